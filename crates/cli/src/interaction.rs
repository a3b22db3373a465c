//! Terminal side of plugin events: progress lines and daemon prompts.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use colored::Colorize;
use cvmweb::{Interaction, InteractionKind, InteractionResult, PluginEvent, Subscription, WebApiPlugin};

use crate::output::print_progress;

/// Prints progress and answers `interact` prompts for as long as the
/// returned subscription lives.
///
/// With `assume_yes` every prompt is accepted without reading stdin.
pub fn attach(plugin: &Arc<WebApiPlugin>, assume_yes: bool) -> Subscription {
	let weak = Arc::downgrade(plugin);

	plugin.on_event(move |event| {
		let weak = weak.clone();
		async move {
			match event {
				PluginEvent::Progress { message, percent } => print_progress(&message, Some(percent)),
				PluginEvent::Started { message } | PluginEvent::Completed { message } => {
					print_progress(&message, None)
				}
				PluginEvent::Privileged { privileged } => {
					tracing::info!(privileged, "Privileged access changed");
				}
				PluginEvent::Interact { interaction } => {
					let result = answer(interaction, assume_yes).await?;
					if let Some(plugin) = weak.upgrade() {
						plugin.reply_interaction(result)?;
					}
				}
				PluginEvent::Disconnected => {
					tracing::warn!("Daemon connection closed");
				}
			}
			Ok::<(), cvmweb::Error>(())
		}
	})
}

async fn answer(interaction: Interaction, assume_yes: bool) -> cvmweb::Result<InteractionResult> {
	eprintln!("{}", describe(&interaction));

	if interaction.kind == InteractionKind::Alert {
		return Ok(InteractionResult::Accepted);
	}
	if assume_yes {
		eprintln!("{}", "accepted (--yes)".dimmed());
		return Ok(InteractionResult::Accepted);
	}

	let accepted = tokio::task::spawn_blocking(|| -> io::Result<bool> {
		let mut stderr = io::stderr().lock();
		write!(stderr, "{} ", "Accept? [y/N]".bold())?;
		stderr.flush()?;

		let mut line = String::new();
		// EOF reads zero bytes and declines.
		io::stdin().lock().read_line(&mut line)?;
		Ok(parse_answer(&line))
	})
	.await
	.map_err(|e| cvmweb::Error::Cancelled(format!("prompt task failed: {e}")))??;

	Ok(InteractionResult::from(accepted))
}

/// Text shown for a daemon prompt.
pub fn describe(interaction: &Interaction) -> String {
	let title = interaction.title.bold();
	match interaction.kind {
		InteractionKind::Confirm => format!("{title}\n{}", interaction.body),
		InteractionKind::Alert => format!("{} {title}\n{}", "!".yellow().bold(), interaction.body),
		InteractionKind::ConfirmLicense => format!("{title}\n\n{}\n", interaction.body),
		InteractionKind::ConfirmLicenseUrl => {
			format!("{title}\nRead the license at {}", interaction.body.underline())
		}
	}
}

pub fn parse_answer(line: &str) -> bool {
	matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_yes_accepts() {
		assert!(parse_answer("y\n"));
		assert!(parse_answer("  YES "));
		assert!(!parse_answer("\n"));
		assert!(!parse_answer("no"));
		assert!(!parse_answer("yep"));
	}

	#[test]
	fn license_url_prompt_shows_the_url() {
		colored::control::set_override(false);
		let interaction = Interaction {
			kind: InteractionKind::ConfirmLicenseUrl,
			title: "License agreement".into(),
			body: "https://example.org/license.html".into(),
		};
		assert_eq!(
			describe(&interaction),
			"License agreement\nRead the license at https://example.org/license.html"
		);
	}
}
