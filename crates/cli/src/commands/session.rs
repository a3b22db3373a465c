//! Commands that act on one session.

use cvmweb::{SessionEvent, SessionId, SessionSnapshot, SessionState};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use super::Context;
use crate::cli::{ControlArgs, GetArgs, SessionAction, SessionArgs, SetArgs, WatchArgs};
use crate::error::{CliError, Result};
use crate::output::{ResultBuilder, print_event, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenData {
	pub session: SessionId,
	pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlData {
	pub session: SessionId,
	pub action: &'static str,
	/// Daemon message for actions that report one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub state: SessionState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueData {
	pub session: SessionId,
	pub key: String,
	pub value: String,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	pub property: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchData {
	pub session: SessionId,
	pub events: usize,
	/// Whether the stream ended because the session closed.
	pub closed: bool,
}

pub async fn open(ctx: &Context, args: SessionArgs) -> Result<()> {
	let (_plugin, session, _prompts) = ctx.open_session(&args.vmcp, args.interact.yes).await?;

	let data = OpenData {
		session: session.id().clone(),
		snapshot: session.snapshot(),
	};
	print_result(
		&ResultBuilder::new("open")
			.inputs(json!({ "vmcp": args.vmcp }))
			.data(data)
			.build(),
		ctx.format,
	);
	Ok(())
}

/// Start parameters as the daemon expects them: a flat string map.
fn start_params(params: Vec<(String, String)>) -> Option<Map<String, Value>> {
	if params.is_empty() {
		return None;
	}
	Some(params.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
}

pub async fn control(ctx: &Context, args: ControlArgs) -> Result<()> {
	if !args.params.is_empty() && args.action != SessionAction::Start {
		return Err(CliError::InvalidInput(format!(
			"--param only applies to start, not {}",
			args.action.name()
		)));
	}

	let (_plugin, session, _prompts) = ctx.open_session(&args.vmcp, args.interact.yes).await?;

	let message = match args.action {
		SessionAction::Start => Some(session.start(start_params(args.params.clone())).await?),
		SessionAction::Stop => Some(session.stop().await?),
		SessionAction::Pause => Some(session.pause().await?),
		SessionAction::Resume => Some(session.resume().await?),
		SessionAction::Hibernate => Some(session.hibernate().await?),
		SessionAction::Reset => Some(session.reset().await?),
		SessionAction::Close => Some(session.close().await?),
		SessionAction::Sync => {
			session.sync()?;
			None
		}
	};
	tracing::info!(session = %session.id(), action = args.action.name(), "Session action done");

	let data = ControlData {
		session: session.id().clone(),
		action: args.action.name(),
		message: message.filter(|m| !m.is_empty()),
		state: session.state(),
	};
	print_result(
		&ResultBuilder::new("control")
			.inputs(json!({ "vmcp": args.vmcp, "action": args.action.name() }))
			.data(data)
			.build(),
		ctx.format,
	);
	Ok(())
}

pub async fn get(ctx: &Context, args: GetArgs) -> Result<()> {
	let (_plugin, session, _prompts) = ctx.open_session(&args.vmcp, args.interact.yes).await?;
	let value = session.get(&args.key).await?;

	let data = ValueData {
		session: session.id().clone(),
		key: args.key.clone(),
		value,
		property: false,
	};
	print_result(
		&ResultBuilder::new("get")
			.inputs(json!({ "vmcp": args.vmcp, "key": args.key }))
			.data(data)
			.build(),
		ctx.format,
	);
	Ok(())
}

pub async fn set(ctx: &Context, args: SetArgs) -> Result<()> {
	let (_plugin, session, _prompts) = ctx.open_session(&args.vmcp, args.interact.yes).await?;
	if args.property {
		session.set_property(&args.key, &args.value).await?;
	} else {
		session.set(&args.key, &args.value).await?;
	}

	let data = ValueData {
		session: session.id().clone(),
		key: args.key.clone(),
		value: args.value.clone(),
		property: args.property,
	};
	print_result(
		&ResultBuilder::new("set")
			.inputs(json!({ "vmcp": args.vmcp, "key": args.key }))
			.data(data)
			.build(),
		ctx.format,
	);
	Ok(())
}

pub async fn watch(ctx: &Context, args: WatchArgs) -> Result<()> {
	let (_plugin, session, _prompts) = ctx.open_session(&args.vmcp, args.interact.yes).await?;
	let id = session.id().clone();

	let (tx, mut rx) = mpsc::unbounded_channel();
	let _events = session.on_event(move |event: SessionEvent| {
		// The receiver only goes away once watching is over.
		let _ = tx.send(event);
		async { Ok::<(), cvmweb::Error>(()) }
	});
	// Ask for the current state so the stream starts with a full picture.
	session.sync()?;

	let mut seen = 0usize;
	let mut closed = false;
	loop {
		if args.count.is_some_and(|limit| seen >= limit) {
			break;
		}
		let event = tokio::select! {
			event = rx.recv() => event,
			_ = tokio::signal::ctrl_c() => {
				tracing::debug!("Interrupted");
				break;
			}
		};
		let Some(event) = event else {
			closed = true;
			break;
		};

		print_event(id.as_str(), &event, ctx.format);
		seen += 1;
		if event == SessionEvent::Closed {
			closed = true;
			break;
		}
	}

	let data = WatchData {
		session: id,
		events: seen,
		closed,
	};
	print_result(
		&ResultBuilder::new("watch")
			.inputs(json!({ "vmcp": args.vmcp }))
			.data(data)
			.build(),
		ctx.format,
	);
	Ok(())
}
