use cvmweb::{RdpTarget, Viewer, ViewerWindow};
use serde::Serialize;
use serde_json::json;

use super::Context;
use crate::cli::ViewerArgs;
use crate::error::{CliError, Result};
use crate::output::{ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerData {
	#[serde(flatten)]
	pub window: ViewerWindow,
	/// `window.open` feature string for embedding pages.
	pub features: String,
}

/// Lays out the viewer window for an RDP address.
///
/// An explicit `--resolution` wins over the one embedded in the address.
pub fn compute(args: &ViewerArgs, viewer_url: &str) -> Result<ViewerWindow> {
	let target = RdpTarget::parse(&args.rdp).map_err(|e| CliError::InvalidInput(e.to_string()))?;
	let resolution = args
		.resolution
		.clone()
		.or_else(|| target.resolution.map(|r| r.to_string()));

	let base_url = args.base_url.as_deref().unwrap_or(viewer_url);
	let viewer = Viewer::new(base_url, args.screen.unwrap_or_default());
	Ok(viewer.window(&target.address, resolution.as_deref())?)
}

pub fn viewer(ctx: &Context, args: ViewerArgs) -> Result<()> {
	let window = compute(&args, &ctx.config.viewer_url)?;
	tracing::info!(url = %window.url, "Viewer window computed");

	let data = ViewerData {
		features: window.features(),
		window,
	};
	print_result(
		&ResultBuilder::new("viewer")
			.inputs(json!({ "rdp": args.rdp, "resolution": args.resolution }))
			.data(data)
			.build(),
		ctx.format,
	);
	Ok(())
}
