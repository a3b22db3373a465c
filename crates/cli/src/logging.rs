use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	// 0 = warnings only (the wire layer stays quiet)
	// 1 (-v) = info, wire layer at warn
	// 2+ (-vv) = debug for everything, including frames
	let filter = match verbosity {
		0 => "warn,cvmweb_runtime=error",
		1 => "info,cvmweb_runtime=warn",
		_ => "debug",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	// A second init (tests calling into the CLI) keeps the first subscriber.
	let _ = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(verbosity > 1)
		.with_level(true)
		.compact()
		.try_init();
}
