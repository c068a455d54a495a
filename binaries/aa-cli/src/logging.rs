//! Logging setup.
//!
//! Verbosity and colour support are decided once in `main` and passed in;
//! nothing else reads terminal state.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy)]
pub struct LogOptions {
    pub verbose: bool,
    /// stderr is a terminal
    pub ansi: bool,
}

pub fn init(options: LogOptions) {
    let default_level = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,aa_core={0},aa_merge={0},aa_import={0},aa_tools={0}",
            default_level
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(options.verbose)
                .with_ansi(options.ansi)
                .with_writer(std::io::stderr),
        )
        .init();
}
