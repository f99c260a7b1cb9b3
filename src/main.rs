//! gradeforge CLI entry point.
//!
//! Logs go to stderr so that stage output and `submit --json` on stdout stay
//! machine-readable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// HTTP client crates are chatty at `debug`; keep them at `warn` unless
/// RUST_LOG says otherwise.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = gradeforge::cli::parse_cli();

    // RUST_LOG wins over --log-level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},{}", cli.log_level, QUIET_DEPENDENCIES))
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .init();

    gradeforge::cli::run_with_cli(cli).await
}
