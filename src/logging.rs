use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CRATE_TARGET: &str = "coaching_engagement";
const LOG_ENV: &str = "COACHING_LOG";

/// Initialize structured logging on stderr so stdout stays clean for
/// command output.
pub fn init_tracing(verbose: bool, log_level: Option<&str>, log_json: bool) -> anyhow::Result<()> {
    let level = match (verbose, log_level) {
        (_, Some(level)) => level,
        (true, None) => "debug",
        (false, None) => "warn",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env(LOG_ENV))
        .unwrap_or_else(|_| EnvFilter::new(directive(level)));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

fn directive(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("{CRATE_TARGET}={level}")
    }
}
