use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over `default_directive`. Stdout is reserved for command
/// output.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}
