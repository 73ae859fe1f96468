// ABOUTME: tracing-subscriber setup for the command-line binary
// ABOUTME: RUST_LOG wins over the --log-level flag when set

use tracing_subscriber::EnvFilter;

pub fn init(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
