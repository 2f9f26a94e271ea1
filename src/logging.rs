use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber.
///
/// `RUST_LOG` wins when set; otherwise events at `verbosity` and above from
/// this crate are shown. Calling it twice is harmless: the second
/// install attempt is ignored.
pub fn init(verbosity: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("graphnet={verbosity}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Subscriber for tests: captured output, debug level
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("graphnet=debug"))
        .with_test_writer()
        .try_init();
}
