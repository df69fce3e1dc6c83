//! Logging setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when neither `-v` nor `RUST_LOG` asks for anything else.
const DEFAULT_FILTER: &str = "warn,drive_helper=info";

/// Map the CLI verbosity count onto a filter directive.
pub fn filter_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => DEFAULT_FILTER,
        1 => "warn,drive_helper=debug",
        _ => "debug,drive_helper=trace",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// command output.
///
/// `RUST_LOG` wins over `verbose` when it is set.
pub fn init(verbose: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for_verbosity(verbose)));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_verbosity() {
        assert_eq!(filter_for_verbosity(0), DEFAULT_FILTER);
        assert!(filter_for_verbosity(1).contains("drive_helper=debug"));
        assert!(filter_for_verbosity(5).contains("drive_helper=trace"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(0);
        init(2);
    }
}
