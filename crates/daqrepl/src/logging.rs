//! Tracing setup for the daqrepl binary.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Level selector consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "DAQREPL_LOG";

fn filter_directive(level: Option<&str>) -> String {
    let base_level = match level {
        Some("debug") => "debug",
        Some("trace") => "trace",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("daqrepl={base_level},daqcmd={base_level}")
}

/// Initialize tracing with DAQREPL_LOG and LOG_FORMAT support.
///
/// Logs go to stderr so they never mix with worker output printed on stdout.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directive(std::env::var(LOG_ENV).ok().as_deref()))
    };

    let output = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    // Fails if a subscriber is already installed; the first one stays.
    let _ = tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_info() {
        assert_eq!(filter_directive(None), "daqrepl=info,daqcmd=info");
        assert_eq!(filter_directive(Some("bogus")), "daqrepl=info,daqcmd=info");
    }

    #[test]
    fn accepts_warning_alias() {
        assert_eq!(filter_directive(Some("warning")), "daqrepl=warn,daqcmd=warn");
        assert_eq!(filter_directive(Some("debug")), "daqrepl=debug,daqcmd=debug");
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
