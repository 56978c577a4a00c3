//! Subscriber installation.

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` overrides `config.default_filter`. A second call leaves the
/// first subscriber in place.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        let config = LogConfig::default().with_format(LogFormat::Pretty);
        init(&config);
        init(&LogConfig::default());
        ::tracing::info!("still logging after second init");
    }
}
