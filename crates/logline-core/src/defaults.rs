//! Process-wide default logger factory
//!
//! [`AppLogger::new`](crate::AppLogger::new) and
//! [`AppLogger::for_type`](crate::AppLogger::for_type) draw their loggers
//! from here. Call [`install`] once at startup, before the first logger is
//! created; the first use freezes the defaults, and without an install the
//! built-in configuration writing through a
//! [`TracingSink`](crate::sink::TracingSink) is used.

use crate::config::LoggingConfiguration;
use crate::error::DefaultsError;
use crate::factory::AppLoggerFactory;
use std::sync::OnceLock;

/// Application name used when nothing else is configured
pub const DEFAULT_APPLICATION_NAME: &str = "application";

static DEFAULT: OnceLock<AppLoggerFactory> = OnceLock::new();

/// Make `factory` the process-wide default
///
/// Fails if defaults were already installed or already used.
pub fn install(factory: AppLoggerFactory) -> Result<(), DefaultsError> {
    DEFAULT
        .set(factory)
        .map_err(|_| DefaultsError::AlreadyInstalled)?;
    tracing::debug!(
        application = DEFAULT.get().map(|f| f.application_name()).unwrap_or_default(),
        "logging defaults installed"
    );
    Ok(())
}

/// Whether the defaults are fixed, by [`install`] or by first use
pub fn is_installed() -> bool {
    DEFAULT.get().is_some()
}

/// The process-wide factory
pub fn factory() -> &'static AppLoggerFactory {
    DEFAULT.get_or_init(|| {
        AppLoggerFactory::new(DEFAULT_APPLICATION_NAME, LoggingConfiguration::default())
            .expect("built-in logging configuration is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::AppLogger;
    use serial_test::serial;
    use std::sync::Arc;

    #[test]
    #[serial]
    fn test_install_once_then_frozen() {
        let sink = Arc::new(MemorySink::new());
        let config = LoggingConfiguration::builder()
            .application_name("inventory")
            .build();
        let factory = AppLoggerFactory::with_sink("ignored", Arc::new(config), sink.clone()).unwrap();

        install(factory).unwrap();
        assert!(is_installed());

        let second = AppLoggerFactory::new("again", LoggingConfiguration::default()).unwrap();
        assert!(matches!(install(second), Err(DefaultsError::AlreadyInstalled)));

        struct StockService;
        let logger = AppLogger::for_type::<StockService>();
        assert_eq!(logger.application(), "inventory");
        logger.info("reserved").unwrap();

        let entry = &sink.entries()[0];
        assert_eq!(entry["application"], "inventory");
        assert!(entry["logger_name"].as_str().unwrap().ends_with("StockService"));
    }
}
