//! Link configuration.
//!
//! There is no configuration file. Settings come from command-line flags,
//! with environment variables as fallbacks, and are checked here before a
//! port is opened.

use std::time::Duration;

use crate::error::{Error, Result};

/// Baud rate of the relay cards.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// How long to wait for a reply before declaring the board absent.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(300);

/// Environment variable overriding the read timeout, in seconds.
pub const TIMEOUT_ENV: &str = "CTC_RELAY_TIMEOUT_SECS";

/// Everything needed to open and drive the serial link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    pub tty: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl LinkConfig {
    pub fn new(tty: impl Into<String>) -> Self {
        Self {
            tty: tty.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tty.is_empty() {
            return Err(Error::InvalidArgument("no serial device given".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::InvalidArgument("read timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Read timeout from the environment, or the default.
pub fn read_timeout_from_env() -> Duration {
    read_timeout_or_default(std::env::var(TIMEOUT_ENV).ok().as_deref())
}

/// Unset or unparsable values fall back to [`DEFAULT_READ_TIMEOUT`].
fn read_timeout_or_default(value: Option<&str>) -> Duration {
    value
        .and_then(|s| parse_timeout(s).ok())
        .unwrap_or(DEFAULT_READ_TIMEOUT)
}

/// Parse a timeout given in (possibly fractional) seconds.
pub fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got {}", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("0.3").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_timeout("2").unwrap(), Duration::from_secs(2));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("inf").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_read_timeout_fallback() {
        assert_eq!(read_timeout_or_default(Some("1.5")), Duration::from_millis(1500));
        assert_eq!(read_timeout_or_default(Some("bogus")), DEFAULT_READ_TIMEOUT);
        assert_eq!(read_timeout_or_default(Some("0")), DEFAULT_READ_TIMEOUT);
        assert_eq!(read_timeout_or_default(None), DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_read_timeout_from_env() {
        // Nothing else in the crate touches this variable.
        std::env::set_var(TIMEOUT_ENV, "2");
        assert_eq!(read_timeout_from_env(), Duration::from_secs(2));
        std::env::remove_var(TIMEOUT_ENV);
        assert_eq!(read_timeout_from_env(), DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_defaults() {
        let config = LinkConfig::new("/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 19_200);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_read_timeout_override() {
        let config = LinkConfig::new("/dev/ttyUSB0").with_read_timeout(Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert!(matches!(
            LinkConfig::new("/dev/ttyUSB0")
                .with_read_timeout(Duration::ZERO)
                .validate(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_tty() {
        assert!(matches!(
            LinkConfig::new("").validate(),
            Err(Error::InvalidArgument(_))
        ));
    }
}
