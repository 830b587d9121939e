// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{RawConfigFile, SupervisorConfig};
use crate::errors::{Result, RuntestError};

impl TryFrom<RawConfigFile> for SupervisorConfig {
    type Error = RuntestError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let section = raw.supervisor;
        let config = SupervisorConfig {
            interactive: section.interactive,
            timeout: Duration::from_secs(section.timeout_secs),
            grace: Duration::from_secs(section.grace_secs),
            exit_notification: section.exit_notification,
        };
        config.validate()?;
        Ok(config)
    }
}

impl SupervisorConfig {
    /// Reject settings the supervisor cannot honour.
    ///
    /// Also used after command-line overrides have been applied.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(RuntestError::ConfigError(
                "[supervisor].timeout_secs must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.grace.is_zero() {
            return Err(RuntestError::ConfigError(
                "[supervisor].grace_secs must be >= 1 (got 0)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ExitNotification, SupervisorSection, DEFAULT_GRACE, DEFAULT_TIMEOUT};

    #[test]
    fn empty_file_yields_defaults() {
        let raw: RawConfigFile = toml::from_str("").unwrap();
        let cfg = SupervisorConfig::try_from(raw).unwrap();

        assert_eq!(cfg, SupervisorConfig::default());
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert_eq!(cfg.grace, DEFAULT_GRACE);
    }

    #[test]
    fn section_values_are_carried_over() {
        let raw: RawConfigFile = toml::from_str(
            r#"
[supervisor]
timeout_secs = 3
grace_secs = 1
interactive = true
exit_notification = "sigchld"
"#,
        )
        .unwrap();
        let cfg = SupervisorConfig::try_from(raw).unwrap();

        assert!(cfg.interactive);
        assert_eq!(cfg.exit_notification, ExitNotification::Sigchld);
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.grace, Duration::from_secs(1));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let raw = RawConfigFile {
            supervisor: SupervisorSection {
                timeout_secs: 0,
                ..SupervisorSection::default()
            },
        };

        match SupervisorConfig::try_from(raw) {
            Err(RuntestError::ConfigError(msg)) => assert!(msg.contains("timeout_secs")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn zero_grace_is_rejected_after_override() {
        let cfg = SupervisorConfig::default().grace(Duration::ZERO);
        assert!(matches!(cfg.validate(), Err(RuntestError::ConfigError(_))));
    }

    #[test]
    fn unknown_notifier_is_a_parse_error() {
        let parsed: std::result::Result<RawConfigFile, _> =
            toml::from_str("[supervisor]\nexit_notification = \"poll\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_keys_are_a_parse_error() {
        let parsed: std::result::Result<RawConfigFile, _> =
            toml::from_str("[supervisor]\ntimeout = 3\n");
        assert!(parsed.is_err());
    }
}
