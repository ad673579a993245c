//! Notifier configuration.

use crate::store::DEFAULT_RECORD_PREFIX;
use crate::templates::{DEFAULT_HTML_TEMPLATE, DEFAULT_PLAINTEXT_TEMPLATE};
use core_config::{env_optional, env_or_default, env_parse, env_required, ConfigError, FromEnv};
use strum::{Display, EnumString};

/// How a delivery key is derived from a stream entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum KeyStrategy {
    /// The stream entry ID.
    #[default]
    EventId,
    /// SHA-256 of the payload plus the entry's `request_id`.
    ContentHash,
}

/// Renderer and record settings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub from_address: String,
    pub plaintext_template: String,
    pub html_template: String,
    pub key_strategy: KeyStrategy,
    pub record_prefix: String,
}

impl NotifierConfig {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
            plaintext_template: DEFAULT_PLAINTEXT_TEMPLATE.to_string(),
            html_template: DEFAULT_HTML_TEMPLATE.to_string(),
            key_strategy: KeyStrategy::default(),
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
        }
    }
}

impl FromEnv for NotifierConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let from_address = env_required("NOTIFY_FROM_ADDRESS")?;
        if from_address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "NOTIFY_FROM_ADDRESS".to_string(),
                details: "sender address must not be empty".to_string(),
            });
        }

        Ok(Self {
            from_address,
            plaintext_template: env_optional("NOTIFY_PLAINTEXT_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_PLAINTEXT_TEMPLATE.to_string()),
            html_template: env_optional("NOTIFY_HTML_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_HTML_TEMPLATE.to_string()),
            key_strategy: env_parse("NOTIFY_DELIVERY_KEY", KeyStrategy::default())?,
            record_prefix: env_or_default("NOTIFY_RECORD_PREFIX", DEFAULT_RECORD_PREFIX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strategy_parse() {
        assert_eq!("event_id".parse::<KeyStrategy>().unwrap(), KeyStrategy::EventId);
        assert_eq!(
            "CONTENT_HASH".parse::<KeyStrategy>().unwrap(),
            KeyStrategy::ContentHash
        );
        assert!("sha1".parse::<KeyStrategy>().is_err());
        assert_eq!(KeyStrategy::ContentHash.to_string(), "content_hash");
    }

    #[test]
    fn test_notifier_config_defaults() {
        temp_env::with_vars(
            [
                ("NOTIFY_FROM_ADDRESS", Some("notifications@example.com")),
                ("NOTIFY_PLAINTEXT_TEMPLATE", None),
                ("NOTIFY_HTML_TEMPLATE", None),
                ("NOTIFY_DELIVERY_KEY", None),
                ("NOTIFY_RECORD_PREFIX", None),
            ],
            || {
                let config = NotifierConfig::from_env().unwrap();
                assert_eq!(config.from_address, "notifications@example.com");
                assert_eq!(config.plaintext_template, DEFAULT_PLAINTEXT_TEMPLATE);
                assert_eq!(config.html_template, DEFAULT_HTML_TEMPLATE);
                assert_eq!(config.key_strategy, KeyStrategy::EventId);
                assert_eq!(config.record_prefix, "notification:record");
            },
        );
    }

    #[test]
    fn test_notifier_config_overrides() {
        temp_env::with_vars(
            [
                ("NOTIFY_FROM_ADDRESS", Some("ops@example.com")),
                ("NOTIFY_PLAINTEXT_TEMPLATE", Some("Hi $recipient_name")),
                ("NOTIFY_HTML_TEMPLATE", Some("<b>$recipient_name</b>")),
                ("NOTIFY_DELIVERY_KEY", Some("content_hash")),
                ("NOTIFY_RECORD_PREFIX", Some("courier:sent")),
            ],
            || {
                let config = NotifierConfig::from_env().unwrap();
                assert_eq!(config.plaintext_template, "Hi $recipient_name");
                assert_eq!(config.html_template, "<b>$recipient_name</b>");
                assert_eq!(config.key_strategy, KeyStrategy::ContentHash);
                assert_eq!(config.record_prefix, "courier:sent");
            },
        );
    }

    #[test]
    fn test_notifier_config_requires_sender() {
        temp_env::with_var_unset("NOTIFY_FROM_ADDRESS", || {
            let err = NotifierConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "NOTIFY_FROM_ADDRESS"));
        });

        temp_env::with_var("NOTIFY_FROM_ADDRESS", Some("   "), || {
            assert!(matches!(
                NotifierConfig::from_env(),
                Err(ConfigError::Invalid { .. })
            ));
        });
    }

    #[test]
    fn test_notifier_config_rejects_unknown_key_strategy() {
        temp_env::with_vars(
            [
                ("NOTIFY_FROM_ADDRESS", Some("ops@example.com")),
                ("NOTIFY_DELIVERY_KEY", Some("random")),
            ],
            || {
                assert!(matches!(
                    NotifierConfig::from_env(),
                    Err(ConfigError::ParseError { .. })
                ));
            },
        );
    }
}
