use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{Backoff, MailboxQuery, ReadState};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub browser: BrowserConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    pub applicant: Applicant,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    pub sender_filter: String,
    pub verification_host: String,
    #[serde(default = "default_true")]
    pub unseen_only: bool,
    pub poll_interval_seconds: u64,
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffKind,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default)]
    pub chrome_path: Option<String>,
    pub element_timeout_seconds: u64,
}

/// Pauses between interactions, giving the page time to react
#[derive(Debug, Deserialize, Clone)]
pub struct FlowConfig {
    #[serde(default = "default_step_settle")]
    pub step_settle_ms: u64,
    #[serde(default = "default_form_settle")]
    pub form_settle_ms: u64,
    #[serde(default = "default_field_settle")]
    pub field_settle_ms: u64,
    #[serde(default = "default_trigger_settle")]
    pub trigger_settle_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            step_settle_ms: default_step_settle(),
            form_settle_ms: default_form_settle(),
            field_settle_ms: default_field_settle(),
            trigger_settle_ms: default_trigger_settle(),
        }
    }
}

/// Identity and mailing address typed into the form
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Applicant {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Visible option text of the suffix dropdown (Jr., Sr., II ...); empty skips it
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub street_address: String,
    #[serde(default)]
    pub apartment: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

fn default_imap_port() -> u16 { 993 }
fn default_folder() -> String { "INBOX".to_string() }
fn default_true() -> bool { true }
fn default_max_backoff() -> u64 { 120 }
fn default_window_width() -> u32 { 1920 }
fn default_window_height() -> u32 { 1080 }
fn default_step_settle() -> u64 { 1000 }
fn default_form_settle() -> u64 { 2000 }
fn default_field_settle() -> u64 { 500 }
fn default_trigger_settle() -> u64 { 2000 }

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides on top of file values.
    ///
    /// `lookup` is `std::env::var(..).ok()` in the binary; tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = lookup(key) {
                *target = v;
            }
        };

        set(&mut self.mailbox.username, "MAIL_ADDRESS");
        set(&mut self.mailbox.password, "MAIL_PASSWORD");
        set(&mut self.mailbox.imap_host, "IMAP_HOST");
        set(&mut self.mailbox.sender_filter, "MAIL_SENDER_FILTER");

        set(&mut self.applicant.first_name, "APPLICANT_FIRST_NAME");
        set(&mut self.applicant.last_name, "APPLICANT_LAST_NAME");
        set(&mut self.applicant.suffix, "APPLICANT_SUFFIX");
        set(&mut self.applicant.street_address, "APPLICANT_STREET");
        set(&mut self.applicant.apartment, "APPLICANT_APARTMENT");
        set(&mut self.applicant.city, "APPLICANT_CITY");
        set(&mut self.applicant.state, "APPLICANT_STATE");
        set(&mut self.applicant.zip_code, "APPLICANT_ZIP");

        if let Some(n) = lookup("POLL_INTERVAL_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            self.mailbox.poll_interval_seconds = n;
        }
        if let Some(n) = lookup("MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
            self.mailbox.max_attempts = n;
        }
        if let Some(v) = lookup("HEADLESS") {
            self.browser.headless = v != "0" && v.to_lowercase() != "false";
        }
    }

    /// Check and normalize every setting the run depends on
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.mailbox.imap_host.trim().is_empty() {
            return Err(ConfigError::Missing("mailbox.imap_host"));
        }
        if self.mailbox.username.trim().is_empty() {
            return Err(ConfigError::Missing("mailbox.username"));
        }
        if self.mailbox.password.is_empty() {
            return Err(ConfigError::Missing("mailbox.password"));
        }
        if self.mailbox.sender_filter.trim().is_empty() {
            return Err(ConfigError::Missing("mailbox.sender_filter"));
        }
        if self.mailbox.verification_host.trim().is_empty() {
            return Err(ConfigError::Missing("mailbox.verification_host"));
        }
        if self.mailbox.max_attempts == 0 {
            return Err(ConfigError::invalid("mailbox.max_attempts", "must be at least 1"));
        }
        if self.browser.element_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "browser.element_timeout_seconds",
                "must be greater than zero",
            ));
        }

        self.applicant.validate()
    }

    pub fn mailbox_query(&self) -> MailboxQuery {
        let backoff = match self.mailbox.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max: Duration::from_secs(self.mailbox.max_backoff_seconds),
            },
        };

        MailboxQuery {
            sender_filter: self.mailbox.sender_filter.clone(),
            read_state: if self.mailbox.unseen_only {
                ReadState::Unseen
            } else {
                ReadState::Any
            },
            poll_interval: Duration::from_secs(self.mailbox.poll_interval_seconds),
            max_attempts: self.mailbox.max_attempts,
            backoff,
        }
    }
}

impl Applicant {
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        for value in [
            &mut self.first_name,
            &mut self.last_name,
            &mut self.suffix,
            &mut self.street_address,
            &mut self.apartment,
            &mut self.city,
            &mut self.state,
            &mut self.zip_code,
        ] {
            *value = value.trim().to_string();
        }

        let required = [
            ("applicant.first_name", &self.first_name),
            ("applicant.last_name", &self.last_name),
            ("applicant.street_address", &self.street_address),
            ("applicant.city", &self.city),
            ("applicant.state", &self.state),
            ("applicant.zip_code", &self.zip_code),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        if self.state.len() != 2 || !self.state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::invalid(
                "applicant.state",
                format!("expected a 2-letter code, got '{}'", self.state),
            ));
        }
        self.state = self.state.to_ascii_uppercase();

        if !is_zip_code(&self.zip_code) {
            return Err(ConfigError::invalid(
                "applicant.zip_code",
                format!("expected 5 digits or ZIP+4, got '{}'", self.zip_code),
            ));
        }

        Ok(())
    }
}

// 10025 or 10025-6053
fn is_zip_code(zip: &str) -> bool {
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    match zip.split_once('-') {
        None => zip.len() == 5 && all_digits(zip),
        Some((head, tail)) => head.len() == 5 && all_digits(head) && tail.len() == 4 && all_digits(tail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        [mailbox]
        imap_host = "imap.example.com"
        username = "someone@example.com"
        password = "app-password"
        sender_filter = "promo.example.com"
        verification_host = "amoe.promo.example.com"
        poll_interval_seconds = 15
        max_attempts = 10

        [browser]
        element_timeout_seconds = 15

        [applicant]
        first_name = "Ada"
        last_name = "Lovelace"
        street_address = "12 Analytical Way"
        city = "New York"
        state = "ny"
        zip_code = "10025-6053"
    "#;

    fn sample() -> AppConfig {
        AppConfig::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_keys() {
        let config = sample();
        assert_eq!(config.mailbox.imap_port, 993);
        assert_eq!(config.mailbox.folder, "INBOX");
        assert!(config.mailbox.unseen_only);
        assert_eq!(config.mailbox.backoff, BackoffKind::Fixed);
        assert_eq!(config.browser.window_width, 1920);
        assert_eq!(config.flow.trigger_settle_ms, 2000);
        assert!(config.applicant.apartment.is_empty());
    }

    #[test]
    fn test_validate_normalizes_state() {
        let mut config = sample();
        config.validate().unwrap();
        assert_eq!(config.applicant.state, "NY");
    }

    #[test]
    fn test_validate_rejects_bad_state_and_zip() {
        let mut config = sample();
        config.applicant.state = "New York".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "applicant.state", .. })
        ));

        let mut config = sample();
        config.applicant.zip_code = "1002A".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "applicant.zip_code", .. })
        ));
    }

    #[test]
    fn test_validate_requires_credentials_and_names() {
        let mut config = sample();
        config.mailbox.password.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("mailbox.password"))));

        let mut config = sample();
        config.applicant.last_name = "   ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("applicant.last_name"))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MAIL_PASSWORD", "from-env"),
            ("APPLICANT_APARTMENT", "4B"),
            ("MAX_ATTEMPTS", "3"),
            ("HEADLESS", "true"),
            ("POLL_INTERVAL_SECONDS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = sample();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.mailbox.password, "from-env");
        assert_eq!(config.applicant.apartment, "4B");
        assert_eq!(config.mailbox.max_attempts, 3);
        assert!(config.browser.headless);
        assert_eq!(config.mailbox.poll_interval_seconds, 15);
    }

    #[test]
    fn test_mailbox_query_from_config() {
        let mut config = sample();
        config.mailbox.backoff = BackoffKind::Exponential;
        let query = config.mailbox_query();

        assert_eq!(query.sender_filter, "promo.example.com");
        assert_eq!(query.read_state, ReadState::Unseen);
        assert_eq!(query.poll_interval, Duration::from_secs(15));
        assert_eq!(
            query.backoff,
            Backoff::Exponential {
                max: Duration::from_secs(120)
            }
        );
    }

    #[test]
    fn test_zip_formats() {
        assert!(is_zip_code("10025"));
        assert!(is_zip_code("10025-6053"));
        assert!(!is_zip_code("1002"));
        assert!(!is_zip_code("10025-60"));
        assert!(!is_zip_code("10025 6053"));
    }
}
