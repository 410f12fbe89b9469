//! Plugin configuration.
//!
//! Configuration is resolved from explicit builder settings with environment
//! variable fallbacks, then validated once at build time. Both Stripe secrets
//! are held as [`SecretString`] so they never show up in logs or debug output.

use secrecy::SecretString;

use crate::error::{Error, Result};

/// Default bulk sync schedule: every ten minutes, six-field form with seconds.
pub const DEFAULT_CRON_EXPRESSION: &str = "0 */10 * * * *";

/// Resolved plugin configuration.
#[derive(Clone)]
pub struct PluginConfig {
    /// Stripe secret API key. Outbound sync is disabled when absent.
    pub secret_key: Option<SecretString>,
    /// Stripe webhook signing secret. The webhook route answers 503 when absent.
    pub webhook_secret: Option<SecretString>,
    /// Scheduled bulk sync settings.
    pub cron: CronConfig,
    /// Re-run the initial product import even when it already completed.
    pub always_run_migration: bool,
}

/// Scheduled bulk sync settings.
#[derive(Debug, Clone)]
pub struct CronConfig {
    /// Whether the cron-driven bulk sync runs at all.
    pub enabled: bool,
    /// Cron expression, 5 or 6 whitespace-separated fields (seconds optional).
    pub expression: String,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            expression: DEFAULT_CRON_EXPRESSION.to_string(),
        }
    }
}

impl std::fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("cron", &self.cron)
            .field("always_run_migration", &self.always_run_migration)
            .finish()
    }
}

impl PluginConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> PluginConfigBuilder {
        PluginConfigBuilder::new()
    }
}

/// Builder for [`PluginConfig`].
///
/// Explicit setters win over environment fallbacks; call [`from_env`] to fill
/// whatever is still unset from the process environment.
///
/// [`from_env`]: PluginConfigBuilder::from_env
#[derive(Default)]
pub struct PluginConfigBuilder {
    secret_key: Option<SecretString>,
    webhook_secret: Option<SecretString>,
    cron_enabled: Option<bool>,
    cron_expression: Option<String>,
    always_run_migration: Option<bool>,
}

impl PluginConfigBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Stripe secret API key.
    #[must_use]
    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(SecretString::new(key.into()));
        self
    }

    /// Set the Stripe webhook signing secret.
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Enable or disable the cron-driven bulk sync.
    #[must_use]
    pub fn with_cron_enabled(mut self, enabled: bool) -> Self {
        self.cron_enabled = Some(enabled);
        self
    }

    /// Set the cron expression for the bulk sync schedule.
    #[must_use]
    pub fn with_cron_expression(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = Some(expression.into());
        self
    }

    /// Force the initial product import to run again on startup.
    #[must_use]
    pub fn with_always_run_migration(mut self, always: bool) -> Self {
        self.always_run_migration = Some(always);
        self
    }

    /// Fill unset fields from environment variables.
    ///
    /// Reads `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`,
    /// `STRIPE_SYNC_CRON_ENABLED`, `STRIPE_SYNC_CRON_EXPRESSION` and
    /// `STRIPE_SYNC_ALWAYS_RUN_MIGRATION`.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.secret_key.is_none() {
            if let Ok(key) = std::env::var("STRIPE_SECRET_KEY") {
                if !key.is_empty() {
                    self.secret_key = Some(SecretString::new(key));
                }
            }
        }
        if self.webhook_secret.is_none() {
            if let Ok(secret) = std::env::var("STRIPE_WEBHOOK_SECRET") {
                if !secret.is_empty() {
                    self.webhook_secret = Some(SecretString::new(secret));
                }
            }
        }
        if self.cron_enabled.is_none() {
            if let Some(enabled) = env_bool("STRIPE_SYNC_CRON_ENABLED") {
                self.cron_enabled = Some(enabled);
            }
        }
        if self.cron_expression.is_none() {
            if let Ok(expression) = std::env::var("STRIPE_SYNC_CRON_EXPRESSION") {
                if !expression.trim().is_empty() {
                    self.cron_expression = Some(expression);
                }
            }
        }
        if self.always_run_migration.is_none() {
            if let Some(always) = env_bool("STRIPE_SYNC_ALWAYS_RUN_MIGRATION") {
                self.always_run_migration = Some(always);
            }
        }
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the cron expression does not have
    /// 5 or 6 whitespace-separated fields.
    pub fn build(self) -> Result<PluginConfig> {
        let expression = self
            .cron_expression
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_CRON_EXPRESSION)
            .to_string();

        let field_count = expression.split_whitespace().count();
        if !(5..=6).contains(&field_count) {
            return Err(Error::config(format!(
                "Invalid cron expression \"{}\": expected 5 or 6 whitespace-separated fields (seconds optional)",
                expression
            )));
        }

        Ok(PluginConfig {
            secret_key: self.secret_key,
            webhook_secret: self.webhook_secret,
            cron: CronConfig {
                enabled: self.cron_enabled.unwrap_or(false),
                expression,
            },
            always_run_migration: self.always_run_migration.unwrap_or(false),
        })
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_build() {
        let config = PluginConfig::builder().build().unwrap();
        assert!(config.secret_key.is_none());
        assert!(config.webhook_secret.is_none());
        assert!(!config.cron.enabled);
        assert_eq!(config.cron.expression, DEFAULT_CRON_EXPRESSION);
        assert!(!config.always_run_migration);
    }

    #[test]
    fn test_explicit_settings() {
        let config = PluginConfig::builder()
            .with_secret_key("sk_test_12345678901234567890")
            .with_webhook_secret("whsec_abc")
            .with_cron_enabled(true)
            .with_cron_expression("*/30 * * * * *")
            .with_always_run_migration(true)
            .build()
            .unwrap();

        assert_eq!(
            config.secret_key.unwrap().expose_secret(),
            "sk_test_12345678901234567890"
        );
        assert_eq!(config.webhook_secret.unwrap().expose_secret(), "whsec_abc");
        assert!(config.cron.enabled);
        assert_eq!(config.cron.expression, "*/30 * * * * *");
        assert!(config.always_run_migration);
    }

    #[test]
    fn test_cron_expression_five_fields_accepted() {
        let config = PluginConfig::builder()
            .with_cron_expression("*/10 * * * *")
            .build()
            .unwrap();
        assert_eq!(config.cron.expression, "*/10 * * * *");
    }

    #[test]
    fn test_cron_expression_too_few_fields_rejected() {
        let result = PluginConfig::builder()
            .with_cron_expression("* * *")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cron_expression_too_many_fields_rejected() {
        let result = PluginConfig::builder()
            .with_cron_expression("* * * * * * *")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_cron_expression_falls_back_to_default() {
        let config = PluginConfig::builder()
            .with_cron_expression("   ")
            .build()
            .unwrap();
        assert_eq!(config.cron.expression, DEFAULT_CRON_EXPRESSION);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = PluginConfig::builder()
            .with_secret_key("sk_test_12345678901234567890")
            .with_webhook_secret("whsec_very_secret")
            .build()
            .unwrap();
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("sk_test_12345678901234567890"));
        assert!(!debug_output.contains("whsec_very_secret"));
    }
}
