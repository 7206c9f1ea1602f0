use crate::actions::{
    FormField, LoginAttempt, LoginConfirmation, LoginForm, RemediationStep, SettlePolicy,
};
use crate::dom::{MatchMode, TextMatcher};
use crate::errors::{Result, ScenarioError};
use crate::types::{Credential, Viewport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub session: SessionConfig,
    pub target: TargetConfig,
    pub login: LoginConfig,
    pub assertion: AssertionConfig,
    pub artifacts: ArtifactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    /// Process-isolation flags for containers and sandboxes.
    pub args: Vec<String>,
    pub default_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub commit_timeout_ms: u64,
    pub load_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub settle: SettlePolicy,
    /// Wheel scroll applied to the landing page before signing in.
    pub pre_login_scroll: Option<ScrollConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollConfig {
    pub dx: i64,
    pub dy: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    pub home_path: String,
    pub signin_path: String,
    pub invoices_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub form: LoginForm,
    pub confirmation: LoginConfirmation,
    pub max_attempts: usize,
    pub attempts: Vec<LoginAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionConfig {
    pub text: String,
    pub mode: MatchMode,
    pub timeout_ms: u64,
    pub diagnostic: String,
    /// Time the page stays open after a passing assertion.
    pub hold_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub screenshot_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("browser.default_timeout_ms", self.browser.default_timeout_ms),
            ("session.commit_timeout_ms", self.session.commit_timeout_ms),
            ("session.action_timeout_ms", self.session.action_timeout_ms),
            ("session.poll_interval_ms", self.session.poll_interval_ms),
            ("assertion.timeout_ms", self.assertion.timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ScenarioError::ConfigurationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.browser.viewport.width == 0 || self.browser.viewport.height == 0 {
            return Err(ScenarioError::ConfigurationError(
                "viewport dimensions must be non-zero".to_string(),
            ));
        }

        self.target.url(&self.target.home_path)?;

        if self.login.max_attempts == 0 {
            return Err(ScenarioError::ConfigurationError(
                "login.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.login.attempts.is_empty() {
            return Err(ScenarioError::ConfigurationError(
                "login.attempts must name at least one attempt".to_string(),
            ));
        }
        let needs_alternate = self.login.attempts.iter().any(|attempt| {
            attempt
                .remediation
                .iter()
                .any(|step| matches!(step, RemediationStep::NavigateAlternate))
        });
        if needs_alternate && self.login.form.alternate.is_none() {
            return Err(ScenarioError::ConfigurationError(
                "navigate_alternate needs login.form.alternate".to_string(),
            ));
        }

        self.assertion.matcher()?;
        Ok(())
    }
}

impl SessionConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TargetConfig {
    pub fn url(&self, path: &str) -> Result<String> {
        let base = url::Url::parse(&self.base_url)?;
        Ok(base.join(path)?.to_string())
    }
}

impl AssertionConfig {
    pub fn matcher(&self) -> Result<TextMatcher> {
        TextMatcher::new(self.text.clone(), self.mode)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LoginConfig {
    /// Overrides the credential of the first scripted attempt.
    pub fn set_primary_credential(&mut self, identity: Option<String>, secret: Option<String>) {
        if let Some(first) = self.attempts.first_mut() {
            if let Some(identity) = identity {
                first.credential.identity = identity;
            }
            if let Some(secret) = secret {
                first.credential.secret = secret;
            }
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec![
                "--disable-dev-shm-usage".to_string(),
                "--ipc=host".to_string(),
                "--single-process".to_string(),
                "--no-sandbox".to_string(),
            ],
            default_timeout_ms: 5000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: 10000,
            load_timeout_ms: 3000,
            action_timeout_ms: 5000,
            poll_interval_ms: 100,
            settle: SettlePolicy::default(),
            pre_login_scroll: Some(ScrollConfig { dx: 0, dy: 300 }),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            home_path: "/".to_string(),
            signin_path: "/signin".to_string(),
            invoices_path: "/invoices".to_string(),
        }
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        let agent = Credential::new("agentm@rental.com", "1234567");
        let tenant = Credential::new("imani@gmail.com", "1234567");
        let blank_both = vec![
            RemediationStep::ClearField {
                field: FormField::Identity,
            },
            RemediationStep::ClearField {
                field: FormField::Secret,
            },
        ];

        Self {
            form: LoginForm::default(),
            confirmation: LoginConfirmation::default(),
            max_attempts: 4,
            attempts: vec![
                LoginAttempt::new("initial", agent.clone()),
                LoginAttempt::new("blank-and-refill", agent.clone())
                    .with_remediation(blank_both.clone()),
                LoginAttempt::new("alternate-path", agent)
                    .with_remediation(vec![RemediationStep::NavigateAlternate]),
                LoginAttempt::new("corrected-credentials", tenant).with_remediation(blank_both),
            ],
        }
    }
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            text: "Invoice generation successful".to_string(),
            mode: MatchMode::Contains,
            timeout_ms: 1000,
            diagnostic: "Test failed: Invoices were not generated automatically by background \
                         tasks or could not be retrieved and viewed correctly."
                .to_string(),
            hold_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_ok!(config.validate());
        assert_eq!(config.session.action_timeout_ms * 2, config.session.commit_timeout_ms);
        assert_eq!(config.login.attempts.len(), config.login.max_attempts);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [target]
            base_url = "http://app.internal:8080"

            [browser]
            headless = false

            [assertion]
            timeout_ms = 2500
            "#,
        )
        .unwrap();

        assert!(!config.browser.headless);
        assert_eq!(config.assertion.timeout_ms, 2500);
        assert_eq!(config.session.load_timeout_ms, 3000);
        assert_eq!(
            config.target.url(&config.target.invoices_path).unwrap(),
            "http://app.internal:8080/invoices"
        );
    }

    #[test]
    fn test_remediation_chain_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [login]
            max_attempts = 2

            [[login.attempts]]
            label = "first"
            credential = { identity = "agent@rental", secret = "pw" }

            [[login.attempts]]
            label = "tenant"
            credential = { identity = "imani@gmail.com", secret = "pw" }
            remediation = [
                { action = "navigate_alternate" },
                { action = "clear_field", field = "identity" },
                { action = "click_control", control = "submit" },
            ]
            "#,
        )
        .unwrap();

        let attempts = &config.login.attempts;
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1].remediation[0], RemediationStep::NavigateAlternate);
        assert_eq!(attempts[1].remediation.len(), 3);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.session.action_timeout_ms = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.target.base_url = "not a url".to_string();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.login.form.alternate = None;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.login.attempts.clear();
        assert_err!(config.validate());
    }

    #[test]
    fn test_primary_credential_override() {
        let mut login = LoginConfig::default();
        login.set_primary_credential(Some("someone@else.com".to_string()), None);
        assert_eq!(login.attempts[0].credential.identity, "someone@else.com");
        assert_eq!(login.attempts[0].credential.secret, "1234567");
        assert_eq!(login.attempts[1].credential.identity, "agentm@rental.com");
    }
}
