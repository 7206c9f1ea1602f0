use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Browser context creation failed: {0}")]
    ContextFailed(String),

    #[error("No active tab")]
    NoActiveTab,

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Navigation to {url} was not committed within {timeout_ms}ms")]
    CommitTimeout { url: String, timeout_ms: u64 },

    #[error("Frame {frame} did not reach DOMContentLoaded within {timeout_ms}ms")]
    LoadStateTimeout { frame: String, timeout_ms: u64 },

    #[error("Element not found: {locator} (waited {waited_ms}ms)")]
    ElementNotFound { locator: String, waited_ms: u64 },

    #[error("{action} on {locator} did not complete within {timeout_ms}ms")]
    ActionTimeout {
        action: String,
        locator: String,
        timeout_ms: u64,
    },

    #[error("{diagnostic}")]
    AssertionFailed {
        expectation: String,
        diagnostic: String,
        timeout_ms: u64,
    },

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chrome error: {0}")]
    ChromeError(String),
}

pub type Result<T> = std::result::Result<T, ScenarioError>;

/// Failure classes a harness can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Environment,
    Navigation,
    NavigationTimeout,
    ElementNotFound,
    ActionTimeout,
    AssertionTimeout,
    Configuration,
    Engine,
}

impl ErrorKind {
    /// Errors that end the current login attempt but leave the remediation
    /// chain free to try the next one.
    pub fn is_attempt_recoverable(self) -> bool {
        matches!(self, ErrorKind::ElementNotFound | ErrorKind::ActionTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Environment => "ENVIRONMENT",
            ErrorKind::Navigation => "NAVIGATION",
            ErrorKind::NavigationTimeout => "NAVIGATION_TIMEOUT",
            ErrorKind::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorKind::ActionTimeout => "ACTION_TIMEOUT",
            ErrorKind::AssertionTimeout => "ASSERTION_TIMEOUT",
            ErrorKind::Configuration => "CONFIGURATION",
            ErrorKind::Engine => "ENGINE",
        };
        f.write_str(name)
    }
}

impl ScenarioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScenarioError::LaunchFailed(_)
            | ScenarioError::BrowserNotLaunched
            | ScenarioError::ContextFailed(_) => ErrorKind::Environment,
            ScenarioError::NavigationFailed { .. } | ScenarioError::CommitTimeout { .. } => {
                ErrorKind::Navigation
            }
            ScenarioError::LoadStateTimeout { .. } => ErrorKind::NavigationTimeout,
            ScenarioError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            ScenarioError::ActionTimeout { .. } => ErrorKind::ActionTimeout,
            ScenarioError::AssertionFailed { .. } => ErrorKind::AssertionTimeout,
            ScenarioError::InvalidLocator(_)
            | ScenarioError::ConfigurationError(_)
            | ScenarioError::ConfigParseError(_) => ErrorKind::Configuration,
            ScenarioError::NoActiveTab
            | ScenarioError::JavaScriptFailed(_)
            | ScenarioError::SerializationError(_)
            | ScenarioError::IoError(_)
            | ScenarioError::ChromeError(_) => ErrorKind::Engine,
        }
    }

    pub fn element_not_found(locator: impl fmt::Display) -> Self {
        ScenarioError::ElementNotFound {
            locator: locator.to_string(),
            waited_ms: 0,
        }
    }

    pub fn from_any_error<E: fmt::Display>(err: E) -> Self {
        ScenarioError::ChromeError(err.to_string())
    }
}

// headless_chrome reports everything through anyhow
impl From<anyhow::Error> for ScenarioError {
    fn from(err: anyhow::Error) -> Self {
        ScenarioError::ChromeError(format!("{:#}", err))
    }
}

impl From<url::ParseError> for ScenarioError {
    fn from(err: url::ParseError) -> Self {
        ScenarioError::ConfigurationError(format!("invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            ScenarioError::LaunchFailed("no chrome".into()).kind(),
            ErrorKind::Environment
        );
        assert_eq!(
            ScenarioError::LoadStateTimeout {
                frame: "main".into(),
                timeout_ms: 3000
            }
            .kind(),
            ErrorKind::NavigationTimeout
        );
        assert_eq!(
            ScenarioError::element_not_found("xpath=html/body/form/input").kind(),
            ErrorKind::ElementNotFound
        );
        assert!(ErrorKind::ActionTimeout.is_attempt_recoverable());
        assert!(!ErrorKind::AssertionTimeout.is_attempt_recoverable());
        assert!(!ErrorKind::Environment.is_attempt_recoverable());
    }

    #[test]
    fn test_engine_errors_convert() {
        let err: ScenarioError = anyhow::anyhow!("target closed").into();
        assert!(matches!(err, ScenarioError::ChromeError(ref msg) if msg == "target closed"));
        assert_eq!(err.kind(), ErrorKind::Engine);

        let err: ScenarioError = anyhow::anyhow!("target closed").context("screenshot failed").into();
        assert_eq!(err.to_string(), "Chrome error: screenshot failed: target closed");

        let err = ScenarioError::from_any_error("lock poisoned");
        assert_eq!(err.to_string(), "Chrome error: lock poisoned");
        assert_eq!(err.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_assertion_failure_displays_diagnostic_only() {
        let err = ScenarioError::AssertionFailed {
            expectation: "text=Invoice generation successful".into(),
            diagnostic: "Invoices were not generated".into(),
            timeout_ms: 1000,
        };
        assert_eq!(err.to_string(), "Invoices were not generated");
        assert_eq!(ErrorKind::AssertionTimeout.to_string(), "ASSERTION_TIMEOUT");
    }
}
