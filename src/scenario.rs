use crate::actions::{LoginReport, LoginRunner};
use crate::browser::{
    ActivePage, AssertionVerifier, LoadReport, NavigationController, Session, Verification,
};
use crate::core::{BrowserTrait, Config};
use crate::errors::{ErrorKind, Result};
use crate::utils::ScreenshotManager;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioOutcome {
    Success,
    Failure { kind: ErrorKind, reason: String },
}

impl ScenarioOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScenarioOutcome::Success)
    }

    /// 0 on success, 2 when the run never got a working browser or config,
    /// 1 for every other failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScenarioOutcome::Success => 0,
            ScenarioOutcome::Failure {
                kind: ErrorKind::Environment | ErrorKind::Configuration,
                ..
            } => 2,
            ScenarioOutcome::Failure { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ScenarioOutcome,
    pub navigations: Vec<LoadReport>,
    pub login: LoginReport,
    pub assertion: Option<Verification>,
    pub screenshot: Option<PathBuf>,
    pub teardown_error: Option<String>,
}

impl ScenarioReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What the run collected before it finished or failed.
#[derive(Debug, Default)]
struct Trace {
    navigations: Vec<LoadReport>,
    login: LoginReport,
    assertion: Option<Verification>,
    screenshot: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InvoiceScenario {
    config: Config,
}

impl InvoiceScenario {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the scenario once on `browser`. Never fails: every problem ends
    /// up in the report's outcome, and the browser is always shut down.
    pub async fn run<B>(&self, browser: B) -> ScenarioReport
    where
        B: BrowserTrait + 'static,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run = %run_id, base_url = %self.config.target.base_url, "scenario started");

        let trace = Arc::new(Mutex::new(Trace::default()));
        let scenario = self.clone();
        let body_trace = trace.clone();
        let body_run_id = run_id.clone();

        let scoped = Session::scoped(browser, self.config.clone(), move |session| {
            async move {
                let result = scenario.drive(session, &body_trace).await;
                if result.is_err() {
                    scenario
                        .capture_failure(session, &body_run_id, &body_trace)
                        .await;
                }
                result
            }
            .boxed()
        })
        .await;

        let (outcome, teardown_error) = match scoped {
            Ok(run) => {
                let teardown_error = run.teardown.err().map(|e| e.to_string());
                let outcome = match run.result {
                    Ok(_) => ScenarioOutcome::Success,
                    Err(err) => ScenarioOutcome::Failure {
                        kind: err.kind(),
                        reason: err.to_string(),
                    },
                };
                (outcome, teardown_error)
            }
            Err(err) => (
                ScenarioOutcome::Failure {
                    kind: err.kind(),
                    reason: err.to_string(),
                },
                None,
            ),
        };

        if let Some(teardown) = &teardown_error {
            warn!(run = %run_id, error = %teardown, "teardown reported an error");
        }
        match &outcome {
            ScenarioOutcome::Success => info!(run = %run_id, "scenario passed"),
            ScenarioOutcome::Failure { kind, reason } => {
                error!(run = %run_id, kind = %kind, "scenario failed: {}", reason)
            }
        }

        let mut trace = trace.lock().await;
        ScenarioReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcome,
            navigations: std::mem::take(&mut trace.navigations),
            login: std::mem::take(&mut trace.login),
            assertion: trace.assertion.take(),
            screenshot: trace.screenshot.take(),
            teardown_error,
        }
    }

    async fn drive<B: BrowserTrait>(
        &self,
        session: &mut Session<B>,
        trace: &Mutex<Trace>,
    ) -> Result<Verification> {
        let target = &self.config.target;
        let timeouts = &self.config.session;

        let home = open(session, &target.url(&target.home_path)?, &self.config, trace).await?;
        if let Some(scroll) = timeouts.pre_login_scroll {
            if let Err(err) = home.scroll_by(scroll.dx, scroll.dy).await {
                warn!(error = %err, "pre-login scroll failed; continuing");
            }
        }

        let committed = home
            .navigate(&target.url(&target.signin_path)?, timeouts.commit_timeout())
            .await?;
        let mut signin = committed.await_loaded(timeouts.load_timeout()).await?;
        trace.lock().await.navigations.push(signin.load_report().clone());

        let mut login = LoginReport::default();
        let attempted = LoginRunner::from_config(&self.config)
            .run(&mut signin, &self.config.login.attempts, &mut login)
            .await;
        trace.lock().await.login = login;
        attempted?;

        let committed = signin
            .navigate(&target.url(&target.invoices_path)?, timeouts.commit_timeout())
            .await?;
        let invoices = committed.await_loaded(timeouts.load_timeout()).await?;
        trace.lock().await.navigations.push(invoices.load_report().clone());

        let assertion = &self.config.assertion;
        let verification = AssertionVerifier::new(timeouts.poll_interval())
            .assert_visible(
                &invoices,
                &assertion.matcher()?,
                assertion.timeout(),
                &assertion.diagnostic,
            )
            .await?;
        trace.lock().await.assertion = Some(verification.clone());

        if assertion.hold_ms > 0 {
            info!(hold_ms = assertion.hold_ms, "holding page open");
            tokio::time::sleep(Duration::from_millis(assertion.hold_ms)).await;
        }
        Ok(verification)
    }

    async fn capture_failure<B: BrowserTrait>(
        &self,
        session: &Session<B>,
        run_id: &str,
        trace: &Mutex<Trace>,
    ) {
        let Some(dir) = &self.config.artifacts.screenshot_dir else {
            return;
        };
        let saved = match session.active_tab().await {
            Ok(tab) => ScreenshotManager::save_failure(session.browser(), &tab, dir, run_id).await,
            Err(err) => Err(err),
        };
        match saved {
            Ok(path) => {
                info!(path = %path.display(), "failure screenshot saved");
                trace.lock().await.screenshot = Some(path);
            }
            Err(err) => warn!(error = %err, "could not capture failure screenshot"),
        }
    }
}

async fn open<'s, B: BrowserTrait>(
    session: &'s mut Session<B>,
    url: &str,
    config: &Config,
    trace: &Mutex<Trace>,
) -> Result<ActivePage<'s, B>> {
    let page = NavigationController::navigate(session, url, config.session.commit_timeout())
        .await?
        .await_loaded(config.session.load_timeout())
        .await?;
    trace.lock().await.navigations.push(page.load_report().clone());
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ScenarioOutcome::Success.exit_code(), 0);
        let environment = ScenarioOutcome::Failure {
            kind: ErrorKind::Environment,
            reason: "no chrome".to_string(),
        };
        assert_eq!(environment.exit_code(), 2);
        let assertion = ScenarioOutcome::Failure {
            kind: ErrorKind::AssertionTimeout,
            reason: "no invoices".to_string(),
        };
        assert_eq!(assertion.exit_code(), 1);
    }

    #[test]
    fn test_outcome_serializes_with_verdict_tag() {
        let outcome = ScenarioOutcome::Failure {
            kind: ErrorKind::ElementNotFound,
            reason: "gone".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["verdict"], "FAILURE");
        assert_eq!(json["kind"], "ELEMENT_NOT_FOUND");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.login.attempts.clear();
        assert!(InvoiceScenario::new(config).is_err());
    }
}
