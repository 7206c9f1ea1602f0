use crate::actions::interaction::{InteractionEngine, InteractionRecord};
use crate::browser::ActivePage;
use crate::core::{BrowserTrait, Config};
use crate::dom::{ElementReference, PathStep, StructuralPath, TextMatcher};
use crate::errors::{ErrorKind, Result, ScenarioError};
use crate::types::Credential;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    Identity,
    Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormControl {
    Submit,
    AlternateLink,
}

/// One corrective action applied before an attempt's fill-and-submit pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RemediationStep {
    ClearField { field: FormField },
    FillField { field: FormField, value: String },
    ClickControl { control: FormControl },
    /// Follow the alternate login link if the page has one.
    NavigateAlternate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginForm {
    pub identity: ElementReference,
    pub secret: ElementReference,
    pub submit: ElementReference,
    #[serde(default)]
    pub alternate: Option<ElementReference>,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            identity: signin_layout(&[PathStep::tag("form"), PathStep::tag("input")]),
            secret: signin_layout(&[
                PathStep::tag("form"),
                PathStep::tag("div"),
                PathStep::tag("input"),
            ]),
            submit: signin_layout(&[PathStep::tag("form"), PathStep::tag("button")]),
            alternate: Some(signin_layout(&[PathStep::nth("div", 2), PathStep::tag("a")])),
        }
    }
}

/// `html/body/div/div/div/<tail>`, first match.
fn signin_layout(tail: &[PathStep]) -> ElementReference {
    let mut steps: Vec<PathStep> = ["html", "body", "div", "div", "div"]
        .into_iter()
        .map(PathStep::tag)
        .collect();
    steps.extend_from_slice(tail);
    ElementReference::new(StructuralPath::from_steps(steps), 0)
}

impl LoginForm {
    pub fn field(&self, field: FormField) -> &ElementReference {
        match field {
            FormField::Identity => &self.identity,
            FormField::Secret => &self.secret,
        }
    }

    pub fn control(&self, control: FormControl) -> Result<&ElementReference> {
        match control {
            FormControl::Submit => Ok(&self.submit),
            FormControl::AlternateLink => self.alternate.as_ref().ok_or_else(|| {
                ScenarioError::ConfigurationError("login form has no alternate link".to_string())
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub label: String,
    pub credential: Credential,
    #[serde(default)]
    pub remediation: Vec<RemediationStep>,
}

impl LoginAttempt {
    pub fn new(label: impl Into<String>, credential: Credential) -> Self {
        Self {
            label: label.into(),
            credential,
            remediation: Vec::new(),
        }
    }

    pub fn with_remediation(mut self, steps: Vec<RemediationStep>) -> Self {
        self.remediation = steps;
        self
    }
}

/// How an attempt is judged after submit. `None` leaves every attempt
/// unconfirmed, so the whole chain runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoginConfirmation {
    None,
    /// The identity field is gone from the active page.
    FormDismissed { within_ms: u64 },
    /// The active page URL no longer contains `fragment`.
    UrlLeaves { fragment: String, within_ms: u64 },
    TextVisible { text: String, within_ms: u64 },
}

impl Default for LoginConfirmation {
    fn default() -> Self {
        LoginConfirmation::FormDismissed { within_ms: 3000 }
    }
}

impl LoginConfirmation {
    fn window(&self) -> Option<Duration> {
        match self {
            LoginConfirmation::None => None,
            LoginConfirmation::FormDismissed { within_ms }
            | LoginConfirmation::UrlLeaves { within_ms, .. }
            | LoginConfirmation::TextVisible { within_ms, .. } => {
                Some(Duration::from_millis(*within_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginStage {
    Init,
    FillIdentity,
    FillSecret,
    Submit,
    OutcomeUnknown,
}

impl LoginStage {
    pub fn next(self) -> Option<LoginStage> {
        match self {
            LoginStage::Init => Some(LoginStage::FillIdentity),
            LoginStage::FillIdentity => Some(LoginStage::FillSecret),
            LoginStage::FillSecret => Some(LoginStage::Submit),
            LoginStage::Submit => Some(LoginStage::OutcomeUnknown),
            LoginStage::OutcomeUnknown => None,
        }
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginStage::Init => "INIT",
            LoginStage::FillIdentity => "FILL_IDENTITY",
            LoginStage::FillSecret => "FILL_SECRET",
            LoginStage::Submit => "SUBMIT",
            LoginStage::OutcomeUnknown => "OUTCOME_UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Confirmed,
    Unconfirmed,
    /// Submitted with no confirmation probe configured.
    Unknown,
    Failed { kind: ErrorKind, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub label: String,
    pub identity: String,
    pub stage: LoginStage,
    pub outcome: AttemptOutcome,
    pub interactions: Vec<InteractionRecord>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginReport {
    pub attempts: Vec<AttemptRecord>,
    pub confirmed: bool,
}

impl LoginReport {
    /// Attempts that ran the state machine through to OUTCOME_UNKNOWN.
    pub fn passes(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.stage == LoginStage::OutcomeUnknown)
            .count()
    }
}

/// Replays login attempts in order until one is confirmed or the attempt
/// budget is spent.
#[derive(Debug, Clone)]
pub struct LoginRunner {
    engine: InteractionEngine,
    form: LoginForm,
    confirmation: LoginConfirmation,
    max_attempts: usize,
    poll: Duration,
}

impl LoginRunner {
    pub fn new(
        engine: InteractionEngine,
        form: LoginForm,
        confirmation: LoginConfirmation,
        max_attempts: usize,
        poll: Duration,
    ) -> Self {
        Self {
            engine,
            form,
            confirmation,
            max_attempts,
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            InteractionEngine::from_config(&config.session),
            config.login.form.clone(),
            config.login.confirmation.clone(),
            config.login.max_attempts,
            config.session.poll_interval(),
        )
    }

    /// Runs at most `max_attempts` of `attempts`. Element and action
    /// failures end only the attempt they happen in; if every attempt ends
    /// that way the last failure is returned. Any other error stops the
    /// chain at once.
    pub async fn run<B: BrowserTrait>(
        &self,
        page: &mut ActivePage<'_, B>,
        attempts: &[LoginAttempt],
        report: &mut LoginReport,
    ) -> Result<()> {
        if attempts.len() > self.max_attempts {
            warn!(
                scripted = attempts.len(),
                cap = self.max_attempts,
                "more login attempts scripted than allowed; extra attempts are skipped"
            );
        }

        let mut last_failure = None;
        let mut completed = 0usize;

        for (index, attempt) in attempts.iter().take(self.max_attempts).enumerate() {
            info!(
                attempt = index + 1,
                label = %attempt.label,
                identity = %attempt.credential.identity,
                "login attempt"
            );
            let started = Instant::now();
            let mut record = AttemptRecord {
                label: attempt.label.clone(),
                identity: attempt.credential.identity.clone(),
                stage: LoginStage::Init,
                outcome: AttemptOutcome::Unknown,
                interactions: Vec::new(),
                execution_time_ms: 0,
            };

            let result = self.run_attempt(page, attempt, &mut record).await;
            record.execution_time_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    completed += 1;
                    record.outcome = self.confirm(page).await?;
                    let confirmed = record.outcome == AttemptOutcome::Confirmed;
                    info!(label = %attempt.label, outcome = ?record.outcome, "login attempt finished");
                    report.attempts.push(record);
                    if confirmed {
                        report.confirmed = true;
                        return Ok(());
                    }
                }
                Err(err) if err.kind().is_attempt_recoverable() => {
                    warn!(
                        label = %attempt.label,
                        stage = %record.stage,
                        kind = %err.kind(),
                        error = %err,
                        "login attempt failed; moving to next remediation"
                    );
                    record.outcome = AttemptOutcome::Failed {
                        kind: err.kind(),
                        reason: err.to_string(),
                    };
                    report.attempts.push(record);
                    last_failure = Some(err);
                }
                Err(err) => {
                    record.outcome = AttemptOutcome::Failed {
                        kind: err.kind(),
                        reason: err.to_string(),
                    };
                    report.attempts.push(record);
                    return Err(err);
                }
            }
        }

        match last_failure {
            Some(err) if completed == 0 => Err(err),
            _ => {
                if !report.confirmed {
                    warn!(completed, "no login attempt was confirmed; continuing unverified");
                }
                Ok(())
            }
        }
    }

    async fn run_attempt<B: BrowserTrait>(
        &self,
        page: &mut ActivePage<'_, B>,
        attempt: &LoginAttempt,
        record: &mut AttemptRecord,
    ) -> Result<()> {
        for step in &attempt.remediation {
            self.apply(page, step, record).await?;
        }

        let mut stage = LoginStage::Init;
        while let Some(next) = stage.next() {
            let interaction = match next {
                LoginStage::FillIdentity => Some(
                    self.engine
                        .fill(page, &self.form.identity, &attempt.credential.identity)
                        .await?,
                ),
                LoginStage::FillSecret => Some(
                    self.engine
                        .fill(page, &self.form.secret, &attempt.credential.secret)
                        .await?,
                ),
                LoginStage::Submit => Some(self.engine.click(page, &self.form.submit).await?),
                LoginStage::Init | LoginStage::OutcomeUnknown => None,
            };
            record.interactions.extend(interaction);
            stage = next;
            record.stage = stage;
            debug!(label = %attempt.label, stage = %stage, "login stage reached");
        }
        Ok(())
    }

    async fn apply<B: BrowserTrait>(
        &self,
        page: &mut ActivePage<'_, B>,
        step: &RemediationStep,
        record: &mut AttemptRecord,
    ) -> Result<()> {
        debug!(step = step_name(step), "remediation step");
        let interaction = match step {
            RemediationStep::ClearField { field } => {
                self.engine.fill(page, self.form.field(*field), "").await?
            }
            RemediationStep::FillField { field, value } => {
                self.engine.fill(page, self.form.field(*field), value).await?
            }
            RemediationStep::ClickControl { control } => {
                self.engine.click(page, self.form.control(*control)?).await?
            }
            RemediationStep::NavigateAlternate => {
                let link = self.form.control(FormControl::AlternateLink)?;
                match self.engine.click(page, link).await {
                    Ok(interaction) => {
                        page.settle_frames().await?;
                        interaction
                    }
                    Err(err) if err.kind() == ErrorKind::ElementNotFound => {
                        warn!(link = %link, "alternate login link not present; skipping");
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                }
            }
        };
        record.interactions.push(interaction);
        Ok(())
    }

    async fn confirm<B: BrowserTrait>(&self, page: &ActivePage<'_, B>) -> Result<AttemptOutcome> {
        let Some(window) = self.confirmation.window() else {
            return Ok(AttemptOutcome::Unknown);
        };
        let matcher = match &self.confirmation {
            LoginConfirmation::TextVisible { text, .. } => Some(TextMatcher::contains(text.clone())?),
            _ => None,
        };

        let deadline = Instant::now() + window;
        loop {
            let tab = page.tab().await?;
            let confirmed = match &self.confirmation {
                LoginConfirmation::None => false,
                LoginConfirmation::FormDismissed { .. } => page
                    .browser()
                    .probe(&tab, &self.form.identity)
                    .await?
                    .map_or(true, |snapshot| !snapshot.visible),
                LoginConfirmation::UrlLeaves { fragment, .. } => {
                    !page.browser().current_url(&tab).await?.contains(fragment.as_str())
                }
                LoginConfirmation::TextVisible { .. } => {
                    let text = page.browser().visible_text(&tab).await?;
                    matcher.as_ref().map_or(false, |m| m.matches(&text))
                }
            };
            if confirmed {
                return Ok(AttemptOutcome::Confirmed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(AttemptOutcome::Unconfirmed);
            }
            tokio::time::sleep(self.poll.min(remaining)).await;
        }
    }
}

fn step_name(step: &RemediationStep) -> &'static str {
    match step {
        RemediationStep::ClearField { .. } => "clear_field",
        RemediationStep::FillField { .. } => "fill_field",
        RemediationStep::ClickControl { .. } => "click_control",
        RemediationStep::NavigateAlternate => "navigate_alternate",
    }
}
