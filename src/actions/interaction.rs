use crate::browser::ActivePage;
use crate::core::config::SessionConfig;
use crate::core::BrowserTrait;
use crate::dom::ElementReference;
use crate::errors::{ErrorKind, Result, ScenarioError};
use crate::types::ElementSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What happens between the previous step and an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Sleep a fixed time, then act as soon as the element is actionable.
    Pause { ms: u64 },
    /// Act once the element has been attached, visible, enabled and
    /// unmoved for `stable_polls` consecutive polls.
    Readiness { stable_polls: u32 },
}

impl Default for SettlePolicy {
    fn default() -> Self {
        SettlePolicy::Readiness { stable_polls: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Fill { target: ElementReference, text: String },
    Click { target: ElementReference },
}

impl Interaction {
    pub fn target(&self) -> &ElementReference {
        match self {
            Interaction::Fill { target, .. } | Interaction::Click { target } => target,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Fill { .. } => "fill",
            Interaction::Click { .. } => "click",
        }
    }
}

// Fill text may be a secret: only its length is shown.
impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interaction::Fill { target, text } => {
                write!(f, "fill({} chars) {}", text.chars().count(), target)
            }
            Interaction::Click { target } => write!(f, "click {}", target),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub action: String,
    pub target: String,
    pub execution_time_ms: u64,
    pub resolutions: u32,
}

#[derive(Debug, Clone)]
pub struct InteractionEngine {
    timeout: Duration,
    poll: Duration,
    settle: SettlePolicy,
}

impl InteractionEngine {
    pub fn new(timeout: Duration, poll: Duration, settle: SettlePolicy) -> Self {
        Self {
            timeout,
            poll: poll.max(Duration::from_millis(1)),
            settle,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.action_timeout(),
            config.poll_interval(),
            config.settle.clone(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fill<B: BrowserTrait>(
        &self,
        page: &ActivePage<'_, B>,
        target: &ElementReference,
        text: &str,
    ) -> Result<InteractionRecord> {
        self.perform(
            page,
            &Interaction::Fill {
                target: target.clone(),
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn click<B: BrowserTrait>(
        &self,
        page: &ActivePage<'_, B>,
        target: &ElementReference,
    ) -> Result<InteractionRecord> {
        self.perform(
            page,
            &Interaction::Click {
                target: target.clone(),
            },
        )
        .await
    }

    /// Runs the settle step, then retries the action until it lands or the
    /// action timeout runs out. A settle pause is not charged to the timeout.
    ///
    /// Fails with `ElementNotFound` if the element was never attached and
    /// with `ActionTimeout` if it was attached but never became actionable.
    pub async fn perform<B: BrowserTrait>(
        &self,
        page: &ActivePage<'_, B>,
        interaction: &Interaction,
    ) -> Result<InteractionRecord> {
        let started = Instant::now();
        let target = interaction.target();

        let (required_stable, pause) = match self.settle {
            SettlePolicy::Pause { ms } => (1, Duration::from_millis(ms)),
            SettlePolicy::Readiness { stable_polls } => (stable_polls.max(1), Duration::ZERO),
        };
        if !pause.is_zero() {
            debug!(pause_ms = pause.as_millis() as u64, "settling before {}", interaction.name());
            tokio::time::sleep(pause).await;
        }
        let acting_since = Instant::now();
        let deadline = acting_since + self.timeout;

        let mut seen = false;
        let mut resolutions = 0u32;
        let mut readiness = Readiness::new(required_stable);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            resolutions += 1;
            match tokio::time::timeout(remaining, self.step(page, interaction, &mut readiness)).await {
                Err(_) => break,
                Ok(Ok(Step::Landed)) => {
                    let execution_time_ms = started.elapsed().as_millis() as u64;
                    debug!(%interaction, execution_time_ms, resolutions, "interaction done");
                    return Ok(InteractionRecord {
                        action: interaction.name().to_string(),
                        target: target.to_string(),
                        execution_time_ms,
                        resolutions,
                    });
                }
                Ok(Ok(Step::Detached)) => {}
                Ok(Ok(Step::Waiting)) => seen = true,
                Ok(Err(err)) => return Err(err),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll.min(remaining)).await;
        }

        let err = if seen {
            ScenarioError::ActionTimeout {
                action: interaction.name().to_string(),
                locator: target.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ScenarioError::ElementNotFound {
                locator: target.to_string(),
                waited_ms: acting_since.elapsed().as_millis() as u64,
            }
        };
        warn!(kind = %err.kind(), resolutions, "{}", err);
        Err(err)
    }

    async fn step<B: BrowserTrait>(
        &self,
        page: &ActivePage<'_, B>,
        interaction: &Interaction,
        readiness: &mut Readiness,
    ) -> Result<Step> {
        let tab = page.tab().await?;
        let snapshot = page.browser().probe(&tab, interaction.target()).await?;
        if !readiness.observe(snapshot) {
            return Ok(if readiness.attached() { Step::Waiting } else { Step::Detached });
        }

        let acted = match interaction {
            Interaction::Fill { target, text } => page.browser().fill(&tab, target, text).await,
            Interaction::Click { target } => page.browser().click(&tab, target).await,
        };
        match acted {
            Ok(()) => Ok(Step::Landed),
            // detached between probe and action
            Err(err) if err.kind() == ErrorKind::ElementNotFound => {
                readiness.reset();
                Ok(Step::Detached)
            }
            Err(err) => Err(err),
        }
    }
}

enum Step {
    Landed,
    Detached,
    Waiting,
}

/// Counts consecutive actionable, unmoved sightings of one element.
struct Readiness {
    required: u32,
    streak: u32,
    previous: Option<ElementSnapshot>,
}

impl Readiness {
    fn new(required: u32) -> Self {
        Self {
            required,
            streak: 0,
            previous: None,
        }
    }

    fn attached(&self) -> bool {
        self.previous.is_some()
    }

    fn reset(&mut self) {
        self.streak = 0;
        self.previous = None;
    }

    fn observe(&mut self, snapshot: Option<ElementSnapshot>) -> bool {
        let Some(snapshot) = snapshot else {
            self.reset();
            return false;
        };

        let actionable = snapshot.visible && snapshot.enabled;
        let unmoved = self
            .previous
            .as_ref()
            .map_or(true, |prev| snapshot.is_stable_against(prev));
        self.streak = if actionable && unmoved { self.streak + 1 } else { 0 };
        self.previous = Some(snapshot);
        self.streak >= self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{NavigationController, Session};
    use crate::testing::{FixtureBrowser, FixtureEvent, FixtureSite, Route, TestHelper};

    const FORM: &str = "html/body/form/input";

    fn engine(settle: SettlePolicy) -> InteractionEngine {
        InteractionEngine::new(Duration::from_millis(1000), Duration::from_millis(100), settle)
    }

    async fn open(route: Route) -> (FixtureBrowser, Session<FixtureBrowser>) {
        let fixture = FixtureBrowser::new(FixtureSite::new().route("/form", route));
        let session = Session::open(fixture.clone(), TestHelper::fast_config("http://app.test"))
            .await
            .unwrap();
        (fixture, session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_rendered_element_is_filled() {
        let route = Route::html("<html><body><p>loading</p></body></html>").replaced_after(
            Duration::from_millis(400),
            "<html><body><form><input name=\"email\"></form></body></html>",
        );
        let (fixture, mut session) = open(route).await;
        let page = NavigationController::navigate(&mut session, "http://app.test/form", Duration::from_secs(10))
            .await
            .unwrap()
            .await_loaded(Duration::from_secs(3))
            .await
            .unwrap();

        let target = page.locate(FORM, 0).unwrap();
        let record = engine(SettlePolicy::default())
            .fill(&page, &target, "agentm@rental.com")
            .await
            .unwrap();
        assert!(record.resolutions > 2);
        assert!(record.execution_time_ms >= 400);
        drop(page);

        let events = fixture.events().await;
        assert!(events.iter().any(|e| matches!(
            e,
            FixtureEvent::Filled { value, .. } if value == "agentm@rental.com"
        )));
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_fails_after_timeout() {
        let (_fixture, mut session) = open(Route::html("<html><body><p>nothing</p></body></html>")).await;
        let page = NavigationController::navigate(&mut session, "http://app.test/form", Duration::from_secs(10))
            .await
            .unwrap()
            .await_loaded(Duration::from_secs(3))
            .await
            .unwrap();

        let started = Instant::now();
        let target = page.locate(FORM, 0).unwrap();
        let err = engine(SettlePolicy::default())
            .click(&page, &target)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ElementNotFound);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        drop(page);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_element_is_an_action_timeout() {
        let route = Route::html("<html><body><form><input disabled></form></body></html>");
        let (_fixture, mut session) = open(route).await;
        let page = NavigationController::navigate(&mut session, "http://app.test/form", Duration::from_secs(10))
            .await
            .unwrap()
            .await_loaded(Duration::from_secs(3))
            .await
            .unwrap();

        let target = page.locate(FORM, 0).unwrap();
        let err = engine(SettlePolicy::Pause { ms: 200 })
            .fill(&page, &target, "x")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ActionTimeout);
        drop(page);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_policy_waits_before_acting() {
        let route = Route::html("<html><body><form><input></form></body></html>");
        let (_fixture, mut session) = open(route).await;
        let page = NavigationController::navigate(&mut session, "http://app.test/form", Duration::from_secs(10))
            .await
            .unwrap()
            .await_loaded(Duration::from_secs(3))
            .await
            .unwrap();

        let target = page.locate(FORM, 0).unwrap();
        let record = engine(SettlePolicy::Pause { ms: 300 })
            .click(&page, &target)
            .await
            .unwrap();
        assert_eq!(record.resolutions, 1);
        assert_eq!(record.execution_time_ms, 300);
        drop(page);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_as_long_as_the_timeout_still_acts() {
        let route = Route::html("<html><body><form><input></form></body></html>");
        let (fixture, mut session) = open(route).await;
        let page = NavigationController::navigate(&mut session, "http://app.test/form", Duration::from_secs(10))
            .await
            .unwrap()
            .await_loaded(Duration::from_secs(3))
            .await
            .unwrap();

        let target = page.locate(FORM, 0).unwrap();
        let record = engine(SettlePolicy::Pause { ms: 1000 })
            .fill(&page, &target, "agentm@rental.com")
            .await
            .unwrap();
        assert_eq!(record.resolutions, 1);
        assert_eq!(record.execution_time_ms, 1000);
        drop(page);

        let events = fixture.events().await;
        assert!(events.iter().any(|e| matches!(e, FixtureEvent::Filled { .. })));
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_element_timeout_starts_after_pause() {
        let (_fixture, mut session) = open(Route::html("<html><body><p>nothing</p></body></html>")).await;
        let page = NavigationController::navigate(&mut session, "http://app.test/form", Duration::from_secs(10))
            .await
            .unwrap()
            .await_loaded(Duration::from_secs(3))
            .await
            .unwrap();

        let started = Instant::now();
        let target = page.locate(FORM, 0).unwrap();
        let err = engine(SettlePolicy::Pause { ms: 500 })
            .click(&page, &target)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ElementNotFound);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
        drop(page);
        session.close().await.unwrap();
    }

    #[test]
    fn test_fill_display_hides_text() {
        let interaction = Interaction::Fill {
            target: ElementReference::parse(FORM, 1).unwrap(),
            text: "1234567".to_string(),
        };
        let shown = interaction.to_string();
        assert!(!shown.contains("1234567"));
        assert!(shown.contains("7 chars"));
    }

    #[test]
    fn test_settle_policy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            settle: SettlePolicy,
        }
        let parsed: Wrapper = toml::from_str("settle = { kind = \"pause\", ms = 1000 }").unwrap();
        assert_eq!(parsed.settle, SettlePolicy::Pause { ms: 1000 });
    }
}
