use crate::browser::page::ActivePage;
use crate::core::BrowserTrait;
use crate::dom::TextMatcher;
use crate::errors::{Result, ScenarioError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub expectation: String,
    pub elapsed_ms: u64,
    pub polls: u32,
}

#[derive(Debug, Clone)]
pub struct AssertionVerifier {
    poll: Duration,
}

impl AssertionVerifier {
    pub fn new(poll: Duration) -> Self {
        Self {
            poll: poll.max(Duration::from_millis(1)),
        }
    }

    /// Polls the active page until `matcher` matches its visible text. The
    /// last check happens no later than `timeout` after the call; a miss
    /// fails with `diagnostic` as the message.
    pub async fn assert_visible<B: BrowserTrait>(
        &self,
        page: &ActivePage<'_, B>,
        matcher: &TextMatcher,
        timeout: Duration,
        diagnostic: &str,
    ) -> Result<Verification> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match tokio::time::timeout(
                deadline.saturating_duration_since(Instant::now()),
                page.visible_text(),
            )
            .await
            {
                Ok(Ok(text)) if matcher.matches(&text) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(expectation = %matcher, elapsed_ms, polls, "assertion passed");
                    return Ok(Verification {
                        expectation: matcher.to_string(),
                        elapsed_ms,
                        polls,
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => debug!(error = %err, "visible text unavailable"),
                Err(_) => break,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.poll.min(remaining)).await;
        }

        error!(expectation = %matcher, polls, "{}", diagnostic);
        Err(ScenarioError::AssertionFailed {
            expectation: matcher.to_string(),
            diagnostic: diagnostic.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{NavigationController, Session};
    use crate::errors::ErrorKind;
    use crate::testing::{FixtureBrowser, FixtureSite, Route, TestHelper};

    const DIAGNOSTIC: &str = "Test failed: invoices were not generated";

    fn site(after: Option<Duration>) -> FixtureSite {
        let route = Route::html("<html><body><p>Working...</p></body></html>");
        let route = match after {
            Some(delay) => route.replaced_after(
                delay,
                "<html><body><p>Invoice generation successful</p></body></html>",
            ),
            None => route,
        };
        FixtureSite::new().route("/invoices", route)
    }

    async fn verify(after: Option<Duration>, timeout: Duration) -> (Result<Verification>, Duration) {
        let fixture = FixtureBrowser::new(site(after));
        let mut session = Session::open(fixture, TestHelper::fast_config("http://app.test"))
            .await
            .unwrap();
        let page = NavigationController::navigate(
            &mut session,
            "http://app.test/invoices",
            Duration::from_secs(10),
        )
        .await
        .unwrap()
        .await_loaded(Duration::from_secs(3))
        .await
        .unwrap();

        let matcher = TextMatcher::contains("Invoice generation successful").unwrap();
        let started = Instant::now();
        let result = AssertionVerifier::new(Duration::from_millis(100))
            .assert_visible(&page, &matcher, timeout, DIAGNOSTIC)
            .await;
        let elapsed = started.elapsed();
        drop(page);
        session.close().await.unwrap();
        (result, elapsed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_when_text_appears_within_bound() {
        let (result, _) = verify(Some(Duration::from_millis(400)), Duration::from_millis(1000)).await;
        let verification = result.unwrap();
        assert!(verification.polls > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_with_diagnostic_without_overshooting() {
        let (result, elapsed) = verify(None, Duration::from_millis(1000)).await;
        let err = result.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AssertionTimeout);
        assert_eq!(err.to_string(), DIAGNOSTIC);
        assert!(elapsed <= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_after_bound_is_a_failure() {
        let (result, _) = verify(Some(Duration::from_millis(1500)), Duration::from_millis(1000)).await;
        assert!(result.is_err());
    }
}
