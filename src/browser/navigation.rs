use crate::browser::page::ActivePage;
use crate::browser::session::Session;
use crate::core::BrowserTrait;
use crate::errors::{ErrorKind, Result, ScenarioError};
use crate::types::{FrameId, ReadyState};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Commit-only navigation and per-frame load waits
pub struct NavigationController;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameLoad {
    pub frame: FrameId,
    pub reached: bool,
    pub last_state: Option<ReadyState>,
    pub waited_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub url: String,
    pub commit_ms: u64,
    pub frames: Vec<FrameLoad>,
}

impl LoadReport {
    pub fn fully_loaded(&self) -> bool {
        self.frames.iter().all(|f| f.reached)
    }
}

/// A navigation that has been committed but whose document has not been
/// waited for. The page behind it is only reachable through
/// [`Committed::await_loaded`].
#[must_use = "a committed navigation must be awaited before the page can be used"]
pub struct Committed<'s, B: BrowserTrait> {
    session: &'s mut Session<B>,
    url: String,
    committed_in: Duration,
}

impl<'s, B: BrowserTrait> Committed<'s, B> {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn committed_in(&self) -> Duration {
        self.committed_in
    }

    /// Wait up to `timeout` per frame for DOMContentLoaded. Missed
    /// milestones are logged, never returned as errors.
    pub async fn await_loaded(self, timeout: Duration) -> Result<ActivePage<'s, B>> {
        let poll = self.session.config().session.poll_interval();
        let tab = self.session.active_tab().await?;
        let frames =
            NavigationController::await_all_frames(self.session.browser(), &tab, timeout, poll)
                .await;

        let report = LoadReport {
            url: self.url,
            commit_ms: self.committed_in.as_millis() as u64,
            frames,
        };
        Ok(ActivePage::new(self.session, report))
    }
}

impl NavigationController {
    /// Issue a navigation on the active page and return once the engine has
    /// committed it.
    pub async fn navigate<'s, B: BrowserTrait>(
        session: &'s mut Session<B>,
        url: &str,
        commit_timeout: Duration,
    ) -> Result<Committed<'s, B>> {
        let tab = session.active_tab().await?;
        let started = Instant::now();

        info!(url = %url, "navigating");
        match tokio::time::timeout(commit_timeout, session.browser().navigate(&tab, url)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.kind() == ErrorKind::Navigation => return Err(err),
            Ok(Err(err)) => {
                return Err(ScenarioError::NavigationFailed {
                    url: url.to_string(),
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                return Err(ScenarioError::CommitTimeout {
                    url: url.to_string(),
                    timeout_ms: commit_timeout.as_millis() as u64,
                })
            }
        }

        let committed_in = started.elapsed();
        debug!(url = %url, commit_ms = committed_in.as_millis() as u64, "navigation committed");

        Ok(Committed {
            session,
            url: url.to_string(),
            committed_in,
        })
    }

    /// Await DOMContentLoaded on every frame currently in the page, main
    /// document first. Each frame gets the full `timeout`.
    pub async fn await_all_frames<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        timeout: Duration,
        poll: Duration,
    ) -> Vec<FrameLoad> {
        let mut loads = vec![Self::await_loaded(browser, tab, FrameId::Main, timeout, poll).await];

        // Frames are enumerated after the main document settled: that is
        // when nested frames have had a chance to attach.
        let frames = match browser.frames(tab).await {
            Ok(frames) => frames,
            Err(err) => {
                warn!(error = %err, "could not enumerate frames; continuing with the main document");
                return loads;
            }
        };

        for frame in frames.into_iter().filter(|f| *f != FrameId::Main) {
            loads.push(Self::await_loaded(browser, tab, frame, timeout, poll).await);
        }
        loads
    }

    /// Poll one frame's ready state until DOMContentLoaded or `timeout`.
    pub async fn await_loaded<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        frame: FrameId,
        timeout: Duration,
        poll: Duration,
    ) -> FrameLoad {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_state = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match tokio::time::timeout(remaining, browser.ready_state(tab, frame)).await {
                Ok(Ok(state)) => {
                    last_state = Some(state);
                    if state.is_dom_ready() {
                        return FrameLoad {
                            frame,
                            reached: true,
                            last_state,
                            waited_ms: started.elapsed().as_millis() as u64,
                        };
                    }
                }
                Ok(Err(err)) => debug!(frame = %frame, error = %err, "ready state check failed"),
                Err(_) => break,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(poll.min(remaining)).await;
        }

        let miss = ScenarioError::LoadStateTimeout {
            frame: frame.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
        warn!(kind = %miss.kind(), state = ?last_state, "{}; continuing", miss);

        FrameLoad {
            frame,
            reached: false,
            last_state,
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureBrowser, FixtureSite, Route, TestHelper};

    async fn open(site: FixtureSite) -> (FixtureBrowser, Session<FixtureBrowser>) {
        let fixture = FixtureBrowser::new(site);
        let session = Session::open(fixture.clone(), TestHelper::fast_config("http://app.test"))
            .await
            .unwrap();
        (fixture, session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_returns_before_dom_ready() {
        let site = FixtureSite::new().route(
            "/slow",
            Route::html("<html><body><p>slow</p></body></html>")
                .dom_ready_after(Duration::from_secs(2)),
        );
        let (_fixture, mut session) = open(site).await;

        let committed =
            NavigationController::navigate(&mut session, "http://app.test/slow", Duration::from_secs(10))
                .await
                .unwrap();
        assert!(committed.committed_in() < Duration::from_secs(2));

        let page = committed.await_loaded(Duration::from_secs(3)).await.unwrap();
        let main = &page.load_report().frames[0];
        assert!(main.reached);
        assert!(main.waited_ms >= 2000);
        drop(page);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeouts_are_swallowed_per_frame() {
        let site = FixtureSite::new().route(
            "/broken",
            Route::html("<html><body><p>partial</p></body></html>")
                .never_ready()
                .with_frame(Some(Duration::from_millis(200)))
                .with_frame(None),
        );
        let (_fixture, mut session) = open(site).await;

        let started = Instant::now();
        let page = NavigationController::navigate(
            &mut session,
            "http://app.test/broken",
            Duration::from_secs(10),
        )
        .await
        .unwrap()
        .await_loaded(Duration::from_millis(3000))
        .await
        .unwrap();

        let frames = &page.load_report().frames;
        assert_eq!(frames.len(), 3);
        assert!(!frames[0].reached);
        assert_eq!(frames[0].last_state, Some(ReadyState::Loading));
        assert!(frames[1].reached);
        assert!(!frames[2].reached);
        assert!(!page.load_report().fully_loaded());
        // main and the dead frame each use their own window
        assert!(started.elapsed() >= Duration::from_millis(6000));
        assert!(started.elapsed() < Duration::from_millis(6500));
        drop(page);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_timeout_propagates() {
        let site = FixtureSite::new()
            .route("/", Route::html("<html><body></body></html>"))
            .commit_delay(Duration::from_secs(30));
        let (_fixture, mut session) = open(site).await;

        let err = NavigationController::navigate(&mut session, "http://app.test/", Duration::from_secs(10))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScenarioError::CommitTimeout { timeout_ms: 10000, .. }));
        assert_eq!(err.kind(), ErrorKind::Navigation);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_navigation_failure() {
        let site = FixtureSite::new().refusing_connections();
        let (_fixture, mut session) = open(site).await;

        let err = NavigationController::navigate(&mut session, "http://app.test/", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScenarioError::NavigationFailed { .. }));
        session.close().await.unwrap();
    }
}
