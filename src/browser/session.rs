use crate::core::{BrowserTrait, Config};
use crate::errors::{ErrorKind, Result, ScenarioError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Session<B: BrowserTrait> {
    id: String,
    browser: B,
    context: Option<B::ContextHandle>,
    config: Config,
    closed: bool,
}

/// Result of [`Session::scoped`]: what the body produced and how teardown
/// went. Teardown always ran.
#[derive(Debug)]
pub struct ScopedRun<T> {
    pub result: Result<T>,
    pub teardown: Result<()>,
}

impl<T> ScopedRun<T> {
    /// Body errors win over teardown errors.
    pub fn into_result(self) -> Result<T> {
        let value = self.result?;
        self.teardown?;
        Ok(value)
    }
}

fn environment_error(err: ScenarioError, stage: &str) -> ScenarioError {
    if err.kind() == ErrorKind::Environment {
        return err;
    }
    match stage {
        "launch" => ScenarioError::LaunchFailed(err.to_string()),
        _ => ScenarioError::ContextFailed(err.to_string()),
    }
}

impl<B: BrowserTrait> Session<B> {
    /// Launches the browser and opens one isolated context. A failure at
    /// any stage releases whatever was already acquired.
    pub async fn open(mut browser: B, config: Config) -> Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        info!(session = %id, headless = config.browser.headless, "opening browser session");

        if let Err(err) = browser.launch(&config.browser).await {
            if browser.is_running() {
                if let Err(close_err) = browser.close().await {
                    warn!(session = %id, error = %close_err, "failed to release half-launched browser");
                }
            }
            error!(session = %id, error = %err, "browser launch failed");
            return Err(environment_error(err, "launch"));
        }

        let default_timeout = Duration::from_millis(config.browser.default_timeout_ms);
        let context = match browser.open_context(default_timeout).await {
            Ok(context) => context,
            Err(err) => {
                if let Err(close_err) = browser.close().await {
                    warn!(session = %id, error = %close_err, "failed to release browser after context failure");
                }
                error!(session = %id, error = %err, "browser context could not be opened");
                return Err(environment_error(err, "context"));
            }
        };

        Ok(Self {
            id,
            browser,
            context: Some(context),
            config,
            closed: false,
        })
    }

    /// Opens a session, runs `body` on it and closes it afterwards, whether
    /// the body returned an error or panicked. A panic is resumed after
    /// teardown.
    pub async fn scoped<T, F>(browser: B, config: Config, body: F) -> Result<ScopedRun<T>>
    where
        F: for<'s> FnOnce(&'s mut Session<B>) -> BoxFuture<'s, Result<T>>,
    {
        let mut session = Self::open(browser, config).await?;
        let outcome = AssertUnwindSafe(body(&mut session)).catch_unwind().await;
        let teardown = session.close().await;

        match outcome {
            Ok(result) => Ok(ScopedRun { result, teardown }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn browser(&self) -> &B {
        &self.browser
    }

    /// The most recently opened page of the context. Looked up on every
    /// call so popups and new tabs take over as soon as they exist.
    pub(crate) async fn active_tab(&self) -> Result<B::TabHandle> {
        let context = self.context.as_ref().ok_or(ScenarioError::NoActiveTab)?;
        self.browser
            .tabs(context)
            .await?
            .pop()
            .ok_or(ScenarioError::NoActiveTab)
    }

    pub async fn page_count(&self) -> Result<usize> {
        let context = self.context.as_ref().ok_or(ScenarioError::NoActiveTab)?;
        Ok(self.browser.tabs(context).await?.len())
    }

    /// Releases the context, then the browser process. Both steps run even
    /// if the first fails; the first error is returned.
    pub async fn close(mut self) -> Result<()> {
        self.release().await
    }

    async fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;

        if let Some(context) = self.context.take() {
            if let Err(err) = self.browser.close_context(context).await {
                warn!(session = %self.id, error = %err, "closing browser context failed");
                first_error = Some(err);
            }
        }

        if let Err(err) = self.browser.close().await {
            warn!(session = %self.id, error = %err, "closing browser failed");
            first_error.get_or_insert(err);
        }

        info!(session = %self.id, "browser session closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl<B: BrowserTrait> Drop for Session<B> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                session = %self.id,
                "session dropped without close; relying on the engine handle's drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureBrowser, FixtureSite, TestHelper};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_open_and_close_release_everything_once() {
        let fixture = FixtureBrowser::new(FixtureSite::new());
        let session = Session::open(fixture.clone(), TestHelper::fast_config("http://app.test"))
            .await
            .unwrap();
        assert_eq!(session.page_count().await.unwrap(), 1);

        session.close().await.unwrap();

        let stats = fixture.stats().await;
        assert_eq!(stats.launches, 1);
        assert_eq!(stats.browser_closes, 1);
        assert_eq!(stats.contexts_opened, 1);
        assert_eq!(stats.contexts_closed, 1);
    }

    #[tokio::test]
    async fn test_failed_launch_is_environment_error() {
        let fixture = FixtureBrowser::new(FixtureSite::new().failing_launch());
        let result = Session::open(fixture.clone(), TestHelper::fast_config("http://app.test")).await;

        let err = assert_err!(result.map(|_| ()));
        assert_eq!(err.kind(), ErrorKind::Environment);
        let stats = fixture.stats().await;
        assert_eq!(stats.launches, stats.browser_closes);
    }

    #[tokio::test]
    async fn test_failed_context_releases_browser() {
        let fixture = FixtureBrowser::new(FixtureSite::new().failing_context());
        let result = Session::open(fixture.clone(), TestHelper::fast_config("http://app.test")).await;

        assert_eq!(result.err().unwrap().kind(), ErrorKind::Environment);
        let stats = fixture.stats().await;
        assert_eq!(stats.launches, 1);
        assert_eq!(stats.browser_closes, 1);
        assert_eq!(stats.contexts_opened, 0);
        assert!(!fixture.is_running());
    }

    #[tokio::test]
    async fn test_scoped_tears_down_after_body_error() {
        let fixture = FixtureBrowser::new(FixtureSite::new());
        let run = Session::scoped(
            fixture.clone(),
            TestHelper::fast_config("http://app.test"),
            |_session| {
                Box::pin(async move {
                    Err::<(), _>(ScenarioError::element_not_found("xpath=html/body/form/input"))
                })
            },
        )
        .await
        .unwrap();

        assert_eq!(run.result.as_ref().err().unwrap().kind(), ErrorKind::ElementNotFound);
        assert_ok!(&run.teardown);
        assert_err!(run.into_result());

        let stats = fixture.stats().await;
        assert_eq!(stats.contexts_closed, 1);
        assert_eq!(stats.browser_closes, 1);
    }

    async fn explode() -> Result<()> {
        panic!("step exploded")
    }

    #[tokio::test]
    async fn test_scoped_tears_down_after_panic() {
        let fixture = FixtureBrowser::new(FixtureSite::new());
        let probe = fixture.clone();

        let handle = tokio::spawn(async move {
            Session::scoped(
                fixture,
                TestHelper::fast_config("http://app.test"),
                |_session| Box::pin(explode()),
            )
            .await
            .map(|run| run.result.is_ok())
        });

        assert!(handle.await.unwrap_err().is_panic());
        let stats = probe.stats().await;
        assert_eq!(stats.browser_closes, 1);
        assert_eq!(stats.contexts_closed, 1);
    }
}
