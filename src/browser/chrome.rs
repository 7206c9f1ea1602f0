use crate::core::config::BrowserConfig;
use crate::core::BrowserTrait;
use crate::dom::ElementReference;
use crate::errors::{Result, ScenarioError};
use crate::types::{ElementSnapshot, FrameId, ReadyState};
use crate::utils::PageScripts;
use anyhow::Context as _;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Page, Target};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chrome browser implementation
pub struct ChromeBrowser {
    browser: Option<Browser>,
}

/// An incognito-style browser context. `anchor` is the page the context was
/// opened with; context-wide CDP calls are issued through it.
pub struct ChromeContext {
    id: String,
    anchor: Arc<Tab>,
    default_timeout: Duration,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self { browser: None }
    }

    fn handle(&self) -> Result<Browser> {
        self.browser
            .clone()
            .ok_or(ScenarioError::BrowserNotLaunched)
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

/// headless_chrome is synchronous; keep its calls off the async workers.
async fn blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(ScenarioError::from_any_error)?
}

fn evaluate(tab: &Tab, script: &str) -> Result<Value> {
    let result = tab
        .evaluate(script, false)
        .map_err(|e| ScenarioError::JavaScriptFailed(e.to_string()))?;

    Ok(result.value.unwrap_or(Value::Null))
}

/// Reads the `{ found, filled, error }` object returned by fill/click scripts.
fn expect_found(result: &Value, element: &ElementReference) -> Result<()> {
    let found = result
        .get("found")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !found {
        return Err(ScenarioError::element_not_found(element));
    }

    let filled = result
        .get("filled")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if !filled {
        let error = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(ScenarioError::JavaScriptFailed(format!("{}: {}", element, error)));
    }

    Ok(())
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type ContextHandle = ChromeContext;
    type TabHandle = Arc<Tab>;

    async fn launch(&mut self, config: &BrowserConfig) -> Result<()> {
        let config = config.clone();
        let browser = blocking(move || {
            let window_size_arg = format!(
                "--window-size={},{}",
                config.viewport.width, config.viewport.height
            );

            let user_agent_arg = config
                .user_agent
                .as_ref()
                .map(|ua| format!("--user-agent={}", ua));

            let mut args = vec![OsStr::new(&window_size_arg)];

            if let Some(ref ua_arg) = user_agent_arg {
                args.push(OsStr::new(ua_arg));
            }

            if config.disable_images {
                args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
            }

            for arg in &config.args {
                args.push(OsStr::new(arg));
            }

            let launch_options = LaunchOptions::default_builder()
                .headless(config.headless)
                .window_size(Some((config.viewport.width, config.viewport.height)))
                .args(args)
                .build()
                .map_err(|e| ScenarioError::LaunchFailed(e.to_string()))?;

            Browser::new(launch_options).map_err(|e| ScenarioError::LaunchFailed(e.to_string()))
        })
        .await?;

        info!(headless = config.headless, "chrome launched");
        self.browser = Some(browser);
        Ok(())
    }

    async fn open_context(&self, default_timeout: Duration) -> Result<Self::ContextHandle> {
        let browser = self.handle()?;
        blocking(move || {
            let context = browser
                .new_context()
                .map_err(|e| ScenarioError::ContextFailed(e.to_string()))?;
            let anchor = context
                .new_tab()
                .map_err(|e| ScenarioError::ContextFailed(e.to_string()))?;
            anchor.set_default_timeout(default_timeout);

            Ok(ChromeContext {
                id: context.get_id().to_string(),
                anchor,
                default_timeout,
            })
        })
        .await
    }

    async fn tabs(&self, context: &Self::ContextHandle) -> Result<Vec<Self::TabHandle>> {
        let browser = self.handle()?;
        let context_id = context.id.clone();
        let default_timeout = context.default_timeout;
        blocking(move || {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(ScenarioError::from_any_error)?
                .clone();

            // Target lookups can fail for pages closing under us; those are
            // not part of the context any more.
            let owned = tabs
                .into_iter()
                .filter(|tab| {
                    tab.get_target_info()
                        .map(|info| info.browser_context_id.as_deref() == Some(context_id.as_str()))
                        .unwrap_or(false)
                })
                .collect::<Vec<_>>();
            // popups start with the engine's own default
            for tab in &owned {
                tab.set_default_timeout(default_timeout);
            }
            Ok(owned)
        })
        .await
    }

    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()> {
        let tab = tab.clone();
        let target = url.to_string();
        blocking(move || {
            // Page.navigate answers once the navigation is committed; no
            // wait_until_navigated here.
            tab.navigate_to(&target)
                .map_err(|e| ScenarioError::NavigationFailed {
                    url: target.clone(),
                    reason: e.to_string(),
                })?;
            Ok(())
        })
        .await
    }

    async fn frames(&self, tab: &Self::TabHandle) -> Result<Vec<FrameId>> {
        let tab = tab.clone();
        let count = blocking(move || evaluate(&tab, PageScripts::frame_count())).await?;
        let nested = count.as_u64().unwrap_or(0) as usize;

        let mut frames = vec![FrameId::Main];
        frames.extend((0..nested).map(FrameId::Nested));
        Ok(frames)
    }

    async fn ready_state(&self, tab: &Self::TabHandle, frame: FrameId) -> Result<ReadyState> {
        let tab = tab.clone();
        let state = blocking(move || evaluate(&tab, &PageScripts::ready_state(frame))).await?;
        Ok(ReadyState::parse(state.as_str().unwrap_or("")))
    }

    async fn probe(
        &self,
        tab: &Self::TabHandle,
        element: &ElementReference,
    ) -> Result<Option<ElementSnapshot>> {
        let tab = tab.clone();
        let script = PageScripts::probe(element);
        let result = blocking(move || evaluate(&tab, &script)).await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    async fn fill(
        &self,
        tab: &Self::TabHandle,
        element: &ElementReference,
        text: &str,
    ) -> Result<()> {
        let tab = tab.clone();
        let script = PageScripts::fill(element, text);
        let result = blocking(move || evaluate(&tab, &script)).await?;
        expect_found(&result, element)?;
        debug!(element = %element, "filled");
        Ok(())
    }

    async fn click(&self, tab: &Self::TabHandle, element: &ElementReference) -> Result<()> {
        let tab = tab.clone();
        let script = PageScripts::click(element);
        let result = blocking(move || evaluate(&tab, &script)).await?;
        expect_found(&result, element)?;
        debug!(element = %element, "clicked");
        Ok(())
    }

    async fn visible_text(&self, tab: &Self::TabHandle) -> Result<String> {
        let tab = tab.clone();
        let text = blocking(move || evaluate(&tab, PageScripts::visible_text())).await?;
        Ok(text.as_str().unwrap_or("").to_string())
    }

    async fn scroll_by(&self, tab: &Self::TabHandle, dx: i64, dy: i64) -> Result<()> {
        let tab = tab.clone();
        blocking(move || evaluate(&tab, &PageScripts::scroll_by(dx, dy))).await?;
        Ok(())
    }

    async fn screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>> {
        let tab = tab.clone();
        blocking(move || {
            let png = tab
                .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
                .context("screenshot failed")?;
            Ok(png)
        })
        .await
    }

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(tab.get_url())
    }

    async fn close_context(&self, context: Self::ContextHandle) -> Result<()> {
        blocking(move || {
            context.anchor.call_method(Target::DisposeBrowserContext {
                browser_context_id: context.id.clone(),
            })?;
            Ok(())
        })
        .await
    }

    fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the last Browser handle kills the process.
        if self.browser.take().is_none() {
            warn!("close called on a browser that is not running");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires a local Chrome
    async fn test_popup_uses_context_timeout() {
        let mut config = BrowserConfig::default();
        config.args.push("--disable-popup-blocking".to_string());
        let mut browser = ChromeBrowser::new();
        browser.launch(&config).await.unwrap();
        let context = browser.open_context(Duration::from_millis(500)).await.unwrap();

        let anchor = context.anchor.clone();
        blocking(move || evaluate(&anchor, "window.open('about:blank'); true"))
            .await
            .unwrap();
        let mut tabs = browser.tabs(&context).await.unwrap();
        for _ in 0..20 {
            if tabs.len() > 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            tabs = browser.tabs(&context).await.unwrap();
        }
        assert_eq!(tabs.len(), 2);

        let popup = tabs[1].clone();
        let started = std::time::Instant::now();
        let missed = blocking(move || {
            let missed = popup.wait_for_element("#never-rendered").is_err();
            Ok(missed)
        })
        .await
        .unwrap();
        assert!(missed);
        assert!(started.elapsed() < Duration::from_secs(5));

        browser.close_context(context).await.unwrap();
        browser.close().await.unwrap();
    }
}
