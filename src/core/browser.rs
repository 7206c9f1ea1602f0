use crate::core::config::BrowserConfig;
use crate::dom::ElementReference;
use crate::errors::Result;
use crate::types::{ElementSnapshot, FrameId, ReadyState};
use async_trait::async_trait;
use std::time::Duration;

/// The boundary to a browser engine.
///
/// Every call is a single attempt against the document as it is right now.
/// Element operations resolve their [`ElementReference`] at call time and
/// fail with `ElementNotFound` when nothing matches; bounded waiting and
/// re-resolution are the caller's business.
#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type ContextHandle: Send + Sync;
    type TabHandle: Clone + Send + Sync;

    /// Launch a new browser instance
    async fn launch(&mut self, config: &BrowserConfig) -> Result<()>;

    /// Open an isolated context (no shared cookies or storage) holding one
    /// blank page.
    async fn open_context(&self, default_timeout: Duration) -> Result<Self::ContextHandle>;

    /// Pages of the context in the order they were opened
    async fn tabs(&self, context: &Self::ContextHandle) -> Result<Vec<Self::TabHandle>>;

    /// Issue a navigation and return once it is committed, not loaded
    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()>;

    /// Main document followed by nested frames in document order
    async fn frames(&self, tab: &Self::TabHandle) -> Result<Vec<FrameId>>;

    async fn ready_state(&self, tab: &Self::TabHandle, frame: FrameId) -> Result<ReadyState>;

    /// `None` when the reference does not resolve right now
    async fn probe(
        &self,
        tab: &Self::TabHandle,
        element: &ElementReference,
    ) -> Result<Option<ElementSnapshot>>;

    /// Replace the element's value with `text` (empty text clears it)
    async fn fill(&self, tab: &Self::TabHandle, element: &ElementReference, text: &str)
        -> Result<()>;

    async fn click(&self, tab: &Self::TabHandle, element: &ElementReference) -> Result<()>;

    /// Rendered text of the top-level document
    async fn visible_text(&self, tab: &Self::TabHandle) -> Result<String>;

    async fn scroll_by(&self, tab: &Self::TabHandle, dx: i64, dy: i64) -> Result<()>;

    async fn screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>>;

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String>;

    /// Close every page of the context and dispose of it
    async fn close_context(&self, context: Self::ContextHandle) -> Result<()>;

    /// Check if browser is still running
    fn is_running(&self) -> bool;

    /// Shut the browser process down
    async fn close(&mut self) -> Result<()>;
}
