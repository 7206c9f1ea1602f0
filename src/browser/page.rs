use crate::browser::navigation::{Committed, LoadReport, NavigationController};
use crate::browser::session::Session;
use crate::core::{BrowserTrait, Config};
use crate::dom::ElementReference;
use crate::errors::Result;
use std::time::Duration;
use tracing::debug;

/// The active page of a session after its document finished loading (or
/// ran out of time trying). Interactions and assertions take one of these,
/// so nothing can touch a page whose navigation was never awaited.
pub struct ActivePage<'s, B: BrowserTrait> {
    session: &'s mut Session<B>,
    load: LoadReport,
}

impl<'s, B: BrowserTrait> ActivePage<'s, B> {
    pub(crate) fn new(session: &'s mut Session<B>, load: LoadReport) -> Self {
        Self { session, load }
    }

    pub fn config(&self) -> &Config {
        self.session.config()
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load
    }

    pub(crate) fn browser(&self) -> &B {
        self.session.browser()
    }

    /// Resolved on every call: a popup opened by the last action is the
    /// active page from then on.
    pub(crate) async fn tab(&self) -> Result<B::TabHandle> {
        self.session.active_tab().await
    }

    /// Builds a reference against this page. Resolution is deferred to the
    /// action that uses it.
    pub fn locate(&self, path: &str, ordinal: usize) -> Result<ElementReference> {
        ElementReference::parse(path, ordinal)
    }

    /// Waits again for every frame of the active page. Used after actions
    /// that may have replaced the document or opened a new one.
    pub async fn settle_frames(&mut self) -> Result<&LoadReport> {
        let config = &self.session.config().session;
        let (timeout, poll) = (config.load_timeout(), config.poll_interval());
        let tab = self.tab().await?;
        let frames = NavigationController::await_all_frames(self.browser(), &tab, timeout, poll).await;

        self.load.url = self.browser().current_url(&tab).await.unwrap_or_default();
        self.load.frames = frames;
        debug!(url = %self.load.url, loaded = self.load.fully_loaded(), "frames settled");
        Ok(&self.load)
    }

    /// Leaves this page. The next page is only reachable by awaiting the
    /// returned navigation.
    pub async fn navigate(self, url: &str, commit_timeout: Duration) -> Result<Committed<'s, B>> {
        NavigationController::navigate(self.session, url, commit_timeout).await
    }

    pub async fn current_url(&self) -> Result<String> {
        let tab = self.tab().await?;
        self.browser().current_url(&tab).await
    }

    pub async fn visible_text(&self) -> Result<String> {
        let tab = self.tab().await?;
        self.browser().visible_text(&tab).await
    }

    pub async fn scroll_by(&self, dx: i64, dy: i64) -> Result<()> {
        let tab = self.tab().await?;
        debug!(dx, dy, "scrolling page");
        self.browser().scroll_by(&tab, dx, dy).await
    }

    pub async fn page_count(&self) -> Result<usize> {
        self.session.page_count().await
    }
}
