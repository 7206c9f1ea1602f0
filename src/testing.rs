use crate::actions::{LoginConfirmation, SettlePolicy};
use crate::core::config::{BrowserConfig, ScrollConfig, SessionConfig};
use crate::core::{BrowserTrait, Config};
use crate::dom::ElementReference;
use crate::errors::{Result, ScenarioError};
use crate::types::{Credential, ElementRect, ElementSnapshot, FrameId, ReadyState};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

const BLANK_PAGE: &str = "<html><head></head><body></body></html>";
const NOT_FOUND_PAGE: &str = "<html><body><h1>404</h1><p>This page could not be found.</p></body></html>";
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Values posted by a form submit, keyed by each control's `name` (or
/// `field<n>` for unnamed controls).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub path: String,
    pub fields: BTreeMap<String, String>,
}

impl FormSubmission {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    /// Navigate the page to this path or URL.
    Redirect(String),
    /// Keep the page and everything typed into it.
    Stay,
}

type SubmitHandler = Arc<dyn Fn(&FormSubmission) -> SubmitResponse + Send + Sync>;

#[derive(Clone)]
pub struct Route {
    html: String,
    replacement: Option<(Duration, String)>,
    dom_ready_after: Duration,
    never_ready: bool,
    frames: Vec<Option<Duration>>,
    on_submit: Option<SubmitHandler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("replacement", &self.replacement.as_ref().map(|(after, _)| after))
            .field("dom_ready_after", &self.dom_ready_after)
            .field("never_ready", &self.never_ready)
            .field("frames", &self.frames)
            .field("on_submit", &self.on_submit.is_some())
            .finish()
    }
}

impl Route {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            replacement: None,
            dom_ready_after: Duration::ZERO,
            never_ready: false,
            frames: Vec::new(),
            on_submit: None,
        }
    }

    /// Swap the document for `html` once `after` has passed since commit.
    pub fn replaced_after(mut self, after: Duration, html: impl Into<String>) -> Self {
        self.replacement = Some((after, html.into()));
        self
    }

    pub fn dom_ready_after(mut self, after: Duration) -> Self {
        self.dom_ready_after = after;
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Adds a nested frame that becomes DOM-ready after the given delay, or
    /// never with `None`.
    pub fn with_frame(mut self, ready_after: Option<Duration>) -> Self {
        self.frames.push(ready_after);
        self
    }

    pub fn on_submit<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FormSubmission) -> SubmitResponse + Send + Sync + 'static,
    {
        self.on_submit = Some(Arc::new(handler));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    routes: HashMap<String, Route>,
    commit_delay: Duration,
    fail_launch: bool,
    fail_context: bool,
    refuse_connections: bool,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, route: Route) -> Self {
        self.routes.insert(path.to_string(), route);
        self
    }

    pub fn commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn failing_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEvent {
    Launched,
    ContextOpened,
    Navigated { url: String },
    Filled { locator: String, value: String },
    Clicked { locator: String },
    Submitted(FormSubmission),
    PopupOpened { url: String },
    Scrolled { dx: i64, dy: i64 },
    ContextClosed,
    BrowserClosed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureStats {
    pub launches: usize,
    pub browser_closes: usize,
    pub contexts_opened: usize,
    pub contexts_closed: usize,
    pub navigations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureContext(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureTab(usize);

#[derive(Debug)]
struct TabState {
    context: usize,
    url: String,
    path: Option<String>,
    committed_at: Instant,
    values: HashMap<(bool, usize), String>,
}

impl TabState {
    fn blank(context: usize) -> Self {
        Self {
            context,
            url: "about:blank".to_string(),
            path: None,
            committed_at: Instant::now(),
            values: HashMap::new(),
        }
    }

    fn load(&mut self, url: &Url) {
        self.url = url.to_string();
        self.path = Some(url.path().to_string());
        self.committed_at = Instant::now();
        self.values.clear();
    }
}

#[derive(Debug, Default)]
struct FixtureState {
    running: bool,
    next_id: usize,
    contexts: HashMap<usize, Vec<usize>>,
    tabs: HashMap<usize, TabState>,
    stats: FixtureStats,
    events: Vec<FixtureEvent>,
}

impl FixtureState {
    fn allocate(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn tab(&self, tab: FixtureTab) -> Result<&TabState> {
        self.tabs.get(&tab.0).ok_or(ScenarioError::NoActiveTab)
    }

    fn tab_mut(&mut self, tab: FixtureTab) -> Result<&mut TabState> {
        self.tabs.get_mut(&tab.0).ok_or(ScenarioError::NoActiveTab)
    }
}

/// In-process browser engine over static HTML routes, for tests. Clones
/// share state, so a test keeps one clone to inspect what the session did
/// with the other.
#[derive(Debug, Clone)]
pub struct FixtureBrowser {
    site: Arc<FixtureSite>,
    state: Arc<Mutex<FixtureState>>,
}

impl FixtureBrowser {
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site: Arc::new(site),
            state: Arc::new(Mutex::new(FixtureState::default())),
        }
    }

    pub async fn stats(&self) -> FixtureStats {
        self.lock().stats
    }

    pub async fn events(&self) -> Vec<FixtureEvent> {
        self.lock().events.clone()
    }

    pub async fn submissions(&self) -> Vec<FormSubmission> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                FixtureEvent::Submitted(submission) => Some(submission.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn route_for(&self, tab: &TabState) -> Option<&Route> {
        tab.path.as_ref().and_then(|path| self.site.routes.get(path))
    }

    fn document(&self, tab: &TabState) -> (bool, String) {
        if tab.path.is_none() {
            return (false, BLANK_PAGE.to_string());
        }
        match self.route_for(tab) {
            Some(route) => match &route.replacement {
                Some((after, html)) if tab.committed_at.elapsed() >= *after => (true, html.clone()),
                _ => (false, route.html.clone()),
            },
            None => (false, NOT_FOUND_PAGE.to_string()),
        }
    }

    fn open_tab(state: &mut FixtureState, context: usize) -> usize {
        let id = state.allocate();
        state.tabs.insert(id, TabState::blank(context));
        if let Some(tabs) = state.contexts.get_mut(&context) {
            tabs.push(id);
        }
        id
    }
}

fn resolve_url(base: &str, target: &str) -> Result<Url> {
    let joined = match Url::parse(base) {
        Ok(base) if base.scheme() != "about" => base.join(target),
        _ => Url::parse(target),
    };
    joined.map_err(|e| ScenarioError::NavigationFailed {
        url: target.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl BrowserTrait for FixtureBrowser {
    type ContextHandle = FixtureContext;
    type TabHandle = FixtureTab;

    async fn launch(&mut self, _config: &BrowserConfig) -> Result<()> {
        if self.site.fail_launch {
            return Err(ScenarioError::LaunchFailed(
                "fixture refused to start the browser".to_string(),
            ));
        }
        let mut state = self.lock();
        state.running = true;
        state.stats.launches += 1;
        state.events.push(FixtureEvent::Launched);
        Ok(())
    }

    async fn open_context(&self, _default_timeout: Duration) -> Result<Self::ContextHandle> {
        let mut state = self.lock();
        if !state.running {
            return Err(ScenarioError::BrowserNotLaunched);
        }
        if self.site.fail_context {
            return Err(ScenarioError::ContextFailed(
                "fixture refused to create a context".to_string(),
            ));
        }

        let id = state.allocate();
        state.contexts.insert(id, Vec::new());
        Self::open_tab(&mut state, id);
        state.stats.contexts_opened += 1;
        state.events.push(FixtureEvent::ContextOpened);
        Ok(FixtureContext(id))
    }

    async fn tabs(&self, context: &Self::ContextHandle) -> Result<Vec<Self::TabHandle>> {
        let state = self.lock();
        Ok(state
            .contexts
            .get(&context.0)
            .map(|tabs| tabs.iter().copied().map(FixtureTab).collect())
            .unwrap_or_default())
    }

    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()> {
        if self.site.refuse_connections {
            return Err(ScenarioError::NavigationFailed {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        if !self.site.commit_delay.is_zero() {
            tokio::time::sleep(self.site.commit_delay).await;
        }

        let mut state = self.lock();
        let current = state.tab(*tab)?.url.clone();
        let target = resolve_url(&current, url)?;
        state.tab_mut(*tab)?.load(&target);
        state.stats.navigations += 1;
        state.events.push(FixtureEvent::Navigated {
            url: target.to_string(),
        });
        Ok(())
    }

    async fn frames(&self, tab: &Self::TabHandle) -> Result<Vec<FrameId>> {
        let state = self.lock();
        let tab = state.tab(*tab)?;
        let nested = self.route_for(tab).map_or(0, |route| route.frames.len());
        Ok(std::iter::once(FrameId::Main)
            .chain((0..nested).map(FrameId::Nested))
            .collect())
    }

    async fn ready_state(&self, tab: &Self::TabHandle, frame: FrameId) -> Result<ReadyState> {
        let state = self.lock();
        let tab = state.tab(*tab)?;
        let elapsed = tab.committed_at.elapsed();
        let Some(route) = self.route_for(tab) else {
            return Ok(ReadyState::Complete);
        };

        let ready_after = match frame {
            FrameId::Main if route.never_ready => None,
            FrameId::Main => Some(route.dom_ready_after),
            FrameId::Nested(index) => match route.frames.get(index) {
                Some(delay) => *delay,
                None => return Ok(ReadyState::Unreachable),
            },
        };
        Ok(match ready_after {
            Some(after) if elapsed >= after => ReadyState::Complete,
            _ => ReadyState::Loading,
        })
    }

    async fn probe(
        &self,
        tab: &Self::TabHandle,
        element: &ElementReference,
    ) -> Result<Option<ElementSnapshot>> {
        let state = self.lock();
        let (_, html) = self.document(state.tab(*tab)?);
        Ok(inspect(&html, element).map(|found| found.snapshot()))
    }

    async fn fill(&self, tab: &Self::TabHandle, element: &ElementReference, text: &str) -> Result<()> {
        let mut state = self.lock();
        let (replaced, html) = self.document(state.tab(*tab)?);
        let found = inspect(&html, element).ok_or_else(|| ScenarioError::element_not_found(element))?;
        if !matches!(found.tag.as_str(), "input" | "textarea") {
            return Err(ScenarioError::JavaScriptFailed(format!(
                "{}: element is not fillable",
                element
            )));
        }

        state
            .tab_mut(*tab)?
            .values
            .insert((replaced, found.index), text.to_string());
        state.events.push(FixtureEvent::Filled {
            locator: element.to_string(),
            value: text.to_string(),
        });
        Ok(())
    }

    async fn click(&self, tab: &Self::TabHandle, element: &ElementReference) -> Result<()> {
        let mut state = self.lock();
        let current = state.tab(*tab)?;
        let (replaced, html) = self.document(current);
        let effect = click_effect(&html, element).ok_or_else(|| ScenarioError::element_not_found(element))?;
        state.events.push(FixtureEvent::Clicked {
            locator: element.to_string(),
        });

        match effect {
            ClickEffect::Plain => Ok(()),
            ClickEffect::Follow { href, popup } => {
                let current = state.tab(*tab)?;
                let target = resolve_url(&current.url, &href)?;
                if popup {
                    let context = current.context;
                    let id = Self::open_tab(&mut state, context);
                    state.tab_mut(FixtureTab(id))?.load(&target);
                    state.events.push(FixtureEvent::PopupOpened {
                        url: target.to_string(),
                    });
                } else {
                    state.tab_mut(*tab)?.load(&target);
                    state.events.push(FixtureEvent::Navigated {
                        url: target.to_string(),
                    });
                }
                state.stats.navigations += 1;
                Ok(())
            }
            ClickEffect::Submit { controls } => {
                let current = state.tab(*tab)?;
                let fields = controls
                    .into_iter()
                    .map(|control| {
                        let value = current
                            .values
                            .get(&(replaced, control.index))
                            .cloned()
                            .unwrap_or(control.initial);
                        (control.key, value)
                    })
                    .collect();
                let submission = FormSubmission {
                    path: current.path.clone().unwrap_or_default(),
                    fields,
                };
                let response = self
                    .route_for(current)
                    .and_then(|route| route.on_submit.as_ref())
                    .map_or(SubmitResponse::Stay, |handler| (**handler)(&submission));
                let base = current.url.clone();
                state.events.push(FixtureEvent::Submitted(submission));

                if let SubmitResponse::Redirect(location) = response {
                    let target = resolve_url(&base, &location)?;
                    state.tab_mut(*tab)?.load(&target);
                    state.stats.navigations += 1;
                    state.events.push(FixtureEvent::Navigated {
                        url: target.to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn visible_text(&self, tab: &Self::TabHandle) -> Result<String> {
        let state = self.lock();
        let (_, html) = self.document(state.tab(*tab)?);
        Ok(rendered_text(&html))
    }

    async fn scroll_by(&self, tab: &Self::TabHandle, dx: i64, dy: i64) -> Result<()> {
        let mut state = self.lock();
        state.tab(*tab)?;
        state.events.push(FixtureEvent::Scrolled { dx, dy });
        Ok(())
    }

    async fn screenshot(&self, tab: &Self::TabHandle) -> Result<Vec<u8>> {
        let state = self.lock();
        let (_, html) = self.document(state.tab(*tab)?);
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(html.as_bytes());
        Ok(bytes)
    }

    async fn current_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(self.lock().tab(*tab)?.url.clone())
    }

    async fn close_context(&self, context: Self::ContextHandle) -> Result<()> {
        let mut state = self.lock();
        let tabs = state.contexts.remove(&context.0).unwrap_or_default();
        for tab in tabs {
            state.tabs.remove(&tab);
        }
        state.stats.contexts_closed += 1;
        state.events.push(FixtureEvent::ContextClosed);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.running = false;
        state.stats.browser_closes += 1;
        state.events.push(FixtureEvent::BrowserClosed);
        Ok(())
    }
}

struct Inspected {
    index: usize,
    tag: String,
    visible: bool,
    enabled: bool,
}

impl Inspected {
    fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            tag_name: self.tag.to_ascii_uppercase(),
            visible: self.visible,
            enabled: self.enabled,
            rect: self.visible.then(|| ElementRect {
                x: 16.0,
                y: 24.0 * self.index as f64,
                width: 240.0,
                height: 20.0,
            }),
        }
    }
}

struct FormControlValue {
    key: String,
    index: usize,
    initial: String,
}

enum ClickEffect {
    Plain,
    Follow { href: String, popup: bool },
    Submit { controls: Vec<FormControlValue> },
}

/// Element index in document order, the fixture's notion of node identity.
fn element_index(document: &Html, element: &ElementRef<'_>) -> usize {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .position(|candidate| candidate.id() == element.id())
        .unwrap_or(0)
}

fn is_displayed(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() || value.attr("type") == Some("hidden") {
        return false;
    }
    let style = value
        .attr("style")
        .map(|s| s.replace(' ', "").to_ascii_lowercase())
        .unwrap_or_default();
    !style.contains("display:none") && !style.contains("visibility:hidden")
}

fn is_rendered(element: &ElementRef<'_>) -> bool {
    is_displayed(element)
        && element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .all(|ancestor| is_displayed(&ancestor))
}

fn find<'a>(document: &'a Html, reference: &ElementReference) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(&reference.path.to_css()).ok()?;
    document.select(&selector).nth(reference.ordinal)
}

fn inspect(html: &str, reference: &ElementReference) -> Option<Inspected> {
    let document = Html::parse_document(html);
    let element = find(&document, reference)?;
    Some(Inspected {
        index: element_index(&document, &element),
        tag: element.value().name().to_string(),
        visible: is_rendered(&element),
        enabled: element.value().attr("disabled").is_none(),
    })
}

fn click_effect(html: &str, reference: &ElementReference) -> Option<ClickEffect> {
    let document = Html::parse_document(html);
    let element = find(&document, reference)?;
    let value = element.value();

    if value.name() == "a" {
        return Some(match value.attr("href") {
            Some(href) => ClickEffect::Follow {
                href: href.to_string(),
                popup: value.attr("target") == Some("_blank"),
            },
            None => ClickEffect::Plain,
        });
    }

    let submits = match value.name() {
        "button" => !matches!(value.attr("type"), Some("button") | Some("reset")),
        "input" => value.attr("type") == Some("submit"),
        _ => false,
    };
    let form = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "form");

    match (submits, form) {
        (true, Some(form)) => {
            let controls = form
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|control| matches!(control.value().name(), "input" | "textarea"))
                .filter(|control| control.value().attr("type") != Some("submit"))
                .enumerate()
                .map(|(position, control)| FormControlValue {
                    key: control
                        .value()
                        .attr("name")
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("field{}", position)),
                    index: element_index(&document, &control),
                    initial: control.value().attr("value").unwrap_or_default().to_string(),
                })
                .collect();
            Some(ClickEffect::Submit { controls })
        }
        _ => Some(ClickEffect::Plain),
    }
}

fn rendered_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body).next() else {
        return String::new();
    };

    body.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(ElementRef::wrap)?;
            if matches!(parent.value().name(), "script" | "style" | "template") {
                return None;
            }
            if !is_rendered(&parent) {
                return None;
            }
            let line = text.trim();
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct TestHelper;

impl TestHelper {
    pub const AGENT_IDENTITY: &'static str = "agentm@rental.com";
    pub const TENANT_IDENTITY: &'static str = "imani@gmail.com";
    pub const SECRET: &'static str = "1234567";
    pub const SUCCESS_TEXT: &'static str = "Invoice generation successful";

    /// Short timeouts and no post-assertion hold.
    pub fn fast_config(base_url: &str) -> Config {
        let mut config = Config::default();
        config.target.base_url = base_url.to_string();
        config.browser.default_timeout_ms = 1000;
        config.session = SessionConfig {
            commit_timeout_ms: 2000,
            load_timeout_ms: 500,
            action_timeout_ms: 1000,
            poll_interval_ms: 50,
            settle: SettlePolicy::Readiness { stable_polls: 2 },
            pre_login_scroll: Some(ScrollConfig { dx: 0, dy: 300 }),
        };
        config.login.confirmation = LoginConfirmation::FormDismissed { within_ms: 500 };
        config.assertion.hold_ms = 0;
        config
    }

    pub fn home_html() -> String {
        "<html><body><header><a href=\"/signin\">Sign in</a></header>\
         <main><h1>Rental management</h1></main></body></html>"
            .to_string()
    }

    /// A sign-in page laid out the way the default login form locators
    /// expect, with the alternate link pointing at `alternate_href`.
    pub fn signin_html(alternate_href: &str, popup: bool) -> String {
        let target = if popup { " target=\"_blank\"" } else { "" };
        format!(
            "<html><body><div><div><div>\
               <form>\
                 <input name=\"email\" type=\"email\">\
                 <div><input name=\"password\" type=\"password\"></div>\
                 <button type=\"submit\">Sign In</button>\
               </form>\
               <div><p>Don't have an account?</p></div>\
               <div><a href=\"{}\"{}>Click here to login as a tenant</a></div>\
             </div></div></div></body></html>",
            alternate_href, target
        )
    }

    pub fn dashboard_html() -> String {
        "<html><body><nav><a href=\"/invoices\">Invoices</a></nav>\
         <main><h1>Dashboard</h1></main></body></html>"
            .to_string()
    }

    pub fn invoices_html(generated: bool) -> String {
        let status = if generated {
            format!("<div role=\"status\">{}</div>", Self::SUCCESS_TEXT)
        } else {
            "<div role=\"status\">No invoices yet</div>".to_string()
        };
        format!(
            "<html><body><main><h1>Invoices</h1>{}<table><tr><td>INV-001</td></tr></table>\
             </main></body></html>",
            status
        )
    }

    /// A sign-in route that redirects to the dashboard for any of the
    /// `accepted` credentials and stays put otherwise.
    pub fn signin_route(accepted: &[Credential], alternate_href: &str, popup: bool) -> Route {
        let accepted = accepted.to_vec();
        Route::html(Self::signin_html(alternate_href, popup)).on_submit(move |form| {
            let ok = accepted.iter().any(|credential| {
                form.field("email") == Some(credential.identity.as_str())
                    && form.field("password") == Some(credential.secret.as_str())
            });
            if ok {
                SubmitResponse::Redirect("/dashboard".to_string())
            } else {
                SubmitResponse::Stay
            }
        })
    }

    /// The whole application: home, sign-in (plus the tenant variant behind
    /// the alternate link), dashboard and invoices.
    pub fn invoice_site(accepted: &[Credential], invoices_generated: bool) -> FixtureSite {
        FixtureSite::new()
            .route("/", Route::html(Self::home_html()))
            .route("/signin", Self::signin_route(accepted, "/signin/tenant", false))
            .route("/signin/tenant", Self::signin_route(accepted, "/signin", false))
            .route("/dashboard", Route::html(Self::dashboard_html()))
            .route("/invoices", Route::html(Self::invoices_html(invoices_generated)))
    }

    pub fn agent() -> Credential {
        Credential::new(Self::AGENT_IDENTITY, Self::SECRET)
    }

    pub fn tenant() -> Credential {
        Credential::new(Self::TENANT_IDENTITY, Self::SECRET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(path: &str, ordinal: usize) -> ElementReference {
        ElementReference::parse(path, ordinal).unwrap()
    }

    #[test]
    fn test_default_form_locators_resolve_against_signin_page() {
        let html = TestHelper::signin_html("/signin/tenant", false);
        let form = crate::actions::LoginForm::default();

        assert_eq!(inspect(&html, &form.identity).unwrap().tag, "input");
        assert_eq!(inspect(&html, &form.secret).unwrap().tag, "input");
        assert_eq!(inspect(&html, &form.submit).unwrap().tag, "button");
        let alternate = form.alternate.unwrap();
        assert_eq!(inspect(&html, &alternate).unwrap().tag, "a");
    }

    #[test]
    fn test_ordinal_picks_among_repeated_matches() {
        let html = "<html><body><ul><li>a</li><li hidden>b</li><li>c</li></ul></body></html>";
        let first = inspect(html, &reference("html/body/ul/li", 0)).unwrap();
        let second = inspect(html, &reference("html/body/ul/li", 1)).unwrap();
        assert!(first.visible);
        assert!(!second.visible);
        assert!(second.index > first.index);
        assert!(inspect(html, &reference("html/body/ul/li", 3)).is_none());
    }

    #[test]
    fn test_rendered_text_skips_hidden_and_scripts() {
        let html = "<html><body><p>shown</p><p style=\"display: none\">hidden</p>\
                    <script>var x = 1;</script></body></html>";
        let text = rendered_text(html);
        assert_eq!(text, "shown");
    }

    #[tokio::test]
    async fn test_submit_posts_typed_values() {
        let site = FixtureSite::new().route(
            "/signin",
            TestHelper::signin_route(&[TestHelper::agent()], "/signin/tenant", false),
        );
        let browser = FixtureBrowser::new(site);
        let mut engine = browser.clone();
        engine.launch(&BrowserConfig::default()).await.unwrap();
        let context = engine.open_context(Duration::from_secs(1)).await.unwrap();
        let tab = engine.tabs(&context).await.unwrap().pop().unwrap();
        engine.navigate(&tab, "http://app.test/signin").await.unwrap();

        let form = crate::actions::LoginForm::default();
        engine.fill(&tab, &form.identity, TestHelper::AGENT_IDENTITY).await.unwrap();
        engine.fill(&tab, &form.secret, TestHelper::SECRET).await.unwrap();
        engine.click(&tab, &form.submit).await.unwrap();

        let submissions = browser.submissions().await;
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].field("email"), Some(TestHelper::AGENT_IDENTITY));
        assert_eq!(
            engine.current_url(&tab).await.unwrap(),
            "http://app.test/dashboard"
        );
    }
}
