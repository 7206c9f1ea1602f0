pub mod actions;
pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod scenario;
pub mod testing;
pub mod types;
pub mod utils;

pub use actions::{LoginAttempt, LoginConfirmation, LoginForm, RemediationStep, SettlePolicy};
#[cfg(feature = "chrome")]
pub use browser::ChromeBrowser;
pub use browser::{ActivePage, NavigationController, Session};
pub use core::{BrowserTrait, Config};
pub use dom::{ElementReference, MatchMode, TextMatcher};
pub use errors::{ErrorKind, Result, ScenarioError};
pub use scenario::{InvoiceScenario, ScenarioOutcome, ScenarioReport};
pub use types::*;
