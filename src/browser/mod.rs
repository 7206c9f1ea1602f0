#[cfg(feature = "chrome")]
pub mod chrome;
pub mod navigation;
pub mod page;
pub mod session;
pub mod verifier;

#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;
pub use navigation::{Committed, FrameLoad, LoadReport, NavigationController};
pub use page::ActivePage;
pub use session::{ScopedRun, Session};
pub use verifier::{AssertionVerifier, Verification};
