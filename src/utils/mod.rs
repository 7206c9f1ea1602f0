pub mod javascript;
pub mod screenshot;

pub use javascript::PageScripts;
pub use screenshot::ScreenshotManager;
