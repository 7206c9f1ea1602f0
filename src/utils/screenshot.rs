use crate::core::BrowserTrait;
use crate::errors::Result;
use std::path::{Path, PathBuf};

pub struct ScreenshotManager;

impl ScreenshotManager {
    pub async fn save_to_file<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        file_path: &Path,
    ) -> Result<()> {
        let screenshot_bytes = browser.screenshot(tab).await?;
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(file_path, screenshot_bytes).await?;
        Ok(())
    }

    /// Writes `<dir>/<run_id>-failure.png`.
    pub async fn save_failure<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        dir: &Path,
        run_id: &str,
    ) -> Result<PathBuf> {
        let path = dir.join(format!("{}-failure.png", run_id));
        Self::save_to_file(browser, tab, &path).await?;
        Ok(path)
    }
}
