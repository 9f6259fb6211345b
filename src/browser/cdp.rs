//! Chrome DevTools Protocol backend (uses the `headless_chrome` crate)

use super::{BrowserBackend, BrowserSession};
use crate::config::{BrowserConfig, PluginConfig};
use crate::template::READY_SELECTOR;
use crate::{Error, Result, Viewport};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Scrolls to the top and reports the document size plus the page-space
/// border box of the element matching the selector (`null` when absent).
const MEASURE_JS: &str = r#"(function(selector) {
    window.scrollTo(0, 0);
    var body = document.body, root = document.documentElement;
    var el = document.querySelector(selector);
    var rect = null;
    if (el) {
        var r = el.getBoundingClientRect();
        rect = { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height };
    }
    return JSON.stringify({
        width: Math.max(body.scrollWidth, body.offsetWidth, root.scrollWidth),
        height: Math.max(body.scrollHeight, body.offsetHeight, root.scrollHeight),
        rect: rect
    });
})"#;

#[derive(Debug, Deserialize)]
struct Layout {
    width: f64,
    height: f64,
    rect: Option<Rect>,
}

#[derive(Debug, Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// The browser connection is dropped after this long without any event;
/// the renderer relaunches it on the next request.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Launches headless Chrome/Chromium processes
#[derive(Debug, Clone)]
pub struct CdpBackend {
    viewport: Viewport,
    config: BrowserConfig,
}

impl CdpBackend {
    pub fn new(viewport: Viewport, config: BrowserConfig) -> Self {
        Self { viewport, config }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(config.viewport, config.browser.clone())
    }
}

impl BrowserBackend for CdpBackend {
    fn launch(&self) -> Result<Arc<dyn BrowserSession>> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(self.config.sandbox)
            .window_size(Some((self.viewport.width, self.viewport.height)))
            .path(self.config.chrome_path.clone())
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(vec![OsStr::new("--hide-scrollbars"), OsStr::new("--disable-gpu")])
            .build()
            .map_err(|e| Error::LaunchError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::LaunchError(format!("Failed to launch browser: {}", e)))?;

        Ok(Arc::new(CdpSession {
            browser,
            viewport: self.viewport,
            load_timeout: Duration::from_millis(self.config.load_timeout_ms),
        }))
    }
}

/// A running headless Chrome; every capture opens and closes its own tab
pub struct CdpSession {
    browser: Browser,
    viewport: Viewport,
    load_timeout: Duration,
}

impl CdpSession {
    fn capture_in(&self, tab: &Tab, document: &Path, selector: &str) -> Result<Vec<u8>> {
        let absolute = document.canonicalize()?;
        let url = url::Url::from_file_path(&absolute)
            .map_err(|_| Error::RenderError(format!("Not a file path: {}", absolute.display())))?;

        tab.set_default_timeout(self.load_timeout);

        tab.navigate_to(url.as_str())
            .map_err(|e| Error::RenderError(format!("Navigation failed: {}", e)))?;

        tab.wait_until_navigated()
            .map_err(|e| Error::RenderError(format!("Wait for navigation failed: {}", e)))?;

        tab.wait_for_element_with_custom_timeout(READY_SELECTOR, self.load_timeout)
            .map_err(|e| Error::RenderError(format!("Document did not finish rendering: {}", e)))?;

        let layout = measure(tab, selector)?;

        // Chrome only paints what lies inside the viewport, so grow it to the
        // whole document before capturing.
        let width = self.viewport.width.max(layout.width.ceil() as u32);
        let height = self.viewport.height.max(layout.height.ceil() as u32);
        tab.call_method(Emulation::SetDeviceMetricsOverride {
            width,
            height,
            device_scale_factor: 1.0,
            mobile: false,
            scale: None,
            screen_width: None,
            screen_height: None,
            position_x: None,
            position_y: None,
            dont_set_visible_size: None,
            screen_orientation: None,
            viewport: None,
            display_feature: None,
            device_posture: None,
        })
        .map_err(|e| Error::RenderError(format!("Failed to resize viewport: {}", e)))?;

        let clip = match layout.rect {
            Some(rect) => Some(Page::Viewport {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                scale: 1.0,
            }),
            None => {
                debug!("No {} element, capturing the full page ({}x{})", selector, width, height);
                None
            }
        };

        let png = tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, clip, true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))?;

        Ok(png)
    }
}

fn measure(tab: &Tab, selector: &str) -> Result<Layout> {
    let selector = serde_json::to_string(selector).map_err(|e| Error::RenderError(e.to_string()))?;
    let remote = tab
        .evaluate(&format!("{}({})", MEASURE_JS, selector), false)
        .map_err(|e| Error::RenderError(format!("Failed to measure document: {}", e)))?;

    match remote.value {
        Some(serde_json::Value::String(json)) => serde_json::from_str(&json)
            .map_err(|e| Error::RenderError(format!("Bad layout result: {}", e))),
        other => Err(Error::RenderError(format!("Unexpected layout result: {:?}", other))),
    }
}

impl BrowserSession for CdpSession {
    fn is_alive(&self) -> bool {
        self.browser.get_version().is_ok()
    }

    fn capture(&self, document: &Path, selector: &str) -> Result<Vec<u8>> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| Error::RenderError(format!("Failed to create tab: {}", e)))?;

        let result = self.capture_in(&tab, document, selector);

        if let Err(e) = tab.close(true) {
            warn!("Failed to close tab: {}", e);
        }
        result
    }

    fn close(&self) -> Result<()> {
        let tabs: Vec<Arc<Tab>> = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| Error::Other(format!("Tab list poisoned: {}", e)))?
            .clone();

        for tab in tabs {
            if let Err(e) = tab.close(false) {
                debug!("Failed to close tab during shutdown: {}", e);
            }
        }
        Ok(())
    }
}
