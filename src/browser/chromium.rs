//! Headless Chromium driver over the Chrome DevTools Protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserDriver, BrowserLauncher, DriverError, DriverResult};

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;

/// Inter-key delay for realistic typing. React-based prejoin forms drop
/// input that arrives faster than a human could type it.
const KEY_DELAY: Duration = Duration::from_millis(45);

/// Launches one headless Chromium per session, media prompts pre-accepted.
pub struct ChromiumLauncher {
    chrome_path: Option<PathBuf>,
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new(chrome_path: Option<PathBuf>, headless: bool) -> Self {
        Self {
            chrome_path,
            headless,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn BrowserDriver>> {
        let mut builder = BrowserConfig::builder()
            .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
            .no_sandbox()
            .args(vec![
                "--use-fake-ui-for-media-stream",
                "--use-fake-device-for-media-stream",
                "--autoplay-policy=no-user-gesture-required",
                "--disable-blink-features=AutomationControlled",
            ]);

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !self.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        // The CDP event handler must be polled for the connection to make
        // progress; it runs until the browser goes away.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        Ok(Arc::new(ChromiumDriver {
            browser: Mutex::new(browser),
            page,
            handler_task,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: AtomicBool,
}

impl ChromiumDriver {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }

    async fn send_char(&self, ch: char) -> DriverResult<()> {
        let params = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::Char)
            .text(ch.to_string())
            .build()
            .map_err(DriverError::Evaluate)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;
        Ok(())
    }

    async fn send_key(&self, key: &str, modifiers: i64) -> DriverResult<()> {
        for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key(key.to_string())
                .modifiers(modifiers)
                .build()
                .map_err(DriverError::Evaluate)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| DriverError::Evaluate(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        self.ensure_open()?;

        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(timeout, navigation).await {
            Err(_) => Err(DriverError::Timeout),
            Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }

    async fn evaluate(&self, js: &str) -> DriverResult<Value> {
        self.ensure_open()?;

        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn find_and_click(&self, selector: &str) -> DriverResult<bool> {
        self.ensure_open()?;

        let element = match self.page.find_element(selector).await {
            Ok(el) => el,
            Err(_) => return Ok(false),
        };

        match element.click().await {
            Ok(_) => Ok(true),
            Err(e) => {
                // Element vanished between find and click. Normal here.
                debug!("Click on {:?} failed: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn click_by_text(&self, needles: &[&str]) -> DriverResult<bool> {
        self.ensure_open()?;

        let needles_json =
            serde_json::to_string(needles).map_err(|e| DriverError::Evaluate(e.to_string()))?;
        let js = format!(
            r#"(() => {{
                const needles = {needles_json}.map(n => n.toLowerCase());
                const candidates = document.querySelectorAll(
                    'button, [role="button"], a, span, div[tabindex]');
                for (const el of candidates) {{
                    const text = (el.innerText || el.textContent || '').trim().toLowerCase();
                    if (!text || text.length > 80) continue;
                    if (needles.some(n => text.includes(n))) {{
                        el.click();
                        return true;
                    }}
                }}
                return false;
            }})()"#
        );

        match self.evaluate(&js).await {
            Ok(Value::Bool(clicked)) => Ok(clicked),
            Ok(_) => Ok(false),
            Err(e) => {
                debug!("Text click for {:?} failed: {}", needles, e);
                Ok(false)
            }
        }
    }

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        self.ensure_open()?;
        self.page
            .click(Point::new(x, y))
            .await
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        self.ensure_open()?;

        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;

        element
            .click()
            .await
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;
        element
            .focus()
            .await
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;

        // Select whatever is in the field so the first keystroke replaces it.
        let select_js = format!(
            r#"(() => {{
                const el = document.querySelector({selector:?});
                if (el && el.select) el.select();
                return true;
            }})()"#
        );
        let _ = self.evaluate(&select_js).await;
        self.send_key("Backspace", 0).await?;

        for ch in text.chars() {
            self.send_char(ch).await?;
            tokio::time::sleep(KEY_DELAY).await;
        }

        Ok(())
    }

    async fn keyboard(&self, shortcut: &str) -> DriverResult<()> {
        self.ensure_open()?;
        let (key, modifiers) = parse_shortcut(shortcut);
        self.send_key(&key, modifiers).await
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.ensure_open()?;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();

        let bytes = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| DriverError::Screenshot(e.to_string()))?;

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| DriverError::Screenshot(e.to_string()))?;
        Ok(())
    }

    async fn grant_permissions(&self, origin: &str) -> DriverResult<()> {
        self.ensure_open()?;

        let params = GrantPermissionsParams {
            permissions: vec![
                PermissionType::AudioCapture,
                PermissionType::VideoCapture,
                PermissionType::Notifications,
            ],
            origin: Some(origin.to_string()),
            browser_context_id: None,
        };

        if let Err(e) = self.page.execute(params).await {
            // The fake-UI launch flags already auto-accept media prompts,
            // so a failed explicit grant is not fatal.
            warn!("Permission grant for {} failed: {}", origin, e);
        }
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            debug!("Browser close: {}", e);
        }
        self.handler_task.abort();
    }
}

/// Parse `"ctrl+shift+u"`-style shortcuts into a CDP key + modifier mask.
/// Modifier bits per the protocol: alt=1, ctrl=2, meta=4, shift=8.
fn parse_shortcut(shortcut: &str) -> (String, i64) {
    let mut modifiers = 0i64;
    let mut key = String::new();

    for part in shortcut.split('+') {
        let part = part.trim();
        match part.to_lowercase().as_str() {
            "alt" => modifiers |= 1,
            "ctrl" | "control" => modifiers |= 2,
            "meta" | "cmd" => modifiers |= 4,
            "shift" => modifiers |= 8,
            _ => {
                key = if part.len() == 1 && modifiers & 8 != 0 {
                    part.to_uppercase()
                } else {
                    part.to_string()
                };
            }
        }
    }

    (key, modifiers)
}
