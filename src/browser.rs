use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use log::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::delay_manager;
use crate::error::BrowserError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{}`", s),
            Locator::XPath(s) => write!(f, "xpath `{}`", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(pub String);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One browser under automation. Every element operation applies to the
/// focused context and waits up to `timeout` for the element to appear.
pub trait Session {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    fn current_url(&self) -> String;

    /// Open contexts, oldest first.
    fn contexts(&self) -> Result<Vec<ContextId>, BrowserError>;

    fn focused(&self) -> ContextId;

    fn switch_to(&mut self, context: &ContextId) -> Result<(), BrowserError>;

    fn close_context(&mut self, context: &ContextId) -> Result<(), BrowserError>;

    /// Clear the field and type `text` into it.
    fn type_into(&self, locator: &Locator, text: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Native click. Returns the element's visible text.
    fn click(&self, locator: &Locator, timeout: Duration) -> Result<String, BrowserError>;

    /// Click dispatched from page script, for anchors that ignore native
    /// clicks under automation. Returns the element's `href` if any.
    fn script_click(&self, locator: &Locator, timeout: Duration) -> Result<String, BrowserError>;

    fn page_source(&self) -> Result<String, BrowserError>;

    fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Tear the browser down. Must not fail; problems are only logged.
    fn shutdown(&mut self);
}

/// Close every context except the first and focus the first.
pub fn normalize_contexts<S: Session + ?Sized>(session: &mut S) -> Result<ContextId, BrowserError> {
    let contexts = session.contexts()?;
    debug!("Open tabs: {:?}", contexts);
    let Some((first, rest)) = contexts.split_first() else {
        return Err(BrowserError::NavigationFailed {
            reason: "no open browser tab".to_string(),
        });
    };

    for extra in rest.iter().rev() {
        session.close_context(extra)?;
        info!("Closed extra tab {}", extra);
    }
    session.switch_to(first)?;
    Ok(first.clone())
}

/// Poll `probe` until it yields a value or `timeout` elapses. A zero
/// timeout still probes once.
pub fn poll_until<T, F>(timeout: Duration, interval: Duration, mut probe: F) -> Result<Option<T>, BrowserError>
where
    F: FnMut() -> Result<Option<T>, BrowserError>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(found) = probe()? {
            return Ok(Some(found));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let step = if interval.is_zero() { Duration::from_millis(50) } else { interval };
        delay_manager::sleep_for(step.min(deadline - now));
    }
}

/// Scoped owner of the run's single browser session.
pub struct DriverSession<S: Session> {
    session: Option<S>,
}

impl<S: Session> DriverSession<S> {
    pub fn acquire<F>(launch: F) -> Result<Self, BrowserError>
    where
        F: FnOnce() -> Result<S, BrowserError>,
    {
        let session = launch()?;
        info!("Browser session acquired.");
        Ok(DriverSession { session: Some(session) })
    }

    pub fn session(&mut self) -> Result<&mut S, BrowserError> {
        self.session.as_mut().ok_or(BrowserError::SessionReleased)
    }

    pub fn is_released(&self) -> bool {
        self.session.is_none()
    }

    /// Idempotent.
    pub fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
            info!("Browser session released.");
        }
    }
}

impl<S: Session> Drop for DriverSession<S> {
    fn drop(&mut self) {
        self.release();
    }
}

const VISIBILITY_POLL: Duration = Duration::from_millis(200);

const IS_VISIBLE_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden'; }";

/// Chrome driven through `headless_chrome`.
pub struct ChromeSession {
    browser: Option<Browser>,
    focused: Arc<Tab>,
    // closed by us, possibly still listed by the driver
    closed: HashSet<String>,
}

impl ChromeSession {
    pub fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let args: Vec<&OsStr> = vec![OsStr::new("--start-maximized")];
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .path(config.chrome_path.clone())
            .idle_browser_timeout(config.idle_timeout())
            .args(args)
            .build()
            .map_err(|e| BrowserError::LaunchFailed { reason: e.to_string() })?;

        let browser = Browser::new(options).map_err(|e| BrowserError::LaunchFailed { reason: e.to_string() })?;
        let existing = Self::lock_tabs(&browser)?.first().cloned();
        let focused = match existing {
            Some(tab) => tab,
            None => browser.new_tab()?,
        };
        info!("Chrome started (headless: {}).", config.headless);

        Ok(ChromeSession {
            browser: Some(browser),
            focused,
            closed: HashSet::new(),
        })
    }

    fn browser(&self) -> Result<&Browser, BrowserError> {
        self.browser.as_ref().ok_or(BrowserError::SessionReleased)
    }

    fn lock_tabs(browser: &Browser) -> Result<Vec<Arc<Tab>>, BrowserError> {
        let tabs = browser.get_tabs().lock().map_err(|e| BrowserError::Protocol {
            detail: format!("tab list poisoned: {}", e),
        })?;
        Ok(tabs.clone())
    }

    fn open_tabs(&self) -> Result<Vec<Arc<Tab>>, BrowserError> {
        let tabs = Self::lock_tabs(self.browser()?)?;
        Ok(tabs
            .into_iter()
            .filter(|t| !self.closed.contains(t.get_target_id().as_str()))
            .collect())
    }

    fn find_tab(&self, context: &ContextId) -> Result<Arc<Tab>, BrowserError> {
        self.open_tabs()?
            .into_iter()
            .find(|t| t.get_target_id() == &context.0)
            .ok_or_else(|| BrowserError::ContextNotFound { id: context.0.clone() })
    }

    /// Present and rendered, both within `timeout`.
    fn wait_clickable(&self, locator: &Locator, timeout: Duration) -> Result<Element<'_>, BrowserError> {
        let started = Instant::now();
        let element = self.wait_element(locator, timeout)?;
        let remaining = timeout.saturating_sub(started.elapsed());
        let visible = poll_until(remaining, VISIBILITY_POLL, || {
            let shown = element
                .call_js_fn(IS_VISIBLE_JS, vec![], false)
                .map(|object| reports_true(object.value.as_ref()))
                .unwrap_or(false);
            Ok(shown.then_some(()))
        })?;
        match visible {
            Some(()) => Ok(element),
            None => Err(BrowserError::ElementNotInteractable {
                reason: format!("{} is present but not visible", locator),
            }),
        }
    }

    fn wait_element(&self, locator: &Locator, timeout: Duration) -> Result<Element<'_>, BrowserError> {
        let found = match locator {
            Locator::Css(selector) => self.focused.wait_for_element_with_custom_timeout(selector, timeout),
            Locator::XPath(xpath) => self.focused.wait_for_xpath_with_custom_timeout(xpath, timeout),
        };
        found.map_err(|e| {
            debug!("Wait for {} failed: {}", locator, e);
            BrowserError::ElementNotFound { selector: locator.to_string() }
        })
    }
}

fn reports_true(value: Option<&serde_json::Value>) -> bool {
    matches!(value, Some(serde_json::Value::Bool(true)))
}

fn not_interactable(locator: &Locator, e: anyhow::Error) -> BrowserError {
    BrowserError::ElementNotInteractable {
        reason: format!("{}: {}", locator, e),
    }
}

impl Session for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.focused
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| BrowserError::NavigationFailed {
                reason: format!("{}: {}", url, e),
            })?;
        Ok(())
    }

    fn current_url(&self) -> String {
        self.focused.get_url()
    }

    fn contexts(&self) -> Result<Vec<ContextId>, BrowserError> {
        Ok(self
            .open_tabs()?
            .iter()
            .map(|t| ContextId(t.get_target_id().clone()))
            .collect())
    }

    fn focused(&self) -> ContextId {
        ContextId(self.focused.get_target_id().clone())
    }

    fn switch_to(&mut self, context: &ContextId) -> Result<(), BrowserError> {
        let tab = self.find_tab(context)?;
        tab.activate()?;
        self.focused = tab;
        Ok(())
    }

    fn close_context(&mut self, context: &ContextId) -> Result<(), BrowserError> {
        let tab = self.find_tab(context)?;
        tab.close(true)?;
        self.closed.insert(context.0.clone());
        Ok(())
    }

    fn type_into(&self, locator: &Locator, text: &str, timeout: Duration) -> Result<(), BrowserError> {
        let element = self.wait_clickable(locator, timeout)?;
        element
            .call_js_fn("function() { this.value = ''; }", vec![], false)
            .map_err(|e| not_interactable(locator, e))?;
        // type_into focuses the field with a click of its own.
        element.type_into(text).map_err(|e| not_interactable(locator, e))?;
        Ok(())
    }

    fn click(&self, locator: &Locator, timeout: Duration) -> Result<String, BrowserError> {
        let element = self.wait_clickable(locator, timeout)?;
        let text = element.get_inner_text().unwrap_or_default();
        element.click().map_err(|e| not_interactable(locator, e))?;
        Ok(text.trim().to_string())
    }

    fn script_click(&self, locator: &Locator, timeout: Duration) -> Result<String, BrowserError> {
        let element = self.wait_element(locator, timeout)?;
        let href = element.get_attribute_value("href")?.unwrap_or_default();
        element
            .call_js_fn("function() { this.click(); }", vec![], false)
            .map_err(|e| not_interactable(locator, e))?;
        Ok(href)
    }

    fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.focused.get_content()?)
    }

    fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(self
            .focused
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?)
    }

    fn shutdown(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };
        match Self::lock_tabs(&browser) {
            Ok(tabs) => {
                for tab in tabs {
                    if let Err(e) = tab.close(false) {
                        debug!("Ignoring tab close error on shutdown: {}", e);
                    }
                }
            }
            Err(e) => warn!("Could not list tabs on shutdown: {}", e),
        }
        // Dropping the handle kills the Chrome process.
        drop(browser);
    }
}
