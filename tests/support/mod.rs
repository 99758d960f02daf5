// tests/support/mod.rs
//! Scripted stand-in for the regulator portal, driven through the same
//! `Session` trait as Chrome.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use rera_status_lib::browser::{ContextId, Locator, Session};
use rera_status_lib::config::{ScraperConfig, SettleDelays, SiteSelectors, Timeouts};
use rera_status_lib::registration::StatusControl;
use rera_status_lib::BrowserError;

pub const ENTRY_URL: &str = "https://rera.example/district_project.php?dcode=0";

pub fn tmp_dir(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("rera_it_{}", name));
    let _ = fs::remove_dir_all(&p);
    fs::create_dir_all(&p).unwrap();
    p
}

/// Config with no waits, no settle delays and every file under `dir`.
pub fn test_config(dir: &PathBuf) -> ScraperConfig {
    ScraperConfig {
        entry_url: ENTRY_URL.to_string(),
        input_path: dir.join("input.csv"),
        output_path: dir.join("construction_status.csv"),
        failure_log_path: dir.join("failed_registrations.txt"),
        snapshot_dir: dir.join("snapshots"),
        timeouts: Timeouts::immediate(),
        settle: SettleDelays::none(),
        ..ScraperConfig::default()
    }
}

pub fn write_input(dir: &PathBuf, registrations: &[&str]) -> PathBuf {
    let path = dir.join("input.csv");
    let mut content = String::from("registration_number\n");
    for r in registrations {
        content.push_str(r);
        content.push('\n');
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn status_page(rows: &[&[&str]]) -> String {
    let mut body = String::from(
        "<tr><th>Building/Tower</th><th>Floor</th><th>Status</th><th>Completion Date</th></tr>",
    );
    for row in rows {
        body.push_str("<tr>");
        for cell in *row {
            body.push_str(&format!("<td>{}</td>", cell));
        }
        body.push_str("</tr>");
    }
    format!(
        "<html><body><h3>Status of Construction</h3><table id=\"agentDataTable\">{}</table></body></html>",
        body
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusShape {
    SuccessButton,
    LabelledButton,
    StatusPageLink,
    Missing,
    /// Clicking the control breaks the driver connection.
    Broken,
}

#[derive(Debug, Clone)]
pub struct FakeProject {
    pub shape: StatusShape,
    pub opens_new_tab: bool,
    pub status_html: String,
}

impl FakeProject {
    pub fn in_place(status_html: String) -> Self {
        FakeProject { shape: StatusShape::SuccessButton, opens_new_tab: false, status_html }
    }

    pub fn new_tab(status_html: String) -> Self {
        FakeProject { shape: StatusShape::SuccessButton, opens_new_tab: true, status_html }
    }

    pub fn with_shape(mut self, shape: StatusShape) -> Self {
        self.shape = shape;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Page {
    Blank,
    Listing { query: Option<String> },
    Project(String),
    Status(String),
}

/// What the fake observed, shared with the test after the session moves.
#[derive(Debug, Default)]
pub struct FakeLog {
    /// (query, open tab count) for every search submitted.
    pub searches: Vec<(String, usize)>,
    /// Open tab count at every navigation.
    pub navigations: Vec<usize>,
    pub script_clicks: usize,
    pub screenshots: usize,
    pub shutdowns: usize,
    pub final_tabs: usize,
}

struct State {
    tabs: Vec<(ContextId, Page)>,
    focused: usize,
    next_id: usize,
    navigate_calls: usize,
    failing_navigations: Vec<usize>,
}

pub struct FakeSession {
    site: HashMap<String, FakeProject>,
    selectors: SiteSelectors,
    state: RefCell<State>,
    log: Rc<RefCell<FakeLog>>,
}

impl FakeSession {
    pub fn new(site: HashMap<String, FakeProject>) -> Self {
        FakeSession {
            site,
            selectors: SiteSelectors::default(),
            state: RefCell::new(State {
                tabs: vec![(ContextId("tab-0".to_string()), Page::Blank)],
                focused: 0,
                next_id: 1,
                navigate_calls: 0,
                failing_navigations: Vec::new(),
            }),
            log: Rc::new(RefCell::new(FakeLog::default())),
        }
    }

    /// Make the given navigate calls (counted from 0) time out.
    pub fn failing_navigations(self, calls: &[usize]) -> Self {
        self.state.borrow_mut().failing_navigations = calls.to_vec();
        self
    }

    pub fn log(&self) -> Rc<RefCell<FakeLog>> {
        Rc::clone(&self.log)
    }

    fn page(&self) -> Page {
        let state = self.state.borrow();
        state.tabs[state.focused].1.clone()
    }

    fn set_page(&self, page: Page) {
        let mut state = self.state.borrow_mut();
        let focused = state.focused;
        state.tabs[focused].1 = page;
    }

    fn missing(locator: &Locator) -> BrowserError {
        BrowserError::ElementNotFound { selector: locator.to_string() }
    }

    fn open_status(&self, registration: &str, project: &FakeProject) {
        let status = Page::Status(registration.to_string());
        if project.opens_new_tab {
            let mut state = self.state.borrow_mut();
            let id = ContextId(format!("tab-{}", state.next_id));
            state.next_id += 1;
            state.tabs.push((id, status));
        } else {
            self.set_page(status);
        }
    }

    fn activate_status(&self, locator: &Locator, script: bool) -> Result<String, BrowserError> {
        let Page::Project(reg) = self.page() else {
            return Err(Self::missing(locator));
        };
        let project = &self.site[&reg];
        let wanted = match project.shape {
            StatusShape::SuccessButton => StatusControl::SuccessButton,
            StatusShape::LabelledButton => StatusControl::LabelledButton,
            StatusShape::StatusPageLink => StatusControl::StatusPageLink,
            StatusShape::Broken => {
                return Err(BrowserError::Protocol { detail: "connection reset".to_string() });
            }
            StatusShape::Missing => return Err(Self::missing(locator)),
        };
        if *locator != wanted.locator(&self.selectors) {
            return Err(Self::missing(locator));
        }
        if script {
            self.log.borrow_mut().script_clicks += 1;
        }
        self.open_status(&reg, project);
        Ok("Project Status".to_string())
    }
}

impl Session for FakeSession {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        {
            let mut state = self.state.borrow_mut();
            let call = state.navigate_calls;
            state.navigate_calls += 1;
            if state.failing_navigations.contains(&call) {
                return Err(BrowserError::NavigationFailed {
                    reason: format!("{}: net::ERR_TIMED_OUT", url),
                });
            }
        }
        let tabs = self.state.borrow().tabs.len();
        self.log.borrow_mut().navigations.push(tabs);
        let page = if url == ENTRY_URL { Page::Listing { query: None } } else { Page::Blank };
        self.set_page(page);
        Ok(())
    }

    fn current_url(&self) -> String {
        match self.page() {
            Page::Blank => "about:blank".to_string(),
            Page::Listing { .. } => ENTRY_URL.to_string(),
            Page::Project(reg) => format!("https://rera.example/project_details.php?id={}", reg),
            Page::Status(reg) => format!("https://rera.example/project_status.php?id={}", reg),
        }
    }

    fn contexts(&self) -> Result<Vec<ContextId>, BrowserError> {
        Ok(self.state.borrow().tabs.iter().map(|(id, _)| id.clone()).collect())
    }

    fn focused(&self) -> ContextId {
        let state = self.state.borrow();
        state.tabs[state.focused].0.clone()
    }

    fn switch_to(&mut self, context: &ContextId) -> Result<(), BrowserError> {
        let mut state = self.state.borrow_mut();
        let index = state
            .tabs
            .iter()
            .position(|(id, _)| id == context)
            .ok_or_else(|| BrowserError::ContextNotFound { id: context.0.clone() })?;
        state.focused = index;
        Ok(())
    }

    fn close_context(&mut self, context: &ContextId) -> Result<(), BrowserError> {
        let mut state = self.state.borrow_mut();
        let index = state
            .tabs
            .iter()
            .position(|(id, _)| id == context)
            .ok_or_else(|| BrowserError::ContextNotFound { id: context.0.clone() })?;
        state.tabs.remove(index);
        if state.focused >= index && state.focused > 0 {
            state.focused -= 1;
        }
        Ok(())
    }

    fn type_into(&self, locator: &Locator, text: &str, _timeout: Duration) -> Result<(), BrowserError> {
        if *locator != self.selectors.search_input() {
            return Err(Self::missing(locator));
        }
        let Page::Listing { .. } = self.page() else {
            return Err(Self::missing(locator));
        };
        let tabs = self.state.borrow().tabs.len();
        self.log.borrow_mut().searches.push((text.to_string(), tabs));
        self.set_page(Page::Listing { query: Some(text.to_string()) });
        Ok(())
    }

    fn click(&self, locator: &Locator, _timeout: Duration) -> Result<String, BrowserError> {
        if *locator == self.selectors.project_link() {
            return match self.page() {
                Page::Listing { query: Some(q) } if self.site.contains_key(&q) => {
                    self.set_page(Page::Project(q.clone()));
                    Ok(format!("Project {}", q))
                }
                _ => Err(Self::missing(locator)),
            };
        }
        self.activate_status(locator, false)
    }

    fn script_click(&self, locator: &Locator, _timeout: Duration) -> Result<String, BrowserError> {
        self.activate_status(locator, true)
    }

    fn page_source(&self) -> Result<String, BrowserError> {
        Ok(match self.page() {
            Page::Status(reg) => self.site[&reg].status_html.clone(),
            _ => "<html><body><p>nothing here</p></body></html>".to_string(),
        })
    }

    fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.log.borrow_mut().screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    fn shutdown(&mut self) {
        let mut log = self.log.borrow_mut();
        log.shutdowns += 1;
        log.final_tabs = self.state.borrow().tabs.len();
    }
}
