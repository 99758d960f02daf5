use std::time::Duration;

use log::{debug, info, warn};

use crate::browser::{ContextId, Locator, Session};
use crate::config::{SettleDelays, SiteSelectors, Timeouts};
use crate::delay_manager::{self, SettlePoint};
use crate::error::{BrowserError, WorkflowError};
use crate::input_loader::RegistrationNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Searching,
    ProjectSelected,
    StatusLoading,
    StatusReady,
    Done,
    Error,
}

#[derive(Debug)]
pub enum Outcome {
    /// Focused on the status page in this context.
    Ready(ContextId),
    Failed(WorkflowError),
}

/// The three shapes the status control takes on project pages, in the
/// order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusControl {
    SuccessButton,
    LabelledButton,
    StatusPageLink,
}

impl StatusControl {
    pub const ORDER: [StatusControl; 3] = [
        StatusControl::SuccessButton,
        StatusControl::LabelledButton,
        StatusControl::StatusPageLink,
    ];

    pub fn locator(self, selectors: &SiteSelectors) -> Locator {
        match self {
            StatusControl::SuccessButton => Locator::Css(selectors.status_button.clone()),
            StatusControl::LabelledButton => Locator::XPath(selectors.status_button_label.clone()),
            StatusControl::StatusPageLink => Locator::XPath(selectors.status_page_link.clone()),
        }
    }

    /// `Ok(None)` when the control is absent or unusable within `timeout`.
    fn attempt<S: Session + ?Sized>(
        self,
        session: &S,
        selectors: &SiteSelectors,
        timeout: Duration,
    ) -> Result<Option<String>, BrowserError> {
        let locator = self.locator(selectors);
        let activated = match self {
            // Anchors do not always get native click semantics under automation.
            StatusControl::StatusPageLink => session.script_click(&locator, timeout),
            _ => session.click(&locator, timeout),
        };
        match activated {
            Ok(label) => Ok(Some(label)),
            Err(e) if e.is_locate_miss() => {
                debug!("Status control {:?} not usable: {}", self, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

pub struct RegistrationWorkflow<'a> {
    selectors: &'a SiteSelectors,
    timeouts: &'a Timeouts,
    settle: &'a SettleDelays,
    state: WorkflowState,
    history: Vec<WorkflowState>,
}

impl<'a> RegistrationWorkflow<'a> {
    pub fn new(selectors: &'a SiteSelectors, timeouts: &'a Timeouts, settle: &'a SettleDelays) -> Self {
        RegistrationWorkflow {
            selectors,
            timeouts,
            settle,
            state: WorkflowState::Idle,
            history: vec![WorkflowState::Idle],
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Every state entered during the last run, starting at `Idle`.
    pub fn history(&self) -> &[WorkflowState] {
        &self.history
    }

    fn advance(&mut self, next: WorkflowState) {
        debug!("Workflow {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: WorkflowError) -> Outcome {
        warn!("Workflow failed in {:?}: {}", self.state, error);
        self.advance(WorkflowState::Error);
        Outcome::Failed(error)
    }

    /// Drive `registration` from the listing page to its status page.
    ///
    /// Classified failures come back as [`Outcome::Failed`]. Only
    /// unexpected driver errors are returned as `Err`.
    pub fn run<S: Session + ?Sized>(
        &mut self,
        session: &mut S,
        registration: &RegistrationNumber,
    ) -> Result<Outcome, BrowserError> {
        self.state = WorkflowState::Idle;
        self.history = vec![WorkflowState::Idle];

        let result = self.drive(session, registration);
        if result.is_err() {
            self.advance(WorkflowState::Error);
        }
        result
    }

    fn drive<S: Session + ?Sized>(
        &mut self,
        session: &mut S,
        registration: &RegistrationNumber,
    ) -> Result<Outcome, BrowserError> {
        // Idle -> Searching
        let search = self.selectors.search_input();
        match session.type_into(&search, registration.as_str(), self.timeouts.search_control()) {
            Ok(()) => self.advance(WorkflowState::Searching),
            Err(BrowserError::ElementNotFound { selector }) => {
                return Ok(self.fail(WorkflowError::ElementNotFound { selector }));
            }
            Err(e) if e.is_locate_miss() => {
                return Ok(self.fail(WorkflowError::SearchFailed {
                    registration: registration.to_string(),
                    reason: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        }
        delay_manager::settle(self.settle, SettlePoint::AfterSearch);

        // Searching -> ProjectSelected. First result row wins.
        let link = self.selectors.project_link();
        match session.click(&link, self.timeouts.project_link()) {
            Ok(name) => {
                info!("Found project name: {}", name);
                self.advance(WorkflowState::ProjectSelected);
            }
            Err(e) if e.is_locate_miss() => {
                return Ok(self.fail(WorkflowError::SearchFailed {
                    registration: registration.to_string(),
                    reason: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        }
        delay_manager::settle(self.settle, SettlePoint::AfterProjectClick);
        info!("Project details page loaded: {}", session.current_url());

        // ProjectSelected -> StatusLoading
        let before = session.contexts()?;
        debug!("Tabs before status click: {:?}", before);
        let mut activated = None;
        for control in StatusControl::ORDER {
            if let Some(label) = control.attempt(&*session, self.selectors, self.timeouts.status_control())? {
                info!("Activated status control {:?}: {}", control, label);
                activated = Some(control);
                break;
            }
        }
        if activated.is_none() {
            return Ok(self.fail(WorkflowError::StatusControlNotFound));
        }
        self.advance(WorkflowState::StatusLoading);
        delay_manager::settle(self.settle, SettlePoint::AfterStatusClick);

        // StatusLoading -> StatusReady
        let after = session.contexts()?;
        debug!("Tabs after status click: {:?}", after);
        let context = if after.len() > before.len() {
            let Some(opened) = after.iter().find(|c| !before.contains(c)) else {
                return Ok(self.fail(WorkflowError::NavigationFailed {
                    reason: "tab count grew but no new tab id".to_string(),
                }));
            };
            if let Err(e) = session.switch_to(opened) {
                return Ok(self.fail(WorkflowError::NavigationFailed { reason: e.to_string() }));
            }
            info!("Switched to project status tab: {}", session.current_url());
            opened.clone()
        } else {
            info!("No new tab detected - status may have loaded in same tab");
            session.focused()
        };

        delay_manager::settle(self.settle, SettlePoint::StatusReady);
        self.advance(WorkflowState::StatusReady);
        info!("Project status page loaded and ready for data extraction");

        self.advance(WorkflowState::Done);
        Ok(Outcome::Ready(context))
    }
}
