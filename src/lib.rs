pub mod error;
pub mod config;
pub mod logger;
pub mod input_loader;
pub mod browser;
pub mod delay_manager;
pub mod registration;
pub mod extractor;
pub mod ledger;
pub mod runner;

// Exporting types for convenience
pub use error::{BrowserError, ExtractError, ScrapeError, WorkflowError};
pub use config::ScraperConfig;
pub use input_loader::RegistrationNumber;
pub use browser::{ChromeSession, ContextId, DriverSession, Locator, Session};
pub use registration::{Outcome, RegistrationWorkflow, WorkflowState};
pub use extractor::{Extraction, RecordExtractor, StatusRow};
pub use ledger::{FailureLog, OutputLedger, SnapshotWriter};
pub use runner::{BatchRunner, BatchSummary};
