use std::path::Path;

use log::{error, info, warn};

use crate::browser::{self, ChromeSession, DriverSession, Session};
use crate::config::{BrowserConfig, ScraperConfig};
use crate::delay_manager::{self, SettlePoint};
use crate::error::{BrowserError, ScrapeError};
use crate::extractor::{Extraction, RecordExtractor};
use crate::input_loader::{self, RegistrationNumber};
use crate::ledger::{FailureLog, OutputLedger, SnapshotWriter};
use crate::registration::{Outcome, RegistrationWorkflow};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// Registrations that wrote at least one row.
    pub extracted: usize,
    /// Reached a status table with no data rows.
    pub empty: usize,
    pub failed: usize,
    pub rows_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistrationResult {
    Extracted(usize),
    Empty,
    Failed,
}

pub struct BatchRunner {
    config: ScraperConfig,
}

impl BatchRunner {
    pub fn new(config: ScraperConfig) -> Self {
        BatchRunner { config }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Process `input` into `output` with a freshly launched Chrome.
    pub fn run(&self, input: &Path, output: &Path) -> Result<BatchSummary, ScrapeError> {
        self.run_with(input, output, ChromeSession::launch)
    }

    /// As [`run`](Self::run), with the browser supplied by `acquire`.
    pub fn run_with<S, F>(&self, input: &Path, output: &Path, acquire: F) -> Result<BatchSummary, ScrapeError>
    where
        S: Session,
        F: FnOnce(&BrowserConfig) -> Result<S, BrowserError>,
    {
        let registrations = input_loader::load_registrations(input)?;
        if registrations.is_empty() {
            error!("No registration numbers found in {:?}", input);
            return Ok(BatchSummary::default());
        }
        info!("Loaded {} registration numbers from {:?}", registrations.len(), input);

        let mut ledger = OutputLedger::open(output)?;
        let failures = FailureLog::new(&self.config.failure_log_path);

        let mut driver = DriverSession::acquire(|| acquire(&self.config.browser))?;
        let summary = self.process_all(driver.session()?, &registrations, &mut ledger, &failures);
        driver.release();

        info!(
            "Data extraction completed and saved to {:?}: {} processed, {} with rows, {} empty, {} failed, {} rows written",
            ledger.path(),
            summary.total,
            summary.extracted,
            summary.empty,
            summary.failed,
            summary.rows_written
        );
        Ok(summary)
    }

    fn process_all<S: Session>(
        &self,
        session: &mut S,
        registrations: &[RegistrationNumber],
        ledger: &mut OutputLedger,
        failures: &FailureLog,
    ) -> BatchSummary {
        let mut on_listing = match session.navigate(&self.config.entry_url) {
            Ok(()) => {
                info!("Navigated to the initial page: {}", session.current_url());
                true
            }
            Err(e) => {
                error!("Could not open the initial page {}: {}", self.config.entry_url, e);
                false
            }
        };

        let snapshots = SnapshotWriter::new(&self.config.snapshot_dir);
        let mut summary = BatchSummary { total: registrations.len(), ..BatchSummary::default() };

        for (i, registration) in registrations.iter().enumerate() {
            info!("=======================================");
            info!("Processing registration {}/{}: {}", i + 1, registrations.len(), registration);

            let attempt = self
                .prepare(session, on_listing)
                .and_then(|()| self.process_one(session, registration, ledger, failures, &snapshots));
            let result = match attempt {
                Ok(result) => result,
                Err(e) => {
                    error!("Error processing {}: {}", registration, e);
                    record_failure(failures, registration, Some(&e.to_string()));
                    RegistrationResult::Failed
                }
            };

            info!("Cleaning up tabs...");
            on_listing = match self.reset(session) {
                Ok(()) => true,
                Err(e) => {
                    error!("Error during tab cleanup after {}: {}", registration, e);
                    false
                }
            };

            match result {
                RegistrationResult::Extracted(rows) => {
                    summary.extracted += 1;
                    summary.rows_written += rows;
                }
                RegistrationResult::Empty => summary.empty += 1,
                RegistrationResult::Failed => summary.failed += 1,
            }
        }

        summary
    }

    // A failed reset is retried here, where it still counts against a registration.
    fn prepare<S: Session>(&self, session: &mut S, on_listing: bool) -> Result<(), BrowserError> {
        if on_listing {
            browser::normalize_contexts(session).map(|_| ())
        } else {
            self.reset(session)
        }
    }

    fn process_one<S: Session>(
        &self,
        session: &mut S,
        registration: &RegistrationNumber,
        ledger: &mut OutputLedger,
        failures: &FailureLog,
        snapshots: &SnapshotWriter,
    ) -> Result<RegistrationResult, BrowserError> {
        let config = &self.config;
        let mut workflow = RegistrationWorkflow::new(&config.selectors, &config.timeouts, &config.settle);
        let result = match workflow.run(session, registration)? {
            Outcome::Ready(_) => {
                let extractor =
                    RecordExtractor::new(&config.selectors, &config.timeouts, &config.settle, snapshots);
                match extractor.extract(&*session, registration, ledger) {
                    Extraction::Extracted { rows_written: 0, .. } => RegistrationResult::Empty,
                    Extraction::Extracted { rows_written, .. } => RegistrationResult::Extracted(rows_written),
                    Extraction::Failed(e) => {
                        warn!("Extraction failed for {}: {}", registration, e);
                        record_failure(failures, registration, None);
                        RegistrationResult::Failed
                    }
                }
            }
            Outcome::Failed(e) => {
                warn!("Failed to search for registration {}: {}", registration, e);
                record_failure(failures, registration, None);
                RegistrationResult::Failed
            }
        };
        Ok(result)
    }

    /// Back to a single tab on the listing page.
    fn reset<S: Session>(&self, session: &mut S) -> Result<(), BrowserError> {
        browser::normalize_contexts(session)?;
        session.navigate(&self.config.entry_url)?;
        info!("Returned to main search page: {}", session.current_url());
        delay_manager::settle(&self.config.settle, SettlePoint::AfterReset);
        Ok(())
    }
}

fn record_failure(failures: &FailureLog, registration: &RegistrationNumber, annotation: Option<&str>) {
    if let Err(e) = failures.record(registration, annotation) {
        error!("Could not write {:?} for {}: {}", failures.path(), registration, e);
    }
}
