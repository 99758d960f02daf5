use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;
use url::Url;

use crate::browser::Locator;
use crate::delay_manager::SettlePoint;
use crate::error::ScrapeError;

pub const DEFAULT_CONFIG_FILE: &str = "scraper_config.json";
pub const DEFAULT_ENTRY_URL: &str = "https://rera.wb.gov.in/district_project.php?dcode=0";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub entry_url: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub failure_log_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub browser: BrowserConfig,
    pub timeouts: Timeouts,
    pub settle: SettleDelays,
    pub selectors: SiteSelectors,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            entry_url: DEFAULT_ENTRY_URL.to_string(),
            input_path: PathBuf::from("WB_input.csv"),
            output_path: PathBuf::from("construction_status.csv"),
            failure_log_path: PathBuf::from("failed_registrations.txt"),
            snapshot_dir: PathBuf::from("."),
            browser: BrowserConfig::default(),
            timeouts: Timeouts::default(),
            settle: SettleDelays::default(),
            selectors: SiteSelectors::default(),
        }
    }
}

impl ScraperConfig {
    /// Load from `path`, or from `scraper_config.json` if it exists, or use
    /// defaults. An explicitly named file that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ScrapeError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                info!("No config file found. Using defaults.");
                ScraperConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ScrapeError> {
        let content = fs::read_to_string(path).map_err(|e| ScrapeError::ConfigInvalid {
            reason: format!("cannot read {:?}: {}", path, e),
        })?;
        let config = Self::from_json(&content).map_err(|e| ScrapeError::ConfigInvalid {
            reason: format!("{:?}: {}", path, e),
        })?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        Url::parse(&self.entry_url).map_err(|e| ScrapeError::ConfigInvalid {
            reason: format!("entry_url {:?}: {}", self.entry_url, e),
        })?;
        if self.selectors.table_id.trim().is_empty() {
            return Err(ScrapeError::ConfigInvalid {
                reason: "selectors.table_id must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Chrome binary; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    pub idle_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            headless: false,
            window_width: 1920,
            window_height: 1080,
            chrome_path: None,
            idle_timeout_secs: 300,
        }
    }
}

impl BrowserConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Bounds on the explicit element waits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub search_control_secs: u64,
    pub project_link_secs: u64,
    /// Applied to each status-control strategy separately.
    pub status_control_secs: u64,
    /// Applied to each waited table strategy separately.
    pub table_secs: u64,
    pub poll_interval_millis: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            search_control_secs: 10,
            project_link_secs: 10,
            status_control_secs: 10,
            table_secs: 15,
            poll_interval_millis: 500,
        }
    }
}

impl Timeouts {
    pub fn search_control(&self) -> Duration {
        Duration::from_secs(self.search_control_secs)
    }

    pub fn project_link(&self) -> Duration {
        Duration::from_secs(self.project_link_secs)
    }

    pub fn status_control(&self) -> Duration {
        Duration::from_secs(self.status_control_secs)
    }

    pub fn table(&self) -> Duration {
        Duration::from_secs(self.table_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    /// All waits zeroed: every wait becomes a single check.
    pub fn immediate() -> Self {
        Timeouts {
            search_control_secs: 0,
            project_link_secs: 0,
            status_control_secs: 0,
            table_secs: 0,
            poll_interval_millis: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    pub after_search_millis: u64,
    pub after_project_click_millis: u64,
    pub after_status_click_millis: u64,
    pub status_ready_millis: u64,
    pub before_extract_millis: u64,
    pub after_reset_millis: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        SettleDelays {
            after_search_millis: 2_000,
            after_project_click_millis: 3_000,
            after_status_click_millis: 3_000,
            status_ready_millis: 5_000,
            before_extract_millis: 5_000,
            after_reset_millis: 2_000,
        }
    }
}

impl SettleDelays {
    pub fn none() -> Self {
        SettleDelays {
            after_search_millis: 0,
            after_project_click_millis: 0,
            after_status_click_millis: 0,
            status_ready_millis: 0,
            before_extract_millis: 0,
            after_reset_millis: 0,
        }
    }

    pub fn duration(&self, point: SettlePoint) -> Duration {
        let millis = match point {
            SettlePoint::AfterSearch => self.after_search_millis,
            SettlePoint::AfterProjectClick => self.after_project_click_millis,
            SettlePoint::AfterStatusClick => self.after_status_click_millis,
            SettlePoint::StatusReady => self.status_ready_millis,
            SettlePoint::BeforeExtract => self.before_extract_millis,
            SettlePoint::AfterReset => self.after_reset_millis,
        };
        Duration::from_millis(millis)
    }
}

/// Where things live on the portal's pages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub search_input: String,
    /// Project-name anchor in the first result row.
    pub project_link: String,
    pub status_button: String,
    pub status_button_label: String,
    pub status_page_link: String,
    pub table_id: String,
    /// Lowercase heading text preceding the status table.
    pub status_heading: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        SiteSelectors {
            search_input: "input[type='search']".to_string(),
            project_link: "table tr td:nth-child(3) a".to_string(),
            status_button: ".btn.btn-success".to_string(),
            status_button_label:
                "//button[contains(@class, 'btn-success') and contains(text(), 'Project Status')]"
                    .to_string(),
            status_page_link: "//a[contains(@href, 'project_status.php')]".to_string(),
            table_id: "agentDataTable".to_string(),
            status_heading: "status of construction".to_string(),
        }
    }
}

impl SiteSelectors {
    pub fn search_input(&self) -> Locator {
        Locator::Css(self.search_input.clone())
    }

    pub fn project_link(&self) -> Locator {
        Locator::Css(self.project_link.clone())
    }
}
