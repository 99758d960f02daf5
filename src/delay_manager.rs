use std::time::Duration;
use std::thread;
use log::{debug, info};

use crate::config::SettleDelays;

/// Named points in a registration where the run pauses for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePoint {
    AfterSearch,
    AfterProjectClick,
    AfterStatusClick,
    StatusReady,
    BeforeExtract,
    AfterReset,
}

impl SettlePoint {
    fn label(self) -> &'static str {
        match self {
            SettlePoint::AfterSearch => "search results",
            SettlePoint::AfterProjectClick => "project page",
            SettlePoint::AfterStatusClick => "status navigation",
            SettlePoint::StatusReady => "status page render",
            SettlePoint::BeforeExtract => "status table render",
            SettlePoint::AfterReset => "listing reload",
        }
    }
}

pub fn settle(delays: &SettleDelays, point: SettlePoint) {
    let wait = delays.duration(point);
    if wait.is_zero() {
        debug!("Skipping settle delay for {}", point.label());
        return;
    }
    info!("Waiting {:.1} seconds ({})...", wait.as_secs_f64(), point.label());
    thread::sleep(wait);
}

pub fn sleep_for(wait: Duration) {
    if !wait.is_zero() {
        thread::sleep(wait);
    }
}
