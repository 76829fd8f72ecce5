//! Deferred Value Configuration

use std::cell::Cell;

use fos_event_loop::EventLoopConfig;
use serde::{Deserialize, Serialize};

/// Runtime configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Warn about, and notify observers of, rejections that never get a
    /// handler
    pub report_unhandled_rejections: bool,

    /// Settings for the thread's event loop
    pub event_loop: EventLoopConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_unhandled_rejections: true,
            event_loop: EventLoopConfig::default(),
        }
    }
}

thread_local! {
    static REPORT_UNHANDLED: Cell<bool> = const { Cell::new(true) };
}

/// Apply `config` to the current thread, event loop included
pub fn configure(config: Config) {
    tracing::debug!(?config, "configuring deferred runtime");
    REPORT_UNHANDLED.with(|flag| flag.set(config.report_unhandled_rejections));
    fos_event_loop::configure(config.event_loop);
}

/// Configuration in effect on the current thread
pub fn config() -> Config {
    Config {
        report_unhandled_rejections: report_unhandled_rejections(),
        event_loop: fos_event_loop::config(),
    }
}

pub(crate) fn report_unhandled_rejections() -> bool {
    REPORT_UNHANDLED.with(Cell::get)
}
