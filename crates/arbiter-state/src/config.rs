//! Workflow configuration.

use chrono::Duration;
use thiserror::Error;

/// Default dispute window: 48 hours.
pub const DEFAULT_DISPUTE_WINDOW_SECS: i64 = 48 * 60 * 60;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Tunables of the resolution workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// How long after creation a resolution accepts disputes.
    pub dispute_window: Duration,
    /// Page size when a list query does not specify one.
    pub default_page_size: u32,
    /// Upper bound on any requested page size.
    pub max_page_size: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            dispute_window: Duration::seconds(DEFAULT_DISPUTE_WINDOW_SECS),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// A configuration value is out of range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("dispute window must be positive")]
    NonPositiveWindow,
    #[error("page sizes must be at least 1")]
    ZeroPageSize,
    #[error("default page size {default} exceeds maximum {max}")]
    DefaultExceedsMax { default: u32, max: u32 },
}

impl WorkflowConfig {
    /// Check the configuration for values the workflow cannot run with.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.dispute_window <= Duration::zero() {
            return Err(InvalidConfig::NonPositiveWindow);
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(InvalidConfig::ZeroPageSize);
        }
        if self.default_page_size > self.max_page_size {
            return Err(InvalidConfig::DefaultExceedsMax {
                default: self.default_page_size,
                max: self.max_page_size,
            });
        }
        Ok(())
    }
}
