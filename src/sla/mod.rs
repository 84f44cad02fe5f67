//! SLA calculator (C6)
//!
//! Computes wall-clock and business-hours pickup/first-response/average-
//! response/resolution timings for a chat and flags whether each target was
//! met. The override-capable shape (`SlaConfig` with a base target plus
//! per-provider/priority overrides) subsumes the simpler single-target
//! calculator as the case where `overrides` is empty.

mod calendar;
mod compute;

pub use calendar::{DatedHoliday, HolidayCalendar, RecurringHoliday, StaticHolidayCalendar};
pub use compute::{ChatSlaMetrics, MessageTiming, SlaCalculator};

use serde::{Deserialize, Serialize};

/// A single base or overridden set of SLA targets, in seconds (percent for
/// `compliance_pct_target`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub pickup_target_seconds: i64,
    pub first_response_target_seconds: i64,
    pub avg_response_target_seconds: i64,
    pub resolution_target_seconds: i64,
    pub compliance_pct_target: f64,
}

impl Default for SlaTarget {
    fn default() -> Self {
        Self {
            pickup_target_seconds: 120,
            first_response_target_seconds: 300,
            avg_response_target_seconds: 600,
            resolution_target_seconds: 24 * 3600,
            compliance_pct_target: 95.0,
        }
    }
}

/// A target that applies when both `provider` and `priority` match, where
/// present. `None` on either field means "any".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaOverride {
    pub provider: Option<String>,
    pub priority: Option<String>,
    pub target: SlaTarget,
}

/// The SLA targets a run computes against. Empty `overrides` degenerates to
/// a single target applied uniformly, which is the common case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaConfig {
    pub base: SlaTarget,
    pub overrides: Vec<SlaOverride>,
}

impl SlaConfig {
    /// Resolve the effective target for a chat. The first matching override
    /// wins; ties are broken by declaration order.
    pub fn target_for(&self, provider: &str, priority: Option<&str>) -> SlaTarget {
        for ov in &self.overrides {
            let provider_matches = ov.provider.as_deref().map_or(true, |p| p == provider);
            let priority_matches = match (&ov.priority, priority) {
                (None, _) => true,
                (Some(p), Some(actual)) => p == actual,
                (Some(_), None) => false,
            };
            if provider_matches && priority_matches {
                return ov.target;
            }
        }
        self.base
    }
}

/// Business-hours window configuration used for the business-hours variant
/// of the pickup/response/resolution metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficeHoursConfig {
    pub timezone: String,
    /// 1 = Monday .. 7 = Sunday, matching `spec.md`'s `workingDays⊆{1..7}`.
    pub working_days: Vec<u8>,
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
}

impl Default for OfficeHoursConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            working_days: vec![1, 2, 3, 4, 5],
            start_hour: 9,
            start_minute: 0,
            end_hour: 17,
            end_minute: 0,
        }
    }
}

impl OfficeHoursConfig {
    pub fn tz(&self) -> crate::error::Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| crate::error::Error::Configuration(format!("invalid timezone: {}", self.timezone)))
    }

    /// ISO weekday number (1 = Monday .. 7 = Sunday) for a `chrono` date.
    fn iso_weekday(date: chrono::NaiveDate) -> u8 {
        use chrono::Datelike;
        date.weekday().number_from_monday() as u8
    }

    pub fn is_working_day(&self, date: chrono::NaiveDate) -> bool {
        self.working_days.contains(&Self::iso_weekday(date))
    }
}
