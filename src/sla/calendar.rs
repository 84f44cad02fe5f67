//! Holiday calendars consulted by the business-hours metrics

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A holiday that recurs on the same month/day every year (e.g. New Year's Day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringHoliday {
    pub month: u32,
    pub day: u32,
}

/// A one-off holiday tied to a specific year (e.g. a moved public holiday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedHoliday {
    pub date: NaiveDate,
}

/// Answers whether a given local calendar date is a non-business day.
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// A calendar backed by a fixed set of recurring and one-off dates. This is
/// the only implementation the pipeline ships; it is populated from
/// configuration rather than fetched from an external calendar service.
#[derive(Debug, Clone, Default)]
pub struct StaticHolidayCalendar {
    recurring: Vec<RecurringHoliday>,
    dated: Vec<DatedHoliday>,
}

impl StaticHolidayCalendar {
    pub fn new(recurring: Vec<RecurringHoliday>, dated: Vec<DatedHoliday>) -> Self {
        Self { recurring, dated }
    }
}

impl HolidayCalendar for StaticHolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dated.iter().any(|h| h.date == date)
            || self
                .recurring
                .iter()
                .any(|h| h.month == date.month() && h.day == date.day())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn recurring_holiday_matches_every_year() {
        let cal = StaticHolidayCalendar::new(vec![RecurringHoliday { month: 1, day: 1 }], vec![]);
        assert!(cal.is_holiday(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(cal.is_holiday(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()));
        assert!(!cal.is_holiday(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()));
    }

    #[test]
    fn dated_holiday_matches_once() {
        let moved = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let cal = StaticHolidayCalendar::new(vec![], vec![DatedHoliday { date: moved }]);
        assert!(cal.is_holiday(moved));
        assert!(!cal.is_holiday(moved.succ_opt().unwrap()));
        assert_eq!(moved.weekday().num_days_from_sunday(), 1);
    }
}
