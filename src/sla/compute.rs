//! Wall-clock and business-hours metric computation

use chrono::{DateTime, Datelike, TimeZone, Utc};

use super::{HolidayCalendar, OfficeHoursConfig, SlaConfig, SlaTarget};
use crate::error::Result;
use crate::models::Chat;

/// Computed SLA metrics for a single chat, both wall-clock and
/// business-hours, against the resolved target. A `None` metric means its
/// anchor timestamps weren't both present, or the interval was negative
/// (bad data), per `spec.md` §4.6.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSlaMetrics {
    pub target: SlaTarget,
    pub pickup_seconds: Option<i64>,
    pub business_pickup_seconds: Option<i64>,
    pub first_response_seconds: Option<i64>,
    pub business_first_response_seconds: Option<i64>,
    pub avg_response_seconds: Option<i64>,
    pub business_avg_response_seconds: Option<i64>,
    pub resolution_seconds: Option<i64>,
    pub business_resolution_seconds: Option<i64>,
    pub pickup_met: Option<bool>,
    pub first_response_met: Option<bool>,
    pub avg_response_met: Option<bool>,
    pub resolution_met: Option<bool>,
}

impl ChatSlaMetrics {
    /// `true` iff every defined per-metric flag is `true`; `None` if none
    /// of the metrics were computable.
    pub fn overall_met(&self) -> Option<bool> {
        let flags: Vec<bool> = [
            self.pickup_met,
            self.first_response_met,
            self.avg_response_met,
            self.resolution_met,
        ]
        .into_iter()
        .flatten()
        .collect();

        if flags.is_empty() {
            None
        } else {
            Some(flags.into_iter().all(|met| met))
        }
    }
}

/// An ordered message used only for the average-response-time metric:
/// the timestamp and whether it came from the customer.
#[derive(Debug, Clone, Copy)]
pub struct MessageTiming {
    pub incoming: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct SlaCalculator {
    config: SlaConfig,
    office_hours: OfficeHoursConfig,
    calendar: Box<dyn HolidayCalendar>,
}

impl SlaCalculator {
    pub fn new(config: SlaConfig, office_hours: OfficeHoursConfig, calendar: Box<dyn HolidayCalendar>) -> Self {
        Self {
            config,
            office_hours,
            calendar,
        }
    }

    pub fn compute(&self, chat: &Chat, messages: &[MessageTiming], priority: Option<&str>) -> Result<ChatSlaMetrics> {
        let target = self.config.target_for(chat.provider.as_str(), priority);

        let pickup_seconds = self.interval(chat.opened_at, chat.picked_up_at)?;
        let first_response_seconds = self.interval(chat.opened_at, chat.response_at)?;
        let resolution_seconds = self.interval(chat.opened_at, chat.closed_at)?;

        let business_pickup_seconds = self.business_interval(chat.opened_at, chat.picked_up_at)?;
        let business_first_response_seconds = self.business_interval(chat.opened_at, chat.response_at)?;
        let business_resolution_seconds = self.business_interval(chat.opened_at, chat.closed_at)?;

        let (avg_response_seconds, business_avg_response_seconds) = self.avg_response(messages)?;

        let pickup_met = pickup_seconds.map(|s| s <= target.pickup_target_seconds);
        let first_response_met = first_response_seconds.map(|s| s <= target.first_response_target_seconds);
        let avg_response_met = avg_response_seconds.map(|s| s <= target.avg_response_target_seconds);
        let resolution_met = resolution_seconds.map(|s| s <= target.resolution_target_seconds);

        Ok(ChatSlaMetrics {
            target,
            pickup_seconds,
            business_pickup_seconds,
            first_response_seconds,
            business_first_response_seconds,
            avg_response_seconds,
            business_avg_response_seconds,
            resolution_seconds,
            business_resolution_seconds,
            pickup_met,
            first_response_met,
            avg_response_met,
            resolution_met,
        })
    }

    /// Wall-clock seconds between two optional anchors. Negative intervals
    /// (bad data) are treated as null, per `spec.md` §4.6.
    fn interval(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Option<i64>> {
        match (from, to) {
            (Some(from), Some(to)) => {
                let seconds = (to - from).num_seconds();
                Ok((seconds >= 0).then_some(seconds))
            }
            _ => Ok(None),
        }
    }

    fn business_interval(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Option<i64>> {
        match (from, to) {
            (Some(from), Some(to)) if to >= from => Ok(Some(self.business_seconds_between(from, to)?)),
            _ => Ok(None),
        }
    }

    /// Mean over adjacent `(customer message -> next agent message)` pairs.
    fn avg_response(&self, messages: &[MessageTiming]) -> Result<(Option<i64>, Option<i64>)> {
        let mut wall_samples = Vec::new();
        let mut business_samples = Vec::new();

        for window in messages.windows(2) {
            let (first, second) = (window[0], window[1]);
            if first.incoming && !second.incoming && second.timestamp >= first.timestamp {
                wall_samples.push((second.timestamp - first.timestamp).num_seconds());
                business_samples.push(self.business_seconds_between(first.timestamp, second.timestamp)?);
            }
        }

        let wall_avg = (!wall_samples.is_empty())
            .then(|| wall_samples.iter().sum::<i64>() / wall_samples.len() as i64);
        let business_avg = (!business_samples.is_empty())
            .then(|| business_samples.iter().sum::<i64>() / business_samples.len() as i64);

        Ok((wall_avg, business_avg))
    }

    /// Sum the seconds of `[start, end]` that fall inside configured office
    /// hours on working, non-holiday days. Walks day by day; fine for chat
    /// durations, which rarely span more than a handful of days.
    fn business_seconds_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        if end <= start {
            return Ok(0);
        }
        let tz = self.office_hours.tz()?;
        let local_start = start.with_timezone(&tz);
        let local_end = end.with_timezone(&tz);

        let mut total = 0i64;
        let mut day = local_start.date_naive();
        let last_day = local_end.date_naive();

        loop {
            if self.office_hours.is_working_day(day) && !self.calendar.is_holiday(day) {
                let window_start = tz
                    .with_ymd_and_hms(
                        day.year(),
                        day.month(),
                        day.day(),
                        self.office_hours.start_hour,
                        self.office_hours.start_minute,
                        0,
                    )
                    .single()
                    .ok_or_else(|| crate::error::Error::Computation("ambiguous office-hours start".to_string()))?;
                let window_end = tz
                    .with_ymd_and_hms(
                        day.year(),
                        day.month(),
                        day.day(),
                        self.office_hours.end_hour,
                        self.office_hours.end_minute,
                        0,
                    )
                    .single()
                    .ok_or_else(|| crate::error::Error::Computation("ambiguous office-hours end".to_string()))?;

                let overlap_start = local_start.max(window_start);
                let overlap_end = local_end.min(window_end);
                if overlap_end > overlap_start {
                    total += (overlap_end - overlap_start).num_seconds();
                }
            }

            if day >= last_day {
                break;
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatDirection, ChatProvider};
    use crate::sla::StaticHolidayCalendar;
    use chrono::Duration;

    fn calc() -> SlaCalculator {
        SlaCalculator::new(
            SlaConfig::default(),
            OfficeHoursConfig::default(),
            Box::new(StaticHolidayCalendar::default()),
        )
    }

    fn base_chat(created: DateTime<Utc>) -> Chat {
        let mut chat = Chat::new("u1".to_string(), ChatProvider::Whatsapp, ChatDirection::Incoming, created);
        chat.opened_at = Some(created);
        chat
    }

    #[test]
    fn scenario_s4_sla_compliance_flags() {
        let opened = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let mut chat = base_chat(opened);
        chat.picked_up_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 1, 0).unwrap());
        chat.response_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 3, 0).unwrap());
        chat.closed_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap());

        let config = SlaConfig {
            base: SlaTarget {
                pickup_target_seconds: 120,
                first_response_target_seconds: 300,
                avg_response_target_seconds: 600,
                resolution_target_seconds: 7200,
                compliance_pct_target: 95.0,
            },
            overrides: vec![],
        };
        let calc = SlaCalculator::new(config, OfficeHoursConfig::default(), Box::new(StaticHolidayCalendar::default()));

        let metrics = calc.compute(&chat, &[], None).unwrap();
        assert_eq!(metrics.pickup_seconds, Some(60));
        assert_eq!(metrics.pickup_met, Some(true));
        assert_eq!(metrics.first_response_seconds, Some(180));
        assert_eq!(metrics.first_response_met, Some(true));
        assert_eq!(metrics.resolution_seconds, Some(3600));
        assert_eq!(metrics.resolution_met, Some(true));
        assert_eq!(metrics.overall_met(), Some(true));
    }

    #[test]
    fn business_hours_exclude_overnight_gap() {
        let calc = calc();
        // Monday 17:30 to Tuesday 09:30: only 30 min Monday + 30 min Tuesday count.
        let opened = Utc.with_ymd_and_hms(2026, 3, 2, 17, 30, 0).unwrap();
        let mut chat = base_chat(opened);
        chat.response_at = Some(Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap());

        let metrics = calc.compute(&chat, &[], None).unwrap();
        assert_eq!(metrics.business_first_response_seconds, Some(3600));
    }

    #[test]
    fn business_hours_skip_weekend_and_holiday() {
        // Friday 16:30 -> Monday 10:30, per scenario S5.
        let config = SlaConfig::default();
        let office_hours = OfficeHoursConfig::default();
        let cal = SlaCalculator::new(config, office_hours, Box::new(StaticHolidayCalendar::default()));

        let opened = Utc.with_ymd_and_hms(2026, 2, 27, 16, 30, 0).unwrap(); // Friday
        let mut chat = base_chat(opened);
        chat.closed_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap()); // Monday

        let metrics = cal.compute(&chat, &[], None).unwrap();
        // 30 min Friday + 1.5h Monday = 2h
        assert_eq!(metrics.business_resolution_seconds, Some(2 * 3600));
        assert!(metrics.resolution_seconds.unwrap() > 60 * 3600);
    }

    #[test]
    fn negative_interval_is_null() {
        let calc = calc();
        let opened = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let mut chat = base_chat(opened);
        chat.closed_at = Some(opened - Duration::minutes(5));

        let metrics = calc.compute(&chat, &[], None).unwrap();
        assert_eq!(metrics.resolution_seconds, None);
        assert_eq!(metrics.resolution_met, None);
    }

    #[test]
    fn avg_response_time_averages_customer_to_agent_gaps() {
        let calc = calc();
        let opened = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let chat = base_chat(opened);

        let messages = vec![
            MessageTiming { incoming: true, timestamp: opened },
            MessageTiming { incoming: false, timestamp: opened + Duration::seconds(60) },
            MessageTiming { incoming: true, timestamp: opened + Duration::seconds(120) },
            MessageTiming { incoming: false, timestamp: opened + Duration::seconds(240) },
        ];

        let metrics = calc.compute(&chat, &messages, None).unwrap();
        assert_eq!(metrics.avg_response_seconds, Some((60 + 120) / 2));
    }

    #[test]
    fn override_target_applies_for_matching_provider() {
        let mut config = SlaConfig::default();
        config.overrides.push(crate::sla::SlaOverride {
            provider: Some("telegram".to_string()),
            priority: None,
            target: SlaTarget {
                first_response_target_seconds: 60,
                ..SlaTarget::default()
            },
        });
        let calc = SlaCalculator::new(config, OfficeHoursConfig::default(), Box::new(StaticHolidayCalendar::default()));

        let opened = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut chat = Chat::new("u1".to_string(), ChatProvider::Telegram, ChatDirection::Incoming, opened);
        chat.opened_at = Some(opened);
        chat.response_at = Some(opened + Duration::minutes(10));

        let metrics = calc.compute(&chat, &[], None).unwrap();
        assert_eq!(metrics.target.first_response_target_seconds, 60);
        assert_eq!(metrics.first_response_met, Some(false));
    }
}
