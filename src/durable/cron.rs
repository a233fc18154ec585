//! Next-fire computation for schedules, backing `ensure_schedule`.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::durable::store::DurableError;
use crate::durable::types::ScheduleType;

/// `cron` expects a 6-field expression (seconds first); a bare 5-field
/// crontab pattern gets a leading `0` so callers can write the familiar
/// minute-first form.
pub fn next_fire(kind: &ScheduleType, pattern: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, DurableError> {
    match kind {
        ScheduleType::Interval => {
            let ms: i64 = pattern
                .parse()
                .map_err(|_| DurableError::InvalidSchedulePattern(pattern.to_string(), "not a millisecond interval".to_string()))?;
            Ok(after + chrono::Duration::milliseconds(ms))
        }
        ScheduleType::Cron => {
            let normalized = normalize(pattern);
            let schedule = cron::Schedule::from_str(&normalized)
                .map_err(|e| DurableError::InvalidSchedulePattern(pattern.to_string(), e.to_string()))?;
            schedule
                .after(&after)
                .next()
                .ok_or_else(|| DurableError::InvalidSchedulePattern(pattern.to_string(), "pattern never fires again".to_string()))
        }
    }
}

fn normalize(pattern: &str) -> String {
    if pattern.split_whitespace().count() == 5 {
        format!("0 {pattern}")
    } else {
        pattern.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_adds_milliseconds() {
        let now = Utc::now();
        let next = next_fire(&ScheduleType::Interval, "60000", now).unwrap();
        assert_eq!(next, now + chrono::Duration::milliseconds(60_000));
    }

    #[test]
    fn five_field_cron_gets_normalized() {
        let now = Utc::now();
        let next = next_fire(&ScheduleType::Cron, "* * * * *", now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let now = Utc::now();
        assert!(next_fire(&ScheduleType::Cron, "not a cron", now).is_err());
    }
}
