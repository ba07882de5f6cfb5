use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tutorme_core::time::{self, TimeWindow};
use tutorme_core::CoreResult;

/// A tutor's "I'm free on <weekday> from HH:MM to HH:MM" input, before it
/// is pinned to a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRequest {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

impl SlotRequest {
    pub fn new(day: &str, start_time: &str, end_time: &str) -> Self {
        Self {
            day: day.to_string(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
        }
    }

    /// Materializes the request on the next occurrence of its weekday in
    /// `tz`, counted from `now`.
    pub fn resolve<Tz: TimeZone>(&self, tz: &Tz, now: &DateTime<Tz>) -> CoreResult<TimeWindow> {
        let weekday = time::parse_weekday(&self.day)?;
        let start = time::parse_time_of_day(&self.start_time)?;
        let end = time::parse_time_of_day(&self.end_time)?;
        let date = time::next_occurrence(weekday, now);
        time::materialize(tz, date, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use tutorme_core::CoreError;

    #[test]
    fn test_resolves_on_next_weekday() {
        // Wednesday 4 March 2026
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
        let window = SlotRequest::new("Monday", "10:00", "12:00").resolve(&Utc, &now).unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_resolves_in_local_calendar() {
        let tz = FixedOffset::east_opt(5 * 3600).unwrap();
        // 21:00 UTC Sunday is already Monday 02:00 at +05:00.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap().with_timezone(&tz);
        let window = SlotRequest::new("Monday", "10:00", "11:00").resolve(&tz, &now).unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 2, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap();
        for request in [
            SlotRequest::new("Funday", "10:00", "11:00"),
            SlotRequest::new("Monday", "25:00", "26:00"),
            SlotRequest::new("Monday", "11:00", "10:00"),
            SlotRequest::new("Monday", "10:00", "10:00"),
        ] {
            assert!(matches!(request.resolve(&Utc, &now), Err(CoreError::ValidationError(_))), "{:?}", request);
        }
    }
}
