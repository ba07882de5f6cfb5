//! Timestamp normalisation, duration/price arithmetic and weekday
//! materialisation. Everything here is pure; callers pass `now` explicitly.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tutorme_shared::Timestamp;

use crate::{CoreError, CoreResult};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Half-open `[start, end)` window on the absolute timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn from_timestamps(start: &Timestamp, end: &Timestamp) -> Self {
        Self::new(to_date(start), to_date(end))
    }
}

pub fn to_date(ts: &Timestamp) -> DateTime<Utc> {
    ts.to_date()
}

pub fn to_millis(ts: &Timestamp) -> i64 {
    ts.to_millis()
}

pub fn duration_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Price of a window at an hourly rate, rounded to the nearest whole unit
/// (halves round up).
pub fn slot_price(hourly_rate: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    (hourly_rate * duration_hours(start, end)).round() as i32
}

/// Accepts full English weekday names ("Monday") and the usual
/// three-letter abbreviations, case-insensitively.
pub fn parse_weekday(name: &str) -> CoreResult<Weekday> {
    name.trim()
        .parse::<Weekday>()
        .map_err(|_| CoreError::ValidationError(format!("Invalid day name: {}", name)))
}

/// Parses a 24h `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| CoreError::ValidationError(format!("Invalid time of day: {}", value)))
}

/// Next calendar date, counted from `now`'s local date, that falls on
/// `weekday`. Today counts when it matches, whatever the time of day.
pub fn next_occurrence<Tz: TimeZone>(weekday: Weekday, now: &DateTime<Tz>) -> NaiveDate {
    let today = now.date_naive();
    let diff = (i64::from(weekday.num_days_from_sunday())
        - i64::from(today.weekday().num_days_from_sunday()))
    .rem_euclid(7);
    today + Duration::days(diff)
}

/// Turns a local date plus two local times into an absolute window.
pub fn materialize<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> CoreResult<TimeWindow> {
    let resolve = |time: NaiveTime| {
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| CoreError::ValidationError(format!("{} {} does not exist locally", date, time)))
    };

    let window = TimeWindow::new(resolve(start)?, resolve(end)?);
    if window.end <= window.start {
        return Err(CoreError::ValidationError("End time must be after start time".to_string()));
    }
    Ok(window)
}

/// Short label used next to slots in lists, e.g. `Mon 2 Mar`.
pub fn slot_day_label<Tz: TimeZone>(ts: &Timestamp, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.to_date().with_timezone(tz).format("%a %-d %b").to_string()
}

/// True once `start` is `threshold_minutes` away or less (or already past).
pub fn within_lead_time(start: DateTime<Utc>, now: DateTime<Utc>, threshold_minutes: i64) -> bool {
    start - now <= Duration::minutes(threshold_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // March 2026: the 2nd is a Monday, the 4th a Wednesday.
        Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_duration_hours() {
        assert_eq!(duration_hours(at(2, 10, 0), at(2, 12, 0)), 2.0);
        assert_eq!(duration_hours(at(2, 10, 0), at(2, 10, 30)), 0.5);
    }

    #[test]
    fn test_slot_price_rounding() {
        assert_eq!(slot_price(30.0, at(2, 10, 0), at(2, 12, 0)), 60);
        assert_eq!(slot_price(30.0, at(2, 10, 0), at(2, 11, 30)), 45);
        // 80 minutes at 30/h is 40 exactly; 25/h for 90 minutes sits on a half.
        assert_eq!(slot_price(30.0, at(2, 10, 0), at(2, 11, 20)), 40);
        assert_eq!(slot_price(25.0, at(2, 10, 0), at(2, 11, 30)), 38);
        assert_eq!(slot_price(10.0, at(2, 10, 0), at(2, 10, 20)), 3);
    }

    #[test]
    fn test_next_occurrence_later_in_week() {
        let wednesday = at(4, 9, 0);
        assert_eq!(next_occurrence(Weekday::Mon, &wednesday), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        assert_eq!(next_occurrence(Weekday::Fri, &wednesday), NaiveDate::from_ymd_opt(2026, 3, 6).unwrap());
    }

    #[test]
    fn test_next_occurrence_same_day_resolves_to_today() {
        let monday_early = at(2, 3, 0);
        let monday_late = at(2, 23, 0);
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        assert_eq!(next_occurrence(Weekday::Mon, &monday_early), today);
        assert_eq!(next_occurrence(Weekday::Mon, &monday_late), today);
    }

    #[test]
    fn test_next_occurrence_uses_local_calendar() {
        // 23:30 UTC Sunday is already Monday in UTC+5.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let pkt = FixedOffset::east_opt(5 * 3600).unwrap();

        assert_eq!(next_occurrence(Weekday::Mon, &now), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(
            next_occurrence(Weekday::Mon, &now.with_timezone(&pkt)),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        assert_eq!(
            next_occurrence(Weekday::Sun, &now.with_timezone(&pkt)),
            NaiveDate::from_ymd_opt(2026, 3, 8).unwrap()
        );
    }

    #[test]
    fn test_materialize_applies_offset() {
        let pkt = FixedOffset::east_opt(5 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let window = materialize(
            &pkt,
            date,
            parse_time_of_day("10:00").unwrap(),
            parse_time_of_day("11:30").unwrap(),
        )
        .unwrap();

        assert_eq!(window.start, at(2, 5, 0));
        assert_eq!(window.end, at(2, 6, 30));
    }

    #[test]
    fn test_materialize_rejects_inverted_window() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let result = materialize(
            &Utc,
            date,
            parse_time_of_day("12:00").unwrap(),
            parse_time_of_day("12:00").unwrap(),
        );
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_parsers() {
        assert_eq!(parse_weekday("Monday").unwrap(), Weekday::Mon);
        assert_eq!(parse_weekday("sunday").unwrap(), Weekday::Sun);
        assert!(parse_weekday("Someday").is_err());
        assert_eq!(parse_time_of_day("09:30").unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert!(parse_time_of_day("9h30").is_err());
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn test_slot_day_label() {
        let ts = Timestamp::from_date(at(2, 10, 0));
        assert_eq!(slot_day_label(&ts, &Utc), "Mon 2 Mar");
    }

    #[test]
    fn test_within_lead_time() {
        let now = at(2, 10, 0);
        assert!(within_lead_time(at(2, 10, 15), now, 15));
        assert!(within_lead_time(at(2, 9, 0), now, 15));
        assert!(!within_lead_time(at(2, 10, 16), now, 15));
    }
}
