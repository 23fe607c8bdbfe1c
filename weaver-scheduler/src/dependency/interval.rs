use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Timelike, Utc};
use weaver_common::dependent::{DateInterval, DependentDateValue};

/// Expands a relative date-value selector into one or more closed
/// calendar windows, evaluated against the reference instant. Windows
/// come back in chronological order; multi-window selectors (e.g.
/// `last2Days`) produce one window per calendar unit.
pub fn expand_date_value(
    date_value: DependentDateValue,
    reference: DateTime<Utc>,
) -> Vec<DateInterval> {
    match date_value {
        DependentDateValue::CurrentHour => vec![hour_window(reference, 0)],
        DependentDateValue::Last1Hour => vec![hour_window(reference, 1)],
        DependentDateValue::Last24Hours => (1..=24).rev().map(|h| hour_window(reference, h)).collect(),
        DependentDateValue::Today => vec![day_window(reference.date_naive())],
        DependentDateValue::Last1Days => last_days(reference, 1),
        DependentDateValue::Last2Days => last_days(reference, 2),
        DependentDateValue::Last3Days => last_days(reference, 3),
        DependentDateValue::Last7Days => last_days(reference, 7),
        DependentDateValue::LastWeek => {
            let monday = last_monday(reference);
            span_window(monday, monday + Duration::days(7))
        }
        DependentDateValue::LastMonday => vec![day_window(last_monday(reference))],
        DependentDateValue::ThisMonth => {
            let start = reference.date_naive().with_day(1).unwrap_or(reference.date_naive());
            let next = start + Months::new(1);
            span_window(start, next)
        }
        DependentDateValue::LastMonth => {
            let this_month = reference.date_naive().with_day(1).unwrap_or(reference.date_naive());
            let start = this_month - Months::new(1);
            span_window(start, this_month)
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

/// One full calendar day, closed at one second before the next
/// midnight.
fn day_window(date: NaiveDate) -> DateInterval {
    let start = day_start(date);
    DateInterval::new(start, start + Duration::days(1) - Duration::seconds(1))
}

fn span_window(start: NaiveDate, end_exclusive: NaiveDate) -> Vec<DateInterval> {
    vec![DateInterval::new(
        day_start(start),
        day_start(end_exclusive) - Duration::seconds(1),
    )]
}

/// The N full days preceding the reference day, oldest first.
fn last_days(reference: DateTime<Utc>, days: i64) -> Vec<DateInterval> {
    (1..=days)
        .rev()
        .map(|d| day_window(reference.date_naive() - Duration::days(d)))
        .collect()
}

/// The full hour `hours_back` hours before the reference hour.
fn hour_window(reference: DateTime<Utc>, hours_back: i64) -> DateInterval {
    let hour_start = reference
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(reference)
        - Duration::hours(hours_back);
    DateInterval::new(hour_start, hour_start + Duration::hours(1) - Duration::seconds(1))
}

/// Monday of the previous ISO week.
fn last_monday(reference: DateTime<Utc>) -> NaiveDate {
    let today = reference.date_naive();
    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    this_monday - Duration::days(7)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    // 2024-06-12 is a Wednesday.
    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 10, 30, 45).unwrap()
    }

    #[test]
    fn last2_days_yields_two_full_day_windows() {
        let windows = expand_date_value(DependentDateValue::Last2Days, reference());
        assert_eq!(windows.len(), 2);
        assert_eq!(
            windows[0],
            DateInterval::new(
                Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap(),
            )
        );
        assert_eq!(
            windows[1],
            DateInterval::new(
                Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 11, 23, 59, 59).unwrap(),
            )
        );
    }

    #[test]
    fn today_covers_the_reference_day() {
        let windows = expand_date_value(DependentDateValue::Today, reference());
        assert_eq!(windows.len(), 1);
        assert!(windows[0].contains(reference()));
        assert!(!windows[0].contains(reference() - Duration::days(1)));
    }

    #[test]
    fn last_monday_is_the_previous_weeks_monday() {
        let windows = expand_date_value(DependentDateValue::LastMonday, reference());
        assert_eq!(
            windows[0].start,
            Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn last_week_spans_monday_through_sunday() {
        let windows = expand_date_value(DependentDateValue::LastWeek, reference());
        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows[0],
            DateInterval::new(
                Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 9, 23, 59, 59).unwrap(),
            )
        );
    }

    #[test]
    fn last_month_is_the_full_previous_month() {
        let windows = expand_date_value(DependentDateValue::LastMonth, reference());
        assert_eq!(
            windows[0],
            DateInterval::new(
                Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap(),
            )
        );
    }

    #[test]
    fn hour_windows_truncate_to_the_hour() {
        let windows = expand_date_value(DependentDateValue::Last1Hour, reference());
        assert_eq!(
            windows[0],
            DateInterval::new(
                Utc.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 12, 9, 59, 59).unwrap(),
            )
        );

        let day = expand_date_value(DependentDateValue::Last24Hours, reference());
        assert_eq!(day.len(), 24);
        assert_eq!(
            day[0].start,
            Utc.with_ymd_and_hms(2024, 6, 11, 10, 0, 0).unwrap()
        );
        assert_eq!(
            day[23].end,
            Utc.with_ymd_and_hms(2024, 6, 12, 9, 59, 59).unwrap()
        );
    }
}
