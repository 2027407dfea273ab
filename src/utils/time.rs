use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use now::DateTimeNow;

/// This is the standard way of converting a date to a string in liftlog.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses names produced by [date_to_record_name].
pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// The calendar day a moment falls on in the reference timezone. Every date key in the
/// application goes through here so sessions and dashboards never disagree on day boundaries.
pub fn calendar_day(moment: DateTime<Utc>, reference: &FixedOffset) -> NaiveDate {
    moment.with_timezone(reference).date_naive()
}

/// First and last calendar day of the month containing `moment` in the reference timezone.
pub fn month_bounds(moment: DateTime<Utc>, reference: &FixedOffset) -> (NaiveDate, NaiveDate) {
    let local = moment.with_timezone(reference);
    (
        local.beginning_of_month().date_naive(),
        local.end_of_month().date_naive(),
    )
}

/// Same moment shifted into the previous month. Day of month is clamped by using the first day.
pub fn previous_month(moment: DateTime<Utc>, reference: &FixedOffset) -> DateTime<Utc> {
    let start = moment.with_timezone(reference).beginning_of_month();
    (start - Duration::days(1)).to_utc()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

    use super::{calendar_day, month_bounds, previous_month};

    #[test]
    fn calendar_day_respects_offset() {
        let moment = Utc.with_ymd_and_hms(2024, 3, 31, 23, 30, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();

        assert_eq!(
            calendar_day(moment, &utc),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
        );
        assert_eq!(
            calendar_day(moment, &plus_two),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
        );
    }

    #[test]
    fn month_bounds_leap_february() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let moment = Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap();
        let (start, end) = month_bounds(moment, &utc);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (start, end) = month_bounds(previous_month(moment, &utc), &utc);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn previous_month_crosses_year() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let moment = Utc.with_ymd_and_hms(2025, 1, 31, 8, 0, 0).unwrap();
        let (start, end) = month_bounds(previous_month(moment, &utc), &utc);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }
}
