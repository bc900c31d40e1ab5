use chrono::{DateTime, Datelike, Utc};

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

/// Whole calendar months crossed between `last` and `now`, ignoring the
/// day-of-month. A result >= 1 means a monthly refresh is due.
pub fn months_elapsed(last: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    (now.year() - last.year()) * 12 + (now.month() as i32 - last.month() as i32)
}

/// Fractional days between two instants, from the millisecond delta.
pub fn days_elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - start).num_milliseconds() as f64 / MS_PER_DAY
}

/// Whole days left in a window that opened at `start`, floored and clamped
/// to zero once the window has passed.
pub fn whole_days_remaining(start: DateTime<Utc>, window_days: i64, now: DateTime<Utc>) -> i64 {
    let remaining = (window_days as f64 - days_elapsed(start, now)).floor() as i64;
    remaining.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn months_elapsed_ignores_day_of_month() {
        // Jan 31st to Feb 1st is still one crossed boundary.
        assert_eq!(months_elapsed(at(2024, 1, 31, 0), at(2024, 2, 1, 0)), 1);
        assert_eq!(months_elapsed(at(2024, 2, 1, 0), at(2024, 2, 28, 0)), 0);
    }

    #[test]
    fn months_elapsed_spans_year_boundaries() {
        assert_eq!(months_elapsed(at(2023, 11, 15, 0), at(2024, 1, 2, 0)), 2);
        assert_eq!(months_elapsed(at(2023, 12, 1, 0), at(2024, 12, 1, 0)), 12);
    }

    #[test]
    fn days_elapsed_is_fractional() {
        let start = at(2024, 3, 1, 0);
        assert_eq!(days_elapsed(start, at(2024, 3, 1, 12)), 0.5);
        assert_eq!(days_elapsed(start, at(2024, 3, 8, 0)), 7.0);
    }

    #[test]
    fn whole_days_remaining_clamps_at_zero() {
        let start = at(2024, 3, 1, 0);
        assert_eq!(whole_days_remaining(start, 7, at(2024, 3, 2, 12)), 5);
        assert_eq!(whole_days_remaining(start, 7, at(2024, 3, 20, 0)), 0);
    }
}
