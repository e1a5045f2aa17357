//! Comparing timestamps by their wall-clock reading.
//!
//! Database drivers often hand back timestamps tagged with whatever offset
//! the session happened to use. These helpers ignore that tag: the reading
//! is pinned to a chosen zone before comparing.

use chrono::{DateTime, NaiveDateTime, TimeZone};

/// Whether `t` is after `u` once both wall-clock readings are placed in `zone`.
///
/// A reading that does not exist in `zone` (skipped by a DST change) is
/// compared as a plain local time. Ambiguous readings resolve to the earlier
/// instant.
pub fn is_after<A, B, Z>(t: &DateTime<A>, u: &DateTime<B>, zone: &Z) -> bool
where
    A: TimeZone,
    B: TimeZone,
    Z: TimeZone,
{
    let (t, u) = (t.naive_local(), u.naive_local());
    match (pin(t, zone), pin(u, zone)) {
        (Some(t), Some(u)) => t > u,
        _ => t > u,
    }
}

fn pin<Z: TimeZone>(naive: NaiveDateTime, zone: &Z) -> Option<DateTime<Z>> {
    zone.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, Utc};

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 8, 18)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .expect("valid time")
    }

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).expect("valid offset")
    }

    #[test]
    fn test_offsets_are_ignored() {
        // 10:00+09:00 is 01:00 UTC, earlier than 09:00 UTC as instants,
        // but reads later on the wall clock.
        let t = offset(9).from_local_datetime(&local(10, 0)).unwrap();
        let u = Utc.from_local_datetime(&local(9, 0)).unwrap();

        assert!(t.timestamp() < u.timestamp());
        assert!(is_after(&t, &u, &Utc));
        assert!(!is_after(&u, &t, &Utc));
    }

    #[test]
    fn test_equal_readings_are_not_after() {
        let t = offset(-5).from_local_datetime(&local(12, 30)).unwrap();
        let u = offset(3).from_local_datetime(&local(12, 30)).unwrap();

        assert!(!is_after(&t, &u, &offset(0)));
        assert!(!is_after(&u, &t, &offset(0)));
    }

    #[test]
    fn test_zone_choice_does_not_change_order() {
        let t = Utc.from_local_datetime(&local(8, 1)).unwrap();
        let u = Utc.from_local_datetime(&local(8, 0)).unwrap();

        for hours in [-11, 0, 5, 14] {
            assert!(is_after(&t, &u, &offset(hours)));
        }
    }
}
