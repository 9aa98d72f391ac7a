use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use super::models::{Measurement, Sample, StationData};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid ISO-8601 duration: {0:?}")]
pub struct DurationParseError(pub String);

const DATE_UNITS: &[(char, i64)] = &[('W', 7 * 86_400), ('D', 86_400)];
const TIME_UNITS: &[(char, i64)] = &[('H', 3_600), ('M', 60), ('S', 1)];

/// Parses the `P[nW][nD][T[nH][nM][nS]]` subset of ISO-8601 durations.
///
/// Years and months are rejected because their length depends on the
/// calendar, which makes them useless as window sizes.
pub fn parse_iso8601_duration(input: &str) -> Result<TimeDelta, DurationParseError> {
    let invalid = || DurationParseError(input.to_string());

    let rest = input.trim().strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    let (mut seconds, mut components) = parse_components(date_part, DATE_UNITS).ok_or_else(invalid)?;
    if let Some(time) = time_part {
        let (time_seconds, time_components) = parse_components(time, TIME_UNITS).ok_or_else(invalid)?;
        seconds = seconds.checked_add(time_seconds).ok_or_else(invalid)?;
        components += time_components;
    }
    if components == 0 {
        return Err(invalid());
    }

    TimeDelta::try_seconds(seconds).ok_or_else(invalid)
}

/// Returns (total seconds, number of components), or `None` on malformed input.
/// Units must appear at most once and in the order given by `units`.
fn parse_components(part: &str, units: &[(char, i64)]) -> Option<(i64, usize)> {
    let mut total: i64 = 0;
    let mut components = 0;
    let mut next_unit = 0;
    let mut digits = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return None;
        }
        let offset = units[next_unit..].iter().position(|(unit, _)| *unit == c)?;
        let factor = units[next_unit + offset].1;
        let amount: i64 = digits.parse().ok()?;
        total = total.checked_add(amount.checked_mul(factor)?)?;
        components += 1;
        next_unit += offset + 1;
        digits.clear();
    }

    if !digits.is_empty() {
        return None;
    }
    Some((total, components))
}

/// Formats a duration as ISO-8601 using days, hours, minutes and seconds.
pub fn format_iso8601_duration(duration: TimeDelta) -> String {
    let total = duration.num_seconds().max(0);
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}

/// Splits raw measurements into a reference and a prediction window.
///
/// The prediction window covers `[now - prediction, ..)`, the reference window
/// `[now - prediction - reference, now - prediction)`. Older measurements are
/// dropped. Returns `None` when either window ends up empty.
pub fn split_windows(
    mut measurements: Vec<Measurement>,
    now: DateTime<Utc>,
    reference: TimeDelta,
    prediction: TimeDelta,
) -> Option<StationData> {
    measurements.sort_by_key(|m| m.timestamp);

    let prediction_start = now - prediction;
    let reference_start = prediction_start - reference;

    let (reference, prediction): (Vec<_>, Vec<_>) = measurements
        .into_iter()
        .filter(|m| m.timestamp.with_timezone(&Utc) >= reference_start)
        .partition(|m| m.timestamp.with_timezone(&Utc) < prediction_start);

    if reference.is_empty() || prediction.is_empty() {
        return None;
    }

    Some(StationData {
        reference: Sample::new(reference),
        prediction: Sample::new(prediction),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn at(now: DateTime<Utc>, minutes_ago: i64, value: f64) -> Measurement {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        Measurement::new(
            (now - TimeDelta::minutes(minutes_ago)).with_timezone(&offset),
            value,
        )
    }

    #[test]
    fn test_parse_common_durations() {
        assert_eq!(parse_iso8601_duration("PT6H").unwrap(), TimeDelta::hours(6));
        assert_eq!(parse_iso8601_duration("PT1H").unwrap(), TimeDelta::hours(1));
        assert_eq!(
            parse_iso8601_duration("PT1H30M").unwrap(),
            TimeDelta::minutes(90)
        );
        assert_eq!(parse_iso8601_duration("P1D").unwrap(), TimeDelta::days(1));
        assert_eq!(
            parse_iso8601_duration("P1DT12H").unwrap(),
            TimeDelta::hours(36)
        );
        assert_eq!(parse_iso8601_duration("P2W").unwrap(), TimeDelta::days(14));
        assert_eq!(parse_iso8601_duration("PT45S").unwrap(), TimeDelta::seconds(45));
    }

    #[test]
    fn test_parse_rejects_malformed_durations() {
        for input in ["", "P", "PT", "6H", "PT6", "PTH", "P1Y", "P1M", "PT1M1H", "PT1H1H", "P1DT"] {
            assert!(
                parse_iso8601_duration(input).is_err(),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_iso8601_duration(TimeDelta::hours(7)), "PT7H");
        assert_eq!(format_iso8601_duration(TimeDelta::minutes(90)), "PT1H30M");
        assert_eq!(format_iso8601_duration(TimeDelta::days(1)), "P1D");
        assert_eq!(format_iso8601_duration(TimeDelta::hours(25)), "P1DT1H");
        assert_eq!(format_iso8601_duration(TimeDelta::zero()), "PT0S");
    }

    #[test]
    fn test_split_windows_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let measurements = vec![
            at(now, 5, 5.0),
            at(now, 60, 4.0),  // exactly at the prediction start
            at(now, 61, 3.0),
            at(now, 420, 2.0), // exactly at the reference start
            at(now, 421, 1.0), // too old
        ];

        let data = split_windows(measurements, now, TimeDelta::hours(6), TimeDelta::hours(1))
            .unwrap();

        let reference: Vec<_> = data.reference.iter().map(|m| m.value.unwrap()).collect();
        let prediction: Vec<_> = data.prediction.iter().map(|m| m.value.unwrap()).collect();
        assert_eq!(reference, vec![2.0, 3.0]);
        assert_eq!(prediction, vec![4.0, 5.0]);
    }

    #[test]
    fn test_split_windows_without_recent_measurements() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let measurements = vec![at(now, 120, 1.0), at(now, 180, 1.0)];

        assert!(
            split_windows(measurements, now, TimeDelta::hours(6), TimeDelta::hours(1)).is_none()
        );
        assert!(split_windows(Vec::new(), now, TimeDelta::hours(6), TimeDelta::hours(1)).is_none());
    }
}
