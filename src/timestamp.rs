// Local wall-clock formatting used by log lines and output file names.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Formats `instant` the way the given locale writes a date and time.
///
/// The instant carries its own offset (usually `chrono::Local`), so DST is
/// resolved by the system timezone database rather than guessed.
/// Unknown locales fall back to an ISO-like `YYYY-MM-DD HH:MM:SS`.
pub fn local_timestamp<Tz>(instant: &DateTime<Tz>, locale: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    instant.format(locale_pattern(locale)).to_string()
}

/// Calendar day of `instant` as `YYYYMMDD`, used as the sortable part of file names.
pub fn date_id<Tz>(instant: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    instant.format("%Y%m%d").to_string()
}

fn locale_pattern(locale: &str) -> &'static str {
    let normalized = locale.trim().replace('_', "-").to_ascii_lowercase();
    match normalized.as_str() {
        "pl" | "pl-pl" => "%-d.%m.%Y, %H:%M:%S",
        "de" | "de-de" | "de-at" | "de-ch" => "%-d.%-m.%Y, %H:%M:%S",
        "en-us" => "%-m/%-d/%Y, %-I:%M:%S %p",
        "en" | "en-gb" | "en-ie" => "%d/%m/%Y, %H:%M:%S",
        "fr" | "fr-fr" | "it" | "it-it" | "es" | "es-es" => "%d/%m/%Y %H:%M:%S",
        _ => "%Y-%m-%d %H:%M:%S",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn sample() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 7, 9, 5, 4)
            .unwrap()
    }

    #[test]
    fn test_polish_format() {
        assert_eq!(local_timestamp(&sample(), "pl-PL"), "7.03.2026, 09:05:04");
    }

    #[test]
    fn test_us_format_uses_twelve_hour_clock() {
        assert_eq!(local_timestamp(&sample(), "en-US"), "3/7/2026, 9:05:04 AM");
    }

    #[test]
    fn test_underscore_locale_and_case_are_normalized() {
        assert_eq!(local_timestamp(&sample(), "DE_de"), "7.3.2026, 09:05:04");
    }

    #[test]
    fn test_unknown_locale_falls_back_to_iso() {
        assert_eq!(local_timestamp(&sample(), "xx-YY"), "2026-03-07 09:05:04");
    }

    #[test]
    fn test_date_id_follows_offset_of_instant() {
        // 23:30 UTC is already the next day at +02:00.
        let utc = Utc.with_ymd_and_hms(2026, 12, 31, 23, 30, 0).unwrap();
        let local = utc.with_timezone(&FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(date_id(&utc), "20261231");
        assert_eq!(date_id(&local), "20270101");
    }
}
