//! Time handling: origin-time normalization to UTC+8 (§4.4) and the
//! period-specifier grammar used by the validation task API (§4.6.5).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::AppError;

/// Fixed offset the system standardizes timestamps to. Stored naively (no
/// zone recorded), matching the source system's behavior.
pub const LOCAL_OFFSET_HOURS: i64 = 8;

/// Convert a message's origin time to local (UTC+8) naive time.
///
/// If `origin` carries a zone, its UTC instant is shifted by the fixed
/// offset; callers supplying an already-zoneless instant should subtract
/// nothing further (treated as already local).
pub fn to_local(origin: DateTime<Utc>) -> NaiveDateTime {
    (origin + Duration::hours(LOCAL_OFFSET_HOURS)).naive_utc()
}

/// A resolved `[start, end)` window plus the human-readable description
/// carried over from the original period-descriptor strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub description: String,
}

/// Parse the period-specifier grammar (§4.6.5) relative to `now`.
///
/// Accepted forms: `today`, `yesterday`, `week`, `month`, `year`, `YYYY`,
/// `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DD:YYYY-MM-DD`.
pub fn parse_period(period: &str, now: NaiveDateTime) -> Result<PeriodWindow, AppError> {
    let trimmed = period.trim();
    let lowered = trimmed.to_ascii_lowercase();

    let start_of_day = |dt: NaiveDateTime| dt.date().and_hms_opt(0, 0, 0).unwrap();

    match lowered.as_str() {
        "today" => {
            return Ok(PeriodWindow {
                start: start_of_day(now),
                end: now,
                description: "今天".into(),
            });
        }
        "yesterday" => {
            let yesterday = now - Duration::days(1);
            let start = start_of_day(yesterday);
            return Ok(PeriodWindow {
                start,
                end: start + Duration::days(1),
                description: "昨天".into(),
            });
        }
        "week" => {
            return Ok(PeriodWindow {
                start: now - Duration::days(7),
                end: now,
                description: "最近7天".into(),
            });
        }
        "month" => {
            return Ok(PeriodWindow {
                start: now - Duration::days(30),
                end: now,
                description: "最近30天".into(),
            });
        }
        "year" => {
            return Ok(PeriodWindow {
                start: now - Duration::days(365),
                end: now,
                description: "最近365天".into(),
            });
        }
        _ => {}
    }

    if let Some((start_str, end_str)) = trimmed.split_once(':') {
        let start = parse_day(start_str.trim())?;
        let end = parse_day(end_str.trim())? + Duration::days(1);
        return Ok(PeriodWindow {
            start,
            end,
            description: format!("{} 至 {}", start_str.trim(), end_str.trim()),
        });
    }

    if trimmed.len() == 10 && trimmed.contains('-') {
        let start = parse_day(trimmed)?;
        return Ok(PeriodWindow {
            start,
            end: start + Duration::days(1),
            description: trimmed.to_string(),
        });
    }

    if trimmed.len() == 7 && trimmed.contains('-') {
        let (year, month) = trimmed
            .split_once('-')
            .and_then(|(y, m)| Some((y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)))
            .ok_or_else(|| AppError::BadRequest(format!("invalid month period: {trimmed}")))?;
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::BadRequest(format!("invalid month period: {trimmed}")))?
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
        return Ok(PeriodWindow { start, end, description: trimmed.to_string() });
    }

    if trimmed.len() == 4 {
        let year: i32 = trimmed
            .parse()
            .map_err(|_| AppError::BadRequest(format!("invalid year period: {trimmed}")))?;
        let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        return Ok(PeriodWindow { start, end, description: trimmed.to_string() });
    }

    Err(AppError::BadRequest(format!("unrecognized period specifier: {trimmed}")))
}

fn parse_day(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap())
        .map_err(|e| AppError::BadRequest(format!("invalid date '{s}': {e}")))
}

/// Current local (UTC+8) naive time, for callers outside tests.
pub fn now_local() -> NaiveDateTime {
    to_local(Utc::now())
}

/// Format an hour boundary the way statistics aggregation needs it.
pub fn truncate_hour(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(dt.time().hour(), 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ndt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn today_spans_midnight_to_now() {
        let now = ndt("2026-07-30 15:00:00");
        let w = parse_period("today", now).unwrap();
        assert_eq!(w.start, ndt("2026-07-30 00:00:00"));
        assert_eq!(w.end, now);
    }

    #[test]
    fn yesterday_is_full_day() {
        let now = ndt("2026-07-30 15:00:00");
        let w = parse_period("yesterday", now).unwrap();
        assert_eq!(w.start, ndt("2026-07-29 00:00:00"));
        assert_eq!(w.end, ndt("2026-07-30 00:00:00"));
    }

    #[test]
    fn single_day_resolves_half_open() {
        let w = parse_period("2026-01-15", ndt("2026-07-30 00:00:00")).unwrap();
        assert_eq!(w.start, ndt("2026-01-15 00:00:00"));
        assert_eq!(w.end, ndt("2026-01-16 00:00:00"));
    }

    #[test]
    fn range_is_inclusive_both_ends() {
        let w = parse_period("2026-01-15:2026-01-20", ndt("2026-07-30 00:00:00")).unwrap();
        assert_eq!(w.start, ndt("2026-01-15 00:00:00"));
        assert_eq!(w.end, ndt("2026-01-21 00:00:00"));
    }

    #[test]
    fn month_period_crosses_year_boundary() {
        let w = parse_period("2025-12", ndt("2026-07-30 00:00:00")).unwrap();
        assert_eq!(w.start, ndt("2025-12-01 00:00:00"));
        assert_eq!(w.end, ndt("2026-01-01 00:00:00"));
    }

    #[test]
    fn year_period() {
        let w = parse_period("2024", ndt("2026-07-30 00:00:00")).unwrap();
        assert_eq!(w.start, ndt("2024-01-01 00:00:00"));
        assert_eq!(w.end, ndt("2025-01-01 00:00:00"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_period("not-a-period", ndt("2026-07-30 00:00:00")).is_err());
    }
}
