//! Campaign clock: local wall-clock fields in the campaign's time zone.
//!
//! Zones resolve through the IANA database compiled into `chrono-tz`, so the
//! host's tzdata does not matter. If the configured name does not resolve, the
//! configured fixed offset is used instead (no DST).

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use driverbot_core::config::CampaignConfig;

/// Time zone used for weekly campaign evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CampaignClock {
    Zone(Tz),
    Fixed(FixedOffset),
}

/// Wall-clock fields at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFields {
    /// 0 = Sunday … 6 = Saturday.
    pub weekday: u32,
    pub hour: u32,
    pub minute: u32,
    /// `YYYY-MM-DD`, the weekly watermark format.
    pub date: String,
}

impl CampaignClock {
    pub fn from_config(config: &CampaignConfig) -> Self {
        match config.timezone.trim().parse::<Tz>() {
            Ok(tz) => CampaignClock::Zone(tz),
            Err(_) => {
                let offset = parse_offset(&config.fallback_utc_offset).unwrap_or_else(|| {
                    tracing::warn!(
                        "⚠️ Invalid fallback_utc_offset '{}', using +00:00",
                        config.fallback_utc_offset
                    );
                    utc_offset()
                });
                tracing::warn!(
                    "⚠️ Unknown time zone '{}', falling back to fixed offset {}",
                    config.timezone,
                    offset
                );
                CampaignClock::Fixed(offset)
            }
        }
    }

    pub fn utc() -> Self {
        CampaignClock::Fixed(utc_offset())
    }

    pub fn local_fields(&self, now: DateTime<Utc>) -> LocalFields {
        match self {
            CampaignClock::Zone(tz) => fields(&now.with_timezone(tz)),
            CampaignClock::Fixed(offset) => fields(&now.with_timezone(offset)),
        }
    }
}

fn fields<Z: TimeZone>(local: &DateTime<Z>) -> LocalFields {
    LocalFields {
        weekday: local.weekday().num_days_from_sunday(),
        hour: local.hour(),
        minute: local.minute(),
        date: local.date_naive().format("%Y-%m-%d").to_string(),
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse `+HH:MM` / `-HH:MM` (also `+HH`).
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => (1, s),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if !(0..=14).contains(&h) || !(0..60).contains(&m) {
        return None;
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
}
