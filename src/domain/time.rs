//! Millisecond-of-day meeting times and their 12-hour rendering.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// How raw meeting times relate to the clock printed in the output.
///
/// The enrollment service reports times as milliseconds since midnight. One
/// historical export path shifted them back six hours before printing, the
/// other printed them as-is; [`MeetingTimePolicy::FixedOffset`] with
/// `hours: 6` reproduces the former.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeetingTimePolicy {
    /// Print the value as reported, no offset.
    #[default]
    SourceLocal,

    /// Subtract `hours` before printing, wrapping into the same day.
    FixedOffset { hours: i64 },
}

impl MeetingTimePolicy {
    fn offset_millis(self) -> i64 {
        match self {
            MeetingTimePolicy::SourceLocal => 0,
            MeetingTimePolicy::FixedOffset { hours } => hours.saturating_mul(MILLIS_PER_HOUR),
        }
    }
}

/// Render a millisecond-of-day value as `H:MM AM/PM`.
///
/// `None` and `0` both mean "no time" and yield `None`. Values outside a single
/// day wrap modulo 24 hours.
pub fn format_time(millis: Option<i64>, policy: MeetingTimePolicy) -> Option<String> {
    let millis = millis.filter(|m| *m != 0)?;
    let adjusted = millis.saturating_sub(policy.offset_millis()).rem_euclid(MILLIS_PER_DAY);
    let seconds = u32::try_from(adjusted / 1000).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)?;
    Some(time.format("%-I:%M %p").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIX_HOURS: MeetingTimePolicy = MeetingTimePolicy::FixedOffset { hours: 6 };

    #[test]
    fn test_source_local_formatting() {
        let local = MeetingTimePolicy::SourceLocal;
        assert_eq!(format_time(Some(32_400_000), local).as_deref(), Some("9:00 AM"));
        assert_eq!(format_time(Some(36_000_000), local).as_deref(), Some("10:00 AM"));
        assert_eq!(format_time(Some(47_700_000), local).as_deref(), Some("1:15 PM"));
        assert_eq!(format_time(Some(43_200_000), local).as_deref(), Some("12:00 PM"));
        assert_eq!(format_time(Some(60_000), local).as_deref(), Some("12:01 AM"));
    }

    #[test]
    fn test_zero_and_missing_mean_no_time() {
        assert_eq!(format_time(None, MeetingTimePolicy::SourceLocal), None);
        assert_eq!(format_time(Some(0), MeetingTimePolicy::SourceLocal), None);
        assert_eq!(format_time(Some(0), SIX_HOURS), None);
    }

    #[test]
    fn test_fixed_offset_wraps_before_midnight() {
        // 15:00 -> 9:00
        assert_eq!(format_time(Some(54_000_000), SIX_HOURS).as_deref(), Some("9:00 AM"));
        // 02:30 -> 20:30 the previous day
        assert_eq!(format_time(Some(9_000_000), SIX_HOURS).as_deref(), Some("8:30 PM"));
    }

    #[test]
    fn test_values_past_one_day_wrap() {
        let next_day_nine = MILLIS_PER_DAY + 32_400_000;
        assert_eq!(
            format_time(Some(next_day_nine), MeetingTimePolicy::SourceLocal).as_deref(),
            Some("9:00 AM")
        );
    }

    #[test]
    fn test_policy_serde_shape() {
        let policy: MeetingTimePolicy =
            serde_json::from_str(r#"{"kind":"fixed_offset","hours":6}"#).unwrap();
        assert_eq!(policy, SIX_HOURS);
        assert_eq!(
            serde_json::to_string(&MeetingTimePolicy::SourceLocal).unwrap(),
            r#"{"kind":"source_local"}"#
        );
    }
}
