use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Regular session opens at 09:30 local exchange time, inclusive.
pub const SESSION_OPEN_MINUTE: u32 = 9 * 60 + 30;
/// Regular session ends at 16:00 local exchange time, exclusive.
pub const SESSION_CLOSE_MINUTE: u32 = 16 * 60;

/// Whether the reference exchange is in its regular session at `now`.
///
/// The result is computed once per run and passed down explicitly; it decides
/// which quote field downstream code prefers as "current price" when the
/// provider's live-price field is ambiguous or stale.
pub fn is_regular_session(now: DateTime<Utc>, tz: Tz) -> bool {
    let local = now.with_timezone(&tz);

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let minute_of_day = local.hour() * 60 + local.minute();
    (SESSION_OPEN_MINUTE..SESSION_CLOSE_MINUTE).contains(&minute_of_day)
}
