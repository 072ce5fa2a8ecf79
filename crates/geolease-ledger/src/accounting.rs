//! Time accountant: used seconds of a rental at any instant.

use geolease_types::Timestamp;

use crate::records::Rental;

/// Seconds of active use at `now`.
///
/// While paused the count is frozen at `last_paused_at`; it never exceeds
/// the booked duration and is floored at zero. An inactive rental reports 0.
pub fn used_seconds(rental: &Rental, now: Timestamp) -> u64 {
    if !rental.is_active {
        return 0;
    }

    let base = match (rental.is_paused, rental.last_paused_at) {
        (true, Some(paused_at)) => paused_at,
        _ => now,
    };
    let elapsed = base
        .saturating_secs_since(rental.start_time)
        .saturating_sub(rental.paused_duration);

    elapsed.min(rental.max_duration())
}

/// Booked seconds not yet used at `now`.
pub fn remaining_seconds(rental: &Rental, now: Timestamp) -> u64 {
    if !rental.is_active {
        return 0;
    }
    rental.max_duration().saturating_sub(used_seconds(rental, now))
}
