//! Dive time derivation and validation.
//!
//! Runs before a dive is created and before every patch-update, on the
//! merged post-write state, so the invariants hold whichever path wrote it:
//!
//! - with both `time_in` and `time_out`, `dive_time` is their difference in
//!   whole minutes;
//! - `dive_time` is never negative;
//! - `dive_time >= bottom_time + safety_stop_time` when both are present.

use crate::entities::Dive;
use crate::error::TimeWindowError;
use crate::identity::Timestamp;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Whole minutes from `time_in` to `time_out`, rounded toward negative
/// infinity so any inverted window yields a negative value.
pub fn minutes_between(time_in: Timestamp, time_out: Timestamp) -> i64 {
    let millis = time_out.signed_duration_since(time_in).num_milliseconds();
    millis.div_euclid(MILLIS_PER_MINUTE)
}

/// Derive `dive_time` and validate the window.
///
/// With only one (or neither) timestamp present, an existing `dive_time` is
/// kept as-is and still validated.
///
/// # Errors
/// `InvalidTimeWindow` when the dive time is negative, `DiveTimeExceeded`
/// when bottom plus safety stop time does not fit inside it.
pub fn process_time(dive: &mut Dive) -> Result<(), TimeWindowError> {
    if let (Some(time_in), Some(time_out)) = (dive.time_in, dive.time_out) {
        dive.dive_time = Some(minutes_between(time_in, time_out) as f64);
    }

    let Some(dive_time) = dive.dive_time else {
        return Ok(());
    };

    if dive_time < 0.0 {
        return Err(TimeWindowError::InvalidTimeWindow);
    }

    if let (Some(bottom), Some(safety_stop)) = (dive.bottom_time, dive.safety_stop_time) {
        if dive_time < bottom + safety_stop {
            return Err(TimeWindowError::DiveTimeExceeded);
        }
    }

    Ok(())
}
