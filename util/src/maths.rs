//! Utility maths functions
//!
//! The shaping curves in here map an input magnitude (usually a heading error
//! or a traversal cost) onto a bounded output, and are shared by the velocity
//! synthesis of the controller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Bounded linear ramp of the input magnitude.
///
/// Rises linearly from zero at `value = 0` and saturates at `max_height` once
/// `|value|` reaches half of `max_width`. The output is always in
/// `[0, max_height]`, the sign of the input is discarded.
pub fn lin_ramp<T>(max_height: T, max_width: T, value: T) -> T
where
    T: Float,
{
    let two = T::from(2.0).unwrap();
    let half_width = max_width / two;

    let value = value.abs();
    if value >= half_width {
        return max_height;
    }

    let incline = max_height / half_width;
    incline * value
}

/// Bell curve over a finite support width.
///
/// Peaks at `max_height` for `value = 0` and decays towards zero, vanishing
/// entirely once `|value|` exceeds half of `max_width`. The standard deviation
/// is chosen as one sixth of the width so that the support covers three sigma
/// on each side.
pub fn gauss_bell<T>(max_height: T, max_width: T, value: T) -> T
where
    T: Float,
{
    let two = T::from(2.0).unwrap();
    let six = T::from(6.0).unwrap();

    let value = value.abs();
    if value > max_width / two {
        return T::from(0.0).unwrap();
    }

    let std_dev = max_width / six;
    max_height * (-(value * value) / (two * std_dev * std_dev)).exp()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
