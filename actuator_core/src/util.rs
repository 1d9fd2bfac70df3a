//! Period and clamping helpers.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Compute the period in microseconds for a given rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Clamp `value` to `[-limit, limit]`. A NaN value maps to 0.
#[inline]
pub fn clip_range(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let limit = limit.abs();
    value.clamp(-limit, limit)
}

/// Clamp to the normalized power range `[-1, 1]`.
#[inline]
pub fn clip_power(value: f64) -> f64 {
    clip_range(value, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_range_is_symmetric() {
        assert_eq!(clip_range(0.7, 0.5), 0.5);
        assert_eq!(clip_range(-0.7, -0.5), -0.5);
        assert_eq!(clip_power(f64::NAN), 0.0);
    }

    #[test]
    fn period_never_divides_by_zero() {
        assert_eq!(period_us(50), 20_000);
        assert_eq!(period_us(0), MICROS_PER_SEC);
        assert_eq!(period_us(u32::MAX), 1);
    }
}
