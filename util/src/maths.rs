//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Wrap an angle in radians into the range [-pi, pi).
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float
{
    let two_pi = T::from(std::f64::consts::PI * 2.0).unwrap();
    let pi = T::from(std::f64::consts::PI).unwrap();

    let mut a = angle % two_pi;
    if a >= pi {
        a = a - two_pi;
    }
    if a < -pi {
        a = a + two_pi;
    }
    a
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 1.0), (0.0, 100.0), 0.5), 50.0);
        assert_eq!(lin_map((-1.0, 1.0), (0.0, 10.0), 0.0), 5.0);
    }

    #[test]
    fn test_wrap_pi() {
        use std::f64::consts::PI;

        assert!((wrap_pi(3.0 * PI) - (-PI)).abs() < 1e-9);
        assert!((wrap_pi(-3.0 * PI) - (-PI)).abs() < 1e-9);
        assert!((wrap_pi(0.5) - 0.5).abs() < 1e-9);
        assert!((wrap_pi(PI + 0.1) - (-PI + 0.1)).abs() < 1e-9);
    }
}
