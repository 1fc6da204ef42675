use std::time::Instant;

/// Makes a time value safe to compare with.
/// Non-finite and negative values become zero.
pub fn sanitize_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0. {
        value
    } else {
        0.
    }
}

/// Returns the seconds elapsed from `earlier` to `later`, or zero if `later` is before `earlier`.
pub fn seconds_between(earlier: Instant, later: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_sanitize_seconds() {
        assert_eq!(sanitize_seconds(12.5), 12.5);
        assert_eq!(sanitize_seconds(f64::NAN), 0.);
        assert_eq!(sanitize_seconds(f64::INFINITY), 0.);
        assert_eq!(sanitize_seconds(f64::NEG_INFINITY), 0.);
        assert_eq!(sanitize_seconds(-3.), 0.);
    }

    #[test]
    fn test_seconds_between() {
        let start = Instant::now();
        let later = start + Duration::from_millis(1500);

        assert_eq!(seconds_between(start, later), 1.5);
        assert_eq!(seconds_between(later, start), 0., "backwards is zero");
    }
}
