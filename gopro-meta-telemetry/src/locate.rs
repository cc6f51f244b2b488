//! Nearest-sample lookup over timestamp-ordered sequences.

use std::cmp::Ordering;

/// Maximum distance (seconds) between a sample and the query offset for the
/// sample to count as a match.
pub const TOLERANCE_SECS: f64 = 0.5;

/// Device clock ticks per second. Sample timestamps are milliseconds.
const TICKS_PER_SECOND: f64 = 1000.0;

/// A record that carries a device timestamp in milliseconds.
pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

/// Seconds elapsed between `start_time` and `timestamp`.
///
/// Negative when `timestamp` precedes the reference, which happens when a
/// stream is aligned against another stream's start. The difference is
/// taken in `i128`, so timestamps anywhere in the `i64` range are accepted.
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)] // Exact below 2^53 ms, rounded above
pub fn elapsed_seconds(timestamp: i64, start_time: i64) -> f64 {
    (i128::from(timestamp) - i128::from(start_time)) as f64 / TICKS_PER_SECOND
}

/// Find the sample closest to `target_offset` seconds after `start_time`.
///
/// `samples` must be sorted ascending by timestamp; this is not checked.
/// Unsorted input or a NaN offset gives an unspecified result but never
/// panics.
///
/// An exact match is returned immediately. Otherwise the two samples
/// bracketing the offset are compared and the closer one is returned,
/// provided it lies within [`TOLERANCE_SECS`]. When both neighbors are
/// equally close the earlier one wins.
///
/// # Returns
/// `None` for an empty slice or when no sample lies within the window.
#[must_use]
pub fn locate<T: Timestamped>(samples: &[T], start_time: i64, target_offset: f64) -> Option<&T> {
    let elapsed = |sample: &T| elapsed_seconds(sample.timestamp(), start_time);

    // Incomparable values (NaN) sort as "less" so the search still terminates
    let search = samples.binary_search_by(|sample| {
        elapsed(sample)
            .partial_cmp(&target_offset)
            .unwrap_or(Ordering::Less)
    });

    let left = match search {
        Ok(exact) => return samples.get(exact),
        Err(insertion_point) => insertion_point,
    };

    let within_window = |sample: &T| {
        let diff = (elapsed(sample) - target_offset).abs();
        (diff <= TOLERANCE_SECS).then_some(diff)
    };

    if left == 0 {
        let first = samples.first()?;
        return within_window(first).map(|_| first);
    }
    if left >= samples.len() {
        let last = samples.last()?;
        return within_window(last).map(|_| last);
    }

    let prev = &samples[left - 1];
    let next = &samples[left];

    match (within_window(prev), within_window(next)) {
        (Some(prev_diff), Some(next_diff)) => {
            if prev_diff <= next_diff {
                Some(prev)
            } else {
                Some(next)
            }
        }
        (Some(_), None) => Some(prev),
        (None, Some(_)) => Some(next),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tick {
        timestamp: i64,
        id: u32,
    }

    impl Timestamped for Tick {
        fn timestamp(&self) -> i64 {
            self.timestamp
        }
    }

    fn ticks(timestamps: &[i64]) -> Vec<Tick> {
        timestamps
            .iter()
            .zip(0..)
            .map(|(&timestamp, id)| Tick { timestamp, id })
            .collect()
    }

    #[test]
    fn test_empty_sequence() {
        let samples: Vec<Tick> = Vec::new();
        assert_eq!(locate(&samples, 0, 0.0), None);
        assert_eq!(locate(&samples, 1234, 99.0), None);
    }

    #[test]
    fn test_exact_match() {
        let samples = ticks(&[1000, 2000, 3000, 4000]);
        assert_eq!(locate(&samples, 1000, 2.0).map(|t| t.id), Some(2));
        assert_eq!(locate(&samples, 1000, 0.0).map(|t| t.id), Some(0));
        assert_eq!(locate(&samples, 1000, 3.0).map(|t| t.id), Some(3));
    }

    #[test]
    fn test_nearest_within_window() {
        let samples = ticks(&[1000, 2000, 3000]);
        // Elapsed 1.0s is 0.1s away
        let found = locate(&samples, 1000, 1.1).expect("within window");
        assert_eq!(found.timestamp, 2000);

        // Elapsed 2.0s is 0.3s away, 1.0s is 0.7s away
        let found = locate(&samples, 1000, 1.7).expect("within window");
        assert_eq!(found.timestamp, 3000);
    }

    #[test]
    fn test_beyond_last_sample() {
        let samples = ticks(&[1000, 2000, 3000]);
        assert_eq!(locate(&samples, 1000, 5.0), None);
        // Just inside the window past the last sample
        assert_eq!(locate(&samples, 1000, 2.4).map(|t| t.id), Some(2));
    }

    #[test]
    fn test_before_first_sample() {
        let samples = ticks(&[1000, 2000]);
        // Reference earlier than the first sample: first sample sits at 0.3s
        assert_eq!(locate(&samples, 700, 0.0).map(|t| t.id), Some(0));
        // First sample at 0.8s, too far from 0.0
        assert_eq!(locate(&samples, 200, 0.0), None);
    }

    #[test]
    fn test_gap_between_samples() {
        // 1.5s of nothing between the samples
        let samples = ticks(&[0, 3000]);
        assert_eq!(locate(&samples, 0, 1.5), None);
        assert_eq!(locate(&samples, 0, 0.5).map(|t| t.id), Some(0));
        assert_eq!(locate(&samples, 0, 2.5).map(|t| t.id), Some(1));
    }

    #[test]
    fn test_tie_prefers_earlier_sample() {
        let samples = ticks(&[1000, 2000]);
        // 0.5s is exactly 0.5s from both samples
        assert_eq!(locate(&samples, 1000, 0.5).map(|t| t.id), Some(0));

        let samples = ticks(&[0, 500]);
        assert_eq!(locate(&samples, 0, 0.25).map(|t| t.id), Some(0));
    }

    #[test]
    fn test_single_sample_window_edges() {
        let samples = ticks(&[5000]);
        assert_eq!(locate(&samples, 5000, 0.6), None);
        assert_eq!(locate(&samples, 5000, 0.4).map(|t| t.id), Some(0));
        assert_eq!(locate(&samples, 5000, -0.4).map(|t| t.id), Some(0));
        // The window is inclusive
        assert_eq!(locate(&samples, 5000, 0.5).map(|t| t.id), Some(0));
    }

    #[test]
    fn test_duplicate_timestamps() {
        let samples = ticks(&[1000, 2000, 2000, 3000]);
        let found = locate(&samples, 1000, 1.05).expect("within window");
        assert_eq!(found.timestamp, 2000);
    }

    #[test]
    fn test_nan_offset_does_not_panic() {
        let samples = ticks(&[1000, 2000, 3000]);
        assert_eq!(locate(&samples, 1000, f64::NAN), None);
    }

    #[test]
    fn test_unsorted_input_does_not_panic() {
        let samples = ticks(&[3000, 1000, 2000, 500]);
        let found = locate(&samples, 0, 1.0);
        if let Some(tick) = found {
            assert!((elapsed_seconds(tick.timestamp, 0) - 1.0).abs() <= TOLERANCE_SECS);
        }
    }

    #[test]
    fn test_result_always_within_window() {
        let samples = ticks(&[0, 250, 900, 2200, 2300, 4000, 7000]);
        let mut offset = -1.0;
        while offset < 8.0 {
            match locate(&samples, 0, offset) {
                Some(tick) => {
                    let diff = (elapsed_seconds(tick.timestamp, 0) - offset).abs();
                    assert!(diff <= TOLERANCE_SECS, "offset {offset}: diff {diff}");
                    // No other sample may be strictly closer
                    for other in &samples {
                        let other_diff = (elapsed_seconds(other.timestamp, 0) - offset).abs();
                        assert!(other_diff >= diff, "offset {offset}: {other:?} is closer");
                    }
                }
                None => {
                    assert!(samples.iter().all(|tick| {
                        (elapsed_seconds(tick.timestamp, 0) - offset).abs() > TOLERANCE_SECS
                    }));
                }
            }
            offset += 0.05;
        }
    }

    #[test]
    fn test_repeat_queries_are_stable() {
        let samples = ticks(&[1000, 1400, 1800]);
        let first = locate(&samples, 1000, 0.6);
        let second = locate(&samples, 1000, 0.6);
        assert_eq!(first, second);
        assert_eq!(samples, ticks(&[1000, 1400, 1800]));
    }

    #[test]
    fn test_elapsed_seconds() {
        assert!((elapsed_seconds(2500, 1000) - 1.5).abs() < f64::EPSILON);
        assert!((elapsed_seconds(500, 1000) + 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let far = elapsed_seconds(i64::MAX, i64::MIN);
        assert!(far.is_finite() && far > 0.0);
        let back = elapsed_seconds(i64::MIN, i64::MAX);
        assert!(back.is_finite() && back < 0.0);

        let samples = ticks(&[i64::MAX]);
        assert_eq!(locate(&samples, -1, 0.0), None);
        let samples = ticks(&[i64::MIN, 0]);
        assert_eq!(locate(&samples, i64::MAX, 0.0), None);
        assert_eq!(locate(&samples, 0, 0.0).map(|t| t.id), Some(1));
    }
}
