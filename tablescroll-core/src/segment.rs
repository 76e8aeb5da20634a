//! Bell-shaped decomposition of a scroll distance into segments.

use rand::Rng;
use std::f64::consts::PI;

/// Distances up to this magnitude are emitted as one segment.
pub const SINGLE_SEGMENT_LIMIT: u64 = 5;
const MIN_SEGMENTS: u64 = 3;
const MAX_SEGMENTS: u64 = 8;
const PIXELS_PER_SEGMENT: u64 = 100;
const JITTER: (f64, f64) = (0.8, 1.2);

/// Split `total` into segments with [`plan_with`] using the thread RNG.
pub fn plan(total: i64) -> Vec<i64> {
    plan_with(total, &mut rand::thread_rng())
}

/// Split `total` into an ordered run of same-signed segments summing to `total`.
///
/// The count grows with `|total|` (one segment up to 5 px, then 3 to 8).
/// Each segment is weighted by a half-sine over its position times a ±20%
/// jitter, so the middle segments are the largest. Every segment is at least
/// 1 px and the rounding remainder lands in the last segment. Zero yields an
/// empty plan.
pub fn plan_with<R: Rng + ?Sized>(total: i64, rng: &mut R) -> Vec<i64> {
    if total == 0 {
        return Vec::new();
    }
    let magnitude = total.unsigned_abs();
    if magnitude <= SINGLE_SEGMENT_LIMIT {
        return vec![total];
    }

    let count = (magnitude / PIXELS_PER_SEGMENT).clamp(MIN_SEGMENTS, MAX_SEGMENTS) as usize;
    let weights: Vec<f64> = (0..count)
        .map(|i| {
            let position = (i as f64 + 0.5) / count as f64;
            (position * PI).sin() * rng.gen_range(JITTER.0..=JITTER.1)
        })
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    let mut magnitudes = Vec::with_capacity(count);
    let mut remaining = magnitude;
    for (i, weight) in weights.iter().take(count - 1).enumerate() {
        // Leave at least 1 px for each segment still to come.
        let still_to_come = (count - 1 - i) as u64;
        let share = (weight / weight_sum * magnitude as f64).floor() as u64;
        let size = share.max(1).min(remaining - still_to_come);
        magnitudes.push(size);
        remaining -= size;
    }
    magnitudes.push(remaining);

    let sign = i128::from(total.signum());
    magnitudes
        .into_iter()
        .map(|m| (sign * i128::from(m)) as i64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn scenario_283_is_split_and_sums_exactly() {
        let mut rng = StdRng::seed_from_u64(283);
        let segments = plan_with(283, &mut rng);
        assert!(segments.len() > 1);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| *s > 0));
        assert_eq!(segments.iter().sum::<i64>(), 283);
    }

    #[test]
    fn sum_and_sign_hold_across_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        let inputs = (-1200..=1200)
            .step_by(7)
            .chain([1, -1, 5, -5, 6, -6, 99, 100, 799, 800, 5_000, -123_456]);
        for total in inputs {
            let segments = plan_with(total, &mut rng);
            assert_eq!(segments.iter().sum::<i64>(), total, "total {total}");
            assert!(
                segments.iter().all(|s| s.signum() == total.signum()),
                "sign flip in {segments:?} for {total}"
            );
        }
    }

    #[test]
    fn small_distances_are_a_single_segment() {
        let mut rng = StdRng::seed_from_u64(1);
        for total in -5..=5 {
            let segments = plan_with(total, &mut rng);
            if total == 0 {
                assert!(segments.is_empty());
            } else {
                assert_eq!(segments, vec![total]);
            }
        }
    }

    #[test]
    fn segment_count_scales_with_distance() {
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(plan_with(6, &mut rng).len(), 3);
        assert_eq!(plan_with(450, &mut rng).len(), 4);
        assert_eq!(plan_with(-650, &mut rng).len(), 6);
        assert_eq!(plan_with(10_000, &mut rng).len(), 8);
    }

    #[test]
    fn middle_segments_dominate() {
        let mut rng = StdRng::seed_from_u64(5);
        let segments = plan_with(800, &mut rng);
        let edge = segments[0].max(segments[7]);
        let middle = segments[3].min(segments[4]);
        assert!(middle > edge, "{segments:?}");
    }

    #[test]
    fn extreme_inputs_do_not_panic() {
        let mut rng = StdRng::seed_from_u64(2);
        for total in [i64::MAX, i64::MIN, i64::MIN + 1] {
            let segments = plan_with(total, &mut rng);
            assert_eq!(segments.len(), 8);
            assert!(segments.iter().all(|s| s.signum() == total.signum()));
            let sum: i128 = segments.iter().map(|s| i128::from(*s)).sum();
            assert_eq!(sum, i128::from(total));
        }
    }

    #[test]
    fn repeated_runs_differ() {
        let a = plan(2_000);
        let b = plan(2_000);
        let c = plan(2_000);
        assert!(a != b || b != c);
    }
}
