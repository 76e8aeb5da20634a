use crate::surface::Surface;
use rand::Rng;
use std::time::Duration;
use tablescroll_common::Result;
use tokio::time::sleep;

const ARC_HEIGHT_FACTOR: f64 = 0.2;

/// Waypoints along a parabolic arc from `from` to `to`.
///
/// The arc bows upward by 20% of the straight-line distance at its midpoint,
/// each waypoint carries up to ±1 px of noise, and the last waypoint is
/// exactly `to`. Coordinates never go negative.
pub fn arc_path<R: Rng + ?Sized>(
    from: (i32, i32),
    to: (i32, i32),
    steps: u32,
    rng: &mut R,
) -> Vec<(i32, i32)> {
    let steps = steps.max(1);
    let (sx, sy) = (f64::from(from.0), f64::from(from.1));
    let (dx, dy) = (f64::from(to.0) - sx, f64::from(to.1) - sy);
    let height = (dx * dx + dy * dy).sqrt() * ARC_HEIGHT_FACTOR;

    let mut points = Vec::with_capacity(steps as usize + 1);
    for i in 0..steps {
        let t = f64::from(i) / f64::from(steps);
        let lift = (-4.0 * (t - 0.5).powi(2) + 1.0) * height;
        let x = sx + dx * t + rng.gen_range(-1.0..=1.0);
        let y = sy + dy * t - lift + rng.gen_range(-1.0..=1.0);
        points.push((x.round().max(0.0) as i32, y.round().max(0.0) as i32));
    }
    points.push(to);
    points
}

/// Move the pointer along [`arc_path`], pausing 10–20 ms between waypoints.
///
/// With `steps <= 1` the pointer jumps straight to `to`.
pub async fn glide_pointer<S, R>(
    surface: &S,
    from: (i32, i32),
    to: (i32, i32),
    steps: u32,
    rng: &mut R,
) -> Result<()>
where
    S: Surface + ?Sized,
    R: Rng + Send + ?Sized,
{
    if steps <= 1 {
        return surface.move_pointer(to.0, to.1).await;
    }
    let path = arc_path(from, to, steps, rng);
    tracing::debug!(?from, ?to, waypoints = path.len(), "pointer.glide.start");
    for (x, y) in path {
        surface.move_pointer(x, y).await?;
        let pause = rng.gen_range(10..=20);
        sleep(Duration::from_millis(pause)).await;
    }
    Ok(())
}
