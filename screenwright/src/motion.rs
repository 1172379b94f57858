//! Humanized pointer motion.
//!
//! Naive linear constant-speed movement is trivially distinguishable from a
//! person by the remote service's anti-automation heuristics, so every move
//! follows a fresh randomized curve: jittered target, quadratic Bézier
//! through a displaced control point, smoothstep speed profile, and
//! distance-scaled total duration.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::instrument;

use crate::backend::InputBackend;
use crate::errors::AutomationError;
use crate::types::Point;

/// Maximum distance between the requested target and the point actually
/// clicked, per axis.
pub const TARGET_JITTER: i32 = 3;
/// Maximum control-point displacement from the midpoint, per axis.
pub const CONTROL_OFFSET: i32 = 30;
pub const MIN_STEPS: usize = 15;
pub const MAX_STEPS: usize = 25;

/// A call-scoped pointer trajectory: intermediate coordinates plus the
/// total replay duration. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPath {
    pub points: Vec<Point>,
    pub total: Duration,
}

impl MotionPath {
    /// The delay to sleep after emitting each point.
    pub fn step_delay(&self) -> Duration {
        self.total / self.points.len().max(1) as u32
    }
}

/// Plans a curved path from `from` to (a jittered copy of) `to`.
///
/// Total duration is `min(0.3 + distance / 1000, 1.0)` seconds; the path
/// has 15 to 25 steps eased by `t' = t^2 (3 - 2t)`.
pub fn plan_path<R: Rng>(from: Point, to: Point, rng: &mut R) -> MotionPath {
    let target = Point::new(
        to.x + rng.gen_range(-TARGET_JITTER..=TARGET_JITTER),
        to.y + rng.gen_range(-TARGET_JITTER..=TARGET_JITTER),
    );

    let distance = from.distance_to(target);
    let total = Duration::from_secs_f64((0.3 + distance / 1000.0).min(1.0));

    let ctrl = Point::new(
        (from.x + target.x) / 2 + rng.gen_range(-CONTROL_OFFSET..=CONTROL_OFFSET),
        (from.y + target.y) / 2 + rng.gen_range(-CONTROL_OFFSET..=CONTROL_OFFSET),
    );

    let steps = rng.gen_range(MIN_STEPS..=MAX_STEPS);
    let points = (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let t = t * t * (3.0 - 2.0 * t); // smoothstep easing
            bezier(from, ctrl, target, t)
        })
        .collect();

    MotionPath { points, total }
}

fn bezier(p0: Point, p1: Point, p2: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let x = u * u * p0.x as f64 + 2.0 * u * t * p1.x as f64 + t * t * p2.x as f64;
    let y = u * u * p0.y as f64 + 2.0 * u * t * p1.y as f64 + t * t * p2.y as f64;
    Point::new(x.round() as i32, y.round() as i32)
}

/// Replays planned paths against the input backend, with the randomized
/// micro-delays that make a click read as manual input.
#[derive(Clone)]
pub struct Pointer {
    input: Arc<dyn InputBackend>,
}

impl Pointer {
    pub(crate) fn new(input: Arc<dyn InputBackend>) -> Self {
        Self { input }
    }

    /// Moves from the live pointer position to `target` along a fresh
    /// humanized path, sleeping between steps so the whole move takes the
    /// planned duration.
    #[instrument(level = "debug", skip(self))]
    pub fn move_to(&self, target: Point) -> Result<(), AutomationError> {
        let from = self.input.pointer_location()?;
        let path = plan_path(from, target, &mut rand::thread_rng());
        let delay = path.step_delay();
        for point in &path.points {
            self.input.pointer_move(*point)?;
            thread::sleep(delay);
        }
        Ok(())
    }

    /// Optionally moves to `target` first, then presses and releases the
    /// primary button with randomized pre-click and hold delays.
    #[instrument(level = "debug", skip(self))]
    pub fn click(&self, target: Option<Point>) -> Result<(), AutomationError> {
        if let Some(target) = target {
            self.move_to(target)?;
        }
        let mut rng = rand::thread_rng();
        thread::sleep(Duration::from_secs_f64(rng.gen_range(0.1..0.3)));
        self.input.button_press()?;
        thread::sleep(Duration::from_secs_f64(rng.gen_range(0.05..0.12)));
        self.input.button_release()
    }

    /// Press-and-hold for a scripted duration.
    pub fn long_press(&self, target: Option<Point>, hold: Duration) -> Result<(), AutomationError> {
        if let Some(target) = target {
            self.move_to(target)?;
        }
        self.input.button_press()?;
        thread::sleep(hold);
        self.input.button_release()
    }

    /// Drags from `from` to `to` with the button held, interpolating
    /// linearly over `duration`. The approach leg is humanized; the drag
    /// itself is deliberately steady, the way a person drags a slider.
    pub fn drag(&self, from: Point, to: Point, duration: Duration) -> Result<(), AutomationError> {
        self.move_to(from)?;
        self.input.button_press()?;
        let steps = 20;
        let delay = duration / steps;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let x = from.x as f64 + (to.x - from.x) as f64 * t;
            let y = from.y as f64 + (to.y - from.y) as f64 * t;
            self.input
                .pointer_move(Point::new(x.round() as i32, y.round() as i32))?;
            thread::sleep(delay);
        }
        self.input.button_release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn path_starts_at_origin_and_ends_near_target() {
        let from = Point::new(100, 200);
        let to = Point::new(700, 450);
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let path = plan_path(from, to, &mut rng);
            assert_eq!(*path.points.first().unwrap(), from);
            let last = *path.points.last().unwrap();
            assert!((last.x - to.x).abs() <= TARGET_JITTER);
            assert!((last.y - to.y).abs() <= TARGET_JITTER);
        }
    }

    #[test]
    fn step_count_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let path = plan_path(Point::new(0, 0), Point::new(300, 300), &mut rng);
            let steps = path.points.len() - 1;
            assert!((MIN_STEPS..=MAX_STEPS).contains(&steps), "steps = {steps}");
        }
    }

    #[test]
    fn duration_scales_with_distance_and_caps_at_one_second() {
        let mut rng = StdRng::seed_from_u64(11);

        let short = plan_path(Point::new(0, 0), Point::new(0, 100), &mut rng);
        // 0.3 + d/1000 with d within jitter of 100.
        let secs = short.total.as_secs_f64();
        assert!((0.39..=0.41).contains(&secs), "short move took {secs}");

        let far = plan_path(Point::new(0, 0), Point::new(3000, 0), &mut rng);
        assert_eq!(far.total, Duration::from_secs(1));
    }

    #[test]
    fn path_is_randomized_between_calls() {
        let from = Point::new(10, 10);
        let to = Point::new(500, 500);
        let a = plan_path(from, to, &mut StdRng::seed_from_u64(1));
        let b = plan_path(from, to, &mut StdRng::seed_from_u64(2));
        assert_ne!(a, b, "two plans with different randomness should differ");
    }

    #[test]
    fn step_delay_covers_total_duration() {
        let mut rng = StdRng::seed_from_u64(3);
        let path = plan_path(Point::new(0, 0), Point::new(400, 0), &mut rng);
        let replay = path.step_delay() * path.points.len() as u32;
        let diff = replay.as_secs_f64() - path.total.as_secs_f64();
        // One step's granularity at most.
        assert!(diff.abs() <= path.step_delay().as_secs_f64() + 1e-9);
    }
}
