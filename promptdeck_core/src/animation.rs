use crate::config::AnimationStrategy;
use crate::layout::Rect;
use std::time::{Duration, Instant};

pub const REFLOW_DURATION: Duration = Duration::from_millis(450);

/// CSS-style cubic bezier timing curve with fixed end points (0,0) and (1,1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

/// `cubic-bezier(.2,.8,.2,1)`
pub const REFLOW_EASING: CubicBezier = CubicBezier::new(0.2, 0.8, 0.2, 1.0);

impl CubicBezier {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn sample(a1: f32, a2: f32, t: f32) -> f32 {
        let u = 1.0 - t;
        3.0 * u * u * t * a1 + 3.0 * u * t * t * a2 + t * t * t
    }

    fn sample_x_derivative(&self, t: f32) -> f32 {
        let u = 1.0 - t;
        3.0 * u * u * self.x1 + 6.0 * u * t * (self.x2 - self.x1) + 3.0 * t * t * (1.0 - self.x2)
    }

    /// Eased progress for linear progress `x` in [0, 1].
    pub fn ease(&self, x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }

        // Newton first, bisection when the slope is too flat.
        let mut t = x;
        for _ in 0..8 {
            let err = Self::sample(self.x1, self.x2, t) - x;
            if err.abs() < 1e-5 {
                return Self::sample(self.y1, self.y2, t);
            }
            let d = self.sample_x_derivative(t);
            if d.abs() < 1e-6 {
                break;
            }
            t -= err / d;
        }

        let (mut lo, mut hi) = (0.0f32, 1.0f32);
        t = x;
        for _ in 0..32 {
            let sx = Self::sample(self.x1, self.x2, t);
            if (sx - x).abs() < 1e-5 {
                break;
            }
            if sx < x {
                lo = t;
            } else {
                hi = t;
            }
            t = (lo + hi) / 2.0;
        }
        Self::sample(self.y1, self.y2, t)
    }
}

/// Inverted transform applied at the start of a FLIP play; animates to identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub dx: f32,
    pub dy: f32,
    pub sx: f32,
    pub sy: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        dx: 0.0,
        dy: 0.0,
        sx: 1.0,
        sy: 1.0,
    };

    pub fn invert(first: &Rect, last: &Rect) -> Self {
        let ratio = |a: f32, b: f32| if b.abs() > f32::EPSILON { a / b } else { 1.0 };
        Self {
            dx: first.x - last.x,
            dy: first.y - last.y,
            sx: ratio(first.width, last.width),
            sy: ratio(first.height, last.height),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// One in-flight reflow between two layouts.
#[derive(Debug, Clone)]
pub struct Reflow {
    pub started_at: Instant,
    pub duration: Duration,
    pub before: Vec<Rect>,
    pub after: Vec<Rect>,
    /// Empty for the native strategy.
    pub transforms: Vec<Transform>,
    interpolate: bool,
}

impl Reflow {
    pub fn ends_at(&self) -> Instant {
        self.started_at + self.duration
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now >= self.ends_at()
    }

    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Card rectangles to draw at `now`.
    pub fn frame(&self, now: Instant) -> Vec<Rect> {
        let p = self.progress(now);
        if !self.interpolate {
            return if p >= 1.0 {
                self.after.clone()
            } else {
                self.before.clone()
            };
        }
        let eased = REFLOW_EASING.ease(p);
        self.before
            .iter()
            .zip(&self.after)
            .map(|(from, to)| from.lerp(to, eased))
            .collect()
    }
}

/// Animates the reflow between two card layouts. Implementations only
/// describe the motion; the caller owns the transition lock and its timing.
pub trait ReflowAnimator: Send + Sync {
    fn name(&self) -> &'static str;
    fn begin(&self, before: Vec<Rect>, after: Vec<Rect>, now: Instant) -> Reflow;
}

pub struct FlipAnimator;

impl ReflowAnimator for FlipAnimator {
    fn name(&self) -> &'static str {
        "flip"
    }

    fn begin(&self, before: Vec<Rect>, after: Vec<Rect>, now: Instant) -> Reflow {
        let transforms = before
            .iter()
            .zip(&after)
            .map(|(first, last)| Transform::invert(first, last))
            .collect();
        Reflow {
            started_at: now,
            duration: REFLOW_DURATION,
            before,
            after,
            transforms,
            interpolate: true,
        }
    }
}

/// Stand-in for a platform transition primitive: no per-card transforms,
/// the new layout appears when the window closes.
pub struct NativeAnimator;

impl ReflowAnimator for NativeAnimator {
    fn name(&self) -> &'static str {
        "native"
    }

    fn begin(&self, before: Vec<Rect>, after: Vec<Rect>, now: Instant) -> Reflow {
        Reflow {
            started_at: now,
            duration: REFLOW_DURATION,
            before,
            after,
            transforms: Vec::new(),
            interpolate: false,
        }
    }
}

pub fn animator_for(strategy: AnimationStrategy) -> Box<dyn ReflowAnimator> {
    match strategy {
        AnimationStrategy::Flip => Box::new(FlipAnimator),
        AnimationStrategy::Native => Box::new(NativeAnimator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_hits_end_points_and_is_monotonic() {
        assert_eq!(REFLOW_EASING.ease(0.0), 0.0);
        assert_eq!(REFLOW_EASING.ease(1.0), 1.0);
        let mut last = 0.0;
        for i in 1..=20 {
            let v = REFLOW_EASING.ease(i as f32 / 20.0);
            assert!(v >= last - 1e-4, "not monotonic at step {}", i);
            last = v;
        }
        // Fast start: well past half way at a quarter of the time.
        assert!(REFLOW_EASING.ease(0.25) > 0.6);
    }

    #[test]
    fn linear_curve_is_identity() {
        let linear = CubicBezier::new(0.25, 0.25, 0.75, 0.75);
        for x in [0.1f32, 0.5, 0.9] {
            assert!((linear.ease(x) - x).abs() < 1e-3);
        }
    }

    #[test]
    fn flip_transforms_invert_the_move() {
        let before = vec![Rect::new(0.0, 0.0, 10.0, 5.0)];
        let after = vec![Rect::new(20.0, 10.0, 40.0, 10.0)];
        let reflow = FlipAnimator.begin(before, after, Instant::now());
        assert_eq!(
            reflow.transforms[0],
            Transform {
                dx: -20.0,
                dy: -10.0,
                sx: 0.25,
                sy: 0.5
            }
        );
    }

    #[test]
    fn flip_frames_interpolate_and_native_snaps_at_end() {
        let start = Instant::now();
        let before = vec![Rect::new(0.0, 0.0, 10.0, 10.0)];
        let after = vec![Rect::new(100.0, 0.0, 10.0, 10.0)];

        let flip = FlipAnimator.begin(before.clone(), after.clone(), start);
        let mid = flip.frame(start + Duration::from_millis(225));
        assert!(mid[0].x > 50.0 && mid[0].x < 100.0);
        assert_eq!(flip.frame(start + REFLOW_DURATION), after);

        let native = NativeAnimator.begin(before.clone(), after.clone(), start);
        assert!(native.transforms.is_empty());
        assert_eq!(native.frame(start + Duration::from_millis(225)), before);
        assert_eq!(native.frame(start + REFLOW_DURATION), after);
        assert!(native.is_finished(start + REFLOW_DURATION));
        assert!(!native.is_finished(start + Duration::from_millis(449)));
    }
}
