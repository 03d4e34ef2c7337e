// src/smoother.rs

/// Linear ramp towards a target value over a fixed duration.
///
/// Used for parameter values written into control input buffers, so a
/// jump in a knob value becomes a short ramp instead of a click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParameterSmoother {
    current: f32,
    target: f32,
    /// Ramp length in seconds.
    duration: f32,
    time_remaining: f32,
    /// Change per second for the running ramp.
    rate: f32,
}

impl LinearParameterSmoother {
    pub fn new(initial: f32, duration_seconds: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            duration: duration_seconds.max(0.0),
            time_remaining: 0.0,
            rate: 0.0,
        }
    }

    /// Start a new ramp. Setting the same target again does not restart it.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if target != self.target {
            self.target = target;
            self.time_remaining = self.duration;
            if self.duration > 0.0 {
                self.rate = (target - self.current) / self.duration;
            }
        }
    }

    /// Advance by `dt` seconds.
    #[inline]
    pub fn process(&mut self, dt: f32) {
        if self.time_remaining > dt {
            self.current += self.rate * dt;
            self.time_remaining -= dt;
        } else {
            self.current = self.target;
            self.time_remaining = 0.0;
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Jump straight to `value` without a ramp.
    pub fn reset(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.time_remaining = 0.0;
        self.rate = 0.0;
    }
}
