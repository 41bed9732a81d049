// Ramped parameters. Non-zero targets approach exponentially, silence is a
// linear ramp that lands on exactly zero

use super::{sec_to_samples, SILENCE};

/// Number of time constants after which an exponential ramp counts as settled
/// (residual error below 1%).
pub const SETTLE_TIME_CONSTANTS: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum RampShape {
    Hold,
    Exponential { coeff: f32, remaining: u32 },
    Linear { start: f32, remaining: u32, total: u32 },
}

#[derive(Debug, Clone)]
pub struct AutomatedParam<C = ()> {
    value: f32,
    target: f32,
    shape: RampShape,
    sample_rate: f32,
    completion: Option<C>,
}

impl<C> AutomatedParam<C> {
    pub fn new(value: f32, sample_rate: f32) -> Self {
        Self {
            value,
            target: value,
            shape: RampShape::Hold,
            sample_rate,
            completion: None,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.shape == RampShape::Hold
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Starts a ramp toward `target`, replacing any ramp in flight and
    /// dropping its completion token. For non-zero targets `seconds` is the
    /// time constant; for silence it is the ramp length.
    pub fn ramp_to(&mut self, target: f32, seconds: f32) {
        self.completion = None;
        self.start_ramp(target, seconds);
    }

    /// Like [`ramp_to`](Self::ramp_to), then yields `completion` from
    /// [`take_completion`](Self::take_completion) once the ramp settles.
    pub fn ramp_to_then(&mut self, target: f32, seconds: f32, completion: C) {
        self.start_ramp(target, seconds);
        self.completion = Some(completion);
    }

    fn start_ramp(&mut self, target: f32, seconds: f32) {
        let seconds = seconds.max(0.0);
        if target.abs() < SILENCE {
            let samples = sec_to_samples(seconds, self.sample_rate).max(1.0) as u32;
            self.target = 0.0;
            self.shape = RampShape::Linear {
                start: self.value,
                remaining: samples,
                total: samples,
            };
        } else {
            let tau_samples = sec_to_samples(seconds, self.sample_rate).max(1.0);
            self.target = target;
            self.shape = RampShape::Exponential {
                coeff: (-1.0 / tau_samples).exp(),
                remaining: (tau_samples * SETTLE_TIME_CONSTANTS) as u32,
            };
        }
    }

    /// Yields the completion token once, after the ramp that carried it has
    /// settled.
    pub fn take_completion(&mut self) -> Option<C> {
        if self.is_settled() {
            self.completion.take()
        } else {
            None
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn next_value(&mut self) -> f32 {
        match &mut self.shape {
            RampShape::Hold => {}
            RampShape::Exponential { coeff, remaining } => {
                if *remaining == 0 {
                    self.value = self.target;
                    self.shape = RampShape::Hold;
                } else {
                    self.value = self.target + (self.value - self.target) * *coeff;
                    *remaining -= 1;
                }
            }
            RampShape::Linear {
                start,
                remaining,
                total,
            } => {
                // Computed from the ramp origin so rounding never accumulates
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    self.value = self.target;
                    self.shape = RampShape::Hold;
                } else {
                    self.value = *start * (*remaining as f32 / *total as f32);
                }
            }
        }
        self.value
    }
}
