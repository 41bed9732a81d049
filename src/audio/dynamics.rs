// Soft-knee peak limiter for the master bus

use crate::audio::StereoAudioProcessor;
use crate::config::LimiterConfig;

#[inline]
fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

pub struct Limiter {
    threshold: f32,
    ratio: f32,
    knee: f32,
    attack: f32,
    release: f32,
    sample_rate: f32,

    attack_coef: f32,
    release_coef: f32,
    envelope: f32,
}

impl Limiter {
    pub fn new(config: &LimiterConfig, sample_rate: f32) -> Self {
        let mut limiter = Self {
            threshold: config.threshold_db.clamp(-60.0, 0.0),
            ratio: config.ratio.clamp(1.0, 50.0),
            knee: config.knee_db.max(0.0),
            attack: config.attack_seconds.clamp(0.0001, 1.0),
            release: config.release_seconds.clamp(0.001, 5.0),
            sample_rate,
            attack_coef: 0.0,
            release_coef: 0.0,
            envelope: 0.0,
        };
        limiter.update_coefficients();
        limiter
    }

    fn update_coefficients(&mut self) {
        self.attack_coef = (-1.0 / (self.attack * self.sample_rate)).exp();
        self.release_coef = (-1.0 / (self.release * self.sample_rate)).exp();
    }

    /// Gain change in dB for an input level in dB (zero or negative).
    #[inline]
    fn compute_gain(&self, input_db: f32) -> f32 {
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                // Quadratic interpolation through the knee
                let x = input_db - knee_start;
                -slope * x * x / (2.0 * self.knee)
            }
        }
    }

    pub fn gain_reduction_db(&self) -> f32 {
        -self.compute_gain(linear_to_db(self.envelope))
    }
}

impl StereoAudioProcessor for Limiter {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input_level = left.abs().max(right.abs());

        let coef = if input_level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * input_level;

        let gain = db_to_linear(self.compute_gain(linear_to_db(self.envelope)));
        (left * gain, right * gain)
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> Limiter {
        Limiter::new(&LimiterConfig::default(), 44100.0)
    }

    #[test]
    fn test_passthrough_below_threshold() {
        let mut limiter = limiter();
        for _ in 0..2000 {
            limiter.process(0.1, -0.1);
        }
        let (l, r) = limiter.process(0.1, -0.1);
        assert!((l - 0.1).abs() < 1e-4, "Quiet signal should pass unchanged: {}", l);
        assert!((r + 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_loud_signal_is_pulled_down() {
        let mut limiter = limiter();
        for _ in 0..5000 {
            limiter.process(2.0, 2.0);
        }
        let (l, _) = limiter.process(2.0, 2.0);
        // +6 dB in, -3 dB threshold, 12:1 -> roughly -2.2 dB out
        println!("Limited output: {:.3}, reduction {:.2} dB", l, limiter.gain_reduction_db());
        assert!(l < 0.9, "Expected limiting, got {}", l);
        assert!(l > 0.5, "Should not over-compress, got {}", l);
    }

    #[test]
    fn test_knee_is_continuous() {
        let limiter = limiter();
        let mut previous = limiter.compute_gain(-12.0);
        let mut db = -12.0;
        while db < 6.0 {
            db += 0.01;
            let gain = limiter.compute_gain(db);
            assert!((gain - previous).abs() < 0.02, "Gain curve jumps at {} dB", db);
            assert!(gain <= 0.0);
            previous = gain;
        }
    }
}
