use crate::audio::noise::{NoiseBuffer, NoiseColor, NoiseLoop};
use crate::audio::AudioGenerator;

/// Colored noise straight off the loop. Brown runs hot and leans on the
/// limiter; white is trimmed so the three colors sit at similar loudness.
pub struct NoiseLayer {
    source: NoiseLoop,
    trim: f32,
}

impl NoiseLayer {
    pub fn new(buffer: NoiseBuffer, rng: &mut fastrand::Rng) -> Self {
        let trim = match buffer.color() {
            NoiseColor::White => 0.5,
            NoiseColor::Pink => 1.0,
            NoiseColor::Brown => 1.0,
        };
        let offset = rng.usize(..buffer.loop_len());
        Self {
            source: NoiseLoop::starting_at(buffer, offset),
            trim,
        }
    }

    pub fn color(&self) -> NoiseColor {
        self.source.color()
    }
}

impl AudioGenerator for NoiseLayer {
    fn next_sample(&mut self) -> f32 {
        self.source.next_sample() * self.trim
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.source.set_sample_rate(sample_rate);
    }
}
