use crate::audio::{AudioGenerator, TWO_PI};
use once_cell::sync::Lazy;

const SINE_TABLE_SIZE: usize = 4096;

// One guard point at the end so interpolation never wraps the index
static SINE_TABLE: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..=SINE_TABLE_SIZE)
        .map(|i| (i as f32 * TWO_PI / SINE_TABLE_SIZE as f32).sin())
        .collect()
});

pub struct PhaseGenerator {
    phase: f32,
    phase_increment: f32,
    frequency: f32,
    sample_rate: f32,
}

impl PhaseGenerator {
    pub fn new(frequency: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            frequency,
            sample_rate,
            phase_increment: frequency / sample_rate,
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
        self.phase_increment = frequency / self.sample_rate;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.phase_increment = self.frequency / sample_rate;
    }

    pub fn set_phase(&mut self, phase: f32) {
        self.phase = phase.rem_euclid(1.0);
    }

    pub fn next_sample(&mut self) -> f32 {
        let sample = self.phase;
        self.phase += self.phase_increment;

        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }
}

/// Wavetable sine with linear interpolation. Frequency changes keep the
/// running phase, so retuning never produces a discontinuity.
pub struct SineOscillator {
    phase_gen: PhaseGenerator,
}

impl SineOscillator {
    pub fn new(frequency: f32, sample_rate: f32) -> Self {
        Self {
            phase_gen: PhaseGenerator::new(frequency, sample_rate),
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.phase_gen.set_frequency(frequency);
    }

    pub fn set_phase(&mut self, phase: f32) {
        self.phase_gen.set_phase(phase);
    }
}

impl AudioGenerator for SineOscillator {
    fn next_sample(&mut self) -> f32 {
        let position = self.phase_gen.next_sample() * SINE_TABLE_SIZE as f32;
        let index = (position as usize).min(SINE_TABLE_SIZE - 1);
        let frac = position - index as f32;
        let a = SINE_TABLE[index];
        let b = SINE_TABLE[index + 1];
        a + (b - a) * frac
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.phase_gen.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_matches_reference() {
        let sample_rate = 44100.0;
        let mut osc = SineOscillator::new(200.0, sample_rate);

        let mut worst = 0.0f32;
        for i in 0..4410 {
            let expected = (TWO_PI * 200.0 * i as f32 / sample_rate).sin();
            let actual = osc.next_sample();
            worst = worst.max((actual - expected).abs());
        }
        println!("Max deviation from reference sine: {:.6}", worst);
        assert!(worst < 1e-3);
    }

    #[test]
    fn test_frequency_change_keeps_phase_continuous() {
        let mut osc = SineOscillator::new(200.0, 44100.0);
        let mut previous = 0.0;
        for i in 0..2000 {
            if i == 1000 {
                osc.set_frequency(205.0);
            }
            let sample = osc.next_sample();
            // A 205 Hz sine moves at most 2*pi*205/44100 per sample
            assert!((sample - previous).abs() < 0.03, "Jump at sample {}", i);
            previous = sample;
        }
    }
}
