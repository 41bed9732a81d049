// Modulators module - using SineOscillator for LFOs
use crate::audio::oscillators::SineOscillator;
use crate::audio::AudioGenerator;

/// Slow sine modulator producing `center + depth * sin(...)`.
pub struct Lfo {
    oscillator: SineOscillator,
    center: f32,
    depth: f32,
}

impl Lfo {
    pub fn new(rate_hz: f32, center: f32, depth: f32, sample_rate: f32) -> Self {
        Self {
            oscillator: SineOscillator::new(rate_hz, sample_rate),
            center,
            depth,
        }
    }

    /// Start somewhere random in the cycle so two layers of the same kind
    /// never breathe in lockstep.
    pub fn with_random_phase(mut self, rng: &mut fastrand::Rng) -> Self {
        self.oscillator.set_phase(rng.f32());
        self
    }
}

impl AudioGenerator for Lfo {
    fn next_sample(&mut self) -> f32 {
        self.center + self.depth * self.oscillator.next_sample()
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.oscillator.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfo_stays_in_range() {
        let sample_rate = 44100.0;
        let mut lfo = Lfo::new(0.12, 600.0, 350.0, sample_rate);
        let (low, high) = (600.0 - 350.0, 600.0 + 350.0);

        // One full period at 0.12 Hz
        let period = (sample_rate / 0.12) as usize;
        let values: Vec<f32> = (0..period).map(|_| lfo.next_sample()).collect();
        let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        println!("LFO range: [{:.1}, {:.1}], expected [{:.1}, {:.1}]", min, max, low, high);
        assert!(min >= low - 0.5 && max <= high + 0.5);
        assert!(min < low + 5.0 && max > high - 5.0, "Should sweep the full range");
    }

    #[test]
    fn test_lfo_moves_slowly() {
        let mut lfo = Lfo::new(0.1, 0.75, 0.25, 44100.0);
        let mut previous = lfo.next_sample();
        for _ in 0..44100 {
            let value = lfo.next_sample();
            assert!((value - previous).abs() < 1e-4);
            previous = value;
        }
    }
}
