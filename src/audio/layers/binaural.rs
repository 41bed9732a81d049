use crate::audio::automation::AutomatedParam;
use crate::audio::oscillators::SineOscillator;
use crate::audio::{AudioGenerator, StereoAudioGenerator};

/// Two persistent sine carriers, one per ear. The right carrier sits
/// `beat_offset` Hz above the left; the interaural difference is the beat.
/// The channels must stay separate all the way to the output.
pub struct ToneOscillatorPair {
    left: SineOscillator,
    right: SineOscillator,
    base_frequency: f32,
    beat_offset: AutomatedParam,
}

impl ToneOscillatorPair {
    pub fn new(base_frequency: f32, beat_offset_hz: f32, sample_rate: f32) -> Self {
        Self {
            left: SineOscillator::new(base_frequency, sample_rate),
            right: SineOscillator::new(base_frequency + beat_offset_hz, sample_rate),
            base_frequency,
            beat_offset: AutomatedParam::new(beat_offset_hz, sample_rate),
        }
    }

    pub fn base_frequency(&self) -> f32 {
        self.base_frequency
    }

    pub fn beat_offset(&self) -> f32 {
        self.beat_offset.value()
    }

    pub fn beat_offset_target(&self) -> f32 {
        self.beat_offset.target()
    }

    /// Glides the right carrier to `base + offset_hz`. The oscillators keep
    /// running, so there is no phase reset.
    pub fn set_beat_offset(&mut self, offset_hz: f32, time_constant: f32) {
        self.beat_offset.ramp_to(offset_hz, time_constant);
    }
}

impl StereoAudioGenerator for ToneOscillatorPair {
    fn next_sample(&mut self) -> (f32, f32) {
        if !self.beat_offset.is_settled() {
            let offset = self.beat_offset.next_value();
            self.right.set_frequency(self.base_frequency + offset);
        }
        (self.left.next_sample(), self.right.next_sample())
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.left.set_sample_rate(sample_rate);
        self.right.set_sample_rate(sample_rate);
        self.beat_offset.set_sample_rate(sample_rate);
    }
}
