pub mod automation;
pub mod dynamics;
pub mod envelopes;
pub mod filters;
pub mod layers;
pub mod mix_graph;
pub mod modulators;
pub mod noise;
pub mod oscillators;

pub const PI: f32 = std::f32::consts::PI;
pub const TWO_PI: f32 = 2.0 * PI;

/// Gain treated as inaudible. Ramps toward silence land on exactly zero,
/// everything else is floored here.
pub const SILENCE: f32 = 1.0e-4;

pub fn sec_to_samples(seconds: f32, sample_rate: f32) -> f32 {
    seconds * sample_rate
}

// Basic trait for audio generators that produce a single sample output
pub trait AudioGenerator {
    fn next_sample(&mut self) -> f32;
    fn set_sample_rate(&mut self, sample_rate: f32);
}

pub trait AudioProcessor {
    fn process(&mut self, input: f32) -> f32;
    fn set_sample_rate(&mut self, sample_rate: f32);
}

pub trait StereoAudioGenerator {
    fn next_sample(&mut self) -> (f32, f32);
    fn set_sample_rate(&mut self, sample_rate: f32);
}

pub trait StereoAudioProcessor {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32);
    fn set_sample_rate(&mut self, sample_rate: f32);
}
