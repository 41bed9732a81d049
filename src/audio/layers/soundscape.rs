use super::NatureKind;
use crate::audio::filters::{FilterMode, SVF};
use crate::audio::modulators::Lfo;
use crate::audio::noise::{NoiseBuffer, NoiseColor, NoiseLoop};
use crate::audio::{AudioGenerator, AudioProcessor};
use crate::error::{EngineError, Result};

const RAIN_CUTOFF: f32 = 1400.0;
const RAIN_LEVEL: f32 = 0.8;

const WIND_CENTER: f32 = 600.0;
const WIND_Q: f32 = 1.0;
const WIND_SWEEP_RATE: f32 = 0.12;
const WIND_SWEEP_DEPTH: f32 = 350.0;
const WIND_LEVEL: f32 = 1.0;

const SEA_CUTOFF: f32 = 575.0;
const SEA_SWELL_RATE: f32 = 0.1;
const SEA_SWELL_CENTER: f32 = 0.75;
const SEA_SWELL_DEPTH: f32 = 0.25;
const SEA_LEVEL: f32 = 0.9;

const NIGHT_CUTOFF: f32 = 5000.0;
const NIGHT_LEVEL: f32 = 0.15;

const FOREST_CUTOFF: f32 = 2500.0;
const FOREST_LEVEL: f32 = 0.35;

/// Butterworth-ish Q for the plain lowpass/highpass kinds.
const FLAT_Q: f32 = 0.707;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modulation {
    Static,
    /// Slow LFO moving the filter cutoff: `(rate_hz, depth_hz)`.
    FilterSweep(f32, f32),
    /// Slow LFO on the output level: `(rate_hz, center, depth)`.
    GainSwell(f32, f32, f32),
}

/// Recipe for one filtered-noise kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NatureProfile {
    pub noise: NoiseColor,
    pub mode: FilterMode,
    pub cutoff: f32,
    pub q: f32,
    pub modulation: Modulation,
    pub level: f32,
}

impl NatureProfile {
    /// `None` for birds, which is not a filtered-noise chain.
    pub fn for_kind(kind: NatureKind) -> Option<Self> {
        let profile = match kind {
            NatureKind::Rain => Self {
                noise: NoiseColor::White,
                mode: FilterMode::Lowpass,
                cutoff: RAIN_CUTOFF,
                q: FLAT_Q,
                modulation: Modulation::Static,
                level: RAIN_LEVEL,
            },
            NatureKind::Wind => Self {
                noise: NoiseColor::Pink,
                mode: FilterMode::Bandpass,
                cutoff: WIND_CENTER,
                q: WIND_Q,
                modulation: Modulation::FilterSweep(WIND_SWEEP_RATE, WIND_SWEEP_DEPTH),
                level: WIND_LEVEL,
            },
            NatureKind::Sea => Self {
                noise: NoiseColor::Brown,
                mode: FilterMode::Lowpass,
                cutoff: SEA_CUTOFF,
                q: FLAT_Q,
                modulation: Modulation::GainSwell(SEA_SWELL_RATE, SEA_SWELL_CENTER, SEA_SWELL_DEPTH),
                level: SEA_LEVEL,
            },
            NatureKind::Night => Self {
                noise: NoiseColor::White,
                mode: FilterMode::Highpass,
                cutoff: NIGHT_CUTOFF,
                q: FLAT_Q,
                modulation: Modulation::Static,
                level: NIGHT_LEVEL,
            },
            NatureKind::Forest => Self {
                noise: NoiseColor::White,
                mode: FilterMode::Highpass,
                cutoff: FOREST_CUTOFF,
                q: FLAT_Q,
                modulation: Modulation::Static,
                level: FOREST_LEVEL,
            },
            NatureKind::Birds => return None,
        };
        Some(profile)
    }
}

enum ActiveModulation {
    Static,
    FilterSweep(Lfo),
    GainSwell(Lfo),
}

/// Looped noise through a state-variable filter, with optional slow
/// movement. Mono; the voice spreads it to both channels.
pub struct SoundscapeLayer {
    kind: NatureKind,
    source: NoiseLoop,
    filter: SVF,
    modulation: ActiveModulation,
    level: f32,
}

impl SoundscapeLayer {
    /// `buffer` must be of the color the kind's profile asks for.
    pub fn new(
        kind: NatureKind,
        buffer: NoiseBuffer,
        sample_rate: f32,
        rng: &mut fastrand::Rng,
    ) -> Result<Self> {
        let profile = NatureProfile::for_kind(kind).ok_or_else(|| {
            EngineError::invalid("nature_kind", format!("{} has no filtered-noise profile", kind))
        })?;
        if buffer.color() != profile.noise {
            return Err(EngineError::invalid(
                "noise_buffer",
                format!("{} needs {} noise, got {}", kind, profile.noise, buffer.color()),
            ));
        }

        let modulation = match profile.modulation {
            Modulation::Static => ActiveModulation::Static,
            Modulation::FilterSweep(rate, depth) => ActiveModulation::FilterSweep(
                Lfo::new(rate, profile.cutoff, depth, sample_rate).with_random_phase(rng),
            ),
            Modulation::GainSwell(rate, center, depth) => ActiveModulation::GainSwell(
                Lfo::new(rate, center, depth, sample_rate).with_random_phase(rng),
            ),
        };

        // Start somewhere random in the loop so two sessions never line up
        let offset = rng.usize(..buffer.loop_len());

        Ok(Self {
            kind,
            source: NoiseLoop::starting_at(buffer, offset),
            filter: SVF::new(profile.cutoff, profile.q, profile.mode, sample_rate),
            modulation,
            level: profile.level,
        })
    }

    pub fn kind(&self) -> NatureKind {
        self.kind
    }

    pub fn cutoff_frequency(&self) -> f32 {
        self.filter.cutoff_frequency()
    }
}

impl AudioGenerator for SoundscapeLayer {
    fn next_sample(&mut self) -> f32 {
        let mut gain = self.level;
        match &mut self.modulation {
            ActiveModulation::Static => {}
            ActiveModulation::FilterSweep(lfo) => {
                let cutoff = lfo.next_sample();
                self.filter.set_cutoff_frequency(cutoff);
            }
            ActiveModulation::GainSwell(lfo) => gain *= lfo.next_sample(),
        }
        let noise = self.source.next_sample();
        self.filter.process(noise) * gain
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.filter.set_sample_rate(sample_rate);
        match &mut self.modulation {
            ActiveModulation::Static => {}
            ActiveModulation::FilterSweep(lfo) | ActiveModulation::GainSwell(lfo) => {
                lfo.set_sample_rate(sample_rate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::noise::NoiseBufferFactory;

    const SAMPLE_RATE: f32 = 44100.0;

    fn layer(kind: NatureKind, seed: u64) -> SoundscapeLayer {
        let mut rng = fastrand::Rng::with_seed(seed);
        let color = NatureProfile::for_kind(kind).unwrap().noise;
        let buffer = NoiseBufferFactory::generate(color, 2.0, 0.25, SAMPLE_RATE, &mut rng).unwrap();
        SoundscapeLayer::new(kind, buffer, SAMPLE_RATE, &mut rng).unwrap()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_every_filtered_kind_produces_bounded_sound() {
        for kind in NatureKind::ALL {
            if kind == NatureKind::Birds {
                assert!(NatureProfile::for_kind(kind).is_none());
                continue;
            }
            let mut layer = layer(kind, 3);
            let samples: Vec<f32> = (0..22050).map(|_| layer.next_sample()).collect();
            let level = rms(&samples);
            println!("{} rms {:.4}", kind, level);
            assert!(level > 1e-3, "{} is silent", kind);
            assert!(samples.iter().all(|s| s.is_finite() && s.abs() < 4.0));
        }
    }

    #[test]
    fn test_wind_sweeps_its_band() {
        let mut wind = layer(NatureKind::Wind, 11);
        let mut low = f32::INFINITY;
        let mut high = f32::NEG_INFINITY;
        // One LFO period at 0.12 Hz
        for _ in 0..(SAMPLE_RATE / WIND_SWEEP_RATE) as usize {
            wind.next_sample();
            low = low.min(wind.cutoff_frequency());
            high = high.max(wind.cutoff_frequency());
        }
        println!("Wind band center moved between {:.0} and {:.0} Hz", low, high);
        assert!(low < WIND_CENTER - 300.0);
        assert!(high > WIND_CENTER + 300.0);
    }

    #[test]
    fn test_night_is_quieter_than_rain() {
        let mut rain = layer(NatureKind::Rain, 5);
        let mut night = layer(NatureKind::Night, 5);
        let rain_samples: Vec<f32> = (0..44100).map(|_| rain.next_sample()).collect();
        let night_samples: Vec<f32> = (0..44100).map(|_| night.next_sample()).collect();
        assert!(rms(&night_samples) < rms(&rain_samples));
    }

    #[test]
    fn test_rejects_wrong_buffer_color() {
        let mut rng = fastrand::Rng::with_seed(1);
        let pink =
            NoiseBufferFactory::generate(NoiseColor::Pink, 1.0, 0.1, SAMPLE_RATE, &mut rng).unwrap();
        assert!(SoundscapeLayer::new(NatureKind::Sea, pink.clone(), SAMPLE_RATE, &mut rng).is_err());
        assert!(SoundscapeLayer::new(NatureKind::Birds, pink, SAMPLE_RATE, &mut rng).is_err());
    }
}
