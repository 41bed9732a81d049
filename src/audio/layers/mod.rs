mod binaural;
mod birds;
mod noise_bed;
mod soundscape;

pub use binaural::ToneOscillatorPair;
pub use birds::{BirdsLayer, ChirpEvent};
pub use noise_bed::NoiseLayer;
pub use soundscape::{NatureProfile, SoundscapeLayer};

use crate::audio::noise::NoiseColor;
use crate::audio::{AudioGenerator, StereoAudioGenerator};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NatureKind {
    Rain,
    Wind,
    Sea,
    Night,
    Forest,
    Birds,
}

impl NatureKind {
    pub const ALL: [NatureKind; 6] = [
        NatureKind::Rain,
        NatureKind::Wind,
        NatureKind::Sea,
        NatureKind::Night,
        NatureKind::Forest,
        NatureKind::Birds,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NatureKind::Rain => "rain",
            NatureKind::Wind => "wind",
            NatureKind::Sea => "sea",
            NatureKind::Night => "night",
            NatureKind::Forest => "forest",
            NatureKind::Birds => "birds",
        }
    }
}

impl fmt::Display for NatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NatureKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        NatureKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| EngineError::invalid("nature_kind", format!("unknown kind '{}'", s)))
    }
}

/// The three summing points of the mix. They live as long as the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixBus {
    Binaural,
    Nature,
    Noise,
}

impl MixBus {
    pub const ALL: [MixBus; 3] = [MixBus::Binaural, MixBus::Nature, MixBus::Noise];

    pub fn index(&self) -> usize {
        match self {
            MixBus::Binaural => 0,
            MixBus::Nature => 1,
            MixBus::Noise => 2,
        }
    }
}

/// Registry identity of a layer. The graph never holds two voices with the
/// same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKey {
    Binaural,
    Nature(NatureKind),
    Noise(NoiseColor),
}

impl LayerKey {
    pub fn bus(&self) -> MixBus {
        match self {
            LayerKey::Binaural => MixBus::Binaural,
            LayerKey::Nature(_) => MixBus::Nature,
            LayerKey::Noise(_) => MixBus::Noise,
        }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKey::Binaural => f.write_str("binaural"),
            LayerKey::Nature(kind) => write!(f, "nature:{}", kind),
            LayerKey::Noise(color) => write!(f, "noise:{}", color),
        }
    }
}

/// Generator state owned by one registry slot.
pub enum LayerVoice {
    Tone(ToneOscillatorPair),
    Soundscape(SoundscapeLayer),
    Birds(BirdsLayer),
    Noise(NoiseLayer),
}

impl LayerVoice {
    /// Next stereo frame. `now` is the render clock position of this frame.
    pub fn next_frame(&mut self, now: u64) -> (f32, f32) {
        match self {
            LayerVoice::Tone(pair) => pair.next_sample(),
            LayerVoice::Soundscape(layer) => {
                let sample = layer.next_sample();
                (sample, sample)
            }
            LayerVoice::Birds(birds) => birds.next_frame(now),
            LayerVoice::Noise(noise) => {
                let sample = noise.next_sample();
                (sample, sample)
            }
        }
    }
}

impl fmt::Debug for LayerVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerVoice::Tone(pair) => write!(f, "Tone({} Hz)", pair.base_frequency()),
            LayerVoice::Soundscape(layer) => write!(f, "Soundscape({})", layer.kind()),
            LayerVoice::Birds(birds) => write!(f, "Birds({} pending)", birds.pending_count()),
            LayerVoice::Noise(noise) => write!(f, "Noise({})", noise.color()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_route_to_buses() {
        assert_eq!(LayerKey::Binaural.bus(), MixBus::Binaural);
        assert_eq!(LayerKey::Nature(NatureKind::Birds).bus(), MixBus::Nature);
        assert_eq!(LayerKey::Noise(NoiseColor::Brown).bus(), MixBus::Noise);
        assert_ne!(
            LayerKey::Noise(NoiseColor::Brown),
            LayerKey::Noise(NoiseColor::Pink)
        );
    }

    #[test]
    fn test_parse_nature_kind() {
        assert_eq!("SEA".parse::<NatureKind>().unwrap(), NatureKind::Sea);
        assert_eq!("birds".parse::<NatureKind>().unwrap(), NatureKind::Birds);
        assert!("volcano".parse::<NatureKind>().is_err());
        assert_eq!(
            serde_json::to_string(&NatureKind::Forest).unwrap(),
            "\"forest\""
        );
    }
}
