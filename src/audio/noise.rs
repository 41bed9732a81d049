// Seamless looping noise buffers, generated on the control thread

use crate::audio::AudioGenerator;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
}

impl NoiseColor {
    pub const ALL: [NoiseColor; 3] = [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown];

    pub fn name(&self) -> &'static str {
        match self {
            NoiseColor::White => "white",
            NoiseColor::Pink => "pink",
            NoiseColor::Brown => "brown",
        }
    }
}

impl fmt::Display for NoiseColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NoiseColor {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "white" => Ok(NoiseColor::White),
            "pink" => Ok(NoiseColor::Pink),
            "brown" => Ok(NoiseColor::Brown),
            other => Err(EngineError::invalid(
                "noise_color",
                format!("unknown noise color '{}'", other),
            )),
        }
    }
}

// Paul Kellet's refined pink noise filter
struct PinkFilter {
    b: [f32; 7],
}

impl PinkFilter {
    fn new() -> Self {
        Self { b: [0.0; 7] }
    }

    fn process(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        // b[6] still holds the previous sample's white term here
        let out = (b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362) * 0.11;
        b[6] = white * 0.115926;
        out
    }
}

// Leaky integrator random walk
struct BrownFilter {
    last: f32,
}

impl BrownFilter {
    fn new() -> Self {
        Self { last: 0.0 }
    }

    fn process(&mut self, white: f32) -> f32 {
        self.last = (self.last + 0.02 * white) / 1.02;
        self.last * 3.5
    }
}

/// An immutable block of noise whose head has been crossfaded against its
/// tail. Playback loops over the first `loop_len()` samples; the wrap lands
/// on a sample that directly followed the loop end before the blend.
#[derive(Clone)]
pub struct NoiseBuffer {
    color: NoiseColor,
    samples: Arc<[f32]>,
    fade_len: usize,
}

impl NoiseBuffer {
    pub fn color(&self) -> NoiseColor {
        self.color
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn fade_len(&self) -> usize {
        self.fade_len
    }

    pub fn loop_len(&self) -> usize {
        self.samples.len() - self.fade_len
    }

}

impl fmt::Debug for NoiseBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseBuffer")
            .field("color", &self.color)
            .field("len", &self.samples.len())
            .field("fade_len", &self.fade_len)
            .finish()
    }
}

/// Stateless noise buffer generation; all randomness comes from the caller's
/// `Rng`.
pub struct NoiseBufferFactory;

impl NoiseBufferFactory {
    pub fn generate(
        color: NoiseColor,
        duration_seconds: f32,
        loop_fade_seconds: f32,
        sample_rate: f32,
        rng: &mut fastrand::Rng,
    ) -> Result<NoiseBuffer> {
        if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
            return Err(EngineError::invalid(
                "duration_seconds",
                format!("{} is not a positive duration", duration_seconds),
            ));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(EngineError::invalid(
                "sample_rate",
                format!("{} is not a positive sample rate", sample_rate),
            ));
        }
        if !(loop_fade_seconds.is_finite() && loop_fade_seconds >= 0.0) {
            return Err(EngineError::invalid(
                "loop_fade_seconds",
                format!("{} is not a valid fade length", loop_fade_seconds),
            ));
        }

        let len = (duration_seconds * sample_rate).round() as usize;
        if len == 0 {
            return Err(EngineError::invalid(
                "duration_seconds",
                "buffer would contain no samples",
            ));
        }
        let fade_len = (loop_fade_seconds * sample_rate).round() as usize;
        if fade_len * 2 > len {
            return Err(EngineError::invalid(
                "loop_fade_seconds",
                "seam fade is longer than half the buffer",
            ));
        }

        let mut samples = Self::shaped(color, len, rng);
        Self::blend_seam(&mut samples, fade_len);

        Ok(NoiseBuffer {
            color,
            samples: samples.into(),
            fade_len,
        })
    }

    fn shaped(color: NoiseColor, len: usize, rng: &mut fastrand::Rng) -> Vec<f32> {
        let mut white = move || rng.f32() * 2.0 - 1.0;
        match color {
            NoiseColor::White => (0..len).map(|_| white()).collect(),
            NoiseColor::Pink => {
                let mut filter = PinkFilter::new();
                (0..len).map(|_| filter.process(white())).collect()
            }
            NoiseColor::Brown => {
                let mut filter = BrownFilter::new();
                (0..len).map(|_| filter.process(white())).collect()
            }
        }
    }

    // Must run after spectral shaping, otherwise the filter state jump at
    // the seam comes back.
    fn blend_seam(samples: &mut [f32], fade_len: usize) {
        let len = samples.len();
        for i in 0..fade_len {
            let alpha = i as f32 / fade_len as f32;
            samples[i] = samples[i] * alpha + samples[len - fade_len + i] * (1.0 - alpha);
        }
    }
}

/// Endless playback of a [`NoiseBuffer`].
pub struct NoiseLoop {
    buffer: NoiseBuffer,
    position: usize,
}

impl NoiseLoop {
    pub fn starting_at(buffer: NoiseBuffer, offset: usize) -> Self {
        let position = offset % buffer.loop_len();
        Self { buffer, position }
    }

    pub fn color(&self) -> NoiseColor {
        self.buffer.color()
    }
}

impl AudioGenerator for NoiseLoop {
    fn next_sample(&mut self) -> f32 {
        let sample = self.buffer.samples[self.position];
        self.position += 1;
        if self.position >= self.buffer.loop_len() {
            self.position = 0;
        }
        sample
    }

    fn set_sample_rate(&mut self, _sample_rate: f32) {
        // Buffers are regenerated on every start at the graph's rate
    }
}
