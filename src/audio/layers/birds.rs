use crate::audio::envelopes::AttackDecayEnvelope;
use crate::audio::filters::{FilterMode, SVF};
use crate::audio::noise::{NoiseBuffer, NoiseColor, NoiseLoop};
use crate::audio::oscillators::SineOscillator;
use crate::audio::{AudioGenerator, AudioProcessor, PI};
use crate::config::BirdsConfig;
use crate::error::{EngineError, Result};

/// Upper bound on chirps waiting for their start sample. Reserved up front.
pub const MAX_PENDING_CHIRPS: usize = 64;
/// Upper bound on chirps sounding at once.
pub const MAX_ACTIVE_CHIRPS: usize = 24;

/// Events arriving later than this are dropped instead of started late.
const MAX_LATENESS_SECONDS: f32 = 0.25;

/// One scheduled chirp, stamped with an absolute render clock position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChirpEvent {
    pub start_sample: u64,
    pub duration: f32,
    pub attack: f32,
    pub start_hz: f32,
    pub end_hz: f32,
    pub peak: f32,
    /// -1 hard left, 1 hard right.
    pub pan: f32,
}

struct ChirpVoice {
    oscillator: SineOscillator,
    envelope: AttackDecayEnvelope,
    frequency: f32,
    sweep: f32,
    left_gain: f32,
    right_gain: f32,
}

impl ChirpVoice {
    fn new(event: &ChirpEvent, sample_rate: f32) -> Self {
        let mut envelope =
            AttackDecayEnvelope::new(event.peak, event.attack, event.duration, sample_rate);
        envelope.trigger();

        // Per-sample ratio for an exponential glide from start_hz to end_hz
        let sweep_samples = (event.duration * sample_rate).max(1.0);
        let sweep = (event.end_hz / event.start_hz).powf(1.0 / sweep_samples);

        // Equal-power pan
        let angle = (event.pan.clamp(-1.0, 1.0) + 1.0) * PI / 4.0;

        Self {
            oscillator: SineOscillator::new(event.start_hz, sample_rate),
            envelope,
            frequency: event.start_hz,
            sweep,
            left_gain: angle.cos(),
            right_gain: angle.sin(),
        }
    }

    fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    fn next_frame(&mut self) -> (f32, f32) {
        let sample = self.oscillator.next_sample() * self.envelope.next_sample();
        self.frequency *= self.sweep;
        self.oscillator.set_frequency(self.frequency);
        (sample * self.left_gain, sample * self.right_gain)
    }
}

/// Breeze bed plus sample-accurate chirps. Chirps are fed in by
/// [`BirdsLayer::schedule`]; the bed runs whether or not any arrive.
pub struct BirdsLayer {
    breeze: NoiseLoop,
    breeze_filter: SVF,
    breeze_level: f32,

    pending: Vec<ChirpEvent>,
    next_due: u64,
    voices: Vec<ChirpVoice>,
    sample_rate: f32,
}

impl BirdsLayer {
    pub fn new(
        breeze: NoiseBuffer,
        config: &BirdsConfig,
        sample_rate: f32,
        rng: &mut fastrand::Rng,
    ) -> Result<Self> {
        if breeze.color() != NoiseColor::Pink {
            return Err(EngineError::invalid(
                "noise_buffer",
                format!("breeze needs pink noise, got {}", breeze.color()),
            ));
        }
        let offset = rng.usize(..breeze.loop_len());
        Ok(Self {
            breeze: NoiseLoop::starting_at(breeze, offset),
            breeze_filter: SVF::new(config.breeze_cutoff_hz, 0.707, FilterMode::Lowpass, sample_rate),
            breeze_level: config.breeze_level,
            pending: Vec::with_capacity(MAX_PENDING_CHIRPS),
            next_due: u64::MAX,
            voices: Vec::with_capacity(MAX_ACTIVE_CHIRPS),
            sample_rate,
        })
    }

    /// Queues a chirp. Returns `false` when the pending list is full and the
    /// event was dropped.
    pub fn schedule(&mut self, event: ChirpEvent) -> bool {
        if self.pending.len() >= MAX_PENDING_CHIRPS {
            return false;
        }
        self.next_due = self.next_due.min(event.start_sample);
        self.pending.push(event);
        true
    }

    /// Drops every chirp not yet started. Sounding chirps ring out.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
        self.next_due = u64::MAX;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    fn start_due(&mut self, now: u64) {
        let max_lateness = (MAX_LATENESS_SECONDS * self.sample_rate) as u64;
        let mut next_due = u64::MAX;
        let mut i = 0;
        while i < self.pending.len() {
            let event = self.pending[i];
            if event.start_sample > now {
                next_due = next_due.min(event.start_sample);
                i += 1;
                continue;
            }
            self.pending.swap_remove(i);
            if now - event.start_sample <= max_lateness && self.voices.len() < MAX_ACTIVE_CHIRPS {
                self.voices.push(ChirpVoice::new(&event, self.sample_rate));
            }
        }
        self.next_due = next_due;
    }

    pub fn next_frame(&mut self, now: u64) -> (f32, f32) {
        if now >= self.next_due {
            self.start_due(now);
        }

        let breeze = self.breeze_filter.process(self.breeze.next_sample()) * self.breeze_level;
        let mut left = breeze;
        let mut right = breeze;

        let mut i = 0;
        while i < self.voices.len() {
            if !self.voices[i].is_active() {
                self.voices.swap_remove(i);
                continue;
            }
            let (l, r) = self.voices[i].next_frame();
            left += l;
            right += r;
            i += 1;
        }
        (left, right)
    }
}
