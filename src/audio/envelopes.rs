use crate::audio::{sec_to_samples, AudioGenerator};

/// Level an exponential decay aims for, relative to the peak.
pub const DECAY_FLOOR: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EnvelopeState {
    Idle,
    Attack,
    Decay,
}

/// Percussive envelope for chirps: linear attack to `peak`, then an
/// exponential decay that reaches `peak * DECAY_FLOOR` at the end of the
/// note and goes idle.
pub struct AttackDecayEnvelope {
    peak: f32,
    attack_samples: u32,
    decay_samples: u32,
    decay_coeff: f32,

    pub(crate) state: EnvelopeState,
    current_level: f32,
    current_sample: u32,
    sample_rate: f32,
}

impl AttackDecayEnvelope {
    pub fn new(peak: f32, attack_time: f32, total_time: f32, sample_rate: f32) -> Self {
        let mut env = Self {
            peak,
            attack_samples: 0,
            decay_samples: 0,
            decay_coeff: 0.0,
            state: EnvelopeState::Idle,
            current_level: 0.0,
            current_sample: 0,
            sample_rate,
        };
        env.calculate_parameters(attack_time, total_time);
        env
    }

    fn calculate_parameters(&mut self, attack_time: f32, total_time: f32) {
        let attack_time = attack_time.max(0.001);
        let decay_time = (total_time - attack_time).max(0.001);
        self.attack_samples = sec_to_samples(attack_time, self.sample_rate).round().max(1.0) as u32;
        self.decay_samples = sec_to_samples(decay_time, self.sample_rate).round().max(1.0) as u32;
        // Per-sample multiplier so that peak * coeff^decay_samples == peak * DECAY_FLOOR
        self.decay_coeff = DECAY_FLOOR.powf(1.0 / self.decay_samples as f32);
    }

    pub fn trigger(&mut self) {
        self.state = EnvelopeState::Attack;
        self.current_sample = 0;
        self.current_level = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.state != EnvelopeState::Idle
    }
}

impl AudioGenerator for AttackDecayEnvelope {
    fn next_sample(&mut self) -> f32 {
        match self.state {
            EnvelopeState::Idle => 0.0,

            EnvelopeState::Attack => {
                self.current_sample += 1;
                self.current_level =
                    self.peak * self.current_sample as f32 / self.attack_samples as f32;
                if self.current_sample >= self.attack_samples {
                    self.state = EnvelopeState::Decay;
                    self.current_sample = 0;
                    self.current_level = self.peak;
                }
                self.current_level
            }

            EnvelopeState::Decay => {
                self.current_sample += 1;
                self.current_level *= self.decay_coeff;
                if self.current_sample >= self.decay_samples {
                    self.state = EnvelopeState::Idle;
                    self.current_level = 0.0;
                }
                self.current_level
            }
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        let attack = self.attack_samples as f32 / self.sample_rate;
        let total = attack + self.decay_samples as f32 / self.sample_rate;
        self.sample_rate = sample_rate;
        self.calculate_parameters(attack, total);
    }
}
