// Render-side mix: layer registry -> bus gains -> master gain -> limiter

use crate::audio::automation::{AutomatedParam, SETTLE_TIME_CONSTANTS};
use crate::audio::dynamics::Limiter;
use crate::audio::layers::{LayerKey, LayerVoice, MixBus, NatureKind};
use crate::audio::noise::NoiseColor;
use crate::audio::StereoAudioProcessor;
use crate::commands::{MixCommand, MixCommandReceiver};
use crate::config::EngineConfig;
use crate::events::{GraphEvent, GraphEventSender};
use crate::sequencing::RenderClock;

pub const MAX_COMMANDS_PER_BLOCK: usize = 64;

/// One slot per possible key, so the registry never reallocates.
pub const MAX_LAYERS: usize = 1 + NatureKind::ALL.len() + NoiseColor::ALL.len();

/// Exponential fade-ins count as done after this many time constants, so a
/// fade of `seconds` uses `seconds / SETTLE_TIME_CONSTANTS` as its constant.
fn fade_in_constant(seconds: f32) -> f32 {
    seconds / SETTLE_TIME_CONSTANTS
}

#[inline]
fn sanitize(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

struct LayerSlot {
    key: LayerKey,
    voice: Box<LayerVoice>,
    /// Carries a release token while fading out.
    gain: AutomatedParam<()>,
}

pub struct MixGraph {
    sample_rate: f32,
    commands: MixCommandReceiver,
    events: GraphEventSender,
    clock: RenderClock,

    slots: Vec<LayerSlot>,
    buses: [AutomatedParam; 3],
    /// Carries a release-everything token while stopping.
    master: AutomatedParam<()>,
    limiter: Limiter,
}

impl MixGraph {
    pub fn new(
        config: &EngineConfig,
        sample_rate: f32,
        commands: MixCommandReceiver,
        events: GraphEventSender,
        clock: RenderClock,
    ) -> Self {
        Self {
            sample_rate,
            commands,
            events,
            clock,
            slots: Vec::with_capacity(MAX_LAYERS),
            buses: [
                AutomatedParam::new(0.0, sample_rate),
                AutomatedParam::new(0.0, sample_rate),
                AutomatedParam::new(0.0, sample_rate),
            ],
            master: AutomatedParam::new(0.0, sample_rate),
            limiter: Limiter::new(&config.limiter, sample_rate),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn clock(&self) -> &RenderClock {
        &self.clock
    }

    pub fn layer_count(&self) -> usize {
        self.slots.len()
    }

    pub fn layer_keys(&self) -> Vec<LayerKey> {
        let mut keys: Vec<LayerKey> = self.slots.iter().map(|slot| slot.key).collect();
        keys.sort();
        keys
    }

    pub fn layer_gain(&self, key: LayerKey) -> Option<f32> {
        self.slot(key).map(|slot| slot.gain.value())
    }

    /// True while the layer is fading toward release.
    pub fn is_releasing(&self, key: LayerKey) -> bool {
        self.slot(key).is_some_and(|slot| slot.gain.has_completion())
    }

    pub fn bus_gain(&self, bus: MixBus) -> f32 {
        self.buses[bus.index()].value()
    }

    pub fn master_gain(&self) -> f32 {
        self.master.value()
    }

    pub fn is_stopping(&self) -> bool {
        self.master.has_completion()
    }

    fn slot(&self, key: LayerKey) -> Option<&LayerSlot> {
        self.slots.iter().find(|slot| slot.key == key)
    }

    fn slot_mut(&mut self, key: LayerKey) -> Option<&mut LayerSlot> {
        self.slots.iter_mut().find(|slot| slot.key == key)
    }

    /// Renders one block into an interleaved buffer. Channels past the
    /// second are zeroed; a mono device gets the average of both sides.
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = output.len() / channels;
        let mut chunks = output.chunks_mut(channels);
        self.render_frames(frames, |left, right| {
            if let Some(frame) = chunks.next() {
                if frame.len() >= 2 {
                    frame[0] = left;
                    frame[1] = right;
                    for sample in frame.iter_mut().skip(2) {
                        *sample = 0.0;
                    }
                } else {
                    frame[0] = (left + right) * 0.5;
                }
            }
        });
    }

    /// Renders `frames` stereo frames, handing each to `write`, then
    /// advances the render clock.
    pub fn render_frames<F>(&mut self, frames: usize, mut write: F)
    where
        F: FnMut(f32, f32),
    {
        self.drain_commands();
        let start = self.clock.now();
        for i in 0..frames {
            let (left, right) = self.next_frame(start + i as u64);
            write(left, right);
        }
        self.clock.advance(frames as u64);
    }

    fn drain_commands(&mut self) {
        for _ in 0..MAX_COMMANDS_PER_BLOCK {
            match self.commands.try_recv() {
                Some(command) => self.apply(command),
                None => break,
            }
        }
    }

    fn apply(&mut self, command: MixCommand) {
        match command {
            MixCommand::Start { gain, fade_seconds } => {
                self.master.ramp_to(gain, fade_in_constant(fade_seconds));
            }
            MixCommand::Stop { fade_seconds } => {
                self.master.ramp_to_then(0.0, fade_seconds, ());
                for slot in &mut self.slots {
                    slot.gain.ramp_to_then(0.0, fade_seconds, ());
                }
            }
            MixCommand::SetMasterVolume {
                gain,
                time_constant,
            } => {
                // A stop fade owns the master until it completes or a start
                // cancels it
                if !self.master.has_completion() {
                    self.master.ramp_to(gain, time_constant);
                }
            }
            MixCommand::SetBusVolume {
                bus,
                gain,
                time_constant,
            } => {
                self.buses[bus.index()].ramp_to(gain, time_constant);
            }
            MixCommand::SetBeatOffset {
                offset_hz,
                time_constant,
            } => {
                if let Some(slot) = self.slot_mut(LayerKey::Binaural) {
                    if let LayerVoice::Tone(pair) = slot.voice.as_mut() {
                        pair.set_beat_offset(offset_hz, time_constant);
                    }
                }
            }
            MixCommand::AddLayer {
                key,
                voice,
                fade_seconds,
            } => self.add_layer(key, voice, fade_seconds),
            MixCommand::RemoveLayer { key, fade_seconds } => {
                if let Some(slot) = self.slot_mut(key) {
                    if !slot.gain.has_completion() {
                        slot.gain.ramp_to_then(0.0, fade_seconds, ());
                    }
                }
            }
            MixCommand::ScheduleChirp(event) => {
                if let Some(slot) = self.slot_mut(LayerKey::Nature(NatureKind::Birds)) {
                    if let LayerVoice::Birds(birds) = slot.voice.as_mut() {
                        birds.schedule(event);
                    }
                }
            }
        }
    }

    fn add_layer(&mut self, key: LayerKey, voice: Box<LayerVoice>, fade_seconds: f32) {
        let constant = fade_in_constant(fade_seconds);
        if let Some(slot) = self.slot_mut(key) {
            // Revive in place; also cancels a pending release
            slot.gain.ramp_to(1.0, constant);
            if let LayerVoice::Birds(birds) = slot.voice.as_mut() {
                // Chirps from the cancelled scheduler; the new one refills
                birds.clear_pending();
            }
            self.events.send(GraphEvent::VoiceDiscarded { key, voice });
            return;
        }
        if self.slots.len() >= MAX_LAYERS {
            self.events.send(GraphEvent::VoiceDiscarded { key, voice });
            return;
        }

        let mut gain = AutomatedParam::new(0.0, self.sample_rate);
        gain.ramp_to(1.0, constant);
        self.slots.push(LayerSlot { key, voice, gain });
    }

    fn release_slot(&mut self, index: usize) {
        let slot = self.slots.swap_remove(index);
        self.events.send(GraphEvent::LayerReleased {
            key: slot.key,
            voice: slot.voice,
        });
    }

    fn release_all(&mut self) {
        while !self.slots.is_empty() {
            self.release_slot(self.slots.len() - 1);
        }
        self.events.send(GraphEvent::SessionReleased);
    }

    fn next_frame(&mut self, now: u64) -> (f32, f32) {
        let mut sums = [(0.0f32, 0.0f32); 3];

        let mut i = 0;
        while i < self.slots.len() {
            let slot = &mut self.slots[i];
            let gain = slot.gain.next_value();
            let (left, right) = slot.voice.next_frame(now);
            let bus = &mut sums[slot.key.bus().index()];
            bus.0 += left * gain;
            bus.1 += right * gain;

            if slot.gain.take_completion().is_some() {
                self.release_slot(i);
                continue;
            }
            i += 1;
        }

        let mut left = 0.0;
        let mut right = 0.0;
        for (sum, bus) in sums.iter().zip(self.buses.iter_mut()) {
            let gain = bus.next_value();
            left += sum.0 * gain;
            right += sum.1 * gain;
        }

        let master = self.master.next_value();
        let (left, right) = self.limiter.process(left * master, right * master);

        if self.master.take_completion().is_some() {
            self.release_all();
        }

        (sanitize(left), sanitize(right))
    }
}
