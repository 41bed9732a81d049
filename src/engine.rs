// Host-facing control surface: validates requests, builds voices off the
// render path and turns each call into mix commands

use crate::audio::layers::{
    BirdsLayer, ChirpEvent, LayerKey, LayerVoice, MixBus, NatureKind, NatureProfile, NoiseLayer,
    SoundscapeLayer, ToneOscillatorPair,
};
use crate::audio::mix_graph::MixGraph;
use crate::audio::noise::{NoiseBuffer, NoiseBufferFactory, NoiseColor};
use crate::audio_output::AudioOutput;
use crate::commands::{MixCommand, MixCommandQueue, MixCommandSender};
use crate::config::EngineConfig;
use crate::error::{check_range, EngineError, Result};
use crate::events::{GraphEvent, GraphEventQueue, GraphEventReceiver};
use crate::liveness::LivenessKeeper;
use crate::sequencing::{ChirpScheduler, LookaheadTimer, RenderClock};
use std::time::Duration;
use tracing::{debug, info};

/// What the host last asked for. Setters called while stopped only update
/// these targets; they apply on the next start.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub master_volume: f32,
    pub binaural_volume: f32,
    pub nature_volume: f32,
    pub noise_volume: f32,
    pub beat_offset_hz: f32,
    /// Sorted, no duplicates.
    pub natures: Vec<NatureKind>,
    pub noise: Option<NoiseColor>,
    pub playing: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            binaural_volume: 0.5,
            nature_volume: 0.5,
            noise_volume: 0.5,
            beat_offset_hz: 10.0,
            natures: Vec::new(),
            noise: None,
            playing: false,
        }
    }
}

/// Voices and timer for a nature crossfade, built before anything is sent.
struct NatureChange {
    natures: Vec<NatureKind>,
    voices: Vec<(LayerKey, Box<LayerVoice>)>,
    removed: Vec<NatureKind>,
    birds: Option<(LookaheadTimer, Vec<ChirpEvent>)>,
}

enum Backend {
    /// Opened on the first start and kept for the life of the engine.
    Device(Option<AudioOutput>),
    /// The host renders the graph itself.
    Offline(f32),
}

pub struct SoundscapeEngine {
    config: EngineConfig,
    session: Session,

    command_queue: MixCommandQueue,
    commands: MixCommandSender,
    event_queue: GraphEventQueue,
    events: GraphEventReceiver,
    clock: RenderClock,
    backend: Backend,

    rng: fastrand::Rng,
    birds_timer: Option<LookaheadTimer>,
    liveness: Option<Box<dyn LivenessKeeper>>,
}

impl SoundscapeEngine {
    /// Engine on the default output device. The device is opened on the
    /// first [`start`](Self::start).
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_backend(config, Backend::Device(None)))
    }

    /// Engine plus the graph it drives, for hosts that pull audio themselves
    /// via [`MixGraph::render`].
    pub fn offline(config: EngineConfig, sample_rate: f32) -> Result<(Self, MixGraph)> {
        config.validate()?;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(EngineError::invalid(
                "sample_rate",
                format!("{} is not a positive sample rate", sample_rate),
            ));
        }
        let engine = Self::with_backend(config, Backend::Offline(sample_rate));
        let graph = MixGraph::new(
            &engine.config,
            sample_rate,
            engine.command_queue.receiver(),
            engine.event_queue.sender(),
            engine.clock.clone(),
        );
        Ok((engine, graph))
    }

    fn with_backend(config: EngineConfig, backend: Backend) -> Self {
        let command_queue = MixCommandQueue::new();
        let event_queue = GraphEventQueue::new();
        Self {
            rng: config.rng(),
            config,
            session: Session::default(),
            commands: command_queue.sender(),
            events: event_queue.receiver(),
            command_queue,
            event_queue,
            clock: RenderClock::new(),
            backend,
            birds_timer: None,
            liveness: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_playing(&self) -> bool {
        self.session.playing
    }

    pub fn clock(&self) -> &RenderClock {
        &self.clock
    }

    /// The keeper hears about every session start and stop from now on. If a
    /// session is already playing it is told right away.
    pub fn attach_liveness_keeper(&mut self, mut keeper: Box<dyn LivenessKeeper>) {
        if self.session.playing {
            keeper.session_started();
        }
        self.liveness = Some(keeper);
    }

    pub fn start(
        &mut self,
        natures: &[NatureKind],
        noise: Option<NoiseColor>,
        beat_offset_hz: f32,
        master_volume: f32,
    ) -> Result<()> {
        self.reap_released_voices();

        let natures = self.normalize_natures(natures)?;
        let beat_offset_hz = self.check_beat_offset(beat_offset_hz)?;
        let master_volume = check_range("master_volume", master_volume, 0.0, 1.0)?;

        if self.session.playing {
            debug!("Start while playing, retargeting the live session");
            let sample_rate = self.ensure_output()?;
            let nature_change = self.prepare_natures(natures, sample_rate)?;
            let incoming_noise = self.prepare_noise(noise, sample_rate)?;

            self.session.beat_offset_hz = beat_offset_hz;
            self.commands.send(MixCommand::SetBeatOffset {
                offset_hz: beat_offset_hz,
                time_constant: self.config.frequency_time_constant,
            });
            self.session.master_volume = master_volume;
            self.commands.send(MixCommand::SetMasterVolume {
                gain: master_volume,
                time_constant: self.config.volume_time_constant,
            });
            self.apply_natures(nature_change);
            self.apply_noise(noise, incoming_noise);
            return Ok(());
        }

        let sample_rate = self.ensure_output()?;

        // Everything fallible happens before the first command goes out
        let mut keys = vec![LayerKey::Binaural];
        keys.extend(natures.iter().map(|kind| LayerKey::Nature(*kind)));
        keys.extend(noise.map(LayerKey::Noise));
        let mut voices = Vec::with_capacity(keys.len());
        for key in keys {
            voices.push((key, self.build_voice(key, sample_rate, beat_offset_hz)?));
        }
        let birds = if natures.contains(&NatureKind::Birds) {
            Some(self.spawn_birds_timer(sample_rate)?)
        } else {
            None
        };

        self.session.beat_offset_hz = beat_offset_hz;
        self.session.master_volume = master_volume;
        for bus in MixBus::ALL {
            self.send_bus_volume(bus);
        }
        for (key, voice) in voices {
            self.add_layer(key, voice);
        }
        // A binaural slot revived from a stop fade keeps its old offset
        self.commands.send(MixCommand::SetBeatOffset {
            offset_hz: beat_offset_hz,
            time_constant: self.config.frequency_time_constant,
        });
        self.commands.send(MixCommand::Start {
            gain: master_volume,
            fade_seconds: self.config.master_fade_seconds,
        });
        if let Some((timer, initial)) = birds {
            self.send_chirps(initial);
            self.birds_timer = Some(timer);
        }

        info!(
            natures = ?natures,
            noise = ?noise,
            beat_offset_hz,
            master_volume,
            sample_rate,
            "Session started"
        );
        self.session.natures = natures;
        self.session.noise = noise;
        self.session.playing = true;
        if let Some(keeper) = self.liveness.as_mut() {
            keeper.session_started();
        }
        Ok(())
    }

    /// Fades everything out and releases the voices once silent. No-op when
    /// stopped.
    pub fn stop(&mut self) {
        self.reap_released_voices();
        if !self.session.playing {
            return;
        }

        if let Some(mut timer) = self.birds_timer.take() {
            timer.cancel();
        }
        self.commands.send(MixCommand::Stop {
            fade_seconds: self.config.master_fade_seconds,
        });
        self.session.playing = false;
        info!("Session stopping");
        if let Some(keeper) = self.liveness.as_mut() {
            keeper.session_stopped();
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        let volume = check_range("master_volume", volume, 0.0, 1.0)?;
        self.session.master_volume = volume;
        if self.session.playing {
            self.commands.send(MixCommand::SetMasterVolume {
                gain: volume,
                time_constant: self.config.volume_time_constant,
            });
        }
        Ok(())
    }

    pub fn set_binaural_volume(&mut self, volume: f32) -> Result<()> {
        self.session.binaural_volume = check_range("binaural_volume", volume, 0.0, 1.0)?;
        if self.session.playing {
            self.send_bus_volume(MixBus::Binaural);
        }
        Ok(())
    }

    pub fn set_nature_volume(&mut self, volume: f32) -> Result<()> {
        self.session.nature_volume = check_range("nature_volume", volume, 0.0, 1.0)?;
        if self.session.playing {
            self.send_bus_volume(MixBus::Nature);
        }
        Ok(())
    }

    pub fn set_noise_volume(&mut self, volume: f32) -> Result<()> {
        self.session.noise_volume = check_range("noise_volume", volume, 0.0, 1.0)?;
        if self.session.playing {
            self.send_bus_volume(MixBus::Noise);
        }
        Ok(())
    }

    /// Glides the beat to `offset_hz` without restarting the carriers.
    pub fn update_frequency(&mut self, offset_hz: f32) -> Result<()> {
        let offset_hz = self.check_beat_offset(offset_hz)?;
        self.session.beat_offset_hz = offset_hz;
        if self.session.playing {
            self.commands.send(MixCommand::SetBeatOffset {
                offset_hz,
                time_constant: self.config.frequency_time_constant,
            });
        }
        Ok(())
    }

    /// Crossfades the active nature layers to exactly `natures`.
    pub fn update_natures(&mut self, natures: &[NatureKind]) -> Result<()> {
        self.reap_released_voices();
        let natures = self.normalize_natures(natures)?;
        if !self.session.playing {
            self.session.natures = natures;
            return Ok(());
        }

        let sample_rate = self.ensure_output()?;
        let change = self.prepare_natures(natures, sample_rate)?;
        self.apply_natures(change);
        Ok(())
    }

    /// Crossfades the noise bed to `color`, or fades it out for `None`.
    pub fn update_noise(&mut self, color: Option<NoiseColor>) -> Result<()> {
        self.reap_released_voices();
        if !self.session.playing {
            self.session.noise = color;
            return Ok(());
        }
        if self.session.noise == color {
            return Ok(());
        }

        let sample_rate = self.ensure_output()?;
        let incoming = self.prepare_noise(color, sample_rate)?;
        self.apply_noise(color, incoming);
        Ok(())
    }

    /// Drops voices the render path has handed back. Called by every control
    /// operation; hosts with long idle periods may call it themselves.
    /// Returns how many voices were dropped.
    pub fn reap_released_voices(&mut self) -> usize {
        let mut dropped = 0;
        self.events.process_events(|event| match event {
            GraphEvent::LayerReleased { key, voice } => {
                debug!(layer = %key, "Released {:?}", voice);
                dropped += 1;
            }
            GraphEvent::VoiceDiscarded { key, voice } => {
                debug!(layer = %key, "Discarded unused {:?}", voice);
                dropped += 1;
            }
            GraphEvent::SessionReleased => info!("Session released"),
        });
        dropped
    }

    /// Builds everything a nature crossfade needs. Nothing is sent, so an
    /// error leaves the live session untouched.
    fn prepare_natures(
        &mut self,
        natures: Vec<NatureKind>,
        sample_rate: f32,
    ) -> Result<NatureChange> {
        let added: Vec<NatureKind> = natures
            .iter()
            .copied()
            .filter(|kind| !self.session.natures.contains(kind))
            .collect();
        let removed: Vec<NatureKind> = self
            .session
            .natures
            .iter()
            .copied()
            .filter(|kind| !natures.contains(kind))
            .collect();

        let mut voices = Vec::with_capacity(added.len());
        for kind in &added {
            let key = LayerKey::Nature(*kind);
            voices.push((key, self.build_voice(key, sample_rate, self.session.beat_offset_hz)?));
        }
        let birds = if added.contains(&NatureKind::Birds) {
            Some(self.spawn_birds_timer(sample_rate)?)
        } else {
            None
        };
        Ok(NatureChange {
            natures,
            voices,
            removed,
            birds,
        })
    }

    fn apply_natures(&mut self, change: NatureChange) {
        // New layers start before old ones go away
        for (key, voice) in change.voices {
            self.add_layer(key, voice);
        }
        for kind in &change.removed {
            self.remove_layer(LayerKey::Nature(*kind));
        }
        if change.removed.contains(&NatureKind::Birds) {
            if let Some(mut timer) = self.birds_timer.take() {
                timer.cancel();
            }
        }
        if let Some((timer, initial)) = change.birds {
            self.send_chirps(initial);
            self.birds_timer = Some(timer);
        }
        self.session.natures = change.natures;
    }

    fn prepare_noise(
        &mut self,
        color: Option<NoiseColor>,
        sample_rate: f32,
    ) -> Result<Option<(LayerKey, Box<LayerVoice>)>> {
        match color {
            Some(color) if self.session.noise != Some(color) => {
                let key = LayerKey::Noise(color);
                let voice = self.build_voice(key, sample_rate, self.session.beat_offset_hz)?;
                Ok(Some((key, voice)))
            }
            _ => Ok(None),
        }
    }

    fn apply_noise(
        &mut self,
        color: Option<NoiseColor>,
        incoming: Option<(LayerKey, Box<LayerVoice>)>,
    ) {
        if self.session.noise == color {
            return;
        }
        if let Some((key, voice)) = incoming {
            self.add_layer(key, voice);
        }
        if let Some(previous) = self.session.noise {
            self.remove_layer(LayerKey::Noise(previous));
        }
        self.session.noise = color;
    }

    fn ensure_output(&mut self) -> Result<f32> {
        match &mut self.backend {
            Backend::Offline(sample_rate) => Ok(*sample_rate),
            Backend::Device(Some(output)) => Ok(output.sample_rate()),
            Backend::Device(slot) => {
                let output = AudioOutput::open(
                    &self.config,
                    self.command_queue.receiver(),
                    self.event_queue.sender(),
                    self.clock.clone(),
                )?;
                let sample_rate = output.sample_rate();
                *slot = Some(output);
                Ok(sample_rate)
            }
        }
    }

    fn normalize_natures(&self, natures: &[NatureKind]) -> Result<Vec<NatureKind>> {
        let mut natures = natures.to_vec();
        natures.sort();
        natures.dedup();
        if natures.len() > self.config.max_nature_layers {
            return Err(EngineError::invalid(
                "natures",
                format!(
                    "{} kinds requested, at most {} allowed",
                    natures.len(),
                    self.config.max_nature_layers
                ),
            ));
        }
        Ok(natures)
    }

    fn check_beat_offset(&self, offset_hz: f32) -> Result<f32> {
        check_range("beat_offset_hz", offset_hz, 0.0, self.config.max_beat_offset_hz)
    }

    fn bus_gain(&self, bus: MixBus) -> f32 {
        let headroom = &self.config.headroom;
        match bus {
            MixBus::Binaural => self.session.binaural_volume * headroom.binaural,
            MixBus::Nature => self.session.nature_volume * headroom.nature,
            MixBus::Noise => self.session.noise_volume * headroom.noise,
        }
    }

    fn send_bus_volume(&self, bus: MixBus) {
        self.commands.send(MixCommand::SetBusVolume {
            bus,
            gain: self.bus_gain(bus),
            time_constant: self.config.volume_time_constant,
        });
    }

    fn add_layer(&self, key: LayerKey, voice: Box<LayerVoice>) {
        debug!(layer = %key, "Adding layer");
        self.commands.send(MixCommand::AddLayer {
            key,
            voice,
            fade_seconds: self.config.layer_fade_seconds,
        });
    }

    fn remove_layer(&self, key: LayerKey) {
        debug!(layer = %key, "Removing layer");
        self.commands.send(MixCommand::RemoveLayer {
            key,
            fade_seconds: self.config.layer_fade_seconds,
        });
    }

    fn send_chirps(&self, events: Vec<ChirpEvent>) {
        for event in events {
            self.commands.send(MixCommand::ScheduleChirp(event));
        }
    }

    fn noise_buffer(&mut self, color: NoiseColor, sample_rate: f32) -> Result<NoiseBuffer> {
        NoiseBufferFactory::generate(
            color,
            self.config.noise_buffer_seconds,
            self.config.loop_fade_seconds,
            sample_rate,
            &mut self.rng,
        )
    }

    fn build_voice(
        &mut self,
        key: LayerKey,
        sample_rate: f32,
        beat_offset_hz: f32,
    ) -> Result<Box<LayerVoice>> {
        let voice = match key {
            LayerKey::Binaural => LayerVoice::Tone(ToneOscillatorPair::new(
                self.config.base_frequency_hz,
                beat_offset_hz,
                sample_rate,
            )),
            LayerKey::Nature(NatureKind::Birds) => {
                let breeze = self.noise_buffer(NoiseColor::Pink, sample_rate)?;
                LayerVoice::Birds(BirdsLayer::new(
                    breeze,
                    &self.config.birds,
                    sample_rate,
                    &mut self.rng,
                )?)
            }
            LayerKey::Nature(kind) => {
                let profile = NatureProfile::for_kind(kind).ok_or_else(|| {
                    EngineError::invalid("natures", format!("{} has no profile", kind))
                })?;
                let buffer = self.noise_buffer(profile.noise, sample_rate)?;
                LayerVoice::Soundscape(SoundscapeLayer::new(
                    kind,
                    buffer,
                    sample_rate,
                    &mut self.rng,
                )?)
            }
            LayerKey::Noise(color) => {
                let buffer = self.noise_buffer(color, sample_rate)?;
                LayerVoice::Noise(NoiseLayer::new(buffer, &mut self.rng))
            }
        };
        Ok(Box::new(voice))
    }

    /// Fills the first horizon synchronously and hands the scheduler to a
    /// timer thread for the rest of the session.
    fn spawn_birds_timer(&mut self, sample_rate: f32) -> Result<(LookaheadTimer, Vec<ChirpEvent>)> {
        let mut scheduler = ChirpScheduler::new(
            self.config.birds,
            sample_rate,
            fastrand::Rng::with_seed(self.rng.u64(..)),
        );
        let mut initial = Vec::new();
        scheduler.fill_horizon(self.clock.now(), &mut initial);

        let clock = self.clock.clone();
        let commands = self.commands.clone();
        let period = Duration::from_secs_f32(self.config.birds.tick_seconds);
        let timer = LookaheadTimer::spawn(period, move || {
            let mut events = Vec::new();
            let bursts = scheduler.fill_horizon(clock.now(), &mut events);
            if bursts > 0 {
                debug!(bursts, tones = events.len(), "Scheduled chirp bursts");
            }
            for event in events {
                commands.send(MixCommand::ScheduleChirp(event));
            }
        })?;
        Ok((timer, initial))
    }
}

impl Drop for SoundscapeEngine {
    fn drop(&mut self) {
        if let Some(mut timer) = self.birds_timer.take() {
            timer.cancel();
        }
        if self.session.playing {
            if let Some(keeper) = self.liveness.as_mut() {
                keeper.session_stopped();
            }
        }
        // Dropping the backend closes the device stream without a fade
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SAMPLE_RATE: f32 = 8000.0;

    fn engine() -> (SoundscapeEngine, MixGraph) {
        let config = EngineConfig {
            noise_buffer_seconds: 1.0,
            loop_fade_seconds: 0.1,
            seed: Some(99),
            ..EngineConfig::default()
        };
        SoundscapeEngine::offline(config, SAMPLE_RATE).unwrap()
    }

    fn render(graph: &mut MixGraph, seconds: f32) -> Vec<f32> {
        let mut output = vec![0.0; (seconds * SAMPLE_RATE) as usize * 2];
        graph.render(&mut output, 2);
        output
    }

    fn sea() -> LayerKey {
        LayerKey::Nature(NatureKind::Sea)
    }

    fn wind() -> LayerKey {
        LayerKey::Nature(NatureKind::Wind)
    }

    #[test]
    fn test_end_to_end_session() {
        let (mut engine, mut graph) = engine();

        engine.start(&[NatureKind::Sea], None, 5.0, 0.6).unwrap();
        render(&mut graph, 2.0);
        assert_eq!(graph.layer_keys(), vec![LayerKey::Binaural, sea()]);
        assert!((graph.master_gain() - 0.6).abs() < 1e-3);
        assert!((graph.layer_gain(sea()).unwrap() - 1.0).abs() < 1e-3);

        engine.set_nature_volume(0.2).unwrap();
        render(&mut graph, 1.0);
        let expected = 0.2 * engine.config().headroom.nature;
        assert!((graph.bus_gain(MixBus::Nature) - expected).abs() < 1e-3);

        engine
            .update_natures(&[NatureKind::Sea, NatureKind::Wind])
            .unwrap();
        render(&mut graph, 0.1);
        let wind_gain = graph.layer_gain(wind()).unwrap();
        assert!(wind_gain > 0.0 && wind_gain < 1.0, "Wind fades in: {}", wind_gain);
        assert!((graph.layer_gain(sea()).unwrap() - 1.0).abs() < 1e-3, "Sea is not interrupted");
        render(&mut graph, 1.0);
        assert!((graph.layer_gain(wind()).unwrap() - 1.0).abs() < 1e-3);

        engine.stop();
        render(&mut graph, 0.5);
        assert_eq!(graph.layer_count(), 3);
        for key in [LayerKey::Binaural, sea(), wind()] {
            let gain = graph.layer_gain(key).unwrap();
            assert!(gain > 0.0 && gain < 1.0, "{} should be mid-fade, at {}", key, gain);
        }
        assert_eq!(engine.reap_released_voices(), 0);

        let tail = render(&mut graph, 0.6);
        assert_eq!(graph.layer_count(), 0);
        assert_eq!(engine.reap_released_voices(), 3);
        assert!(tail[tail.len() - 200..].iter().all(|&s| s == 0.0));
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_invalid_parameters_change_nothing() {
        let (mut engine, mut graph) = engine();

        assert!(matches!(
            engine.start(&[NatureKind::Rain], None, 5.0, 1.5),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(engine.start(&[], None, 80.0, 0.5).is_err());
        assert!(engine.start(&[], None, f32::NAN, 0.5).is_err());
        assert!(engine
            .start(
                &[NatureKind::Rain, NatureKind::Sea, NatureKind::Night],
                None,
                5.0,
                0.5
            )
            .is_err());

        render(&mut graph, 0.5);
        assert_eq!(graph.layer_count(), 0);
        assert_eq!(engine.session(), &Session::default());

        engine.start(&[], None, 5.0, 0.5).unwrap();
        let before = engine.session().clone();
        assert!(engine.set_master_volume(-0.1).is_err());
        assert!(engine.set_noise_volume(f32::INFINITY).is_err());
        assert!(engine.update_frequency(-1.0).is_err());
        assert_eq!(engine.session(), &before);
    }

    #[test]
    fn test_duplicate_kinds_collapse() {
        let (mut engine, mut graph) = engine();
        engine
            .start(&[NatureKind::Rain, NatureKind::Rain], None, 5.0, 0.5)
            .unwrap();
        render(&mut graph, 0.1);
        assert_eq!(engine.session().natures, vec![NatureKind::Rain]);
        assert_eq!(graph.layer_count(), 2);
    }

    #[test]
    fn test_setters_while_stopped_apply_on_start() {
        let (mut engine, mut graph) = engine();
        engine.set_noise_volume(0.3).unwrap();
        engine.update_noise(Some(NoiseColor::Pink)).unwrap();
        engine.update_frequency(7.0).unwrap();
        render(&mut graph, 0.5);
        assert_eq!(graph.layer_count(), 0);
        assert_eq!(graph.bus_gain(MixBus::Noise), 0.0);

        let noise = engine.session().noise;
        engine.start(&[], noise, 7.0, 0.5).unwrap();
        render(&mut graph, 1.0);
        let expected = 0.3 * engine.config().headroom.noise;
        assert!((graph.bus_gain(MixBus::Noise) - expected).abs() < 1e-3);
        assert_eq!(
            graph.layer_keys(),
            vec![LayerKey::Binaural, LayerKey::Noise(NoiseColor::Pink)]
        );
    }

    #[test]
    fn test_stop_then_start_does_not_duplicate() {
        let (mut engine, mut graph) = engine();
        let natures = [NatureKind::Rain, NatureKind::Birds];

        engine
            .start(&natures, Some(NoiseColor::Brown), 10.0, 0.5)
            .unwrap();
        render(&mut graph, 2.0);
        engine.stop();
        render(&mut graph, 0.3);
        engine
            .start(&natures, Some(NoiseColor::Brown), 10.0, 0.5)
            .unwrap();
        render(&mut graph, 2.0);

        assert_eq!(
            graph.layer_keys(),
            vec![
                LayerKey::Binaural,
                LayerKey::Nature(NatureKind::Rain),
                LayerKey::Nature(NatureKind::Birds),
                LayerKey::Noise(NoiseColor::Brown),
            ]
        );
        assert!(!graph.is_stopping());
        // The four freshly built voices were not needed
        assert_eq!(engine.reap_released_voices(), 4);

        engine.stop();
        engine.stop();
        render(&mut graph, 1.1);
        assert_eq!(graph.layer_count(), 0);
    }

    #[test]
    fn test_noise_color_swap_crossfades() {
        let (mut engine, mut graph) = engine();
        engine
            .start(&[], Some(NoiseColor::White), 5.0, 0.5)
            .unwrap();
        render(&mut graph, 2.0);

        engine.update_noise(Some(NoiseColor::Brown)).unwrap();
        render(&mut graph, 0.1);
        assert!(graph.layer_gain(LayerKey::Noise(NoiseColor::White)).is_some());
        assert!(graph.layer_gain(LayerKey::Noise(NoiseColor::Brown)).is_some());

        render(&mut graph, 1.0);
        assert_eq!(
            graph.layer_keys(),
            vec![LayerKey::Binaural, LayerKey::Noise(NoiseColor::Brown)]
        );
        assert_eq!(engine.reap_released_voices(), 1);

        engine.update_noise(None).unwrap();
        render(&mut graph, 1.0);
        assert_eq!(graph.layer_keys(), vec![LayerKey::Binaural]);
    }

    #[test]
    fn test_layer_updates_are_idempotent() {
        let (mut engine, mut graph) = engine();
        engine.start(&[], None, 5.0, 0.5).unwrap();

        engine.update_natures(&[NatureKind::Rain]).unwrap();
        engine.update_natures(&[NatureKind::Rain]).unwrap();
        engine.update_natures(&[]).unwrap();
        engine.update_natures(&[]).unwrap();
        engine.update_natures(&[NatureKind::Forest]).unwrap();
        engine.update_noise(None).unwrap();
        render(&mut graph, 1.5);

        assert_eq!(
            graph.layer_keys(),
            vec![LayerKey::Binaural, LayerKey::Nature(NatureKind::Forest)]
        );
        assert_eq!(engine.session().natures, vec![NatureKind::Forest]);
    }

    #[test]
    fn test_failed_retarget_leaves_session_untouched() {
        let (mut engine, mut graph) = engine();
        engine.start(&[NatureKind::Rain], None, 5.0, 0.5).unwrap();
        render(&mut graph, 2.0);

        // Any noise buffer built from here on fails
        engine.config.noise_buffer_seconds = -1.0;
        let before = engine.session().clone();
        assert!(engine
            .start(&[], Some(NoiseColor::Pink), 12.0, 0.9)
            .is_err());
        assert_eq!(engine.session(), &before);

        render(&mut graph, 1.0);
        assert_eq!(
            graph.layer_keys(),
            vec![LayerKey::Binaural, LayerKey::Nature(NatureKind::Rain)]
        );
        assert!(!graph.is_releasing(LayerKey::Nature(NatureKind::Rain)));
        assert!((graph.master_gain() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_master_volume_last_write_wins() {
        let (mut engine, mut graph) = engine();
        engine.start(&[], None, 5.0, 0.5).unwrap();
        render(&mut graph, 2.0);

        engine.set_master_volume(0.2).unwrap();
        engine.set_master_volume(0.9).unwrap();
        render(&mut graph, 1.0);
        assert!((graph.master_gain() - 0.9).abs() < 1e-3);
        assert_eq!(engine.session().master_volume, 0.9);
    }

    #[test]
    fn test_liveness_keeper_follows_sessions() {
        struct Counting(Arc<AtomicUsize>, Arc<AtomicUsize>);

        impl LivenessKeeper for Counting {
            fn session_started(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }

            fn session_stopped(&mut self) {
                self.1.fetch_add(1, Ordering::SeqCst);
            }
        }

        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let (mut engine, _graph) = engine();
        engine.attach_liveness_keeper(Box::new(Counting(
            Arc::clone(&started),
            Arc::clone(&stopped),
        )));

        engine.start(&[], None, 5.0, 0.5).unwrap();
        engine.stop();
        engine.stop();
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);

        engine.start(&[], None, 5.0, 0.5).unwrap();
        drop(engine);
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_offline_rejects_bad_sample_rate() {
        assert!(SoundscapeEngine::offline(EngineConfig::default(), 0.0).is_err());
    }
}
