use crate::audio::layers::{ChirpEvent, LayerKey, LayerVoice, MixBus};
use crossbeam::queue::SegQueue;
use std::sync::Arc;

/// Automation requests from the control side. Every gain or frequency change
/// becomes a ramp that starts in the render block that drains the command.
#[derive(Debug)]
pub enum MixCommand {
    /// Fade the master in to `gain`. Cancels a stop fade in flight.
    Start { gain: f32, fade_seconds: f32 },
    /// Fade master and every layer to silence, then release all voices.
    Stop { fade_seconds: f32 },
    SetMasterVolume { gain: f32, time_constant: f32 },
    SetBusVolume {
        bus: MixBus,
        gain: f32,
        time_constant: f32,
    },
    SetBeatOffset { offset_hz: f32, time_constant: f32 },
    /// Fade a layer in. If a slot with this key still exists (for instance
    /// fading out), that slot is revived and `voice` comes back unused.
    AddLayer {
        key: LayerKey,
        voice: Box<LayerVoice>,
        fade_seconds: f32,
    },
    /// Fade a layer out and release it once silent. No-op for absent keys.
    RemoveLayer { key: LayerKey, fade_seconds: f32 },
    ScheduleChirp(ChirpEvent),
}

/// Lock-free command queue for the render path.
/// Multiple producers (engine, lookahead timer), one consumer (render).
pub struct MixCommandQueue {
    queue: Arc<SegQueue<MixCommand>>,
}

impl MixCommandQueue {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(SegQueue::new()),
        }
    }

    pub fn sender(&self) -> MixCommandSender {
        MixCommandSender {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn receiver(&self) -> MixCommandReceiver {
        MixCommandReceiver {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl Default for MixCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct MixCommandSender {
    queue: Arc<SegQueue<MixCommand>>,
}

impl MixCommandSender {
    /// Never blocks.
    pub fn send(&self, command: MixCommand) {
        self.queue.push(command);
    }
}

pub struct MixCommandReceiver {
    queue: Arc<SegQueue<MixCommand>>,
}

impl MixCommandReceiver {
    pub fn try_recv(&self) -> Option<MixCommand> {
        self.queue.pop()
    }

    pub fn has_commands(&self) -> bool {
        !self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let queue = MixCommandQueue::new();
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.send(MixCommand::SetMasterVolume {
            gain: 0.2,
            time_constant: 0.05,
        });
        sender.clone().send(MixCommand::SetMasterVolume {
            gain: 0.7,
            time_constant: 0.05,
        });

        let gains: Vec<f32> = std::iter::from_fn(|| receiver.try_recv())
            .map(|command| match command {
                MixCommand::SetMasterVolume { gain, .. } => gain,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(gains, vec![0.2, 0.7]);
        assert!(!receiver.has_commands());
    }
}
