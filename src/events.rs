use crate::audio::layers::{LayerKey, LayerVoice};
use crossbeam::queue::SegQueue;
use std::sync::Arc;

/// Render -> control notifications. Voices ride along so they are dropped
/// on the control side, never inside the audio callback.
#[derive(Debug)]
pub enum GraphEvent {
    /// A layer finished its fade-out and left the registry.
    LayerReleased {
        key: LayerKey,
        voice: Box<LayerVoice>,
    },
    /// An added voice was not needed: its slot was revived or the registry
    /// was full.
    VoiceDiscarded {
        key: LayerKey,
        voice: Box<LayerVoice>,
    },
    /// The stop fade completed and the graph is empty.
    SessionReleased,
}

/// Lock-free event queue for render -> control communication
pub struct GraphEventQueue {
    queue: Arc<SegQueue<GraphEvent>>,
}

impl GraphEventQueue {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(SegQueue::new()),
        }
    }

    pub fn sender(&self) -> GraphEventSender {
        GraphEventSender {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn receiver(&self) -> GraphEventReceiver {
        GraphEventReceiver {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl Default for GraphEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender handle for the render path
#[derive(Clone)]
pub struct GraphEventSender {
    queue: Arc<SegQueue<GraphEvent>>,
}

impl GraphEventSender {
    pub fn send(&self, event: GraphEvent) {
        self.queue.push(event);
    }
}

/// Receiver handle for the control side
pub struct GraphEventReceiver {
    queue: Arc<SegQueue<GraphEvent>>,
}

impl GraphEventReceiver {
    /// Drains every pending event.
    pub fn process_events<F>(&self, mut handle_event: F)
    where
        F: FnMut(GraphEvent),
    {
        while let Some(event) = self.queue.pop() {
            handle_event(event);
        }
    }
}
