use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sample counter advanced by the render path after every block and read by
/// the control side to stamp scheduled events. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct RenderClock {
    current_sample: Arc<AtomicU64>,
}

impl RenderClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered so far.
    pub fn now(&self) -> u64 {
        self.current_sample.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self, frames: u64) {
        self.current_sample.fetch_add(frames, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_basic_operation() {
        let clock = RenderClock::new();
        assert_eq!(clock.now(), 0);

        clock.advance(512);
        assert_eq!(clock.now(), 512);

        clock.advance(512);
        assert_eq!(clock.now(), 1024);
    }

    #[test]
    fn test_clones_share_the_counter() {
        let render_side = RenderClock::new();
        let control_side = render_side.clone();

        let worker = std::thread::spawn(move || {
            for _ in 0..100 {
                render_side.advance(64);
            }
        });
        worker.join().unwrap();

        assert_eq!(control_side.now(), 6400);
    }
}
