// Look-ahead chirp scheduling. Bursts are synthesized on the control side
// and handed to the render path stamped with render clock positions

use crate::audio::layers::ChirpEvent;
use crate::config::BirdsConfig;
use crate::error::Result;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Frequency ranges of the three "species", in Hz.
const SPECIES_BANDS: [(f32, f32); 3] = [(1800.0, 2600.0), (2800.0, 4000.0), (4200.0, 5800.0)];

const MIN_TONES: usize = 2;
const MAX_TONES: usize = 6;
const MIN_TONE_SECONDS: f32 = 0.4;
const MAX_TONE_SECONDS: f32 = 0.8;
const MAX_TONE_OFFSET_SECONDS: f32 = 0.6;
const MIN_ATTACK_SECONDS: f32 = 0.02;
const MAX_ATTACK_SECONDS: f32 = 0.04;
const MIN_PEAK: f32 = 0.04;
const MAX_PEAK: f32 = 0.18;
/// Sweep spans between these frequency ratios, up or down.
const MIN_SWEEP_RATIO: f32 = 1.15;
const MAX_SWEEP_RATIO: f32 = 1.8;
const MAX_PAN: f32 = 0.8;

#[inline]
fn uniform(rng: &mut fastrand::Rng, min: f32, max: f32) -> f32 {
    min + rng.f32() * (max - min)
}

pub struct ChirpScheduler {
    config: BirdsConfig,
    sample_rate: f32,
    rng: fastrand::Rng,
    next_event_sample: Option<u64>,
}

impl ChirpScheduler {
    pub fn new(config: BirdsConfig, sample_rate: f32, rng: fastrand::Rng) -> Self {
        Self {
            config,
            sample_rate,
            rng,
            next_event_sample: None,
        }
    }

    /// Where the next burst will go; `None` before the first fill.
    pub fn next_event_sample(&self) -> Option<u64> {
        self.next_event_sample
    }

    fn seconds_to_samples(&self, seconds: f32) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }

    /// Synthesizes every burst due before `now + window` into `out` and
    /// returns how many bursts were added.
    pub fn fill_horizon(&mut self, now: u64, out: &mut Vec<ChirpEvent>) -> usize {
        let horizon = now + self.seconds_to_samples(self.config.window_seconds);

        let mut next = match self.next_event_sample {
            Some(next) if next >= now => next,
            Some(next) => {
                debug!(
                    behind_seconds = (now - next) as f32 / self.sample_rate,
                    "Chirp horizon fell behind the render clock, skipping ahead"
                );
                now
            }
            None => now,
        };

        let mut bursts = 0;
        while next < horizon {
            self.synthesize_burst(next, out);
            bursts += 1;
            let gap = uniform(
                &mut self.rng,
                self.config.min_gap_seconds,
                self.config.max_gap_seconds,
            );
            // Always move forward, even with a degenerate gap
            next += self.seconds_to_samples(gap).max(1);
        }
        self.next_event_sample = Some(next);
        bursts
    }

    fn synthesize_burst(&mut self, at: u64, out: &mut Vec<ChirpEvent>) {
        let (band_low, band_high) = SPECIES_BANDS[self.rng.usize(..SPECIES_BANDS.len())];
        let tones = self.rng.usize(MIN_TONES..=MAX_TONES);

        for _ in 0..tones {
            let offset = uniform(&mut self.rng, 0.0, MAX_TONE_OFFSET_SECONDS);
            let start_hz = uniform(&mut self.rng, band_low, band_high);
            let ratio = uniform(&mut self.rng, MIN_SWEEP_RATIO, MAX_SWEEP_RATIO);
            let end_hz = if self.rng.bool() {
                start_hz * ratio
            } else {
                start_hz / ratio
            };

            out.push(ChirpEvent {
                start_sample: at + self.seconds_to_samples(offset),
                duration: uniform(&mut self.rng, MIN_TONE_SECONDS, MAX_TONE_SECONDS),
                attack: uniform(&mut self.rng, MIN_ATTACK_SECONDS, MAX_ATTACK_SECONDS),
                start_hz,
                end_hz,
                peak: uniform(&mut self.rng, MIN_PEAK, MAX_PEAK),
                pan: uniform(&mut self.rng, -MAX_PAN, MAX_PAN),
            });
        }
    }
}

/// Wall-clock worker that calls `on_tick` every `period` until cancelled.
/// The first tick comes one period after spawning; callers fill the initial
/// horizon themselves. Dropping the timer cancels it and joins the thread.
pub struct LookaheadTimer {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LookaheadTimer {
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, cancelled) = channel::bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("soundscape-lookahead".to_string())
            .spawn(move || {
                loop {
                    match cancelled.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => on_tick(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    /// Stops scheduling. No tick runs after this returns.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // A full channel means a cancel is already pending
            let _ = cancel.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Lookahead timer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for LookaheadTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::layers::BirdsLayer;
    use crate::audio::noise::{NoiseBufferFactory, NoiseColor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SAMPLE_RATE: f32 = 8000.0;

    fn scheduler(seed: u64) -> ChirpScheduler {
        ChirpScheduler::new(
            BirdsConfig::default(),
            SAMPLE_RATE,
            fastrand::Rng::with_seed(seed),
        )
    }

    fn seconds(s: f32) -> u64 {
        (s * SAMPLE_RATE) as u64
    }

    #[test]
    fn test_fill_covers_the_window() {
        let mut scheduler = scheduler(1);
        let mut events = Vec::new();
        let bursts = scheduler.fill_horizon(0, &mut events);

        let next = scheduler.next_event_sample().unwrap();
        println!("{} bursts, {} tones, next burst at {:.2}s", bursts, events.len(), next as f32 / SAMPLE_RATE);
        assert!(bursts >= 1);
        assert!(next >= seconds(5.0));
        assert!(events.len() >= bursts * MIN_TONES && events.len() <= bursts * MAX_TONES);

        for event in &events {
            assert!(event.start_sample < seconds(5.0 + MAX_TONE_OFFSET_SECONDS) + 1);
            assert!(event.duration >= MIN_TONE_SECONDS && event.duration <= MAX_TONE_SECONDS);
            assert!(event.attack >= MIN_ATTACK_SECONDS && event.attack <= MAX_ATTACK_SECONDS);
            assert!(event.pan.abs() <= MAX_PAN);
            assert!(event.start_hz >= SPECIES_BANDS[0].0 && event.start_hz <= SPECIES_BANDS[2].1);
            assert_ne!(event.start_hz, event.end_hz);
        }
    }

    #[test]
    fn test_tick_within_window_adds_only_new_bursts() {
        let mut scheduler = scheduler(2);
        let mut first = Vec::new();
        scheduler.fill_horizon(0, &mut first);
        let next = scheduler.next_event_sample().unwrap();

        // Tick delayed by 4 seconds
        let mut second = Vec::new();
        scheduler.fill_horizon(seconds(4.0), &mut second);

        assert!(
            second.iter().all(|event| event.start_sample >= next),
            "A refill must not duplicate or catch up earlier bursts"
        );
        assert!(scheduler.next_event_sample().unwrap() >= seconds(9.0));
    }

    #[test]
    fn test_starved_scheduler_tops_up_instead_of_catching_up() {
        let mut scheduler = scheduler(3);
        let mut events = Vec::new();
        scheduler.fill_horizon(0, &mut events);

        let resumed_at = seconds(60.0);
        let mut refill = Vec::new();
        let bursts = scheduler.fill_horizon(resumed_at, &mut refill);

        // At most one burst per minimum gap across the window
        let max_bursts = (5.0 / BirdsConfig::default().min_gap_seconds) as usize + 1;
        println!("Refilled {} bursts after a 60s stall", bursts);
        assert!(bursts >= 1 && bursts <= max_bursts);
        assert!(refill.iter().all(|event| event.start_sample >= resumed_at));
    }

    #[test]
    fn test_scheduled_horizon_plays_while_ticks_are_delayed() {
        let mut rng = fastrand::Rng::with_seed(4);
        let breeze =
            NoiseBufferFactory::generate(NoiseColor::Pink, 1.0, 0.1, SAMPLE_RATE, &mut rng).unwrap();
        let mut birds = BirdsLayer::new(breeze, &BirdsConfig::default(), SAMPLE_RATE, &mut rng).unwrap();

        let mut scheduler = scheduler(4);
        let mut events = Vec::new();
        scheduler.fill_horizon(0, &mut events);
        for event in &events {
            assert!(birds.schedule(*event));
        }

        // No tick for 4 seconds: the render path plays what it already has
        let stalled = seconds(4.0);
        for now in 0..stalled {
            birds.next_frame(now);
        }
        let still_due = events.iter().filter(|event| event.start_sample >= stalled).count();
        assert_eq!(birds.pending_count(), still_due);
        assert!(events.iter().any(|event| event.start_sample < stalled));
    }

    #[test]
    fn test_timer_ticks_and_cancels() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let mut timer = LookaheadTimer::spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        timer.cancel();
        assert!(!timer.is_running());

        let after_cancel = ticks.load(Ordering::SeqCst);
        assert!(after_cancel >= 2, "Expected several ticks, got {}", after_cancel);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }
}
