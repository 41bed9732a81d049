pub mod audio;
mod audio_output;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod liveness;
pub mod sequencing;

pub use audio::layers::{LayerKey, MixBus, NatureKind};
pub use audio::mix_graph::MixGraph;
pub use audio::noise::NoiseColor;
pub use config::EngineConfig;
pub use engine::{Session, SoundscapeEngine};
pub use error::{EngineError, Result};
pub use liveness::{LivenessKeeper, LoggingKeeper};
