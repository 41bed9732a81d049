// Soundscape CLI - plays a session on the default output device

use clap::Parser;
use soundscape_engine_lib::{
    EngineConfig, LoggingKeeper, NatureKind, NoiseColor, SoundscapeEngine,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const OFFLINE_BLOCK_FRAMES: usize = 512;

#[derive(Parser)]
#[command(name = "soundscape")]
#[command(about = "Binaural beats over procedural nature and noise beds", long_about = None)]
struct Cli {
    /// Nature layers, comma separated (rain, wind, sea, night, forest, birds)
    #[arg(short, long, value_delimiter = ',')]
    nature: Vec<NatureKind>,

    /// Noise bed color (white, pink, brown)
    #[arg(long)]
    noise: Option<NoiseColor>,

    /// Binaural beat offset in Hz
    #[arg(short, long, default_value = "10.0")]
    beat: f32,

    /// Master volume 0.0-1.0
    #[arg(short, long, default_value = "0.8")]
    volume: f32,

    /// How long to play before fading out
    #[arg(short, long, default_value = "30.0")]
    seconds: f32,

    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render without an audio device and report the output level
    #[arg(long)]
    offline: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if cli.offline {
        return render_offline(&cli, config);
    }

    let fade = Duration::from_secs_f32(config.master_fade_seconds);
    let mut engine = SoundscapeEngine::new(config)?;
    engine.attach_liveness_keeper(Box::new(LoggingKeeper));
    engine.start(&cli.nature, cli.noise, cli.beat, cli.volume)?;

    std::thread::sleep(Duration::from_secs_f32(cli.seconds.max(0.0)));

    engine.stop();
    // Let the fade finish before the stream goes away
    std::thread::sleep(fade + Duration::from_millis(200));
    engine.reap_released_voices();
    Ok(())
}

fn render_offline(cli: &Cli, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let sample_rate = config.offline_sample_rate;
    let fade_seconds = config.master_fade_seconds;
    let (mut engine, mut graph) = SoundscapeEngine::offline(config, sample_rate)?;
    engine.start(&cli.nature, cli.noise, cli.beat, cli.volume)?;

    let mut block = vec![0.0f32; OFFLINE_BLOCK_FRAMES * 2];
    let mut peak = 0.0f32;
    let mut sum_squares = 0.0f64;
    let mut rendered = 0usize;

    let mut render_for = |seconds: f32, graph: &mut soundscape_engine_lib::MixGraph| {
        let frames = (seconds.max(0.0) * sample_rate) as usize;
        let mut done = 0;
        while done < frames {
            graph.render(&mut block, 2);
            for sample in &block {
                peak = peak.max(sample.abs());
                sum_squares += (*sample as f64) * (*sample as f64);
            }
            done += OFFLINE_BLOCK_FRAMES;
        }
        rendered += done;
    };

    render_for(cli.seconds, &mut graph);
    engine.stop();
    render_for(fade_seconds + 0.1, &mut graph);
    let released = engine.reap_released_voices();

    let rms = (sum_squares / (rendered * 2).max(1) as f64).sqrt();
    info!(
        seconds = rendered as f32 / sample_rate,
        peak,
        rms,
        released,
        "Offline render finished"
    );
    Ok(())
}
