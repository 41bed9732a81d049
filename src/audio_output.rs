use crate::audio::mix_graph::MixGraph;
use crate::commands::MixCommandReceiver;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::GraphEventSender;
use crate::sequencing::RenderClock;
use cpal::{traits::*, Sample};
use tracing::{error, info};

/// Output device stream driving a [`MixGraph`]. The graph lives inside the
/// device callback; dropping this stops the stream immediately.
pub struct AudioOutput {
    _stream: cpal::Stream,
    sample_rate: f32,
}

impl AudioOutput {
    pub fn open(
        config: &EngineConfig,
        commands: MixCommandReceiver,
        events: GraphEventSender,
        clock: RenderClock,
    ) -> Result<Self> {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());

        let device = host
            .default_output_device()
            .ok_or(EngineError::DeviceUnavailable)?;
        info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string())
        );

        let supported = device.default_output_config()?;
        info!("Audio config: {:?}", supported);

        // Voices are built at the device rate, so read it before anything else
        let sample_rate = supported.sample_rate().0 as f32;
        let graph = MixGraph::new(config, sample_rate, commands, events, clock);

        let stream_config: cpal::StreamConfig = supported.config();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => Self::run::<f32>(&device, &stream_config, graph)?,
            cpal::SampleFormat::I16 => Self::run::<i16>(&device, &stream_config, graph)?,
            cpal::SampleFormat::U16 => Self::run::<u16>(&device, &stream_config, graph)?,
            other => return Err(EngineError::UnsupportedSampleFormat(format!("{:?}", other))),
        };

        stream.play()?;
        info!("Audio stream started at {} Hz", sample_rate);

        Ok(AudioOutput {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn run<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut graph: MixGraph,
    ) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: Sample + cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = (config.channels as usize).max(1);

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                let mut chunks = data.chunks_mut(channels);
                graph.render_frames(frames, |left, right| {
                    let Some(frame) = chunks.next() else {
                        return;
                    };
                    if channels >= 2 {
                        frame[0] = T::from_sample(left);
                        frame[1] = T::from_sample(right);
                    } else {
                        frame[0] = T::from_sample((left + right) * 0.5);
                    }

                    for sample in frame.iter_mut().skip(2) {
                        *sample = T::from_sample(0.0);
                    }
                });
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?;

        Ok(stream)
    }
}
