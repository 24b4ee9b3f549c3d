use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig};
use crossbeam::channel::Sender;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::lockfree_buffer::frame_ring;
use super::{AudioConfig, AudioError, AudioResult, EngineEvent, Mixer, MixerView};
use crate::hardware::{ControlSurface, FeedbackSink};

// Ring capacity in blocks of input.
const RING_BLOCKS: usize = 64;
const MIN_RING_FRAMES: usize = 8192;

fn device_name(device: &Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

pub struct AudioStream {
    host: Host,
    input_device: Device,
    output_device: Device,
    input_config: StreamConfig,
    output_config: StreamConfig,
    block_size: usize,
    input_device_name: String,
    output_device_name: String,
}

impl AudioStream {
    /// Opens the default devices at the configured sample rate.
    pub fn new(config: &AudioConfig) -> AudioResult<Self> {
        let host = cpal::default_host();

        let input_device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;
        let output_device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let input_default = input_device
            .default_input_config()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;
        let output_default = output_device
            .default_output_config()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;

        let input_device_name = device_name(&input_device);
        let output_device_name = device_name(&output_device);

        log::info!(
            "Input device: {} (default {}Hz, {}ch, {:?})",
            input_device_name,
            input_default.sample_rate().0,
            input_default.channels(),
            input_default.sample_format()
        );
        log::info!(
            "Output device: {} (default {}Hz, {}ch, {:?})",
            output_device_name,
            output_default.sample_rate().0,
            output_default.channels(),
            output_default.sample_format()
        );

        // Both sides run at the looper rate; there is no resampler between
        // the ring and the mixer.
        let input_config = StreamConfig {
            channels: input_default.channels(),
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let output_config = StreamConfig {
            channels: output_default.channels(),
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        if input_default.sample_rate() != output_default.sample_rate() {
            log::warn!(
                "Device default rates differ ({}Hz in, {}Hz out); forcing {}Hz",
                input_default.sample_rate().0,
                output_default.sample_rate().0,
                config.sample_rate
            );
        }

        Ok(Self {
            host,
            input_device,
            output_device,
            input_config,
            output_config,
            block_size: config.block_size.max(1),
            input_device_name,
            output_device_name,
        })
    }

    /// Starts both streams. The mixer, control surface and feedback sink move
    /// into the output callback; `view` is refreshed there with `try_lock`.
    pub fn start<S, F>(
        &self,
        mut mixer: Mixer,
        mut surface: S,
        mut feedback: F,
        view: Arc<Mutex<MixerView>>,
        events: Sender<EngineEvent>,
    ) -> AudioResult<(Stream, Stream)>
    where
        S: ControlSurface + Send + 'static,
        F: FeedbackSink + Send + 'static,
    {
        mixer.set_event_sender(events.clone());

        let block_size = self.block_size;
        let (mut producer, mut consumer) =
            frame_ring((block_size * RING_BLOCKS).max(MIN_RING_FRAMES));

        let input_channels = self.input_config.channels as usize;
        let input_err_sender = events.clone();
        let input_stream = self
            .input_device
            .build_input_stream(
                &self.input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    producer.push_interleaved(data, input_channels);
                },
                move |_err| {
                    let _ =
                        input_err_sender.try_send(EngineEvent::StreamError("Input stream error"));
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        let output_channels = (self.output_config.channels as usize).max(1);
        let output_err_sender = events.clone();
        let overrun_sender = events;

        // Preallocated block buffers; nothing is allocated in the callback.
        let mut in_l = vec![0.0f32; block_size];
        let mut in_r = vec![0.0f32; block_size];
        let mut out_l = vec![0.0f32; block_size];
        let mut out_r = vec![0.0f32; block_size];
        let epoch = Instant::now();

        let output_stream = self
            .output_device
            .build_output_stream(
                &self.output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for chunk in data.chunks_mut(block_size * output_channels) {
                        let frames = chunk.len() / output_channels;
                        consumer.read_into(&mut in_l[..frames], &mut in_r[..frames]);

                        let now_ms = epoch.elapsed().as_millis() as u64;
                        mixer.run_block(
                            &mut surface,
                            &mut feedback,
                            now_ms,
                            (&in_l[..frames], &in_r[..frames]),
                            (&mut out_l[..frames], &mut out_r[..frames]),
                        );

                        for (i, frame) in chunk.chunks_exact_mut(output_channels).enumerate() {
                            match frame {
                                [mono] => *mono = (out_l[i] + out_r[i]) * 0.5,
                                [left, right, rest @ ..] => {
                                    *left = out_l[i];
                                    *right = out_r[i];
                                    rest.fill(0.0);
                                }
                                [] => {}
                            }
                        }
                    }

                    if consumer.check_and_clear_overrun() {
                        let _ = overrun_sender.try_send(EngineEvent::InputOverrun);
                    }
                    if let Ok(mut view) = view.try_lock() {
                        mixer.describe_into(&mut view);
                    }
                },
                move |_err| {
                    let _ =
                        output_err_sender.try_send(EngineEvent::StreamError("Output stream error"));
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        input_stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
        output_stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!(
            "Audio streams started: {}Hz, block {} frames, {}ch in / {}ch out",
            self.output_config.sample_rate.0,
            block_size,
            input_channels,
            output_channels
        );

        Ok((input_stream, output_stream))
    }

    pub fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn input_device_name(&self) -> &str {
        &self.input_device_name
    }

    pub fn output_device_name(&self) -> &str {
        &self.output_device_name
    }

    pub fn list_devices(&self) -> AudioResult<()> {
        println!("Available input devices:");
        let input_devices = self
            .host
            .input_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;
        for (i, device) in input_devices.enumerate() {
            println!("  {}: {}", i, device_name(&device));
        }

        println!("\nAvailable output devices:");
        let output_devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;
        for (i, device) in output_devices.enumerate() {
            println!("  {}: {}", i, device_name(&device));
        }

        Ok(())
    }
}
