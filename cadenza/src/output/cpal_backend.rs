use crate::error::{CadenzaError, InitError, Result};
use crate::output::{AudioBackend, DeviceSpec, ErrorCallback, OutputStream, RenderCallback};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};

/// Output backend for the host's default device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

struct CpalStream(cpal::Stream);

impl OutputStream for CpalStream {
    fn play(&self) -> Result<()> {
        self.0
            .play()
            .map_err(|e| CadenzaError::Device(format!("Failed to start stream: {}", e)))
    }
}

fn default_device() -> Result<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| InitError::NoOutputDevice.into())
}

impl CpalBackend {
    /// Connect to the default host and make sure it has an output device.
    pub fn new() -> std::result::Result<Self, InitError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(InitError::NoOutputDevice)?;
        device
            .default_output_config()
            .map_err(|e| InitError::Backend(format!("Failed to get default config: {}", e)))?;
        log::info!(
            "Using {} output device '{}'",
            host.id().name(),
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );
        Ok(Self)
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn device_spec(&self) -> Result<DeviceSpec> {
        let config = default_device()?
            .default_output_config()
            .map_err(|e| CadenzaError::Device(format!("Failed to get default config: {}", e)))?;
        Ok(DeviceSpec {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        })
    }

    fn open_stream(
        &self,
        spec: DeviceSpec,
        render: RenderCallback,
        on_error: ErrorCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let device = default_device()?;

        let config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Create the stream based on the device's default format
        let default_config = device
            .default_output_config()
            .map_err(|e| CadenzaError::Device(format!("Failed to get default config: {}", e)))?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => create_stream::<f32>(&device, &config, render, on_error)?,
            cpal::SampleFormat::I16 => create_stream::<i16>(&device, &config, render, on_error)?,
            cpal::SampleFormat::U16 => create_stream::<u16>(&device, &config, render, on_error)?,
            other => {
                return Err(CadenzaError::Device(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        log::debug!(
            "Opened cpal stream: {} Hz, {} ch, {:?}",
            spec.sample_rate,
            spec.channels,
            default_config.sample_format()
        );
        Ok(Box::new(CpalStream(stream)))
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: RenderCallback,
    mut on_error: ErrorCallback,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    // Grown on the first callback, reused afterwards
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let buffer = &mut scratch[..data.len()];
                render(buffer);

                for (sample, value) in data.iter_mut().zip(buffer.iter()) {
                    *sample = T::from_sample(*value);
                }
            },
            move |err| {
                if is_device_loss(&err) {
                    log::error!("Audio device lost: {}", err);
                    on_error(err.to_string());
                } else {
                    log::warn!("Audio stream error: {}", err);
                }
            },
            None,
        )
        .map_err(|e| CadenzaError::Device(format!("Failed to build stream: {}", e)))
}

/// Only a vanished device ends playback; other stream errors are transient.
fn is_device_loss(err: &cpal::StreamError) -> bool {
    matches!(err, cpal::StreamError::DeviceNotAvailable)
}
