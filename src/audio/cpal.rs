// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, fmt, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thread_priority::ThreadPriorityValue;
use tracing::{error, info, span, Level};

use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::{OutputFormat, OutputHandle, SampleFormat};
use crate::{audio::Device as AudioDevice, config, transport::Transport};

/// Frames converted per pass in integer callbacks. The scratch buffer is allocated once
/// when the stream is built.
const SCRATCH_FRAMES: usize = 2048;

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The number of channels the stream is opened with.
    channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The stream format.
    format: OutputFormat,
    /// Fixed stream buffer size in frames, or the backend default.
    buffer_size: Option<u32>,
    /// Priority for the delivery thread.
    thread_priority: u8,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Everything the delivery path needs, moved into the stream callback.
struct Delivery {
    transport: Arc<Transport>,
    channels: u16,
    priority: Option<ThreadPriorityValue>,
    rt_audio: bool,
    priority_set: bool,
}

impl Delivery {
    #[inline]
    fn prepare(&mut self) {
        configure_audio_thread_priority(self.priority, self.rt_audio, &mut self.priority_set);
    }
}

/// f32 callback: the transport writes straight into the cpal buffer.
fn create_f32_callback(
    mut delivery: Delivery,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        delivery.prepare();
        delivery.transport.read_block(data, delivery.channels);
    }
}

/// Integer callback: read into preallocated scratch and convert.
fn create_int_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mut delivery: Delivery,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES * delivery.channels.max(1) as usize];
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        delivery.prepare();
        for chunk in data.chunks_mut(scratch.len()) {
            let scratch = &mut scratch[..chunk.len()];
            delivery.transport.read_block(scratch, delivery.channels);
            for (dst, &src) in chunk.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        }
    }
}

/// Builds and starts the stream. Must run on the thread that keeps the stream alive.
fn build_stream(
    device: &cpal::Device,
    format: &OutputFormat,
    buffer_size: Option<u32>,
    delivery: Delivery,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let config = cpal::StreamConfig {
        channels: delivery.channels,
        sample_rate: format.sample_rate,
        buffer_size: buffer_size.map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed),
    };

    let stream = match (format.sample_format, format.bits_per_sample) {
        (SampleFormat::Float, _) => device.build_output_stream(
            &config,
            create_f32_callback(delivery),
            |err| error!("CPAL output stream error: {}", err),
            None,
        )?,
        (SampleFormat::Int, 16) => device.build_output_stream(
            &config,
            create_int_callback::<i16>(delivery),
            |err| error!("CPAL output stream error: {}", err),
            None,
        )?,
        (SampleFormat::Int, 32) => device.build_output_stream(
            &config,
            create_int_callback::<i32>(delivery),
            |err| error!("CPAL output stream error: {}", err),
            None,
        )?,
        (SampleFormat::Int, bits) => {
            return Err(format!("Unsupported bit depth {} for integer output", bits).into())
        }
    };
    stream.play()?;
    Ok(stream)
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device::new(device, host_id, max_channels)?);
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    fn new(
        device: cpal::Device,
        host_id: cpal::HostId,
        max_channels: u16,
    ) -> Result<Device, Box<dyn Error>> {
        Ok(Device {
            name: device.name()?,
            max_channels,
            channels: max_channels.min(2),
            host_id,
            device,
            format: OutputFormat::default(),
            buffer_size: None,
            thread_priority: super::thread_priority::DEFAULT_CALLBACK_THREAD_PRIORITY,
        })
    }

    /// Gets the configured cpal device. "default" picks the default output device of the
    /// default host when no device carries that name.
    pub fn get(config: &config::Audio, format: OutputFormat) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let found = Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name);

        let mut device = match found {
            Some(device) => device,
            None if name == "default" => {
                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or("no default output device")?;
                let channels = device.default_output_config()?.channels();
                Device::new(device, host.id(), channels)?
            }
            None => return Err(format!("no device found with name {}", name).into()),
        };

        device.format = format;
        device.buffer_size = config.buffer_size();
        device.thread_priority = config.thread_priority();
        Ok(device)
    }
}

impl AudioDevice for Device {
    fn open(&self, transport: Arc<Transport>) -> Result<OutputHandle, Box<dyn Error>> {
        let span = span!(Level::INFO, "output (cpal)");
        let _enter = span.enter();

        let delivery = Delivery {
            transport,
            channels: self.channels,
            priority: callback_thread_priority(self.thread_priority),
            rt_audio: rt_audio_enabled(),
            priority_set: false,
        };
        let device = self.device.clone();
        let format = self.format.clone();
        let buffer_size = self.buffer_size;

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        // The stream lives on its own thread since it cannot be moved between threads on
        // every host.
        let thread = thread::Builder::new()
            .name("chopdeck-output".to_string())
            .spawn(move || {
                let stream = match build_stream(&device, &format, buffer_size, delivery) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the handle is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = self.name,
                    format = %self.format,
                    channels = self.channels,
                    "CPAL output stream started."
                );
                Ok(OutputHandle::new(shutdown_tx, thread))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(format!("unable to open {}: {}", self.name, e).into())
            }
            Err(_) => {
                let _ = thread.join();
                Err(format!("output thread for {} exited before starting", self.name).into())
            }
        }
    }

    fn format(&self) -> &OutputFormat {
        &self.format
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
