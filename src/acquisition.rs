// Bounded, cancellable buffer acquisition loop.
//
// One cooperative task per session: suspend for a buffer interval, read the
// device ring, slice per-role channel views, hand the window to the sink.
// Uploads are issued synchronously and in strict buffer order, so the
// returned ledger matches acquisition order. Cancellation is observed at the
// suspension point between cycles; every exit path runs stop-then-disconnect
// before returning.

use crate::device::{DeviceDescriptor, DeviceSource, SampleBlock};
use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// One sliced fixed-duration window of multi-channel samples.
///
/// `timestamps` is aligned 1:1 with the samples of every channel row.
#[derive(Debug, Clone)]
pub struct BufferWindow {
    pub eeg: Vec<Vec<f64>>,
    pub timestamps: Vec<f64>,
    pub accel: Option<Vec<Vec<f64>>>,
    pub ppg: Option<Vec<Vec<f64>>>,
}

/// Ledger entry for one accepted buffer. `data_id` is server-assigned;
/// `processed` carries inline results for piped sessions.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub data_id: String,
    pub session_id: String,
    pub processed: Option<serde_json::Value>,
}

/// Sequential per-buffer upload step invoked once per completed window.
#[async_trait]
pub trait BufferSink: Send {
    async fn upload(&mut self, window: &BufferWindow) -> StreamResult<UploadRecord>;
}

/// Acquisition loop tuning
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Total wall-clock capture time in seconds
    pub stream_duration: f64,

    /// Wall-clock length of one buffer in seconds
    pub buffer_duration: f64,

    /// Abort the loop after this many consecutive upload failures
    pub max_upload_failures: u32,

    /// Warn once this many consecutive cycles under-fill
    pub stall_warning_cycles: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            stream_duration: 60.0,
            buffer_duration: 5.0,
            max_upload_failures: 3,
            stall_warning_cycles: 3,
        }
    }
}

/// Number of buffers needed to cover `stream_duration`: at least one, plus one
/// per additional started `buffer_duration`. Short requests round up to a
/// single full buffer.
pub fn planned_iterations(stream_duration: f64, buffer_duration: f64) -> u64 {
    let extra = ((stream_duration - buffer_duration) / buffer_duration).ceil();
    1 + extra.max(0.0) as u64
}

/// Run the acquisition loop against a connected device.
///
/// Returns the ordered ledger of accepted buffers. Cancellation of `cancel`
/// stops iterating at the next suspension point and returns the records
/// accumulated so far; it is not an error. The device is stopped and released
/// on every exit path, normal or not.
pub async fn run(
    device: &mut dyn DeviceSource,
    sink: &mut dyn BufferSink,
    config: &AcquisitionConfig,
    cancel: &CancellationToken,
) -> StreamResult<Vec<UploadRecord>> {
    let descriptor = match device.descriptor() {
        Some(d) if device.is_connected() => d.clone(),
        _ => return Err(StreamError::NotConnected),
    };

    if config.buffer_duration <= 0.0 || config.stream_duration <= 0.0 {
        return Err(StreamError::Validation(
            "stream_duration and buffer_duration must be positive".to_string(),
        ));
    }

    let buffer_size = (descriptor.sampling_rate as f64 * config.buffer_duration) as usize;
    let iterations = planned_iterations(config.stream_duration, config.buffer_duration);
    log::info!(
        "starting acquisition: {} buffers of {} samples ({}s each) from {}",
        iterations,
        buffer_size,
        config.buffer_duration,
        descriptor.board
    );

    let result = match device.start(buffer_size).await {
        Ok(()) => drive(device, sink, &descriptor, buffer_size, iterations, config, cancel).await,
        Err(e) => Err(e),
    };

    // Mandatory terminal cleanup, shared by completion, cancellation and
    // failure paths.
    shutdown(device).await;
    result
}

async fn drive(
    device: &mut dyn DeviceSource,
    sink: &mut dyn BufferSink,
    descriptor: &DeviceDescriptor,
    buffer_size: usize,
    iterations: u64,
    config: &AcquisitionConfig,
    cancel: &CancellationToken,
) -> StreamResult<Vec<UploadRecord>> {
    let mut records = Vec::with_capacity(iterations as usize);
    let mut completed: u64 = 0;
    let mut short_reads: u32 = 0;
    let mut upload_failures: u32 = 0;
    let interval = Duration::from_secs_f64(config.buffer_duration);

    while completed < iterations {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::info!(
                    "acquisition interrupted after {} of {} buffers",
                    completed,
                    iterations
                );
                return Ok(records);
            }

            _ = sleep(interval) => {}
        }

        let block = device.read(buffer_size).await?;

        // Under-fill: the device ring has not accumulated a full buffer yet.
        // Skip the cycle without consuming an iteration; the ring keeps
        // filling while we wait again.
        if block.num_samples() < buffer_size {
            short_reads += 1;
            log::debug!(
                "buffer under-filled ({} < {}), cycle skipped",
                block.num_samples(),
                buffer_size
            );
            if short_reads == config.stall_warning_cycles {
                log::warn!(
                    "device under-delivered for {} consecutive cycles, stream may be stalling",
                    short_reads
                );
            }
            continue;
        }
        short_reads = 0;

        let window = slice_window(descriptor, &block, buffer_size);
        match sink.upload(&window).await {
            Ok(record) => {
                upload_failures = 0;
                log::debug!(
                    "buffer {}/{} accepted as {}",
                    completed + 1,
                    iterations,
                    record.data_id
                );
                records.push(record);
                completed += 1;
            }
            Err(StreamError::Upload { status, body }) => {
                upload_failures += 1;
                log::warn!(
                    "buffer upload failed (status {}): {}; {} consecutive failure(s)",
                    status,
                    body,
                    upload_failures
                );
                if upload_failures >= config.max_upload_failures {
                    return Err(StreamError::UploadAborted {
                        failures: upload_failures,
                    });
                }
                // The next cycle proceeds with fresh data; a rejected buffer
                // is never re-sent.
            }
            Err(e) => return Err(e),
        }
    }

    log::info!("acquisition complete: {} buffers uploaded", records.len());
    Ok(records)
}

/// Slice the newest `buffer_size` samples of each role out of a raw block.
fn slice_window(
    descriptor: &DeviceDescriptor,
    block: &SampleBlock,
    buffer_size: usize,
) -> BufferWindow {
    let eeg = block.select_tail(&descriptor.eeg_channels, buffer_size);
    let timestamps = block.tail(descriptor.timestamp_channel, buffer_size);
    let accel = descriptor
        .accel_channels
        .as_ref()
        .map(|rows| block.select_tail(rows, buffer_size));
    let ppg = descriptor
        .ppg_channels
        .as_ref()
        .map(|rows| block.select_tail(rows, buffer_size));

    debug_assert!(eeg.iter().all(|row| row.len() == timestamps.len()));

    BufferWindow {
        eeg,
        timestamps,
        accel,
        ppg,
    }
}

async fn shutdown(device: &mut dyn DeviceSource) {
    if let Err(e) = device.stop().await {
        log::warn!("failed to stop device stream: {}", e);
    }
    if let Err(e) = device.disconnect().await {
        log::warn!("failed to release device: {}", e);
    }
}
