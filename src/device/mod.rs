// Pluggable acquisition device system.
//
// The `DeviceSource` trait is the seam between the acquisition loop and
// whatever produces samples. New device backends are added by:
// 1. Implementing the DeviceSource trait
// 2. Adding a variant to DeviceConfig
// 3. Registering in the factory function
//
// Only the synthetic board ships with the crate; real hardware backends live
// behind the same trait out of tree.

mod synthetic;

pub use synthetic::SyntheticDevice;

use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Channel-role layout and sampling metadata for one device model.
///
/// Captured once at connect time and read-only afterwards; every slicing
/// decision downstream is driven by these row indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Board model identifier (e.g. "synthetic")
    pub board: String,

    /// Samples per second, per channel
    pub sampling_rate: u32,

    /// Rows of the raw sample matrix carrying EEG channels
    pub eeg_channels: Vec<usize>,

    /// Accelerometer rows, when the model exposes them
    pub accel_channels: Option<Vec<usize>>,

    /// Gyroscope rows, when the model exposes them
    pub gyro_channels: Option<Vec<usize>>,

    /// PPG rows (red, infrared), when the model exposes them
    pub ppg_channels: Option<Vec<usize>>,

    /// Row carrying per-sample unix timestamps
    pub timestamp_channel: usize,

    /// Total rows in the raw matrix
    pub num_rows: usize,
}

/// Raw multi-channel sample window: rows are device channels, columns are
/// samples. Row meaning comes from the `DeviceDescriptor`.
#[derive(Debug, Clone, Default)]
pub struct SampleBlock {
    pub rows: Vec<Vec<f64>>,
}

impl SampleBlock {
    /// Number of samples per row (0 for an empty block)
    pub fn num_samples(&self) -> usize {
        self.rows.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Copy out the newest `count` samples of one row.
    pub fn tail(&self, index: usize, count: usize) -> Vec<f64> {
        match self.row(index) {
            Some(row) => row[row.len().saturating_sub(count)..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Copy out the newest `count` samples of each of the given rows.
    pub fn select_tail(&self, indices: &[usize], count: usize) -> Vec<Vec<f64>> {
        indices.iter().map(|&i| self.tail(i, count)).collect()
    }
}

/// Trait for acquisition device backends.
///
/// Exactly one live connection may exist per value; the loop takes the device
/// by mutable reference, so ownership rules keep a session exclusive.
#[async_trait]
pub trait DeviceSource: Send {
    /// Single connection attempt. Captures the channel layout on success.
    /// Must fail with `AlreadyConnected` when called on an attached source.
    async fn connect(&mut self) -> StreamResult<DeviceDescriptor>;

    /// Begin continuous capture, ring-buffering at least
    /// `buffer_size_samples` samples per channel.
    async fn start(&mut self, buffer_size_samples: usize) -> StreamResult<()>;

    /// Read whatever is currently buffered, up to `buffer_size_samples`
    /// samples per channel. May return fewer when called too soon.
    async fn read(&mut self, buffer_size_samples: usize) -> StreamResult<SampleBlock>;

    /// Stop capture. Idempotent.
    async fn stop(&mut self) -> StreamResult<()>;

    /// Release the device. Idempotent; a no-op when already disconnected.
    async fn disconnect(&mut self) -> StreamResult<()>;

    fn is_connected(&self) -> bool;

    /// Layout captured at connect time, if connected.
    fn descriptor(&self) -> Option<&DeviceDescriptor>;
}

/// Bounded-retry connect with a fixed delay between attempts.
///
/// On success returns the captured descriptor. After exhausting `retries`
/// attempts the last failure is surfaced and the device is left unattached.
/// Calling this on an attached source fails immediately.
pub async fn connect_with_retry(
    source: &mut dyn DeviceSource,
    retries: u32,
    delay: Duration,
) -> StreamResult<DeviceDescriptor> {
    if source.is_connected() {
        return Err(StreamError::AlreadyConnected);
    }

    let mut last = String::from("no attempts made");
    for attempt in 1..=retries.max(1) {
        match source.connect().await {
            Ok(descriptor) => {
                log::info!(
                    "device connected on attempt {}: {} @ {} Hz, {} EEG channels",
                    attempt,
                    descriptor.board,
                    descriptor.sampling_rate,
                    descriptor.eeg_channels.len()
                );
                return Ok(descriptor);
            }
            Err(StreamError::AlreadyConnected) => return Err(StreamError::AlreadyConnected),
            Err(e) => {
                log::warn!("connect attempt {}/{} failed: {}", attempt, retries, e);
                last = e.to_string();
                if attempt < retries {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(StreamError::Connection {
        attempts: retries.max(1),
        last,
    })
}

/// Configuration for device backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceConfig {
    /// Simulated board producing sine+noise EEG, accel and PPG rows
    #[serde(rename = "synthetic")]
    Synthetic {
        #[serde(default = "default_sampling_rate")]
        sampling_rate: u32,
    },
}

fn default_sampling_rate() -> u32 {
    256
}

/// Factory for `DeviceSource` implementations. New backends register a match
/// arm here.
pub fn create_device(config: DeviceConfig) -> Box<dyn DeviceSource> {
    match config {
        DeviceConfig::Synthetic { sampling_rate } => {
            Box::new(SyntheticDevice::new(sampling_rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(rows: Vec<Vec<f64>>) -> SampleBlock {
        SampleBlock { rows }
    }

    #[test]
    fn test_empty_block_has_no_samples() {
        assert_eq!(SampleBlock::default().num_samples(), 0);
    }

    #[test]
    fn test_tail_takes_newest_samples() {
        let b = block(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(b.tail(0, 2), vec![3.0, 4.0]);
        // asking for more than available returns the whole row
        assert_eq!(b.tail(0, 10), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(b.tail(5, 2).is_empty());
    }

    #[test]
    fn test_select_tail_preserves_row_order() {
        let b = block(vec![vec![0.0; 4], vec![1.0; 4], vec![2.0; 4]]);
        let picked = b.select_tail(&[2, 0], 3);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0], vec![2.0; 3]);
        assert_eq!(picked[1], vec![0.0; 3]);
    }

    #[test]
    fn test_device_config_serde_tag() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{ "type": "synthetic", "sampling_rate": 128 }"#).unwrap();
        let DeviceConfig::Synthetic { sampling_rate } = config;
        assert_eq!(sampling_rate, 128);
    }
}
