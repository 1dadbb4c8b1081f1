// Simulated acquisition board.
//
// Produces a Muse-S-like channel layout (4 EEG rows, 3 accelerometer rows,
// 2 PPG rows, a packet counter and a timestamp row) filled with sine+noise
// samples. Useful for:
// - Exercising the acquisition loop without hardware
// - Integration tests and demos
//
// Sample availability is driven by wall-clock time since `start`, mimicking a
// device ring buffer that fills asynchronously: a `read` issued too soon after
// `start` returns fewer samples than requested.

use super::{DeviceDescriptor, DeviceSource, SampleBlock};
use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use rand::Rng;
use std::f64::consts::TAU;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const PACKET_ROW: usize = 0;
const EEG_ROWS: [usize; 4] = [1, 2, 3, 4];
const ACCEL_ROWS: [usize; 3] = [5, 6, 7];
const PPG_ROWS: [usize; 2] = [8, 9];
const TIMESTAMP_ROW: usize = 10;
const NUM_ROWS: usize = 11;

pub struct SyntheticDevice {
    sampling_rate: u32,
    descriptor: Option<DeviceDescriptor>,
    stream: Option<StreamState>,
}

struct StreamState {
    started_at: Instant,
    ring_capacity: usize,
}

impl SyntheticDevice {
    pub fn new(sampling_rate: u32) -> Self {
        Self {
            sampling_rate,
            descriptor: None,
            stream: None,
        }
    }

    fn build_descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            board: "synthetic".to_string(),
            sampling_rate: self.sampling_rate,
            eeg_channels: EEG_ROWS.to_vec(),
            accel_channels: Some(ACCEL_ROWS.to_vec()),
            gyro_channels: None,
            ppg_channels: Some(PPG_ROWS.to_vec()),
            timestamp_channel: TIMESTAMP_ROW,
            num_rows: NUM_ROWS,
        }
    }

    /// Generate the newest `count` samples, ending now. `first_index` is the
    /// absolute index of the first generated sample since `start`.
    fn generate_block(&self, first_index: u64, count: usize) -> SampleBlock {
        let mut rng = rand::thread_rng();
        let rate = self.sampling_rate as f64;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let mut rows = vec![Vec::with_capacity(count); NUM_ROWS];
        for i in 0..count {
            let index = first_index + i as u64;
            let t = index as f64 / rate;

            rows[PACKET_ROW].push((index % 256) as f64);
            for (ch, &row) in EEG_ROWS.iter().enumerate() {
                // 10 Hz alpha-band sine, per-channel phase, plus noise
                let phase = ch as f64 * 0.7;
                let value = 20.0 * (TAU * 10.0 * t + phase).sin() + rng.gen_range(-5.0..5.0);
                rows[row].push(value);
            }
            for &row in &ACCEL_ROWS {
                rows[row].push(rng.gen_range(-0.02..0.02));
            }
            for &row in &PPG_ROWS {
                rows[row].push(1.0 + 0.05 * (TAU * 1.2 * t).sin() + rng.gen_range(-0.01..0.01));
            }
            rows[TIMESTAMP_ROW].push(now - (count - 1 - i) as f64 / rate);
        }

        SampleBlock { rows }
    }
}

#[async_trait]
impl DeviceSource for SyntheticDevice {
    async fn connect(&mut self) -> StreamResult<DeviceDescriptor> {
        if self.descriptor.is_some() {
            return Err(StreamError::AlreadyConnected);
        }
        let descriptor = self.build_descriptor();
        self.descriptor = Some(descriptor.clone());
        log::debug!("synthetic board attached @ {} Hz", self.sampling_rate);
        Ok(descriptor)
    }

    async fn start(&mut self, buffer_size_samples: usize) -> StreamResult<()> {
        if self.descriptor.is_none() {
            return Err(StreamError::NotConnected);
        }
        self.stream = Some(StreamState {
            started_at: Instant::now(),
            ring_capacity: buffer_size_samples,
        });
        Ok(())
    }

    async fn read(&mut self, buffer_size_samples: usize) -> StreamResult<SampleBlock> {
        if self.descriptor.is_none() {
            return Err(StreamError::NotConnected);
        }
        let stream = match &self.stream {
            Some(s) => s,
            None => return Ok(SampleBlock::default()),
        };

        // The ring fills at sampling_rate since start; a read returns the
        // newest samples, capped by ring capacity and the requested count.
        let elapsed = stream.started_at.elapsed().as_secs_f64();
        let total = (elapsed * self.sampling_rate as f64) as u64;
        let available = (total as usize)
            .min(stream.ring_capacity)
            .min(buffer_size_samples);
        let first_index = total - available as u64;

        Ok(self.generate_block(first_index, available))
    }

    async fn stop(&mut self) -> StreamResult<()> {
        self.stream = None;
        Ok(())
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        self.stream = None;
        self.descriptor = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.descriptor.is_some()
    }

    fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }
}
