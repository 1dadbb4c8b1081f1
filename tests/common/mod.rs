#![allow(dead_code)]

//! Shared scripted device and sink fakes for the integration suites.

use async_trait::async_trait;
use biostream::acquisition::{BufferSink, BufferWindow, UploadRecord};
use biostream::device::{DeviceDescriptor, DeviceSource, SampleBlock};
use biostream::error::{StreamError, StreamResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_descriptor(sampling_rate: u32) -> DeviceDescriptor {
    DeviceDescriptor {
        board: "mock".to_string(),
        sampling_rate,
        eeg_channels: vec![1, 2],
        accel_channels: None,
        gyro_channels: None,
        ppg_channels: None,
        timestamp_channel: 0,
        num_rows: 3,
    }
}

/// Device fake with scripted connect failures and per-read sample counts.
/// Row 0 carries a strictly increasing counter so ordering is observable
/// downstream.
pub struct MockDevice {
    pub sampling_rate: u32,
    pub connect_attempts: Arc<AtomicUsize>,
    pub stop_calls: Arc<AtomicUsize>,
    pub disconnect_calls: Arc<AtomicUsize>,
    remaining_connect_failures: u32,
    scripted_reads: VecDeque<usize>,
    descriptor: Option<DeviceDescriptor>,
    started: bool,
    cursor: usize,
}

impl MockDevice {
    pub fn new(sampling_rate: u32) -> Self {
        Self {
            sampling_rate,
            connect_attempts: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
            disconnect_calls: Arc::new(AtomicUsize::new(0)),
            remaining_connect_failures: 0,
            scripted_reads: VecDeque::new(),
            descriptor: None,
            started: false,
            cursor: 0,
        }
    }

    /// Fail the first `n` connect attempts before succeeding.
    pub fn failing_connects(mut self, n: u32) -> Self {
        self.remaining_connect_failures = n;
        self
    }

    /// Script the sample counts of the next reads; later reads return a full
    /// buffer.
    pub fn scripted_reads(mut self, counts: &[usize]) -> Self {
        self.scripted_reads = counts.iter().copied().collect();
        self
    }

    /// Pre-attach without going through connect, for loop-level tests.
    pub fn connected(mut self) -> Self {
        self.descriptor = Some(test_descriptor(self.sampling_rate));
        self
    }
}

#[async_trait]
impl DeviceSource for MockDevice {
    async fn connect(&mut self) -> StreamResult<DeviceDescriptor> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.descriptor.is_some() {
            return Err(StreamError::AlreadyConnected);
        }
        if self.remaining_connect_failures > 0 {
            self.remaining_connect_failures -= 1;
            return Err(StreamError::Device("board not found".to_string()));
        }
        let descriptor = test_descriptor(self.sampling_rate);
        self.descriptor = Some(descriptor.clone());
        Ok(descriptor)
    }

    async fn start(&mut self, _buffer_size_samples: usize) -> StreamResult<()> {
        if self.descriptor.is_none() {
            return Err(StreamError::NotConnected);
        }
        self.started = true;
        Ok(())
    }

    async fn read(&mut self, buffer_size_samples: usize) -> StreamResult<SampleBlock> {
        if self.descriptor.is_none() {
            return Err(StreamError::NotConnected);
        }
        let count = self
            .scripted_reads
            .pop_front()
            .unwrap_or(buffer_size_samples);
        let rows = (0..3)
            .map(|r| {
                (0..count)
                    .map(|i| (self.cursor + i) as f64 + r as f64 * 0.1)
                    .collect()
            })
            .collect();
        self.cursor += count;
        Ok(SampleBlock { rows })
    }

    async fn stop(&mut self) -> StreamResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.started = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> StreamResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
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

/// Sink fake recording every accepted window. Can inject a run of upload
/// failures and can cancel a token after a given number of acceptances.
pub struct MockSink {
    pub windows: Arc<Mutex<Vec<BufferWindow>>>,
    pub upload_calls: Arc<AtomicUsize>,
    remaining_failures: u32,
    always_fail: bool,
    cancel_after: Option<(usize, CancellationToken)>,
    accepted: usize,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(Mutex::new(Vec::new())),
            upload_calls: Arc::new(AtomicUsize::new(0)),
            remaining_failures: 0,
            always_fail: false,
            cancel_after: None,
            accepted: 0,
        }
    }

    pub fn failing_first(mut self, n: u32) -> Self {
        self.remaining_failures = n;
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn cancelling_after(mut self, accepted: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((accepted, token));
        self
    }
}

#[async_trait]
impl BufferSink for MockSink {
    async fn upload(&mut self, window: &BufferWindow) -> StreamResult<UploadRecord> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail || self.remaining_failures > 0 {
            self.remaining_failures = self.remaining_failures.saturating_sub(1);
            return Err(StreamError::Upload {
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        self.windows.lock().unwrap().push(window.clone());
        self.accepted += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.accepted == *after {
                token.cancel();
            }
        }
        Ok(UploadRecord {
            data_id: format!("d{}", self.accepted),
            session_id: "s-test".to_string(),
            processed: None,
        })
    }
}
