//! Sinks that relay acquired buffer windows to the service.

use crate::acquisition::{BufferSink, BufferWindow, UploadRecord};
use crate::api::models::{BufferPayload, RecordingMetadata};
use crate::api::ApiClient;
use crate::error::StreamResult;
use async_trait::async_trait;
use log::debug;

/// Sink that stores each window as raw session data.
pub struct RawUploader<'a> {
    client: &'a ApiClient,
    metadata: RecordingMetadata,
}

impl<'a> RawUploader<'a> {
    pub fn new(client: &'a ApiClient, metadata: RecordingMetadata) -> Self {
        Self { client, metadata }
    }
}

#[async_trait]
impl BufferSink for RawUploader<'_> {
    async fn upload(&mut self, window: &BufferWindow) -> StreamResult<UploadRecord> {
        let payload = BufferPayload::from_window(self.metadata.clone(), window);
        let data_id = self.client.upload_buffer(&payload).await?;
        debug!("stored buffer {data_id} ({} samples)", window.timestamps.len());
        Ok(UploadRecord {
            data_id,
            session_id: self.metadata.session_id.clone(),
            processed: None,
        })
    }
}

/// Sink for piped sessions: each window comes back with the pipeline's
/// output for that buffer.
pub struct PipedUploader<'a> {
    client: &'a ApiClient,
    metadata: RecordingMetadata,
}

impl<'a> PipedUploader<'a> {
    pub fn new(client: &'a ApiClient, metadata: RecordingMetadata) -> Self {
        Self { client, metadata }
    }
}

#[async_trait]
impl BufferSink for PipedUploader<'_> {
    async fn upload(&mut self, window: &BufferWindow) -> StreamResult<UploadRecord> {
        let payload = BufferPayload::from_window(self.metadata.clone(), window);
        let (data_id, processed) = self.client.upload_piped_buffer(&payload).await?;
        debug!(
            "stored piped buffer {data_id} (processed: {})",
            processed.is_some()
        );
        Ok(UploadRecord {
            data_id,
            session_id: self.metadata.session_id.clone(),
            processed,
        })
    }
}
