//! End-to-end session orchestration: create the session, bring the device
//! up with retries, drive the acquisition loop, and hand back the ledger of
//! stored buffers.

use crate::acquisition::{self, AcquisitionConfig, UploadRecord};
use crate::api::models::{RecordingMetadata, SessionMetadata};
use crate::api::ApiClient;
use crate::device::{connect_with_retry, DeviceSource};
use crate::error::{StreamError, StreamResult};
use crate::uploader::{PipedUploader, RawUploader};
use log::info;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_CONNECT_RETRIES: u32 = 3;
pub const DEFAULT_CONNECT_RETRY_DELAY_SECS: u64 = 2;

/// Tunables for one streaming run.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Total time to acquire, in seconds
    pub stream_duration: f64,
    /// Length of each uploaded window, in seconds
    pub buffer_duration: f64,
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            stream_duration: 60.0,
            buffer_duration: 5.0,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_retry_delay: Duration::from_secs(DEFAULT_CONNECT_RETRY_DELAY_SECS),
        }
    }
}

impl StreamSettings {
    fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            stream_duration: self.stream_duration,
            buffer_duration: self.buffer_duration,
            ..AcquisitionConfig::default()
        }
    }
}

/// Result of a completed (or cancelled) streaming session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub records: Vec<UploadRecord>,
}

impl SessionOutcome {
    pub fn data_ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.data_id.as_str()).collect()
    }

    pub fn processed(&self) -> Vec<&Value> {
        self.records
            .iter()
            .filter_map(|r| r.processed.as_ref())
            .collect()
    }
}

/// Run a raw streaming session: buffers are stored server-side unmodified.
///
/// Requires an established encrypted channel; fails before touching the
/// device otherwise. The device is stopped and disconnected on every exit
/// path once streaming has begun, including cancellation.
pub async fn acquire_and_send_raw(
    client: &ApiClient,
    device: &mut dyn DeviceSource,
    metadata: &SessionMetadata,
    settings: &StreamSettings,
    cancel: &CancellationToken,
) -> StreamResult<SessionOutcome> {
    ensure_channel(client)?;
    let session_id = client.create_session(metadata).await?;
    let descriptor = connect_with_retry(device, settings.connect_retries, settings.connect_retry_delay).await?;

    let stream_id = Uuid::new_v4().to_string();
    info!(
        "starting raw stream {stream_id} for session {session_id} ({} Hz)",
        descriptor.sampling_rate
    );
    let recording = RecordingMetadata::new(&session_id, &stream_id, &descriptor);
    let mut sink = RawUploader::new(client, recording);

    let records = acquisition::run(device, &mut sink, &settings.acquisition(), cancel).await?;
    info!("session {session_id} finished with {} buffers stored", records.len());
    Ok(SessionOutcome {
        session_id,
        records,
    })
}

/// Run a piped streaming session: each buffer is processed server-side by
/// the named pipeline as it arrives, and the per-buffer results are
/// collected in the outcome.
pub async fn acquire_and_send_piped(
    client: &ApiClient,
    device: &mut dyn DeviceSource,
    metadata: &SessionMetadata,
    pipeline: &str,
    processing_params: Value,
    settings: &StreamSettings,
    cancel: &CancellationToken,
) -> StreamResult<SessionOutcome> {
    ensure_channel(client)?;
    let session_id = client
        .create_piped_session(metadata, pipeline, processing_params)
        .await?;
    let descriptor = connect_with_retry(device, settings.connect_retries, settings.connect_retry_delay).await?;

    let stream_id = Uuid::new_v4().to_string();
    info!("starting piped stream {stream_id} for session {session_id} ({pipeline})");
    let recording = RecordingMetadata::new(&session_id, &stream_id, &descriptor);
    let mut sink = PipedUploader::new(client, recording);

    let records = acquisition::run(device, &mut sink, &settings.acquisition(), cancel).await?;
    Ok(SessionOutcome {
        session_id,
        records,
    })
}

/// Refuse to start a session over an unestablished channel with a clearer
/// error than the first sealed request would produce.
pub fn ensure_channel(client: &ApiClient) -> StreamResult<()> {
    if !client.has_session_key() {
        return Err(StreamError::Handshake {
            stage: "key",
            detail: "no session key committed; call handshake() first".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_typical_run() {
        let settings = StreamSettings::default();
        assert_eq!(settings.connect_retries, 3);
        assert!(settings.stream_duration > settings.buffer_duration);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = SessionOutcome {
            session_id: "s1".to_string(),
            records: vec![
                UploadRecord {
                    data_id: "d1".to_string(),
                    session_id: "s1".to_string(),
                    processed: None,
                },
                UploadRecord {
                    data_id: "d2".to_string(),
                    session_id: "s1".to_string(),
                    processed: Some(serde_json::json!({"alpha": 0.4})),
                },
            ],
        };
        assert_eq!(outcome.data_ids(), vec!["d1", "d2"]);
        assert_eq!(outcome.processed().len(), 1);
    }

    #[test]
    fn test_ensure_channel_rejects_fresh_client() {
        let client = ApiClient::new("http://localhost:9000", "client-1").unwrap();
        assert!(ensure_channel(&client).is_err());
    }
}
