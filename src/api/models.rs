// Wire types for the processing service API

use crate::acquisition::BufferWindow;
use crate::device::DeviceDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session variant selected at setup time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Live acquisition, buffers stored server-side
    #[serde(rename = "simple-realtime")]
    SimpleRealtime,

    /// Pre-recorded data uploaded in chunks
    #[serde(rename = "simple-offline")]
    SimpleOffline,

    /// Live acquisition with synchronous server-side processing per buffer
    #[serde(rename = "piped")]
    Piped,
}

/// Metadata describing one acquisition session. Immutable once the session is
/// created; validated fail-closed before any network call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub user_id: String,
    pub session_date: DateTime<Utc>,
    #[serde(default)]
    pub session_type: String,
    #[serde(default)]
    pub session_tags: Vec<String>,
    pub mode: SessionMode,
}

/// User account details sent at registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

/// Per-buffer metadata correlating every upload with its session and the
/// device layout it was sliced from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub session_id: String,
    /// Client-side correlation id for this acquisition run
    pub stream_id: String,
    pub board: String,
    pub sampling_rate: u32,
    pub eeg_channels: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accel_channels: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ppg_channels: Option<Vec<usize>>,
}

impl RecordingMetadata {
    pub fn new(session_id: &str, stream_id: &str, descriptor: &DeviceDescriptor) -> Self {
        Self {
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
            board: descriptor.board.clone(),
            sampling_rate: descriptor.sampling_rate,
            eeg_channels: descriptor.eeg_channels.clone(),
            accel_channels: descriptor.accel_channels.clone(),
            ppg_channels: descriptor.ppg_channels.clone(),
        }
    }
}

/// One encrypted buffer upload: metadata, timestamps, primary EEG data and the
/// two auxiliary PPG arrays (empty when the device has no PPG).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferPayload {
    pub metadata: RecordingMetadata,
    pub timestamps: Vec<f64>,
    pub data: Vec<Vec<f64>>,
    pub ppg_red: Vec<f64>,
    pub ppg_ir: Vec<f64>,
}

impl BufferPayload {
    pub fn from_window(metadata: RecordingMetadata, window: &BufferWindow) -> Self {
        let mut ppg = window.ppg.clone().unwrap_or_default().into_iter();
        Self {
            metadata,
            timestamps: window.timestamps.clone(),
            data: window.eeg.clone(),
            ppg_red: ppg.next().unwrap_or_default(),
            ppg_ir: ppg.next().unwrap_or_default(),
        }
    }
}

/// Piped session setup body: session metadata plus processing parameters for
/// the named pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipedSessionPayload {
    pub metadata: SessionMetadata,
    pub processing_params: Value,
}

/// Envelope for user creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    pub user_data: UserProfile,
}

// --- handshake wire types ---

#[derive(Debug, Deserialize)]
pub struct PublicKeyResponse {
    pub api_public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WrappedKeyPayload {
    pub encrypted_session_key: String,
}

// --- response shapes ---

#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub data_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PipedUploadResponse {
    pub data_id: String,
    #[serde(default)]
    pub pipe_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub user_id: String,
}

// --- encrypted retrieval envelopes ---

#[derive(Debug, Deserialize)]
pub struct RawDataEnvelope {
    pub raw_data: Value,
}

#[derive(Debug, Deserialize)]
pub struct SessionDataEnvelope {
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct IdListEnvelope {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionListEnvelope {
    pub session_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserEnvelope {
    pub user_data: UserProfile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::BufferWindow;

    #[test]
    fn test_session_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionMode::SimpleRealtime).unwrap(),
            "\"simple-realtime\""
        );
        assert_eq!(serde_json::to_string(&SessionMode::Piped).unwrap(), "\"piped\"");
    }

    #[test]
    fn test_payload_maps_ppg_rows_to_aux_arrays() {
        let descriptor = DeviceDescriptor {
            board: "synthetic".to_string(),
            sampling_rate: 4,
            eeg_channels: vec![0],
            accel_channels: None,
            gyro_channels: None,
            ppg_channels: Some(vec![1, 2]),
            timestamp_channel: 3,
            num_rows: 4,
        };
        let window = BufferWindow {
            eeg: vec![vec![1.0, 2.0]],
            timestamps: vec![0.1, 0.2],
            accel: None,
            ppg: Some(vec![vec![3.0, 4.0], vec![5.0, 6.0]]),
        };

        let meta = RecordingMetadata::new("s1", "run1", &descriptor);
        let payload = BufferPayload::from_window(meta, &window);

        assert_eq!(payload.ppg_red, vec![3.0, 4.0]);
        assert_eq!(payload.ppg_ir, vec![5.0, 6.0]);
        assert_eq!(payload.data, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_payload_without_ppg_sends_empty_aux_arrays() {
        let window = BufferWindow {
            eeg: vec![vec![1.0]],
            timestamps: vec![0.1],
            accel: None,
            ppg: None,
        };
        let descriptor = DeviceDescriptor {
            board: "bare".to_string(),
            sampling_rate: 4,
            eeg_channels: vec![0],
            accel_channels: None,
            gyro_channels: None,
            ppg_channels: None,
            timestamp_channel: 1,
            num_rows: 2,
        };
        let payload =
            BufferPayload::from_window(RecordingMetadata::new("s1", "run1", &descriptor), &window);
        assert!(payload.ppg_red.is_empty());
        assert!(payload.ppg_ir.is_empty());
    }
}
