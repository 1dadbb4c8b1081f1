//! HTTP client for the processing service.
//!
//! All payload-bearing routes use the encrypted channel: requests are
//! serialized to JSON, sealed with the session key and sent as
//! `application/octet-stream`; response bodies come back the same way and are
//! opened before deserialization. The session key itself is established once
//! per client via an RSA handshake and never travels in the clear.

use crate::api::models::{
    BufferPayload, IdListEnvelope, PipedSessionPayload, PipedUploadResponse, PublicKeyResponse,
    RawDataEnvelope, SessionDataEnvelope, SessionListEnvelope, SessionMetadata, SessionResponse,
    UploadResponse, UserEnvelope, UserPayload, UserProfile, UserResponse, WrappedKeyPayload,
};
use crate::api::validate;
use crate::crypto::{wrap_session_key, CryptoChannel, SessionKey};
use crate::error::{StreamError, StreamResult};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const CLIENT_ID_HEADER: &str = "X-Client-ID";
pub const ENCRYPTED_CONTENT_TYPE: &str = "application/octet-stream";
pub const API_VERSION: &str = "v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for one service endpoint, holding the encrypted channel state.
///
/// A fresh client has no session key; call [`ApiClient::handshake`] before any
/// payload-bearing operation or they fail with a crypto error.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    channel: CryptoChannel,
}

impl ApiClient {
    pub fn new(base_url: &str, client_id: &str) -> StreamResult<Self> {
        Self::with_timeout(base_url, client_id, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, client_id: &str, timeout: Duration) -> StreamResult<Self> {
        validate::validate_identifier("client_id", client_id)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            channel: CryptoChannel::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_session_key(&self) -> bool {
        self.channel.has_key()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{API_VERSION}/{path}", self.base_url)
    }

    /// Establish the encrypted channel: fetch the service's RSA public key,
    /// generate a fresh session key, send it back wrapped under that public
    /// key, and commit it only once the service acknowledges. On any failure
    /// the channel is cleared so no partially-established key survives.
    pub async fn handshake(&mut self) -> StreamResult<()> {
        self.channel.clear();

        let response = self
            .http
            .get(self.url("handshake/rsa"))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .send()
            .await
            .map_err(|e| StreamError::Handshake {
                stage: "rsa",
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(StreamError::Handshake {
                stage: "rsa",
                detail: format!("public key request returned {}", response.status()),
            });
        }
        let public_key: PublicKeyResponse =
            response.json().await.map_err(|e| StreamError::Handshake {
                stage: "rsa",
                detail: format!("malformed public key response: {e}"),
            })?;

        let session_key = SessionKey::random();
        let wrapped = wrap_session_key(&public_key.api_public_key, &session_key)?;

        let ack = self
            .http
            .post(self.url("handshake/key"))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .json(&WrappedKeyPayload {
                encrypted_session_key: wrapped,
            })
            .send()
            .await
            .map_err(|e| StreamError::Handshake {
                stage: "key",
                detail: e.to_string(),
            })?;
        if !ack.status().is_success() {
            return Err(StreamError::Handshake {
                stage: "key",
                detail: format!("key exchange returned {}", ack.status()),
            });
        }

        self.channel.commit(session_key);
        info!("encrypted channel established with {}", self.base_url);
        Ok(())
    }

    async fn post_encrypted<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> StreamResult<reqwest::Response> {
        let plaintext = serde_json::to_vec(body)?;
        let sealed = self.channel.encrypt(&plaintext)?;
        debug!("POST {path} ({} bytes sealed)", sealed.len());
        let response = self
            .http
            .post(self.url(path))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(reqwest::header::CONTENT_TYPE, ENCRYPTED_CONTENT_TYPE)
            .body(sealed)
            .send()
            .await?;
        Ok(response)
    }

    async fn open_response<R: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> StreamResult<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Response(format!(
                "service returned {status}: {body}"
            )));
        }
        let sealed = response.bytes().await?;
        let plaintext = self.channel.decrypt(&sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    async fn get_encrypted_json<R: DeserializeOwned>(&self, path: &str) -> StreamResult<R> {
        debug!("GET {path}");
        let response = self
            .http
            .get(self.url(path))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .send()
            .await?;
        self.open_response(response).await
    }

    // --- sessions ---

    pub async fn create_session(&self, metadata: &SessionMetadata) -> StreamResult<String> {
        validate::validate_session_metadata(metadata)?;
        let response = self.post_encrypted("sessions", metadata).await?;
        let created: SessionResponse = self.open_response(response).await?;
        info!("created session {}", created.session_id);
        Ok(created.session_id)
    }

    pub async fn create_piped_session(
        &self,
        metadata: &SessionMetadata,
        pipeline: &str,
        processing_params: Value,
    ) -> StreamResult<String> {
        validate::validate_session_metadata(metadata)?;
        validate::validate_identifier("pipeline", pipeline)?;
        let payload = PipedSessionPayload {
            metadata: metadata.clone(),
            processing_params,
        };
        let response = self
            .post_encrypted(&format!("sessions/piped/{pipeline}"), &payload)
            .await?;
        let created: SessionResponse = self.open_response(response).await?;
        info!("created piped session {} ({pipeline})", created.session_id);
        Ok(created.session_id)
    }

    // --- buffer uploads ---

    /// Upload one sealed buffer. Transport failures and non-success statuses
    /// both surface as [`StreamError::Upload`] so the acquisition loop can
    /// treat them as recoverable per-cycle errors.
    pub async fn upload_buffer(&self, payload: &BufferPayload) -> StreamResult<String> {
        let response = self
            .post_encrypted("rawdata", payload)
            .await
            .map_err(upload_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Upload {
                status: status.as_u16(),
                body,
            });
        }
        let stored: UploadResponse = self.open_response(response).await?;
        Ok(stored.data_id)
    }

    /// Upload one sealed buffer to a piped session, returning the stored id
    /// together with whatever the pipeline produced for this buffer.
    pub async fn upload_piped_buffer(
        &self,
        payload: &BufferPayload,
    ) -> StreamResult<(String, Option<Value>)> {
        let response = self
            .post_encrypted("pipedata", payload)
            .await
            .map_err(upload_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Upload {
                status: status.as_u16(),
                body,
            });
        }
        let stored: PipedUploadResponse = self.open_response(response).await?;
        Ok((stored.data_id, stored.pipe_data))
    }

    // --- retrieval ---

    pub async fn get_raw_data(&self, data_id: &str) -> StreamResult<Value> {
        validate::validate_identifier("data_id", data_id)?;
        let envelope: RawDataEnvelope =
            self.get_encrypted_json(&format!("rawdata/{data_id}")).await?;
        Ok(envelope.raw_data)
    }

    pub async fn get_session_data(&self, session_id: &str) -> StreamResult<Value> {
        validate::validate_identifier("session_id", session_id)?;
        let envelope: SessionDataEnvelope = self
            .get_encrypted_json(&format!("sessions/{session_id}/rawdata"))
            .await?;
        Ok(envelope.data)
    }

    pub async fn get_session_data_ids(&self, session_id: &str) -> StreamResult<Vec<String>> {
        validate::validate_identifier("session_id", session_id)?;
        let envelope: IdListEnvelope = self
            .get_encrypted_json(&format!("sessions/{session_id}/ids"))
            .await?;
        Ok(envelope.ids)
    }

    pub async fn get_user_sessions(&self, user_id: &str) -> StreamResult<Vec<String>> {
        validate::validate_identifier("user_id", user_id)?;
        let envelope: SessionListEnvelope = self
            .get_encrypted_json(&format!("sessions/user/{user_id}"))
            .await?;
        Ok(envelope.session_ids)
    }

    // --- users ---

    pub async fn create_user(&self, profile: &UserProfile) -> StreamResult<String> {
        validate::validate_user_profile(profile)?;
        let response = self
            .post_encrypted(
                "users",
                &UserPayload {
                    user_data: profile.clone(),
                },
            )
            .await?;
        let created: UserResponse = self.open_response(response).await?;
        info!("registered user {}", created.user_id);
        Ok(created.user_id)
    }

    pub async fn get_user(&self, user_id: &str) -> StreamResult<UserProfile> {
        validate::validate_identifier("user_id", user_id)?;
        let envelope: UserEnvelope = self.get_encrypted_json(&format!("users/{user_id}")).await?;
        Ok(envelope.user_data)
    }
}

fn upload_transport_error(err: StreamError) -> StreamError {
    match err {
        StreamError::Transport(e) => {
            warn!("buffer upload transport failure: {e}");
            StreamError::Upload {
                status: 0,
                body: e.to_string(),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:9000/", "client-1").unwrap();
        assert_eq!(
            client.url("sessions"),
            "http://localhost:9000/api/v1/sessions"
        );
    }

    #[test]
    fn test_new_client_has_no_session_key() {
        let client = ApiClient::new("http://localhost:9000", "client-1").unwrap();
        assert!(!client.has_session_key());
    }

    #[test]
    fn test_rejects_invalid_client_id() {
        assert!(ApiClient::new("http://localhost:9000", "bad id").is_err());
    }

    #[tokio::test]
    async fn test_upload_before_handshake_is_a_crypto_error() {
        let client = ApiClient::new("http://localhost:9000", "client-1").unwrap();
        let payload = BufferPayload {
            metadata: crate::api::models::RecordingMetadata {
                session_id: "s".to_string(),
                stream_id: "r".to_string(),
                board: "synthetic".to_string(),
                sampling_rate: 256,
                eeg_channels: vec![1],
                accel_channels: None,
                ppg_channels: None,
            },
            timestamps: vec![],
            data: vec![],
            ppg_red: vec![],
            ppg_ir: vec![],
        };
        let err = client.upload_buffer(&payload).await.unwrap_err();
        assert!(matches!(err, StreamError::Crypto(_)));
    }
}
