pub mod client;
pub mod models;
pub mod validate;

pub use client::ApiClient;
pub use models::{
    BufferPayload, PipedSessionPayload, RecordingMetadata, SessionMetadata, SessionMode,
    UserProfile,
};
