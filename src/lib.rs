//! Client SDK for streaming biosignal data (EEG, PPG, accelerometer) from an
//! acquisition device into time-bounded buffers and relaying them to a remote
//! processing service over an encrypted channel.
//!
//! The typical flow:
//!
//! 1. Build an [`ApiClient`] and run [`ApiClient::handshake`] to establish
//!    the AES session key via the service's RSA public key.
//! 2. Construct a [`DeviceSource`] (e.g. [`device::SyntheticDevice`]) or plug
//!    in your own hardware backend.
//! 3. Call [`session::acquire_and_send_raw`] or
//!    [`session::acquire_and_send_piped`] with a [`CancellationToken`] you
//!    control; cancel it at any time to get back the buffers stored so far.

pub mod acquisition;
pub mod api;
pub mod crypto;
pub mod device;
pub mod error;
pub mod session;
pub mod uploader;

pub use acquisition::{AcquisitionConfig, BufferSink, BufferWindow, UploadRecord};
pub use api::{ApiClient, SessionMetadata, SessionMode, UserProfile};
pub use crypto::{CryptoChannel, CryptoError, SessionKey};
pub use device::{DeviceConfig, DeviceDescriptor, DeviceSource, SampleBlock};
pub use error::{StreamError, StreamResult};
pub use session::{SessionOutcome, StreamSettings};
pub use tokio_util::sync::CancellationToken;
