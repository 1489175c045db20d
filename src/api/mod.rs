pub mod client;
pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use error::{ApiError, ApiErrorKind};
