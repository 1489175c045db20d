pub mod error;
pub mod flow;
pub mod phone;
pub mod ports;

pub use error::{VerificationError, VerificationErrorKind};
pub use flow::{VerificationConfig, VerificationFlow, VerificationSession, VerificationStep};
pub use phone::normalize_phone_number;
pub use ports::{HttpVerificationApi, VerificationApi};
