pub mod batch;
pub mod client;
pub mod error;
pub mod retry;
pub mod sender;

pub use client::{ClientOptions, FcmClient, MulticastReport, TargetFailure};
pub use error::PushError;
pub use retry::RetryPolicy;
