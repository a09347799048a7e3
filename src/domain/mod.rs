pub mod credentials;
pub mod message;
pub mod target;

pub use credentials::ServiceAccountKey;
pub use message::Message;
pub use target::Target;
