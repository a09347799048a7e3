pub mod signer;
pub mod token_provider;

pub use signer::{AssertionClaims, sign_assertion};
pub use token_provider::{AccessToken, AccessTokenProvider, CacheBinding};
