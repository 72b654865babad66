// Webhook dispatch module
//
// Handles:
// - Webhook and auth descriptors
// - OAuth2 client-credentials token acquisition
// - Token caching per auth endpoint
// - Single-attempt delivery with typed failures

pub mod dispatcher;
pub mod error;
pub mod oauth;
pub mod token_cache;
pub mod types;

pub use dispatcher::{DispatchOptions, Dispatcher};
pub use error::{DispatchError, Result};
pub use token_cache::{CachedToken, TokenCache};
pub use types::{Auth, AuthKind, Webhook};

// Property-based tests module
#[cfg(test)]
mod proptests;
