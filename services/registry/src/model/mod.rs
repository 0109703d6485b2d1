//! Registry data model.
//!
//! # Purpose
//! Re-exports the authority and API key records shared by the API and store layers.
mod api_key;
mod authority;

pub use api_key::ApiKey;
pub use authority::{Authority, AuthorityKey, AuthorityPatch};
