//! Registry authentication and authorization.
//!
//! # Purpose
//! Groups credential parsing, API key lifecycle, sessions, CLI tokens, the
//! role enforcer and the request authorizer.
pub mod api_keys;
pub mod authenticate;
pub mod authorize;
pub mod cli_token;
pub mod context;
pub mod rbac;
pub mod session;
