//! HTTP file sharing module
//!
//! Serves one artifact behind a token URL with expiry and password gating.

pub mod policy;
pub mod server;

pub use policy::{AccessDecision, AccessPolicy, Credentials, decide};
pub use server::{DownloadCounter, ShareServer, create_router, generate_session_token};
