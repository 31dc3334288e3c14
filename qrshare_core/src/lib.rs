//! Ad-hoc LAN file sharing over HTTP.
//!
//! A share session packs the requested paths into a single artifact, serves
//! it under a random token URL, and gates every download on expiry, an
//! optional password and the token itself.

use std::net::{IpAddr, SocketAddr};

pub mod archive;
pub mod config;
pub mod error;
pub mod http_share;
pub mod network;
pub mod qr;
pub mod session;

pub use error::{ArchiveError, SetupError, TransferError};
pub use session::{Session, SessionOptions, SessionReport};

/// Report from the share server to whoever runs the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareEvent {
    /// HTTP server is accepting connections
    ServerStarted { addr: SocketAddr },

    /// Artifact was released to a client
    DownloadServed { client_ip: IpAddr, total: u64 },

    /// Request was rejected by the access policy
    AccessDenied {
        client_ip: IpAddr,
        reason: &'static str,
    },

    /// HTTP server has stopped accepting connections
    ServerStopped { total: u64 },
}
