//! Error types for session setup and per-request transfer failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while preparing a session. Nothing is served when this occurs.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no paths given to share")]
    NoPaths,

    #[error("failed to prepare artifact: {0}")]
    Archive(#[from] ArchiveError),

    #[error("interface '{0}' not found or has no IPv4 address")]
    InterfaceNotFound(String),

    #[error("no usable network interface found")]
    NoNetworkInterface,

    #[error("no free port available: {0}")]
    NoFreePort(#[source] io::Error),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Artifact could not be read for a single request.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot open artifact {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot stat artifact {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        tracing::error!("Transfer failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "File is no longer available",
        )
            .into_response()
    }
}
