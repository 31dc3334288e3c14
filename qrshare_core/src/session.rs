//! Session controller: owns one share run from artifact to final count.

use crate::ShareEvent;
use crate::archive::{Artifact, prepare_artifact};
use crate::error::SetupError;
use crate::http_share::{AccessPolicy, ShareServer, generate_session_token};
use crate::http_share::server::PASSWORD_QUERY_PARAM;
use crate::network::{BIND_ALL, find_free_port, resolve_ip};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

/// What the operator asked to share, and how
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub paths: Vec<PathBuf>,
    /// Pack even a single file into an archive
    pub force_zip: bool,
    /// Network interface whose address goes into the URL
    pub interface: Option<String>,
    /// Link lifetime, counted from when the server starts
    pub expire: Option<Duration>,
    pub password: Option<String>,
}

/// Outcome of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub url: String,
    pub downloads: u64,
}

/// A prepared session, ready to serve
#[derive(Debug)]
pub struct Session {
    token: String,
    password: Option<String>,
    expire: Option<Duration>,
    artifact: Artifact,
    ip: IpAddr,
    port: u16,
    url: String,
    cleaned_up: bool,
}

/// Public download URL: `http://{ip}:{port}/{token}`, plus `?passed=` when a
/// password is set
pub fn share_url(ip: IpAddr, port: u16, token: &str, password: Option<&str>) -> String {
    let base = format!("http://{}/{}", SocketAddr::new(ip, port), token);
    match password {
        Some(secret) => {
            let encoded: String = url::form_urlencoded::byte_serialize(secret.as_bytes()).collect();
            format!("{}?{}={}", base, PASSWORD_QUERY_PARAM, encoded)
        }
        None => base,
    }
}

impl Session {
    /// Build the artifact, then pick the advertised IP and a free port.
    pub async fn prepare(options: SessionOptions) -> Result<Self, SetupError> {
        Self::prepare_with(options, |interface| {
            let ip = resolve_ip(interface)?;
            let port = find_free_port()?;
            Ok((ip, port))
        })
        .await
    }

    /// Like [`Session::prepare`] with a custom IP/port lookup
    pub async fn prepare_with<F>(options: SessionOptions, locate: F) -> Result<Self, SetupError>
    where
        F: FnOnce(Option<&str>) -> Result<(IpAddr, u16), SetupError>,
    {
        if options.paths.is_empty() {
            return Err(SetupError::NoPaths);
        }

        let artifact = prepare_artifact(options.paths, options.force_zip).await?;

        let (ip, port) = match locate(options.interface.as_deref()) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                if let Err(cleanup_err) = artifact.cleanup() {
                    tracing::warn!("Could not remove temporary archive: {}", cleanup_err);
                }
                return Err(e);
            }
        };

        let token = generate_session_token();
        let password = options.password.filter(|p| !p.is_empty());
        let url = share_url(ip, port, &token, password.as_deref());

        Ok(Self {
            token,
            password,
            expire: options.expire.filter(|d| !d.is_zero()),
            artifact,
            ip,
            port,
            url,
            cleaned_up: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn is_password_protected(&self) -> bool {
        self.password.is_some()
    }

    pub fn expire(&self) -> Option<Duration> {
        self.expire
    }

    /// Serve until `stop` resolves, then shut down and clean up.
    ///
    /// The temporary artifact is only removed once the server has stopped.
    pub async fn serve<F>(
        mut self,
        stop: F,
        event_tx: mpsc::Sender<ShareEvent>,
    ) -> Result<SessionReport, SetupError>
    where
        F: Future<Output = ()>,
    {
        let expires_at = self.expire.map(|lifetime| SystemTime::now() + lifetime);
        let policy = AccessPolicy::new(self.token.clone(), self.password.clone(), expires_at);
        let addr = SocketAddr::new(BIND_ALL, self.port);

        let server = ShareServer::start(addr, self.artifact.path.clone(), policy, event_tx)
            .await
            .map_err(|source| SetupError::Bind { addr, source })?;

        stop.await;

        let downloads = server.stop().await;
        self.remove_artifact();

        Ok(SessionReport {
            url: self.url.clone(),
            downloads,
        })
    }

    fn remove_artifact(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        if let Err(e) = self.artifact.cleanup() {
            tracing::warn!(
                "Could not remove temporary archive {}: {}",
                self.artifact.path.display(),
                e
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.remove_artifact();
    }
}
