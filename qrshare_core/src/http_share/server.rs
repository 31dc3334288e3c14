//! HTTP server for the download session
//!
//! One route shape: `GET /{token}`. Every request is run through the
//! [`AccessPolicy`] before any byte of the artifact is released.

use super::policy::{AccessDecision, AccessPolicy, Credentials};
use crate::ShareEvent;
use crate::archive::download_name;
use crate::error::TransferError;
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs::File;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Query parameter carrying the password
pub const PASSWORD_QUERY_PARAM: &str = "passed";

/// Header carrying the password
pub const PASSWORD_HEADER: &str = "x-password";

/// How long `stop` waits for in-flight transfers before abandoning them
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const EXPIRED_MESSAGE: &str = "Link expired";
const UNAUTHORIZED_MESSAGE: &str =
    "Unauthorized. Provide password via '?passed=SECRET' or header X-Password.";
const NOT_FOUND_MESSAGE: &str = "Not Found";

/// Generate a random session token (32 characters)
pub fn generate_session_token() -> String {
    // Full UUID entropy (128 bits) so the token cannot be brute-forced
    Uuid::new_v4().simple().to_string()
}

/// Successful download counter shared by all request handlers
#[derive(Debug, Clone, Default)]
pub struct DownloadCounter(Arc<AtomicU64>);

impl DownloadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one download and return the new total
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// State handed to every request handler
pub struct ShareState {
    pub policy: AccessPolicy,
    pub artifact_path: PathBuf,
    pub file_name: String,
    pub downloads: DownloadCounter,
    pub event_tx: mpsc::Sender<ShareEvent>,
}

impl ShareState {
    pub fn new(
        policy: AccessPolicy,
        artifact_path: PathBuf,
        event_tx: mpsc::Sender<ShareEvent>,
    ) -> Self {
        let file_name = download_name(&artifact_path);
        Self {
            policy,
            artifact_path,
            file_name,
            downloads: DownloadCounter::new(),
            event_tx,
        }
    }

    // Events are best-effort; a slow consumer must never stall a download
    fn emit(&self, event: ShareEvent) {
        let _ = self.event_tx.try_send(event);
    }
}

/// Middleware to add security headers
async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}

fn password_from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == PASSWORD_QUERY_PARAM && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

fn password_from_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Map a denial onto its HTTP status and body
fn denial_response(decision: AccessDecision) -> Response {
    match decision {
        AccessDecision::DeniedExpired => (StatusCode::GONE, EXPIRED_MESSAGE).into_response(),
        AccessDecision::DeniedUnauthorized => {
            (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE).into_response()
        }
        AccessDecision::DeniedNotFound | AccessDecision::Allowed => {
            (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE).into_response()
        }
    }
}

/// `Content-Disposition` only carries visible ASCII reliably
fn attachment_header(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// Handler for every GET: policy check, then stream the artifact
async fn download_handler(
    State(state): State<Arc<ShareState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, TransferError> {
    let path = uri.path();
    let query_password = password_from_query(&uri);
    let credentials = Credentials {
        token: path.strip_prefix('/').unwrap_or(path),
        query_password: query_password.as_deref(),
        header_password: password_from_header(&headers),
    };

    let decision = state.policy.decide(SystemTime::now(), &credentials);
    if !decision.is_allowed() {
        tracing::info!("Denied request from {}: {}", addr.ip(), decision.reason());
        state.emit(ShareEvent::AccessDenied {
            client_ip: addr.ip(),
            reason: decision.reason(),
        });
        return Ok(denial_response(decision));
    }

    let file = File::open(&state.artifact_path)
        .await
        .map_err(|source| TransferError::Open {
            path: state.artifact_path.clone(),
            source,
        })?;
    let len = file
        .metadata()
        .await
        .map_err(|source| TransferError::Metadata {
            path: state.artifact_path.clone(),
            source,
        })?
        .len();

    let total = state.downloads.increment();
    tracing::info!("Serving {} to {} (download #{})", state.file_name, addr.ip(), total);
    state.emit(ShareEvent::DownloadServed {
        client_ip: addr.ip(),
        total,
    });

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CONTENT_DISPOSITION, attachment_header(&state.file_name)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Build the axum router for a share session
pub fn create_router(state: Arc<ShareState>) -> Router {
    Router::new()
        .route("/", get(download_handler))
        .route("/{*token}", get(download_handler))
        .layer(middleware::from_fn(add_security_headers))
        .with_state(state)
}

/// Running download session server
pub struct ShareServer {
    local_addr: SocketAddr,
    downloads: DownloadCounter,
    event_tx: mpsc::Sender<ShareEvent>,
    cancel_token: CancellationToken,
    shutdown_grace: Duration,
    task: JoinHandle<io::Result<()>>,
}

impl ShareServer {
    /// Bind `addr` and start serving `artifact_path` in a background task
    pub async fn start(
        addr: SocketAddr,
        artifact_path: PathBuf,
        policy: AccessPolicy,
        event_tx: mpsc::Sender<ShareEvent>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(ShareState::new(policy, artifact_path, event_tx.clone()));
        let downloads = state.downloads.clone();
        let router = create_router(state.clone());

        let cancel_token = CancellationToken::new();
        let ct = cancel_token.clone();

        tracing::info!(
            "HTTP share server starting on http://{}/{}",
            local_addr,
            state.policy.token()
        );

        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                ct.cancelled().await;
                tracing::info!("HTTP share server shutting down gracefully");
            })
            .await
        });

        let _ = event_tx.try_send(ShareEvent::ServerStarted { addr: local_addr });

        Ok(Self {
            local_addr,
            downloads,
            event_tx,
            cancel_token,
            shutdown_grace: SHUTDOWN_GRACE,
            task,
        })
    }

    /// Override how long `stop` waits for in-flight transfers
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Successful downloads so far
    pub fn downloads(&self) -> u64 {
        self.downloads.get()
    }

    /// Stop accepting connections and return the final download count.
    ///
    /// In-flight transfers get the shutdown grace period ([`SHUTDOWN_GRACE`]
    /// by default) to finish; after that the server task is abandoned.
    pub async fn stop(mut self) -> u64 {
        self.cancel_token.cancel();

        match tokio::time::timeout(self.shutdown_grace, &mut self.task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::error!("HTTP share server error: {}", e),
            Ok(Err(e)) => tracing::error!("HTTP share server task failed: {}", e),
            Err(_) => {
                tracing::warn!(
                    "In-flight transfers still running after {:?}, abandoning them",
                    self.shutdown_grace
                );
                self.task.abort();
            }
        }

        let total = self.downloads.get();
        let _ = self.event_tx.try_send(ShareEvent::ServerStopped { total });
        tracing::info!("HTTP share server stopped after {} download(s)", total);
        total
    }
}

impl Drop for ShareServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    const TOKEN: &str = "abc123";
    const CONTENT: &[u8] = b"hello from the share";

    struct Fixture {
        _dir: tempfile::TempDir,
        router: Router,
        state: Arc<ShareState>,
        events: mpsc::Receiver<ShareEvent>,
    }

    fn fixture(policy: AccessPolicy) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, CONTENT).unwrap();

        let (tx, rx) = mpsc::channel(100);
        let state = Arc::new(ShareState::new(policy, path, tx));
        let router = create_router(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([192, 168, 1, 20], 50000))));

        Fixture {
            _dir: dir,
            router,
            state,
            events: rx,
        }
    }

    async fn send_get(router: &Router, uri: &str, password_header: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(p) = password_header {
            builder = builder.header("X-Password", p);
        }
        router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_of(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[test]
    fn test_generate_session_token() {
        let token = generate_session_token();
        assert_eq!(token.len(), 32);
        assert_ne!(token, generate_session_token());
    }

    #[tokio::test]
    async fn test_correct_token_serves_file() {
        let mut fx = fixture(AccessPolicy::new(TOKEN.into(), None, None));

        let response = send_get(&fx.router, "/abc123", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            &CONTENT.len().to_string()
        );
        assert_eq!(body_of(response).await, CONTENT);
        assert_eq!(fx.state.downloads.get(), 1);

        assert_eq!(
            fx.events.try_recv().unwrap(),
            ShareEvent::DownloadServed {
                client_ip: [192, 168, 1, 20].into(),
                total: 1
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_token_is_plain_404() {
        let fx = fixture(AccessPolicy::new(TOKEN.into(), None, None));

        for uri in ["/wrong", "/", "/abc123/extra", "/abc1234"] {
            let response = send_get(&fx.router, uri, None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
            assert_eq!(body_of(response).await, NOT_FOUND_MESSAGE.as_bytes());
        }
        assert_eq!(fx.state.downloads.get(), 0);
    }

    #[tokio::test]
    async fn test_password_channels() {
        let fx = fixture(AccessPolicy::new(TOKEN.into(), Some("secret".into()), None));

        let ok_query = send_get(&fx.router, "/abc123?passed=secret", None).await;
        assert_eq!(ok_query.status(), StatusCode::OK);

        let ok_header = send_get(&fx.router, "/abc123", Some("secret")).await;
        assert_eq!(ok_header.status(), StatusCode::OK);

        let bad = send_get(&fx.router, "/abc123?passed=bad", None).await;
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
        let message = String::from_utf8(body_of(bad).await).unwrap();
        assert!(message.contains("passed"));
        assert!(message.contains("X-Password"));

        let missing = send_get(&fx.router, "/abc123", None).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(fx.state.downloads.get(), 2);
    }

    #[tokio::test]
    async fn test_url_encoded_password() {
        let fx = fixture(AccessPolicy::new(TOKEN.into(), Some("s3cr3t &x".into()), None));
        let response = send_get(&fx.router, "/abc123?passed=s3cr3t%20%26x", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expired_link_is_gone() {
        let past = SystemTime::now() - Duration::from_secs(1);
        let mut fx = fixture(AccessPolicy::new(TOKEN.into(), Some("secret".into()), Some(past)));

        let response = send_get(&fx.router, "/abc123?passed=secret", Some("secret")).await;
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(fx.state.downloads.get(), 0);
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ShareEvent::AccessDenied {
                client_ip: [192, 168, 1, 20].into(),
                reason: "expired"
            }
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_is_server_error() {
        let fx = fixture(AccessPolicy::new(TOKEN.into(), None, None));
        std::fs::remove_file(&fx.state.artifact_path).unwrap();

        let response = send_get(&fx.router, "/abc123", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fx.state.downloads.get(), 0);
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        let fx = fixture(AccessPolicy::new(TOKEN.into(), None, None));
        let response = fx
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(fx.state.downloads.get(), 0);
    }

    #[tokio::test]
    async fn test_security_headers() {
        let fx = fixture(AccessPolicy::new(TOKEN.into(), None, None));

        for uri in ["/abc123", "/wrong"] {
            let response = send_get(&fx.router, uri, None).await;
            let headers = response.headers();
            assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
            assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
            assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        }
    }

    #[test]
    fn test_attachment_header_sanitizes_name() {
        assert_eq!(attachment_header("a b.txt"), "attachment; filename=\"a b.txt\"");
        assert_eq!(
            attachment_header("quo\"te\\é.txt"),
            "attachment; filename=\"quo_te__.txt\""
        );
    }

    #[test]
    fn test_counter_increments() {
        let counter = DownloadCounter::new();
        let shared = counter.clone();
        assert_eq!(counter.increment(), 1);
        assert_eq!(shared.increment(), 2);
        assert_eq!(counter.get(), 2);
    }
}
