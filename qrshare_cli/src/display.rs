//! Operator-facing terminal output

use qrshare_core::{Session, ShareEvent, qr};
use tokio::sync::mpsc;

/// Show the QR code, URL and session notices
pub fn present(session: &Session) {
    println!("Scan this QR code to download:");
    match qr::render_terminal(session.url()) {
        Some(code) => println!("{}", code),
        None => println!("(URL too long for a QR code)"),
    }
    println!("URL: {}", session.url());

    if session.is_password_protected() {
        println!("[Protected] Password is in URL param 'passed' or HTTP header X-Password.");
    }
    if let Some(expire) = session.expire() {
        println!(
            "[Notice] Link will expire in {} seconds",
            expire.as_secs()
        );
    }
}

/// Prompt shown once the listener is accepting connections
pub const STOP_PROMPT: &str = "Press Enter or Ctrl+C to stop transfer...";

/// Terminal line for a session event, if it is worth showing
pub fn event_line(evt: &ShareEvent) -> Option<String> {
    match evt {
        ShareEvent::ServerStarted { .. } => Some(STOP_PROMPT.to_string()),
        ShareEvent::DownloadServed { client_ip, total } => {
            Some(format!("Download #{} started by {}", total, client_ip))
        }
        ShareEvent::AccessDenied { client_ip, reason } => {
            Some(format!("Rejected request from {} ({})", client_ip, reason))
        }
        ShareEvent::ServerStopped { .. } => None,
    }
}

/// Print session activity as it happens
pub async fn print_events(mut rx: mpsc::Receiver<ShareEvent>) {
    while let Some(evt) = rx.recv().await {
        if let Some(line) = event_line(&evt) {
            println!("{}", line);
        }
    }
}
