//! Access policy for the download route.
//!
//! The checks run in a fixed order: expiry first, then the password, then
//! the token. A client without the password therefore never learns whether
//! a token is valid, and an expired link is dead even with every credential.

use std::time::SystemTime;

/// Outcome of evaluating one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    DeniedExpired,
    DeniedUnauthorized,
    DeniedNotFound,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == AccessDecision::Allowed
    }

    /// Short label for logs and events
    pub fn reason(self) -> &'static str {
        match self {
            AccessDecision::Allowed => "allowed",
            AccessDecision::DeniedExpired => "expired",
            AccessDecision::DeniedUnauthorized => "unauthorized",
            AccessDecision::DeniedNotFound => "not found",
        }
    }
}

/// What a client presented with its request
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Path segment after the leading `/`
    pub token: &'a str,
    /// `passed` query parameter
    pub query_password: Option<&'a str>,
    /// `X-Password` header
    pub header_password: Option<&'a str>,
}

/// Immutable access rules of one session
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    token: String,
    password: Option<String>,
    expires_at: Option<SystemTime>,
}

impl AccessPolicy {
    /// An empty password is the same as no password.
    pub fn new(token: String, password: Option<String>, expires_at: Option<SystemTime>) -> Self {
        Self {
            token,
            password: password.filter(|p| !p.is_empty()),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn decide(&self, now: SystemTime, credentials: &Credentials<'_>) -> AccessDecision {
        decide(
            now,
            self.expires_at,
            credentials,
            &self.token,
            self.password.as_deref(),
        )
    }
}

/// Evaluate a request against the session's rules.
pub fn decide(
    now: SystemTime,
    expires_at: Option<SystemTime>,
    credentials: &Credentials<'_>,
    expected_token: &str,
    expected_password: Option<&str>,
) -> AccessDecision {
    if expires_at.is_some_and(|deadline| now > deadline) {
        return AccessDecision::DeniedExpired;
    }

    if let Some(expected) = expected_password.filter(|p| !p.is_empty()) {
        let supplied = |candidate: Option<&str>| candidate.is_some_and(|p| p == expected);
        if !supplied(credentials.query_password) && !supplied(credentials.header_password) {
            return AccessDecision::DeniedUnauthorized;
        }
    }

    if credentials.token != expected_token {
        return AccessDecision::DeniedNotFound;
    }

    AccessDecision::Allowed
}
