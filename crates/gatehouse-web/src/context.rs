//! Per-request state threaded through the middleware chain.

use axum::http::StatusCode;
use gatehouse::AppError;
use gatehouse_auth::Claims;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Values that belong to one request.
///
/// A fresh context is created for each request before the chain runs and is
/// passed by `&mut` to every layer, so nothing here is shared between requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: String,
    started_at: Instant,
    start_time: SystemTime,
    status: Option<StatusCode>,
    claims: Option<Claims>,
    user_id: Option<Uuid>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            started_at: Instant::now(),
            start_time: SystemTime::now(),
            status: None,
            claims: None,
            user_id: None,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Wall-clock time the request entered the chain.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// [`start_time`](Self::start_time) as milliseconds since the Unix epoch.
    pub fn start_unix_ms(&self) -> u64 {
        self.start_time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Status of the response, once one has been produced.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Store verified claims along with the user id parsed from their subject.
    pub fn set_claims(&mut self, claims: Claims) {
        self.user_id = claims.user_id();
        self.claims = Some(claims);
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    /// The authenticated user, or `unauthenticated` on routes without one.
    pub fn require_user_id(&self) -> Result<Uuid, AppError> {
        self.user_id.ok_or_else(AppError::unauthenticated)
    }
}
