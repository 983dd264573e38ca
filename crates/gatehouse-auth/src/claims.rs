use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Token payload: registered claims plus the caller's roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user id as a UUID string.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

pub(crate) fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl Claims {
    /// Claims for `subject` issued now and valid for `ttl`.
    pub fn new(subject: Uuid, issuer: impl Into<String>, ttl: Duration) -> Self {
        let now = now();
        Self {
            sub: subject.to_string(),
            iss: issuer.into(),
            iat: now,
            exp: now + ttl.as_secs(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Exact, case-sensitive membership check.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}
