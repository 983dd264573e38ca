use gatehouse::{AppError, ErrorCode};
use std::collections::BTreeSet;
use std::fmt;

/// Why a bearer credential was rejected.
///
/// Callers only ever see `unauthenticated`; the variant exists for server-side logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Header is not exactly `<scheme> <token>`.
    MalformedHeader,
    /// Scheme other than `Bearer`.
    UnsupportedScheme(String),
    /// Token could not be decoded.
    Malformed(String),
    MissingKid,
    IssuerMismatch { expected: String, found: String },
    KeyNotFound(String),
    KeyMalformed(String),
    Expired,
    /// `iat` lies in the future.
    NotYetIssued,
    InvalidSignature,
    InvalidSubject(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader => write!(f, "malformed token"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "expected authorization header format: Bearer <token>, got scheme {:?}", scheme)
            }
            Self::Malformed(msg) => write!(f, "malformed token: {}", msg),
            Self::MissingKid => write!(f, "kid missing from header"),
            Self::IssuerMismatch { expected, found } => {
                write!(f, "issuer mismatch: expected {:?}, found {:?}", expected, found)
            }
            Self::KeyNotFound(kid) => write!(f, "public key lookup failed for kid {:?}", kid),
            Self::KeyMalformed(msg) => write!(f, "parsing public key: {}", msg),
            Self::Expired => write!(f, "token has expired"),
            Self::NotYetIssued => write!(f, "token issued in the future"),
            Self::InvalidSignature => write!(f, "signature verification failed"),
            Self::InvalidSubject(msg) => write!(f, "invalid subject claim: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

/// Errors produced by [`TokenAuthority`](crate::TokenAuthority).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Any failure while authenticating a bearer credential.
    Unauthenticated(TokenError),
    /// Claims lack the role a route requires.
    Forbidden {
        role: String,
        roles: BTreeSet<String>,
    },
    /// No private key for the kid used to sign.
    KeyNotFound(String),
    /// Private key PEM could not be parsed.
    KeyMalformed(String),
    /// Signing itself failed.
    Signing(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::Forbidden { .. } => ErrorCode::PermissionDenied,
            Self::KeyNotFound(_) | Self::KeyMalformed(_) | Self::Signing(_) => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(cause) => write!(f, "unauthenticated: {}", cause),
            Self::Forbidden { role, roles } => {
                write!(f, "unauthorized: claims roles {:?} role [{}]: user does not have role", roles, role)
            }
            Self::KeyNotFound(kid) => write!(f, "private key lookup failed for kid {:?}", kid),
            Self::KeyMalformed(msg) => write!(f, "parsing private key: {}", msg),
            Self::Signing(msg) => write!(f, "signing token: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unauthenticated(cause) => Some(cause),
            _ => None,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        Self::Unauthenticated(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let base = match err.code() {
            ErrorCode::Unauthenticated => AppError::unauthenticated(),
            ErrorCode::PermissionDenied => AppError::permission_denied(),
            _ => AppError::internal(),
        };
        base.with_detail(err.to_string())
    }
}
