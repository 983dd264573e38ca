use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::claims::{now, Claims};
use crate::error::{AuthError, TokenError};
use crate::keystore::KeyLookup;

/// The only algorithm tokens are signed or verified with.
const ALGORITHM: Algorithm = Algorithm::RS256;

/// Issues and verifies RS256 bearer tokens.
///
/// Keys are resolved per token through the `kid` header, so tokens signed by any
/// key in the store verify while it is present. Verification only ever builds
/// RSA decoding keys and an RS256-only [`Validation`], which rules out accepting
/// an HMAC token keyed with a public key.
///
/// The authority holds no mutable state and is shared across requests as-is.
#[derive(Clone)]
pub struct TokenAuthority {
    keys: Arc<dyn KeyLookup>,
    issuer: String,
    validation: Validation,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn new(keys: Arc<dyn KeyLookup>, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            keys,
            issuer,
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign `claims` with the private key registered under `kid`.
    pub fn generate_token(&self, kid: &str, claims: &Claims) -> Result<String, AuthError> {
        let pem = self
            .keys
            .private_key(kid)
            .map_err(|_| AuthError::KeyNotFound(kid.to_string()))?;

        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::KeyMalformed(e.to_string()))?;

        let mut header = Header::new(ALGORITHM);
        header.kid = Some(kid.to_string());

        encode(&header, claims, &key).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Validate an `Authorization` header value and return its claims.
    ///
    /// Every failure is [`AuthError::Unauthenticated`]; the wrapped cause says
    /// which check rejected the credential.
    pub fn authenticate(&self, authorization: &str) -> Result<Claims, AuthError> {
        let token = bearer_token(authorization)?;
        Ok(self.verify(token)?)
    }

    /// Verify a compact token.
    ///
    /// The issuer is compared before any key is looked up, so that is the only
    /// place an issuer mismatch is reported.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let unverified = inspect(token)?;

        if unverified.issuer != self.issuer {
            return Err(TokenError::IssuerMismatch {
                expected: self.issuer.clone(),
                found: unverified.issuer,
            });
        }

        let pem = self
            .keys
            .public_key(&unverified.kid)
            .map_err(|_| TokenError::KeyNotFound(unverified.kid.clone()))?;

        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| TokenError::KeyMalformed(e.to_string()))?;

        let claims = decode::<Claims>(token, &key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        if claims.iat > now() {
            return Err(TokenError::NotYetIssued);
        }

        if claims.sub.is_empty() {
            return Err(TokenError::InvalidSubject("no subject claim".to_string()));
        }
        if claims.user_id().is_none() {
            return Err(TokenError::InvalidSubject(format!(
                "parsing subject {:?}",
                claims.sub
            )));
        }

        Ok(claims)
    }

    /// Succeed if `claims` carries `role`.
    pub fn authorize(&self, claims: &Claims, role: &str) -> Result<(), AuthError> {
        if claims.has_role(role) {
            return Ok(());
        }

        Err(AuthError::Forbidden {
            role: role.to_string(),
            roles: claims.roles.clone(),
        })
    }
}

/// Split `Bearer <token>` on its single space.
fn bearer_token(authorization: &str) -> Result<&str, TokenError> {
    let mut parts = authorization.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        (Some(scheme), Some(_), None) => Err(TokenError::UnsupportedScheme(scheme.to_string())),
        _ => Err(TokenError::MalformedHeader),
    }
}

/// Fields read before the signature is checked.
struct Unverified {
    kid: String,
    issuer: String,
}

fn inspect(token: &str) -> Result<Unverified, TokenError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed("expected three segments".to_string()));
    };

    let header = decode_segment(header)?;
    let kid = match header.get("kid") {
        Some(Value::String(kid)) => kid.clone(),
        _ => return Err(TokenError::MissingKid),
    };

    let payload = decode_segment(payload)?;
    let issuer = payload
        .get("iss")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Unverified { kid, issuer })
}

fn decode_segment(segment: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
}
