//! Bearer token authentication for gatehouse.
//!
//! Keys are loaded once from a directory of `<kid>/{private,public}.pem` pairs.
//! Tokens are RS256 JWTs whose header names the signing key.
//!
//! # Example
//!
//! ```rust,ignore
//! use gatehouse_auth::{Claims, KeyStore, TokenAuthority};
//! use std::{sync::Arc, time::Duration};
//!
//! let keys = KeyStore::load("keys/")?;
//! let authority = TokenAuthority::new(Arc::new(keys), "gatehouse");
//!
//! let claims = Claims::new(user_id, "gatehouse", Duration::from_secs(3600))
//!     .with_roles(["user"]);
//! let token = authority.generate_token(kid, &claims)?;
//!
//! let claims = authority.authenticate(&format!("Bearer {token}"))?;
//! authority.authorize(&claims, "user")?;
//! ```

mod claims;
mod error;
mod jwt;
mod keystore;

pub use claims::Claims;
pub use error::{AuthError, TokenError};
pub use jwt::TokenAuthority;
pub use keystore::{KeyLookup, KeyPair, KeyStore, KeyStoreError};
