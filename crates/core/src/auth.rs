// Access token store for bearer authentication
//
// Only SHA-256 digests of the configured tokens are kept. Plaintext never
// enters a log line; diagnostics use the first few hex chars of the digest.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

/// Number of hex characters of a digest that may appear in logs
pub const DIGEST_LOG_PREFIX_LEN: usize = 8;

/// Why a request could not be authenticated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing or malformed Authorization header")]
    MissingOrMalformedHeader,

    #[error("Invalid access token")]
    InvalidToken,
}

/// Identity attached to a request after successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub token_digest: String,
}

impl AuthenticatedIdentity {
    /// Truncated digest, safe for logging
    pub fn digest_prefix(&self) -> &str {
        digest_prefix(&self.token_digest)
    }
}

/// Immutable set of acceptable token digests
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    digests: HashSet<String>,
}

impl TokenStore {
    /// Build the store from plaintext tokens. Entries are trimmed and empty
    /// entries skipped.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut digests = HashSet::new();

        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }

            let digest = hash_token(token);
            tracing::info!(digest_prefix = digest_prefix(&digest), "Registered access token");
            digests.insert(digest);
        }

        if digests.is_empty() {
            tracing::warn!("No access tokens configured; all authenticated requests will be rejected");
        } else {
            tracing::info!(count = digests.len(), "Access token store initialized");
        }

        Self { digests }
    }

    /// Validate an `Authorization` header value of the form `Bearer <token>`.
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthenticatedIdentity, AuthError> {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingOrMalformedHeader)?;

        let digest = hash_token(token);
        if self.digests.contains(&digest) {
            Ok(AuthenticatedIdentity {
                token_digest: digest,
            })
        } else {
            tracing::warn!(digest_prefix = digest_prefix(&digest), "Rejected unknown access token");
            Err(AuthError::InvalidToken)
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Hex-encoded SHA-256 digest of a token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn digest_prefix(digest: &str) -> &str {
    &digest[..DIGEST_LOG_PREFIX_LEN.min(digest.len())]
}
