//! PKCE S256 challenge generation and random protocol values
//!
//! This module implements the Proof Key for Code Exchange (PKCE) extension
//! to OAuth 2.0 as defined in RFC 7636, specifically the `S256` challenge
//! method, plus the random `state` and `nonce` values of an authorization
//! request.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random string called the `code_verifier`.
//! 2. The client computes a SHA-256 hash of the verifier and base64url-encodes
//!    it to produce the `code_challenge`.
//! 3. The authorization request includes `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The token exchange request includes the original `code_verifier`.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest, Sha256};

/// Challenge method sent with every authorization request
pub const CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkceChallenge
// ---------------------------------------------------------------------------

/// A PKCE S256 verifier and its derived challenge
///
/// # Examples
///
/// ```
/// use msal_authcode::client::pkce::{generate, CHALLENGE_METHOD};
///
/// let pkce = generate();
/// assert_eq!(pkce.method, CHALLENGE_METHOD);
/// assert_eq!(pkce.verifier.len(), 43);
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Base64url (no padding) encoding of 32 random bytes, 43 characters.
    /// Sent to the token endpoint as `code_verifier`.
    pub verifier: String,

    /// Base64url (no padding) SHA-256 digest of the verifier's UTF-8 bytes.
    /// Sent to the authorization endpoint as `code_challenge`.
    pub challenge: String,

    /// Always `"S256"`
    pub method: String,
}

/// Generates a fresh PKCE S256 challenge
pub fn generate() -> PkceChallenge {
    let verifier = random_token(32);
    let challenge = challenge_for(&verifier);

    PkceChallenge {
        verifier,
        challenge,
        method: CHALLENGE_METHOD.to_string(),
    }
}

/// `BASE64URL(SHA256(ASCII(verifier)))`, RFC 7636 section 4.2
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Random `state` value for an authorization request
///
/// The output only uses base64url characters, so it is also a valid session
/// key for every session backend.
pub fn generate_state() -> String {
    random_token(16)
}

/// Random `nonce` value expected back in the ID token
pub fn generate_nonce() -> String {
    random_token(16)
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
