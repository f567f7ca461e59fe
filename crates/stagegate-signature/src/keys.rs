//! Ed25519 key helpers for image signing.
//!
//! # Purpose
//! Generate signing keys and move public keys in and out of the PEM form that
//! policy objects carry in `signedBy.allOf` / `signedBy.anyOf`.
//!
//! # Key invariants
//! - Keys are always Ed25519.
//! - Policy objects only ever hold public keys (SPKI PEM).
//! - Fingerprints are SHA-256 over the raw public key bytes, hex encoded, and are
//!   safe to log.
//!
//! # Security model
//! Private keys produced by [`generate_signing_key`] never leave the caller;
//! nothing in this crate serializes them.
use crate::{SignatureError, SignatureResult};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a fresh Ed25519 signing key from a random 32-byte seed.
pub fn generate_signing_key() -> SigningKey {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    SigningKey::from_bytes(&seed)
}

/// Encode a public key as SPKI PEM.
pub fn public_key_pem(key: &VerifyingKey) -> SignatureResult<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|err| SignatureError::InvalidKey(err.to_string()))
}

/// Parse an SPKI PEM public key as found in signature rules.
pub fn parse_public_key(pem: &str) -> SignatureResult<VerifyingKey> {
    VerifyingKey::from_public_key_pem(pem.trim())
        .map_err(|err| SignatureError::InvalidKey(err.to_string()))
}

pub fn key_fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
