//! Image signing and signature verification for Stagegate.
//!
//! # Purpose
//! Signs image digests with Ed25519 keys and verifies that the signatures
//! attached to a digest satisfy the `signatures` requirements of an image
//! selector.
//!
//! # How it fits
//! The controller's selector matcher hands a digest and the selector's
//! [`SignatureRules`] to a [`SignatureVerifier`]; the verifier pulls signatures
//! through a [`SignatureSource`] (a registry in production,
//! [`MemorySignatureStore`] in tests).
//!
//! # Key invariants
//! - Signatures cover a simple-signing payload naming the manifest digest.
//! - The signed reference is recorded in the `stagegate.io/signed-name`
//!   annotation at signing time.
//! - Verification failures, malformed policy and transport errors are distinct
//!   [`SignatureError`] classes.
//!
//! # Examples
//! ```rust
//! use stagegate_signature::{generate_signing_key, sign_image};
//! use std::collections::BTreeMap;
//!
//! let key = generate_signing_key();
//! let digest = format!("sha256:{}", "ab".repeat(32));
//! let signature = sign_image(&key, "reg/app:v1", &digest, &BTreeMap::new()).expect("sign");
//! assert!(signature.payload.contains(&digest));
//! ```

mod errors;
mod keys;
mod payload;
mod rules;
mod sign;
mod source;
mod verify;

pub use errors::{SignatureError, SignatureResult};
pub use keys::{generate_signing_key, key_fingerprint, parse_public_key, public_key_pem};
pub use payload::{PAYLOAD_TYPE, SIGNED_NAME_ANNOTATION, SimpleSigningPayload};
pub use rules::{AnnotationRequirement, AnnotationSelector, MatchMode, SignatureRules, SignedBy};
pub use sign::sign_image;
pub use source::{ImageSignature, MemorySignatureStore, SignatureSource};
pub use verify::{SignatureVerifier, VerifyOptions};
