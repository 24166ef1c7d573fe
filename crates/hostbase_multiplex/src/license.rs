//! Module license gate.
//!
//! Multiplexing is a licensed module. A [`ModulesDescriptor`] unlocks it if
//! it names a customer, is marked valid, has not expired, switches the
//! `multiplex` module on and carries a valid signature.
//!
//! ## Signature Format
//!
//! The signature is an Ed25519 signature over the SHA-256 digest of the
//! descriptor's canonical listing (`key = value\r\n` lines, sorted, meta
//! keys excluded), base64-encoded.

use crate::error::{MultiplexError, MultiplexResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hostbase_backend::ModulesDescriptor;
use sha2::{Digest, Sha256};

/// Module that must be switched on.
pub const MULTIPLEX_MODULE: &str = "multiplex";

fn listing_digest(descriptor: &ModulesDescriptor) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(descriptor.canonical_listing().as_bytes()));
    digest
}

/// Signs `descriptor`, returning it with the signature set.
pub fn sign_descriptor(key: &SigningKey, mut descriptor: ModulesDescriptor) -> ModulesDescriptor {
    let signature = key.sign(&listing_digest(&descriptor));
    descriptor.signature = Some(STANDARD.encode(signature.to_bytes()));
    descriptor
}

/// Checks module license descriptors against a verifying key.
#[derive(Clone)]
pub struct LicenseGate {
    key: VerifyingKey,
}

impl LicenseGate {
    /// Creates a gate from raw public key bytes.
    pub fn new(key: &[u8; 32]) -> MultiplexResult<Self> {
        let key = VerifyingKey::from_bytes(key)
            .map_err(|e| MultiplexError::Config(format!("invalid license key: {e}")))?;
        Ok(Self { key })
    }

    /// Checks `descriptor` as of today.
    pub fn check(&self, descriptor: &ModulesDescriptor) -> MultiplexResult<()> {
        self.check_at(descriptor, Utc::now().date_naive())
    }

    /// Checks `descriptor` as of `today`.
    pub fn check_at(&self, descriptor: &ModulesDescriptor, today: NaiveDate) -> MultiplexResult<()> {
        if descriptor.customer.as_deref().unwrap_or_default().is_empty() {
            return Err(MultiplexError::License("no customer in modules descriptor".into()));
        }
        if !descriptor.valid {
            return Err(MultiplexError::License("modules descriptor invalid".into()));
        }
        match descriptor.expires.as_deref() {
            None | Some("never") => {}
            Some(expires) => {
                let date = NaiveDate::parse_from_str(expires, "%Y-%m-%d").map_err(|_| {
                    MultiplexError::License(format!("bad expiry date '{expires}'"))
                })?;
                if date <= today {
                    return Err(MultiplexError::License(format!("modules descriptor expired on {date}")));
                }
            }
        }
        if !descriptor.is_enabled(MULTIPLEX_MODULE) {
            return Err(MultiplexError::License("multiplex module not enabled".into()));
        }
        self.verify_signature(descriptor)?;
        tracing::debug!(customer = ?descriptor.customer, "modules descriptor signature verified");
        Ok(())
    }

    fn verify_signature(&self, descriptor: &ModulesDescriptor) -> MultiplexResult<()> {
        let encoded = descriptor
            .signature
            .as_deref()
            .ok_or_else(|| MultiplexError::License("modules descriptor is unsigned".into()))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| MultiplexError::License("signature is not base64".into()))?;
        let signature = Signature::from_slice(&bytes)
            .map_err(|_| MultiplexError::License("malformed signature".into()))?;
        self.key
            .verify(&listing_digest(descriptor), &signature)
            .map_err(|_| MultiplexError::License("signature mismatch".into()))
    }
}

impl std::fmt::Debug for LicenseGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseGate").finish_non_exhaustive()
    }
}
