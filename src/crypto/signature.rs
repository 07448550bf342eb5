//! Recipe signature verification (RSA PKCS#1 v1.5 over SHA-256).

use crate::error::{Error, Result};
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use sha2::Sha256;

/// Parses a PEM public key, accepting both SPKI (`BEGIN PUBLIC KEY`) and
/// PKCS#1 (`BEGIN RSA PUBLIC KEY`) encodings.
fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::Signature(format!("invalid RSA public key: {}", e)))
}

/// Verifies `signature` over `message` with the PEM-encoded RSA `public_key_pem`.
pub fn verify_recipe_signature(
    public_key_pem: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let public_key = parse_public_key(public_key_pem)?;
    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let signature = Signature::try_from(signature)
        .map_err(|e| Error::Signature(format!("malformed signature: {}", e)))?;

    verifying_key
        .verify(message, &signature)
        .map_err(|e| Error::Signature(e.to_string()))
}
