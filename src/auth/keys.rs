//! RSA key material for signing and verifying session tokens.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Signature algorithm for every token this service issues.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Public half of the key pair.
///
/// Cheap to clone; hand it to any process that only verifies tokens.
#[derive(Clone)]
pub struct VerifyingKey(DecodingKey);

impl VerifyingKey {
    pub fn from_pem(public_pem: &[u8]) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(public_pem).context("invalid RSA public key PEM")?;
        Ok(Self(key))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = fs::read(path)
            .with_context(|| format!("failed to read public key {}", path.display()))?;
        Self::from_pem(&pem)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.0
    }
}

/// Signing key pair, loaded once at startup and shared read-only.
#[derive(Clone)]
pub struct KeyMaterial {
    signing: EncodingKey,
    verifying: VerifyingKey,
}

impl KeyMaterial {
    /// Load a key pair from PEM text.
    ///
    /// Fails if either key is unreadable or if the public key does not
    /// verify signatures made by the private key.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self> {
        let signing =
            EncodingKey::from_rsa_pem(private_pem).context("invalid RSA private key PEM")?;
        let verifying = VerifyingKey::from_pem(public_pem)?;

        let material = Self { signing, verifying };
        material.check_pair()?;
        Ok(material)
    }

    /// Load a key pair from two PEM files.
    pub fn from_files(private_path: impl AsRef<Path>, public_path: impl AsRef<Path>) -> Result<Self> {
        let private_path = private_path.as_ref();
        let public_path = public_path.as_ref();

        let private_pem = fs::read(private_path)
            .with_context(|| format!("failed to read private key {}", private_path.display()))?;
        let public_pem = fs::read(public_path)
            .with_context(|| format!("failed to read public key {}", public_path.display()))?;

        Self::from_pem(&private_pem, &public_pem)
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.signing
    }

    fn check_pair(&self) -> Result<()> {
        #[derive(Serialize, Deserialize, Clone)]
        struct PairCheck {
            check: String,
        }

        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &PairCheck {
                check: "key-pair-check".to_string(),
            },
            &self.signing,
        )
        .context("private key cannot sign")?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_aud = false;

        decode::<PairCheck>(&token, self.verifying.decoding_key(), &validation)
            .map_err(|_| anyhow!("public key does not match private key"))?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    pub const PRIVATE_PEM: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa_private.pem"));
    pub const PUBLIC_PEM: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa_public.pem"));
    pub const FOREIGN_PRIVATE_PEM: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa_foreign_private.pem"));
    pub const FOREIGN_PUBLIC_PEM: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/rsa_foreign_public.pem"));

    pub fn key_material() -> super::KeyMaterial {
        super::KeyMaterial::from_pem(PRIVATE_PEM.as_bytes(), PUBLIC_PEM.as_bytes()).unwrap()
    }
}
