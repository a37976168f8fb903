//! Symmetric decryption of blueprint secrets.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use sha2::{Digest as _, Sha256};

use crate::exec::Executor;

/// Environment variable used to hand the password to `openssl`.
const PASSWORD_ENV: &str = "BLUEPRINT_DECRYPT_PASSWORD";

/// Decrypts ciphertext with a password.
pub trait Decryptor: Send + Sync + std::fmt::Debug {
    /// # Errors
    ///
    /// Returns an error if the password is wrong or the ciphertext is
    /// corrupt.
    fn decrypt(&self, ciphertext: &[u8], password: &str) -> Result<Vec<u8>>;
}

/// [`Decryptor`] for base64-armoured AES-256-CBC files produced by
/// `openssl enc -aes-256-cbc -pbkdf2 -iter 100000 -a`.
///
/// The password travels through the child's environment, never its
/// command line.
#[derive(Debug)]
pub struct OpensslDecryptor {
    executor: Arc<dyn Executor>,
}

impl OpensslDecryptor {
    /// Decryptor running `openssl` through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

impl Decryptor for OpensslDecryptor {
    fn decrypt(&self, ciphertext: &[u8], password: &str) -> Result<Vec<u8>> {
        let armoured =
            std::str::from_utf8(ciphertext).context("encrypted file is not base64 text")?;
        let pass_arg = format!("env:{PASSWORD_ENV}");
        let result = self.executor.run_with_input(
            "openssl",
            &[
                "enc", "-d", "-aes-256-cbc", "-pbkdf2", "-iter", "100000", "-a", "-pass",
                &pass_arg,
            ],
            &[(PASSWORD_ENV, password)],
            Some(armoured),
        )?;
        if !result.success {
            bail!("decryption failed (wrong password or corrupt file)");
        }
        Ok(result.stdout.into_bytes())
    }
}

/// Hex-encoded SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
