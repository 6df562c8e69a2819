//! AES-256-GCM authenticated encryption for data the agent protects at rest.
//!
//! Sealed data is `nonce (12 bytes) || ciphertext+tag`. Text helpers wrap
//! that in standard base64. Decryption fails closed: a wrong key, a flipped
//! bit or a truncated input all yield [`CipherError::Decrypt`] and no
//! plaintext at all.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Extension appended by [`Cipher::encrypt_file`] when no output is given.
pub const ENCRYPTED_EXTENSION: &str = "enc";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed: data is corrupt or was sealed with another key")]
    Decrypt,

    #[error("sealed data is malformed: {0}")]
    Malformed(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Symmetric cipher bound to one key for the life of the process.
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Build a cipher from configured key material.
    ///
    /// URL-safe base64 of exactly 32 bytes (the output of
    /// [`generate_random_key`](super::api_key::generate_random_key)) is used
    /// as the key directly; anything else is stretched with SHA-256.
    pub fn new(material: &str) -> Self {
        let key: [u8; KEY_LEN] = match URL_SAFE.decode(material.trim()) {
            Ok(bytes) if bytes.len() == KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&bytes);
                key
            }
            _ => Sha256::digest(material.as_bytes()).into(),
        };
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_LEN {
            return Err(CipherError::Malformed(format!(
                "expected at least {NONCE_LEN} bytes, got {}",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)
    }

    /// Encrypt UTF-8 text to base64.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String, CipherError> {
        self.encrypt(plaintext.as_bytes())
            .map(|sealed| STANDARD.encode(sealed))
    }

    /// Decrypt base64 produced by [`encrypt_str`](Self::encrypt_str).
    pub fn decrypt_str(&self, encoded: &str) -> Result<String, CipherError> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::Malformed(e.to_string()))?;
        let plaintext = self.decrypt(&sealed)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }

    /// Encrypt `input` to `output` (default `<input>.enc`); returns the path written.
    pub fn encrypt_file(&self, input: &Path, output: Option<&Path>) -> Result<PathBuf, CipherError> {
        let output = output.map_or_else(|| default_encrypted_path(input), Path::to_path_buf);
        let plaintext = read(input)?;
        let sealed = self.encrypt(&plaintext)?;
        write(&output, &sealed)?;
        Ok(output)
    }

    /// Decrypt `input` to `output` (default: `input` without its `.enc`
    /// extension, or `<input>.dec`); returns the path written.
    ///
    /// Nothing is written when decryption fails.
    pub fn decrypt_file(&self, input: &Path, output: Option<&Path>) -> Result<PathBuf, CipherError> {
        let output = output.map_or_else(|| default_decrypted_path(input), Path::to_path_buf);
        let sealed = read(input)?;
        let plaintext = self.decrypt(&sealed)?;
        write(&output, &plaintext)?;
        Ok(output)
    }
}

fn default_encrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    PathBuf::from(name)
}

fn default_decrypted_path(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == ENCRYPTED_EXTENSION) {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_owned();
        name.push(".dec");
        PathBuf::from(name)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, CipherError> {
    std::fs::read(path).map_err(|source| CipherError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, data: &[u8]) -> Result<(), CipherError> {
    std::fs::write(path, data).map_err(|source| CipherError::Io {
        path: path.to_path_buf(),
        source,
    })
}
