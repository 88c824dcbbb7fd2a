//! The symmetric key tickets are signed with.

use crate::error::KeyError;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::info;

pub(crate) type HmacSha256 = Hmac<Sha256>;

/// Length of generated keys.
pub const KEY_LEN: usize = 32;

/// An initialized HMAC-SHA256 key. Created once at startup and shared by reference.
#[derive(Clone)]
pub struct TicketKey {
    mac: HmacSha256,
}

impl fmt::Debug for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TicketKey(..)")
    }
}

impl TicketKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() < KEY_LEN {
            return Err(KeyError::TooShort { len: bytes.len(), min: KEY_LEN });
        }
        let mac = HmacSha256::new_from_slice(bytes).map_err(|_e| KeyError::TooShort { len: bytes.len(), min: KEY_LEN })?;
        Ok(Self { mac })
    }

    /// A fresh key that only lives as long as the process.
    pub fn generate() -> Result<Self, KeyError> {
        Self::from_bytes(&random_bytes())
    }

    /// Reads the key at `path`, generating and persisting a new one if there is none yet.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let bytes = random_bytes();
                let write_error = |source| KeyError::Write { path: path.to_owned(), source };
                let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path).map_err(write_error)?;
                file.write_all(&bytes).map_err(write_error)?;
                file.sync_all().map_err(write_error)?;

                info!(path = %path.display(), "generated new ticket key");
                Self::from_bytes(&bytes)
            }
            Err(source) => Err(KeyError::Read { path: path.to_owned(), source }),
        }
    }

    pub(crate) fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }
}

fn random_bytes() -> [u8; KEY_LEN] {
    let mut bytes = [0_u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("nimbus-ticket-{name}-{}", std::process::id()));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(matches!(TicketKey::from_bytes(&[7; 16]), Err(KeyError::TooShort { len: 16, min: KEY_LEN })));
        assert!(TicketKey::from_bytes(&[7; KEY_LEN]).is_ok());
    }

    #[test]
    fn generated_key_is_persisted_and_reloaded() {
        let path = scratch_path("persist");

        let first = TicketKey::load_or_generate(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), KEY_LEN);
        let second = TicketKey::load_or_generate(&path).unwrap();

        let sign = |key: &TicketKey| {
            let mut mac = key.mac();
            mac.update(b"payload");
            mac.finalize().into_bytes()
        };
        assert_eq!(sign(&first), sign(&second));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unusable_key_file_fails_fast() {
        let path = scratch_path("short");
        fs::write(&path, b"too short").unwrap();
        assert!(matches!(TicketKey::load_or_generate(&path), Err(KeyError::TooShort { .. })));
        fs::remove_file(&path).unwrap();
    }
}
