//! Password-based key derivation (PBKDF2-HMAC-SHA256, RFC 8018).

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::encryption::{EncryptionError, KEY_LEN};

type HmacSha256 = Hmac<Sha256>;

const DIGEST_LEN: usize = 32;

/// Work factor for backup key derivation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl SecurityLevel {
    pub fn iterations(self) -> u32 {
        match self {
            SecurityLevel::Low => 50_000,
            SecurityLevel::Medium => 100_000,
            SecurityLevel::High => 200_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the AES-256 backup key for `password`.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; KEY_LEN]>, EncryptionError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac_sha256(password.as_bytes(), salt, iterations, key.as_mut())?;
    Ok(key)
}

/// Fill `out` with PBKDF2-HMAC-SHA256 output. `iterations` below 1 is treated as 1.
pub fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<(), EncryptionError> {
    let prf = HmacSha256::new_from_slice(password)
        .map_err(|_| EncryptionError::InvalidKeyLength(password.len()))?;

    for (index, chunk) in out.chunks_mut(DIGEST_LEN).enumerate() {
        let block = u32::try_from(index + 1).map_err(|_| EncryptionError::OutputTooLong)?;

        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&block.to_be_bytes());
        let mut u = mac.finalize().into_bytes();
        let mut t = u.clone();

        for _ in 1..iterations.max(1) {
            let mut mac = prf.clone();
            mac.update(&u);
            u = mac.finalize().into_bytes();
            for (acc, byte) in t.iter_mut().zip(u.iter()) {
                *acc ^= byte;
            }
        }

        chunk.copy_from_slice(&t[..chunk.len()]);
        u.as_mut_slice().zeroize();
        t.as_mut_slice().zeroize();
    }
    Ok(())
}
