//! Restore support for backups written by the earlier Fernet scheme.
//!
//! Those payloads are a Fernet token (AES-128-CBC, then HMAC-SHA256 over the whole token)
//! whose 32-byte secret is the PBKDF2 key, and the plaintext is a records-oriented JSON
//! array: `[{"Tên Học Sinh": "An", "Điểm": 8.5}, ...]`. They are read, never written.

use std::fmt;

use aes::Aes128;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use cbc::Decryptor;
use cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use roster_model::CellValue;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use sha2::Sha256;

use crate::encryption::{EncryptionError, KEY_LEN};

type HmacSha256 = Hmac<Sha256>;

/// Method identifier found in the metadata sidecar of Fernet backups.
pub const LEGACY_METHOD: &str = "fernet_pbkdf2";

const TOKEN_VERSION: u8 = 0x80;
const TIMESTAMP_LEN: usize = 8;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const MAC_LEN: usize = 32;
const PREFIX_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

/// Verify and decrypt a Fernet token.
///
/// The first half of `key` signs, the second half encrypts. The token's timestamp is not
/// checked against any TTL.
pub fn open_token(token: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>, EncryptionError> {
    let token = std::str::from_utf8(token)
        .map_err(|_| EncryptionError::MalformedToken)?
        .trim();
    let raw = URL_SAFE
        .decode(token)
        .map_err(|_| EncryptionError::MalformedToken)?;

    let body_len = raw
        .len()
        .checked_sub(MAC_LEN)
        .ok_or(EncryptionError::MalformedToken)?;
    let ciphertext_len = body_len.saturating_sub(PREFIX_LEN);
    if body_len < PREFIX_LEN + BLOCK_LEN
        || ciphertext_len % BLOCK_LEN != 0
        || raw[0] != TOKEN_VERSION
    {
        return Err(EncryptionError::MalformedToken);
    }

    let (body, mac) = raw.split_at(body_len);
    let (signing_key, encryption_key) = key.split_at(KEY_LEN / 2);
    let mut verifier = HmacSha256::new_from_slice(signing_key)
        .map_err(|_| EncryptionError::InvalidKeyLength(signing_key.len()))?;
    verifier.update(body);
    verifier
        .verify_slice(mac)
        .map_err(|_| EncryptionError::TokenSignature)?;

    let iv = &body[1 + TIMESTAMP_LEN..PREFIX_LEN];
    let mut buffer = body[PREFIX_LEN..].to_vec();
    let plaintext_len = Decryptor::<Aes128>::new_from_slices(encryption_key, iv)
        .map_err(|_| EncryptionError::InvalidKeyLength(encryption_key.len()))?
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|_| EncryptionError::MalformedToken)?
        .len();
    buffer.truncate(plaintext_len);
    Ok(buffer)
}

/// Split a records-oriented JSON array into columns and rows.
///
/// Columns appear in the order they are first seen; a record without some column gets an
/// empty cell there.
pub fn records_to_rows(
    json: &[u8],
) -> Result<(Vec<String>, Vec<Vec<CellValue>>), serde_json::Error> {
    let records: Vec<OrderedRecord> = serde_json::from_slice(json)?;

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for (label, _) in &record.0 {
            if !columns.contains(label) {
                columns.push(label.clone());
            }
        }
    }

    let rows = records
        .into_iter()
        .map(|record| {
            let mut row = vec![CellValue::Empty; columns.len()];
            for (label, value) in record.0 {
                if let Some(col) = columns.iter().position(|c| *c == label) {
                    row[col] = value;
                }
            }
            row
        })
        .collect();
    Ok((columns, rows))
}

/// One JSON object with its keys in document order.
struct OrderedRecord(Vec<(String, CellValue)>);

impl<'de> Deserialize<'de> for OrderedRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = OrderedRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping column labels to cell values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut cells = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, CellValue>()? {
                    cells.push(entry);
                }
                Ok(OrderedRecord(cells))
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// Build a Fernet token the way the earlier scheme did.
#[cfg(test)]
pub(crate) fn seal_token(plaintext: &[u8], key: &[u8; KEY_LEN], iv: [u8; IV_LEN]) -> String {
    use cbc::Encryptor;
    use cipher::BlockEncryptMut;

    let (signing_key, encryption_key) = key.split_at(KEY_LEN / 2);
    let mut buffer = plaintext.to_vec();
    buffer.resize(plaintext.len() + BLOCK_LEN, 0);
    let ciphertext = Encryptor::<Aes128>::new_from_slices(encryption_key, &iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
        .unwrap()
        .to_vec();

    let mut token = vec![TOKEN_VERSION];
    token.extend_from_slice(&1_700_000_000u64.to_be_bytes());
    token.extend_from_slice(&iv);
    token.extend_from_slice(&ciphertext);
    let mut signer = HmacSha256::new_from_slice(signing_key).unwrap();
    signer.update(&token);
    token.extend_from_slice(&signer.finalize().into_bytes());
    URL_SAFE.encode(token)
}
