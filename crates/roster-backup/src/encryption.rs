use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Method identifier written to the metadata sidecar of encrypted backups.
pub const ENCRYPTION_METHOD: &str = "aes256gcm_pbkdf2_sha256";

const CONTAINER_MAGIC: &[u8; 8] = b"RSTRBKUP";
const CONTAINER_VERSION: u8 = 1;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

const AAD_LEN: usize = 8 /* magic */ + 1 /* container version */;
const HEADER_LEN: usize = AAD_LEN + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encrypted container is truncated")]
    TruncatedContainer,
    #[error("encrypted container magic header mismatch")]
    InvalidMagic,
    #[error("unsupported encrypted container version: {0}")]
    UnsupportedContainerVersion(u8),
    #[error("invalid key length: {0} bytes")]
    InvalidKeyLength(usize),
    #[error("requested key material is too long")]
    OutputTooLong,
    #[error("aes-gcm error")]
    Aead,
    #[error("fernet token signature mismatch")]
    TokenSignature,
    #[error("malformed fernet token")]
    MalformedToken,
}

impl From<aes_gcm::aead::Error> for EncryptionError {
    fn from(_: aes_gcm::aead::Error) -> Self {
        EncryptionError::Aead
    }
}

pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn is_encrypted_container(bytes: &[u8]) -> bool {
    bytes.starts_with(CONTAINER_MAGIC)
}

/// Encrypt `plaintext` into a self-describing container:
/// `magic | version | nonce | tag | ciphertext`, with `magic | version` authenticated as AAD.
pub fn seal(plaintext: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>, EncryptionError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher.encrypt_in_place_detached(nonce, &aad(), &mut buffer)?;

    let mut out = Vec::with_capacity(HEADER_LEN + buffer.len());
    out.extend_from_slice(CONTAINER_MAGIC);
    out.push(CONTAINER_VERSION);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(tag.as_slice());
    out.extend_from_slice(&buffer);
    Ok(out)
}

/// Decrypt a container produced by [`seal`]. Nothing is returned unless the tag verifies.
pub fn open(container: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>, EncryptionError> {
    let parsed = parse_container(container)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut buffer = parsed.ciphertext.to_vec();
    cipher.decrypt_in_place_detached(
        Nonce::from_slice(&parsed.nonce),
        &aad(),
        &mut buffer,
        Tag::from_slice(&parsed.tag),
    )?;
    Ok(buffer)
}

#[derive(Debug)]
struct ParsedContainer<'a> {
    nonce: [u8; NONCE_LEN],
    tag: [u8; TAG_LEN],
    ciphertext: &'a [u8],
}

fn parse_container(bytes: &[u8]) -> Result<ParsedContainer<'_>, EncryptionError> {
    if bytes.len() < HEADER_LEN {
        return Err(EncryptionError::TruncatedContainer);
    }
    if !is_encrypted_container(bytes) {
        return Err(EncryptionError::InvalidMagic);
    }
    let version = bytes[CONTAINER_MAGIC.len()];
    if version != CONTAINER_VERSION {
        return Err(EncryptionError::UnsupportedContainerVersion(version));
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes[AAD_LEN..AAD_LEN + NONCE_LEN]);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&bytes[AAD_LEN + NONCE_LEN..HEADER_LEN]);

    Ok(ParsedContainer {
        nonce,
        tag,
        ciphertext: &bytes[HEADER_LEN..],
    })
}

fn aad() -> [u8; AAD_LEN] {
    let mut aad = [0u8; AAD_LEN];
    aad[..8].copy_from_slice(CONTAINER_MAGIC);
    aad[8] = CONTAINER_VERSION;
    aad
}
