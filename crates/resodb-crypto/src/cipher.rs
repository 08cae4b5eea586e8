//! AES-256-CBC encryption of serialized documents
//!
//! The on-disk blob is `<ivHex>:<cipherHex>`. The key is derived from the
//! store password with scrypt (N=2^14, r=8, p=1), the same parameters
//! Node's `crypto.scryptSync` uses by default, so blobs produced with
//! `scryptSync` + `aes-256-cbc` in Node decrypt here unchanged.
//!
//! SECURITY: the salt is a fixed constant shared by every store. That keeps
//! the file format stable but lets an attacker precompute keys for common
//! passwords. A per-store random salt would need a new blob layout.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 128-bit IV (16 bytes), one AES block
pub const IV_SIZE: usize = 16;
/// Separator between the hex IV and the hex ciphertext
pub const BLOB_DELIMITER: char = ':';
/// Static, non-secret scrypt salt
pub const KDF_SALT: &[u8] = b"salt";

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Malformed blob: {0}")]
    MalformedBlob(&'static str),

    #[error("Invalid IV size: expected {IV_SIZE}, got {0}")]
    InvalidIvSize(usize),

    #[error("Decryption failed - wrong password or corrupted data")]
    DecryptionFailed,
}

/// Derive the AES key for `password`.
pub fn derive_key(password: &str) -> Result<Zeroizing<[u8; KEY_SIZE]>, CipherError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    scrypt::scrypt(password.as_bytes(), KDF_SALT, &params, &mut key[..])
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Generate a fresh random IV
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `password`.
///
/// Every call draws a new IV, so encrypting the same input twice gives
/// different blobs.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<String, CipherError> {
    let key = derive_key(password)?;
    let iv = generate_iv();

    let ciphertext = Aes256CbcEnc::new_from_slices(&key[..], &iv)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok(format!(
        "{}{}{}",
        hex::encode(iv),
        BLOB_DELIMITER,
        hex::encode(ciphertext)
    ))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// A wrong password almost always trips the padding check; the rare case
/// where garbage survives unpadding is caught by the UTF-8 check.
pub fn decrypt(blob: &str, password: &str) -> Result<Zeroizing<String>, CipherError> {
    let (iv_hex, cipher_hex) = blob
        .trim()
        .split_once(BLOB_DELIMITER)
        .ok_or(CipherError::MalformedBlob("missing delimiter"))?;

    let iv = hex::decode(iv_hex).map_err(|_| CipherError::MalformedBlob("IV is not hex"))?;
    if iv.len() != IV_SIZE {
        return Err(CipherError::InvalidIvSize(iv.len()));
    }

    let ciphertext =
        hex::decode(cipher_hex).map_err(|_| CipherError::MalformedBlob("ciphertext is not hex"))?;
    if ciphertext.is_empty() || ciphertext.len() % IV_SIZE != 0 {
        return Err(CipherError::MalformedBlob("ciphertext is not whole blocks"));
    }

    let key = derive_key(password)?;
    let plaintext = Aes256CbcDec::new_from_slices(&key[..], &iv)
        .map_err(|_| CipherError::DecryptionFailed)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::DecryptionFailed)
}
