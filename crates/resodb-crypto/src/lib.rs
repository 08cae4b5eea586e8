//! ResoDB Crypto - at-rest encryption for store files
//!
//! This crate provides:
//! - scrypt key derivation from a store password
//! - AES-256-CBC encryption with a fresh random IV per call
//! - The `<ivHex>:<cipherHex>` blob encoding used on disk

pub mod cipher;

pub use cipher::{decrypt, derive_key, encrypt, CipherError};
