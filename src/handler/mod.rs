//! Key/Value Handler Module
//!
//! Codecs that translate typed keys and values to and from the raw bytes of a
//! record slot, independent of the index algorithm.
//!
//! ## Responsibilities
//! - Encode a key into exactly `key_length` bytes (reject keys that don't fit)
//! - Hash encoded keys so the low bits are uniformly distributed
//! - Compare keys on their raw encoding
//! - Encode/decode values against a `value_length` byte region
//!
//! Handlers carry no per-operation state. Everything an operation needs is
//! passed explicitly, so one handler can serve every call of its index.

mod key;
mod value;

use std::fmt;

use crate::error::Result;

pub use key::{BytesKey, LongKey};
pub use value::{BytesValue, LongValue};

/// Encodes, hashes and compares keys of a fixed encoded length
pub trait KeyHandler {
    /// Borrowed key type accepted by the index
    type Key: ?Sized;

    /// Owned key type produced when reading a stored key back
    type Owned: fmt::Debug;

    /// Encoded key length in bytes
    fn key_length(&self) -> usize;

    /// Encode `key` into `dst`, which is exactly `key_length` bytes long.
    ///
    /// Returns `InvalidArgument` if the key does not fit; `dst` is left
    /// untouched in that case.
    fn write_key(&self, key: &Self::Key, dst: &mut [u8]) -> Result<()>;

    /// Decode a stored key
    fn read_key(&self, src: &[u8]) -> Self::Owned;

    /// Hash of an encoded key. Only the low bits are used for addressing.
    fn key_hash(&self, encoded: &[u8]) -> u64 {
        mix64(fnv1a(encoded))
    }

    /// Raw byte equality of an encoded key against a stored one
    fn key_equals(&self, encoded: &[u8], stored: &[u8]) -> bool {
        encoded == stored
    }
}

/// Encodes and decodes values of a bounded encoded length
pub trait ValueHandler {
    /// Borrowed value type accepted by the index
    type Value: ?Sized;

    /// Owned value type produced when reading a stored value back
    type Owned;

    /// Encoded value length in bytes (the value region of a record)
    fn value_length(&self) -> usize;

    /// Encode `value` into `dst`, which is exactly `value_length` bytes long.
    ///
    /// Returns `InvalidArgument` if the value does not fit.
    fn write_value(&self, value: &Self::Value, dst: &mut [u8]) -> Result<()>;

    /// Decode a stored value
    fn read_value(&self, src: &[u8]) -> Self::Owned;
}

// =============================================================================
// Hash Functions
// =============================================================================

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over a byte slice
pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Stafford variant-13 finalizer (the SplitMix64 mix).
///
/// Every input bit affects every output bit, so sequential keys spread over
/// the low bits used for slot selection.
#[inline]
pub(crate) fn mix64(mut h: u64) -> u64 {
    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;
    h
}
