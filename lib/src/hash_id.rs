// Copyright 2026 The Zeta Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-size content-addressed object identifiers.

use std::fmt;
use std::fmt::Debug;
use std::sync::OnceLock;

use blake2::Blake2b;
use digest::Digest as _;
use digest::consts::U32;
use thiserror::Error;

/// The digest used for all object identifiers.
type Blake2b256 = Blake2b<U32>;

/// A 32-byte object identifier.
///
/// The all-zero value is reserved for "absent" and never addresses a stored
/// object. The identifier of the empty blob is also reserved; see
/// [`HashID::empty_blob`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashID([u8; Self::LEN]);

/// The given input could not be parsed as a [`HashID`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error(r#"Invalid object identifier "{input}""#)]
pub struct InvalidHashIDError {
    input: String,
}

impl HashID {
    /// Length of an identifier in bytes.
    pub const LEN: usize = 32;

    /// The reserved all-zero identifier denoting "absent".
    pub const ZERO: Self = Self([0; Self::LEN]);

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidHashIDError> {
        let raw = bytes.try_into().map_err(|_| InvalidHashIDError {
            input: hex::encode(bytes),
        })?;
        Ok(Self(raw))
    }

    /// Parses the given hex string into a `HashID`.
    ///
    /// The given string must be valid. A static str is required to prevent
    /// API misuse.
    pub fn from_hex(hex: &'static str) -> Self {
        Self::try_from_hex(hex).unwrap()
    }

    /// Parses the given hex string into a `HashID`.
    pub fn try_from_hex(hex: impl AsRef<[u8]>) -> Result<Self, InvalidHashIDError> {
        let hex = hex.as_ref();
        let mut raw = [0; Self::LEN];
        if hex.len() != Self::LEN * 2 || hex::decode_to_slice(hex, &mut raw).is_err() {
            return Err(InvalidHashIDError {
                input: String::from_utf8_lossy(hex).into_owned(),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the reserved "absent" identifier.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The reserved identifier of the zero-length blob, computed through the
    /// same canonical codec as any other blob.
    pub fn empty_blob() -> &'static Self {
        static EMPTY_BLOB: OnceLock<HashID> = OnceLock::new();
        EMPTY_BLOB.get_or_init(|| {
            let mut hasher = Hasher::new();
            hasher.update(b"blob 0\0");
            hasher.finalize()
        })
    }
}

impl Debug for HashID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("HashID").field(&self.hex()).finish()
    }
}

impl fmt::Display for HashID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.hex())
    }
}

impl serde::Serialize for HashID {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            self.hex().serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

/// Incremental hasher producing a [`HashID`].
///
/// Encoders feed canonical bytes through this while writing them out, so the
/// stored bytes and the identifier can never disagree.
#[derive(Clone)]
pub struct Hasher(Blake2b256);

impl Hasher {
    pub fn new() -> Self {
        Self(Blake2b256::new())
    }

    pub fn update(&mut self, bytes: impl AsRef<[u8]>) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> HashID {
        let digest = self.0.finalize();
        HashID(digest.into())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashes a complete canonical encoding in one call.
pub fn hash_bytes(bytes: &[u8]) -> HashID {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let id =
            HashID::from_hex("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff");
        assert_eq!(
            id.hex(),
            "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
        );
        assert_eq!(HashID::try_from_hex(id.hex()), Ok(id));
        assert_eq!(format!("{id:.8}"), "00112233");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(HashID::try_from_hex("abcd").is_err());
        assert!(HashID::try_from_hex("0x123").is_err());
        assert!(HashID::from_bytes(&[0; 31]).is_err());
    }

    #[test]
    fn test_zero_is_absent() {
        assert!(HashID::ZERO.is_zero());
        assert!(!HashID::empty_blob().is_zero());
    }

    #[test]
    fn test_hashing_is_deterministic() {
        let a = hash_bytes(b"blob 6\0hello\n");
        let mut hasher = Hasher::new();
        hasher.update(b"blob 6\0");
        hasher.update(b"hello\n");
        assert_eq!(hasher.finalize(), a);
    }
}
