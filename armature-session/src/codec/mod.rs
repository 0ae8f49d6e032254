//! Authenticated cookie codecs with key rotation.
//!
//! A [`CodecChain`] is built from one or more [`KeyPair`]s. Values are always
//! encoded with the first pair; decoding tries each pair in order, so cookies
//! minted under a retired key stay readable while that key remains listed.
//!
//! ```
//! use armature_session::codec::{CodecChain, KeyPair};
//!
//! let old = KeyPair::new(b"old-hash-key-old-hash-key-old-ha".to_vec());
//! let new = KeyPair::new(b"new-hash-key-new-hash-key-new-ha".to_vec());
//!
//! let before = CodecChain::from_pairs(&[old.clone()]).unwrap();
//! let cookie = before.encode("sid", &"abc").unwrap();
//!
//! let rotated = CodecChain::from_pairs(&[new, old]).unwrap();
//! let id: String = rotated.decode("sid", &cookie).unwrap();
//! assert_eq!(id, "abc");
//! ```

mod error;
mod secure_cookie;

pub use error::{CodecError, CodecResult};
pub use secure_cookie::{DEFAULT_MAX_LENGTH, SecureCookie};

use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Generate `len` bytes from the thread-local CSPRNG.
pub fn generate_random_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::rng().fill_bytes(&mut key);
    key
}

/// A hash key for authentication plus an optional block key for encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub hash_key: Vec<u8>,
    pub block_key: Option<Vec<u8>>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash_key", &format_args!("<{} bytes>", self.hash_key.len()))
            .field("block_key", &self.block_key.as_ref().map(Vec::len))
            .finish()
    }
}

impl KeyPair {
    /// Signing-only key pair.
    pub fn new(hash_key: Vec<u8>) -> Self {
        Self {
            hash_key,
            block_key: None,
        }
    }

    /// Signing and encryption key pair.
    pub fn with_block_key(hash_key: Vec<u8>, block_key: Vec<u8>) -> Self {
        Self {
            hash_key,
            block_key: Some(block_key),
        }
    }

    /// Random 64-byte hash key and 32-byte block key.
    pub fn generate() -> Self {
        Self::with_block_key(generate_random_key(64), generate_random_key(32))
    }

    /// Group a flat key list into pairs: hash, block, hash, block, ...
    ///
    /// A trailing hash key without a block key yields a signing-only pair.
    pub fn from_flat(keys: &[Vec<u8>]) -> Vec<Self> {
        keys.chunks(2)
            .map(|chunk| Self {
                hash_key: chunk[0].clone(),
                block_key: chunk.get(1).filter(|k| !k.is_empty()).cloned(),
            })
            .collect()
    }
}

/// Ordered list of codecs; the first one is the current key.
#[derive(Debug, Clone)]
pub struct CodecChain {
    codecs: Vec<SecureCookie>,
}

impl CodecChain {
    /// Build a chain from codecs, first one used for encoding.
    pub fn new(codecs: Vec<SecureCookie>) -> CodecResult<Self> {
        if codecs.is_empty() {
            return Err(CodecError::NoCodecs);
        }
        Ok(Self { codecs })
    }

    /// Build a chain with one codec per key pair.
    pub fn from_pairs(pairs: &[KeyPair]) -> CodecResult<Self> {
        let codecs = pairs
            .iter()
            .map(|pair| SecureCookie::new(&pair.hash_key, pair.block_key.as_deref()))
            .collect::<CodecResult<Vec<_>>>()?;
        Self::new(codecs)
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Apply a maximum age to every codec in the chain.
    pub fn set_max_age(&mut self, max_age: i64) {
        for codec in &mut self.codecs {
            codec.set_max_age(max_age);
        }
    }

    /// Apply a maximum encoded length to every codec; 0 disables the check.
    pub fn set_max_length(&mut self, max_length: usize) {
        for codec in &mut self.codecs {
            codec.set_max_length(max_length);
        }
    }

    /// Serialize `value` as JSON and encode it with the current key.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> CodecResult<String> {
        let codec = self.codecs.first().ok_or(CodecError::NoCodecs)?;
        let payload = serde_json::to_vec(value)?;
        codec.encode(name, &payload)
    }

    /// Decode with each codec in order, returning the first success.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, value: &str) -> CodecResult<T> {
        let mut errors = Vec::with_capacity(self.codecs.len());
        for codec in &self.codecs {
            let decoded = codec
                .decode(name, value)
                .and_then(|payload| serde_json::from_slice(&payload).map_err(CodecError::from));
            match decoded {
                Ok(decoded) => return Ok(decoded),
                Err(e) => errors.push(e),
            }
        }

        match errors.len() {
            0 => Err(CodecError::NoCodecs),
            1 => Err(errors.remove(0)),
            _ => Err(CodecError::Multi(errors)),
        }
    }
}
