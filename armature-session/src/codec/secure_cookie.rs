use super::error::{CodecError, CodecResult};
use crate::session::DEFAULT_MAX_AGE;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Default maximum length of an encoded value.
pub const DEFAULT_MAX_LENGTH: usize = 4096;

#[derive(Clone)]
enum BlockCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl BlockCipher {
    fn new(key: &[u8]) -> CodecResult<Self> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(BlockCipher::Aes128)
                .map_err(|_| CodecError::InvalidBlockKey(key.len())),
            32 => Aes256Gcm::new_from_slice(key)
                .map(BlockCipher::Aes256)
                .map_err(|_| CodecError::InvalidBlockKey(key.len())),
            len => Err(CodecError::InvalidBlockKey(len)),
        }
    }

    /// Returns `nonce || ciphertext`.
    fn encrypt(&self, plaintext: &[u8]) -> CodecResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = match self {
            BlockCipher::Aes128(cipher) => cipher.encrypt(&nonce, plaintext),
            BlockCipher::Aes256(cipher) => cipher.encrypt(&nonce, plaintext),
        }
        .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(CodecError::Decryption("value is too short".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        match self {
            BlockCipher::Aes128(cipher) => cipher.decrypt(nonce, ciphertext),
            BlockCipher::Aes256(cipher) => cipher.decrypt(nonce, ciphertext),
        }
        .map_err(|e| CodecError::Decryption(e.to_string()))
    }
}

/// Authenticated (and optionally encrypted) cookie value codec.
///
/// Encoded values carry a timestamp and an HMAC-SHA256 over the cookie name,
/// the timestamp and the payload, so a value minted for one cookie name does
/// not verify under another.
#[derive(Clone)]
pub struct SecureCookie {
    hash_key: Vec<u8>,
    cipher: Option<BlockCipher>,
    max_age: i64,
    min_age: i64,
    max_length: usize,
}

impl fmt::Debug for SecureCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCookie")
            .field("encrypted", &self.cipher.is_some())
            .field("max_age", &self.max_age)
            .field("min_age", &self.min_age)
            .field("max_length", &self.max_length)
            .finish()
    }
}

impl SecureCookie {
    /// Create a codec from a hash key and an optional block key.
    ///
    /// The block key enables AES-GCM encryption and must be 16 or 32 bytes.
    pub fn new(hash_key: &[u8], block_key: Option<&[u8]>) -> CodecResult<Self> {
        if hash_key.is_empty() {
            return Err(CodecError::HashKeyNotSet);
        }
        let cipher = block_key
            .filter(|key| !key.is_empty())
            .map(BlockCipher::new)
            .transpose()?;

        Ok(Self {
            hash_key: hash_key.to_vec(),
            cipher,
            max_age: DEFAULT_MAX_AGE,
            min_age: 0,
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    /// Set the maximum age in seconds; 0 disables the check.
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the minimum age in seconds; 0 disables the check.
    pub fn with_min_age(mut self, min_age: i64) -> Self {
        self.min_age = min_age;
        self
    }

    /// Set the maximum encoded length; 0 disables the check.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn set_max_age(&mut self, max_age: i64) {
        self.max_age = max_age;
    }

    pub fn set_max_length(&mut self, max_length: usize) {
        self.max_length = max_length;
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encode a payload for the given cookie name.
    pub fn encode(&self, name: &str, payload: &[u8]) -> CodecResult<String> {
        self.encode_at(name, payload, chrono::Utc::now().timestamp())
    }

    pub(crate) fn encode_at(&self, name: &str, payload: &[u8], timestamp: i64) -> CodecResult<String> {
        let payload = match &self.cipher {
            Some(cipher) => cipher.encrypt(payload)?,
            None => payload.to_vec(),
        };
        let body = URL_SAFE_NO_PAD.encode(payload);

        let mac = self.sign(name, timestamp, &body)?;
        let mut raw = format!("{}|{}|", timestamp, body).into_bytes();
        raw.extend_from_slice(&mac);

        let encoded = URL_SAFE_NO_PAD.encode(raw);
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CodecError::ValueTooLong(encoded.len()));
        }
        Ok(encoded)
    }

    /// Verify and decode a value produced by [`SecureCookie::encode`].
    pub fn decode(&self, name: &str, value: &str) -> CodecResult<Vec<u8>> {
        if self.max_length != 0 && value.len() > self.max_length {
            return Err(CodecError::ValueTooLong(value.len()));
        }

        let raw = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;

        // timestamp|body|mac; the MAC is binary and may itself contain '|'
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(body), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::Malformed("missing separator".to_string()));
        };

        let timestamp = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| CodecError::Malformed("invalid timestamp".to_string()))?;
        let body =
            std::str::from_utf8(body).map_err(|e| CodecError::Malformed(e.to_string()))?;

        self.verify(name, timestamp, body, mac)?;

        let now = chrono::Utc::now().timestamp();
        if self.min_age != 0 && timestamp > now - self.min_age {
            return Err(CodecError::TooNew);
        }
        if self.max_age != 0 && timestamp < now - self.max_age {
            return Err(CodecError::Expired);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;

        match &self.cipher {
            Some(cipher) => cipher.decrypt(&payload),
            None => Ok(payload),
        }
    }

    fn mac(&self, name: &str, timestamp: i64, body: &str) -> CodecResult<HmacSha256> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|_| CodecError::HashKeyNotSet)?;
        mac.update(format!("{}|{}|{}", name, timestamp, body).as_bytes());
        Ok(mac)
    }

    fn sign(&self, name: &str, timestamp: i64, body: &str) -> CodecResult<Vec<u8>> {
        Ok(self
            .mac(name, timestamp, body)?
            .finalize()
            .into_bytes()
            .to_vec())
    }

    fn verify(&self, name: &str, timestamp: i64, body: &str, tag: &[u8]) -> CodecResult<()> {
        // verify_slice compares in constant time
        self.mac(name, timestamp, body)?
            .verify_slice(tag)
            .map_err(|_| CodecError::InvalidMac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_KEY: &[u8] = b"test_hash_key_32_bytes_long!!!!!";
    const BLOCK_KEY: &[u8] = b"test_block_key_32_bytes_long!!!!";

    #[test]
    fn test_encode_decode_signed() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let encoded = codec.encode("sid", b"\"hello\"").unwrap();

        assert!(!encoded.contains('='));
        assert_eq!(codec.decode("sid", &encoded).unwrap(), b"\"hello\"");
    }

    #[test]
    fn test_encode_decode_encrypted() {
        let codec = SecureCookie::new(HASH_KEY, Some(BLOCK_KEY)).unwrap();
        assert!(codec.is_encrypted());

        let encoded = codec.encode("sid", b"secret payload").unwrap();
        let raw = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("secret payload"));

        assert_eq!(codec.decode("sid", &encoded).unwrap(), b"secret payload");
    }

    #[test]
    fn test_aes128_block_key() {
        let codec = SecureCookie::new(HASH_KEY, Some(&BLOCK_KEY[..16])).unwrap();
        let encoded = codec.encode("sid", b"x").unwrap();
        assert_eq!(codec.decode("sid", &encoded).unwrap(), b"x");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            SecureCookie::new(b"", None),
            Err(CodecError::HashKeyNotSet)
        ));
        assert!(matches!(
            SecureCookie::new(HASH_KEY, Some(b"short")),
            Err(CodecError::InvalidBlockKey(5))
        ));
    }

    #[test]
    fn test_name_is_authenticated() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let encoded = codec.encode("sid", b"1").unwrap();
        assert!(matches!(
            codec.decode("other", &encoded),
            Err(CodecError::InvalidMac)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let other = SecureCookie::new(b"wrong_hash_key_32_bytes_long!!!!", None).unwrap();
        let encoded = codec.encode("sid", b"1").unwrap();
        assert!(matches!(
            other.decode("sid", &encoded),
            Err(CodecError::InvalidMac)
        ));
    }

    #[test]
    fn test_tampered_value_rejected() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        let encoded = codec.encode("sid", b"\"user\"").unwrap();

        let mut raw = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        // flip a bit inside the body, right after the timestamp separator
        let pos = raw.iter().position(|b| *b == b'|').unwrap() + 1;
        raw[pos] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);

        assert!(codec.decode("sid", &tampered).is_err());
        assert!(matches!(
            codec.decode("sid", "not base64 at all!"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_expired_value() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_max_age(60);
        let old = chrono::Utc::now().timestamp() - 120;
        let encoded = codec.encode_at("sid", b"1", old).unwrap();
        assert!(matches!(codec.decode("sid", &encoded), Err(CodecError::Expired)));

        let unlimited = codec.clone().with_max_age(0);
        assert!(unlimited.decode("sid", &encoded).is_ok());
    }

    #[test]
    fn test_too_new_value() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_min_age(60);
        let encoded = codec.encode("sid", b"1").unwrap();
        assert!(matches!(codec.decode("sid", &encoded), Err(CodecError::TooNew)));
    }

    #[test]
    fn test_defaults_match_cookie_defaults() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap();
        assert_eq!(codec.max_age(), crate::session::SessionOptions::default().max_age);
        assert_eq!(codec.max_length(), DEFAULT_MAX_LENGTH);
    }

    #[test]
    fn test_max_length() {
        let codec = SecureCookie::new(HASH_KEY, None).unwrap().with_max_length(64);
        assert!(matches!(
            codec.encode("sid", &[b'a'; 200]),
            Err(CodecError::ValueTooLong(_))
        ));

        let unbounded = codec.with_max_length(0);
        assert!(unbounded.encode("sid", &[b'a'; 8192]).is_ok());
    }
}
