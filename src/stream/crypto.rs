//! Password-based decryption of `{ "s": salt, "iv": iv, "ct": ciphertext }`
//! envelopes (CryptoJS-compatible AES-256-CBC).

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::DecryptError;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// PBKDF2 rounds used by the envelope producer.
pub const PBKDF2_ROUNDS: u32 = 1000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

#[derive(Debug, Deserialize)]
struct Envelope {
    /// Hex salt.
    s: Option<String>,
    /// Hex IV.
    iv: Option<String>,
    /// Base64 ciphertext.
    ct: Option<String>,
}

/// `true` if `value` has the shape of an encrypted envelope.
pub fn looks_like_envelope(value: &serde_json::Value) -> bool {
    ["s", "iv", "ct"].iter().all(|k| value.get(k).is_some_and(serde_json::Value::is_string))
}

/// Decrypt an envelope and parse the plaintext as JSON.
///
/// Every failure mode is reported as a [`DecryptError`]; nothing panics on
/// attacker-controlled input.
pub fn decrypt_envelope(
    envelope_json: &str,
    password: &str,
) -> Result<serde_json::Value, DecryptError> {
    let envelope: Envelope = serde_json::from_str(envelope_json).map_err(DecryptError::Envelope)?;

    let salt = decode_hex("s", envelope.s.as_deref())?;
    let iv = decode_hex("iv", envelope.iv.as_deref())?;
    let ciphertext = required("ct", envelope.ct.as_deref())?;
    let mut ciphertext = STANDARD.decode(ciphertext).map_err(|_| DecryptError::Encoding {
        field: "ct",
        encoding: "base64",
    })?;

    if iv.len() != IV_LEN {
        return Err(DecryptError::KeyLength);
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ROUNDS, &mut key);

    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| DecryptError::KeyLength)?
        .decrypt_padded_mut::<Pkcs7>(&mut ciphertext)
        .map_err(|_| DecryptError::Padding)?;

    let text = std::str::from_utf8(plaintext).map_err(|e| DecryptError::Payload(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| DecryptError::Payload(e.to_string()))
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, DecryptError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(DecryptError::MissingField(field))
}

fn decode_hex(field: &'static str, value: Option<&str>) -> Result<Vec<u8>, DecryptError> {
    hex::decode(required(field, value)?).map_err(|_| DecryptError::Encoding {
        field,
        encoding: "hex",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    fn seal(plaintext: &str, password: &str) -> String {
        let salt = [7u8; 8];
        let iv = [3u8; IV_LEN];
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ROUNDS, &mut key);
        let ct = Aes256CbcEnc::new_from_slices(&key, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        serde_json::json!({
            "s": hex::encode(salt),
            "iv": hex::encode(iv),
            "ct": STANDARD.encode(ct),
        })
        .to_string()
    }

    #[test]
    fn decrypts_sealed_payload() {
        let envelope = seal(r#"{"stream":{"playlist":"https://x/a.m3u8"}}"#, "token-123");
        let value = decrypt_envelope(&envelope, "token-123").unwrap();
        assert_eq!(value["stream"]["playlist"], "https://x/a.m3u8");
    }

    #[test]
    fn wrong_password_is_an_error() {
        let envelope = seal(r#"{"ok":true}"#, "right");
        assert!(decrypt_envelope(&envelope, "wrong").is_err());
    }

    #[test]
    fn missing_iv_is_reported() {
        let envelope = r#"{"s":"0707070707070707","ct":"AAAA"}"#;
        assert!(matches!(
            decrypt_envelope(envelope, "pw"),
            Err(DecryptError::MissingField("iv"))
        ));
    }

    #[test]
    fn garbage_is_reported() {
        assert!(matches!(
            decrypt_envelope("not json", "pw"),
            Err(DecryptError::Envelope(_))
        ));
        assert!(matches!(
            decrypt_envelope(r#"{"s":"zz","iv":"00","ct":"AAAA"}"#, "pw"),
            Err(DecryptError::Encoding { field: "s", .. })
        ));
        assert!(matches!(
            decrypt_envelope(r#"{"s":"00","iv":"00","ct":"AAAA"}"#, "pw"),
            Err(DecryptError::KeyLength)
        ));
    }

    #[test]
    fn envelope_shape_detection() {
        assert!(looks_like_envelope(&serde_json::json!({"s":"a","iv":"b","ct":"c"})));
        assert!(!looks_like_envelope(&serde_json::json!({"stream":{}})));
    }
}
