//! Envelope cryptography (C1): wraps a wallet's private key under a
//! passphrase-derived KEK and a random DEK, per spec §4.1/§6.
//!
//! AAD is always reconstructed by the caller from context
//! (`user:<userId>:wallet:<walletId>`) and never trusted from the blob.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::EngineError;

/// Argon2id tuning. Defaults match spec §4.1 (`m=65536, t=3, p=1`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 65536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfDescriptor {
    pub name: String,
    pub m: u32,
    pub t: u32,
    pub p: u32,
    #[serde(with = "b64_bytes")]
    pub salt: Vec<u8>,
}

/// Wire format of the v1 envelope blob (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeBlob {
    pub v: u8,
    pub alg: String,
    pub kdf: KdfDescriptor,
    #[serde(with = "b64_bytes")]
    pub iv1: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub tag1: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub pk_cipher: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub iv2: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub tag2: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub dek_cipher: Vec<u8>,
    pub aad_hint: Option<String>,
}

mod b64_bytes {
    use super::B64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        B64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

fn derive_kek(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<Zeroizing<[u8; 32]>, EngineError> {
    let argon_params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| EngineError::BadInput(format!("invalid argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut kek = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, kek.as_mut())
        .map_err(|e| EngineError::BadInput(format!("kdf derivation failed: {e}")))?;
    Ok(kek)
}

fn gcm_open(key: &[u8], iv: &[u8], aad: &[u8], ciphertext_and_tag: &[u8]) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);
    let payload = aes_gcm::aead::Payload {
        msg: ciphertext_and_tag,
        aad,
    };
    cipher
        .decrypt(nonce, payload)
        .map(Zeroizing::new)
        .map_err(|_| EngineError::AuthFailed)
}

fn gcm_seal(key: &[u8], aad: &[u8], plaintext: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let payload = aes_gcm::aead::Payload {
        msg: plaintext,
        aad,
    };
    let mut ct = cipher.encrypt(&nonce, payload).expect("AES-GCM encryption cannot fail for valid key/nonce sizes");
    // aes-gcm appends the 16-byte tag to the ciphertext.
    let tag = ct.split_off(ct.len() - 16);
    (nonce.to_vec(), [ct, tag].concat())
}

/// `encryptPrivateKey`: wraps `pk` under a fresh DEK, itself wrapped under
/// an Argon2id-derived KEK. Zeroises KEK/DEK before returning.
pub fn encrypt_private_key(
    pk: &[u8],
    passphrase: &str,
    aad: &str,
    kdf_params: Option<KdfParams>,
) -> Result<EnvelopeBlob, EngineError> {
    if aad.is_empty() {
        return Err(EngineError::BadInput("aad must not be empty".into()));
    }
    let params = kdf_params.unwrap_or_default();

    let mut salt = [0u8; 16];
    getrandom(&mut salt);
    let kek = derive_kek(passphrase, &salt, params)?;

    let mut dek = Zeroizing::new([0u8; 32]);
    getrandom(dek.as_mut());

    let (iv1, pk_ct_and_tag) = gcm_seal(dek.as_ref(), aad.as_bytes(), pk);
    let tag1 = pk_ct_and_tag[pk_ct_and_tag.len() - 16..].to_vec();
    let pk_cipher = pk_ct_and_tag[..pk_ct_and_tag.len() - 16].to_vec();

    let (iv2, dek_ct_and_tag) = gcm_seal(kek.as_ref(), aad.as_bytes(), dek.as_ref());
    let tag2 = dek_ct_and_tag[dek_ct_and_tag.len() - 16..].to_vec();
    let dek_cipher = dek_ct_and_tag[..dek_ct_and_tag.len() - 16].to_vec();

    Ok(EnvelopeBlob {
        v: 1,
        alg: "AES-256-GCM".to_string(),
        kdf: KdfDescriptor {
            name: "argon2id".to_string(),
            m: params.m_cost_kib,
            t: params.t_cost,
            p: params.p_cost,
            salt: salt.to_vec(),
        },
        iv1,
        tag1,
        pk_cipher,
        iv2,
        tag2,
        dek_cipher,
        aad_hint: Some(aad.to_string()),
    })
}

/// `unwrapDEK`: re-derives the KEK and opens the DEK. Caller MUST zeroise
/// the returned buffer; `Zeroizing` does this automatically on drop.
pub fn unwrap_dek(blob: &EnvelopeBlob, passphrase: &str, aad: &str) -> Result<Zeroizing<[u8; 32]>, EngineError> {
    if blob.kdf.name != "argon2id" {
        return Err(EngineError::BadInput(format!("unsupported kdf {}", blob.kdf.name)));
    }
    let params = KdfParams {
        m_cost_kib: blob.kdf.m,
        t_cost: blob.kdf.t,
        p_cost: blob.kdf.p,
    };
    let kek = derive_kek(passphrase, &blob.kdf.salt, params)?;

    let mut combined = blob.dek_cipher.clone();
    combined.extend_from_slice(&blob.tag2);
    let dek = gcm_open(kek.as_ref(), &blob.iv2, aad.as_bytes(), &combined)?;

    let mut out = Zeroizing::new([0u8; 32]);
    if dek.len() != 32 {
        return Err(EngineError::AuthFailed);
    }
    out.copy_from_slice(&dek);
    Ok(out)
}

/// `decryptPK`: opens the private key ciphertext under a caller-supplied DEK.
pub fn decrypt_pk(blob: &EnvelopeBlob, dek: &[u8], aad: &str) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let mut combined = blob.pk_cipher.clone();
    combined.extend_from_slice(&blob.tag1);
    gcm_open(dek, &blob.iv1, aad.as_bytes(), &combined)
}

/// Re-wraps an envelope under a new passphrase: unwrap under the old one,
/// re-encrypt the recovered private key under a fresh salt and fresh DEK.
/// Not named explicitly in spec.md, but required to operationally rotate a
/// compromised passphrase without re-deriving a brand-new wallet keypair.
pub fn rotate_passphrase(
    old_blob: &EnvelopeBlob,
    old_passphrase: &str,
    new_passphrase: &str,
    aad: &str,
) -> Result<EnvelopeBlob, EngineError> {
    let dek = unwrap_dek(old_blob, old_passphrase, aad)?;
    let pk = decrypt_pk(old_blob, dek.as_ref(), aad)?;
    encrypt_private_key(pk.as_ref(), new_passphrase, aad, None)
}

/// Decrypts a pre-envelope legacy ciphertext: base58(iv[12] || ct || tag[16])
/// under a single process-wide legacy key. Spec §4.6 step 5's "legacy
/// ciphertext path", kept separate from the v1 envelope format it predates.
pub fn decrypt_legacy(ciphertext_b58: &str, legacy_key: &[u8; 32], aad: &str) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let raw = bs58::decode(ciphertext_b58)
        .into_vec()
        .map_err(|e| EngineError::BadInput(format!("legacy ciphertext not base58: {e}")))?;
    if raw.len() < 12 + 16 {
        return Err(EngineError::AuthFailed);
    }
    let (iv, ct_and_tag) = raw.split_at(12);
    gcm_open(legacy_key, iv, aad.as_bytes(), ct_and_tag)
}

fn getrandom(buf: &mut [u8]) {
    use aes_gcm::aead::rand_core::RngCore;
    OsRng.fill_bytes(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let pk = b"some-64-byte-private-key-material-padded-out-xxxxxxxxxxxxxxxxx";
        let aad = "user:u1:wallet:w1";
        let blob = encrypt_private_key(pk, "correct horse battery staple", aad, None).unwrap();
        let dek = unwrap_dek(&blob, "correct horse battery staple", aad).unwrap();
        let recovered = decrypt_pk(&blob, dek.as_ref(), aad).unwrap();
        assert_eq!(recovered.as_slice(), pk);
    }

    #[test]
    fn wrong_aad_fails_auth() {
        let pk = b"some-private-key-bytes";
        let blob = encrypt_private_key(pk, "pw", "user:u1:wallet:w1", None).unwrap();
        let err = unwrap_dek(&blob, "pw", "user:u1:wallet:w2").unwrap_err();
        assert!(matches!(err, EngineError::AuthFailed));
    }

    #[test]
    fn wrong_passphrase_fails_auth() {
        let pk = b"some-private-key-bytes";
        let aad = "user:u1:wallet:w1";
        let blob = encrypt_private_key(pk, "pw", aad, None).unwrap();
        let err = unwrap_dek(&blob, "wrong-pw", aad).unwrap_err();
        assert!(matches!(err, EngineError::AuthFailed));
    }

    #[test]
    fn rejects_empty_aad() {
        let err = encrypt_private_key(b"pk", "pw", "", None).unwrap_err();
        assert!(matches!(err, EngineError::BadInput(_)));
    }

    #[test]
    fn legacy_decrypt_round_trip() {
        let key = [9u8; 32];
        let aad = "user:u1:wallet:w1";
        let pk = b"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd";
        let (iv, ct_and_tag) = gcm_seal(&key, aad.as_bytes(), pk);
        let raw = [iv, ct_and_tag].concat();
        let b58 = bs58::encode(raw).into_string();
        let recovered = decrypt_legacy(&b58, &key, aad).unwrap();
        assert_eq!(recovered.as_slice(), pk);
    }

    #[test]
    fn legacy_decrypt_wrong_key_fails() {
        let key = [9u8; 32];
        let wrong = [1u8; 32];
        let aad = "user:u1:wallet:w1";
        let (iv, ct_and_tag) = gcm_seal(&key, aad.as_bytes(), b"some-private-key-bytes");
        let raw = [iv, ct_and_tag].concat();
        let b58 = bs58::encode(raw).into_string();
        assert!(decrypt_legacy(&b58, &wrong, aad).is_err());
    }

    #[test]
    fn rotate_changes_salt_and_still_decrypts() {
        let pk = b"some-private-key-bytes";
        let aad = "user:u1:wallet:w1";
        let blob = encrypt_private_key(pk, "old-pw", aad, None).unwrap();
        let rotated = rotate_passphrase(&blob, "old-pw", "new-pw", aad).unwrap();
        assert_ne!(blob.kdf.salt, rotated.kdf.salt);
        let dek = unwrap_dek(&rotated, "new-pw", aad).unwrap();
        let recovered = decrypt_pk(&rotated, dek.as_ref(), aad).unwrap();
        assert_eq!(recovered.as_slice(), pk);
    }
}
