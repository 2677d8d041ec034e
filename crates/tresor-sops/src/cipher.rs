//! Per-value AES-256-GCM encryption in the SOPS `ENC[...]` envelope

use crate::error::{Error, Result};
use aes_gcm::aead::consts::U32;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

/// Size of the data key in bytes (256 bits)
pub(crate) const DATA_KEY_SIZE: usize = 32;

/// SOPS uses a 256-bit IV rather than the usual 96 bits
const IV_SIZE: usize = 32;

const TAG_SIZE: usize = 16;

type SopsAesGcm = AesGcm<Aes256, U32>;

/// Random symmetric key shared by every value of one document
pub(crate) struct DataKey(Zeroizing<[u8; DATA_KEY_SIZE]>);

impl DataKey {
    pub(crate) fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; DATA_KEY_SIZE]);
        rand::rng().fill_bytes(key.as_mut());
        Self(key)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// Scalar type recorded in the envelope so the value can be restored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueType {
    Str,
    Int,
    Float,
    Bool,
}

impl ValueType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }
}

/// Encrypt one value with a fresh IV, authenticating `additional_data`.
///
/// Returns `ENC[AES256_GCM,data:<b64>,iv:<b64>,tag:<b64>,type:<type>]`.
pub(crate) fn encrypt_value(
    key: &DataKey,
    plaintext: &[u8],
    value_type: ValueType,
    additional_data: &str,
) -> Result<String> {
    let cipher = SopsAesGcm::new_from_slice(key.as_bytes()).map_err(Error::encryption)?;

    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let sealed = cipher
        .encrypt(
            Nonce::<U32>::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: additional_data.as_bytes(),
            },
        )
        .map_err(|e| Error::encryption(format!("AES-GCM: {}", e)))?;

    // aes-gcm appends the tag to the ciphertext; SOPS stores them separately.
    let (data, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    Ok(format!(
        "ENC[AES256_GCM,data:{},iv:{},tag:{},type:{}]",
        BASE64.encode(data),
        BASE64.encode(iv),
        BASE64.encode(tag),
        value_type.as_str()
    ))
}
