//! Common test helpers for tresor-sops integration tests
//!
//! Provides a minimal decryptor for the archives this crate writes. The crate
//! itself never decrypts; tests use this to check that the recipients in the
//! policy can recover every value and that the MAC verifies.

use aes_gcm::aead::consts::U32;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::SecondsFormat;
use regex::Regex;
use serde_yaml_ng::{Mapping, Value};
use sha2::{Digest, Sha512};
use std::io::Read;
use tresor_sops::{KeyGroup, ResolvedPolicy, SopsMetadata};

type SopsAesGcm = AesGcm<Aes256, U32>;

/// Fresh age identity and its recipient string
pub fn identity() -> (age::x25519::Identity, String) {
    let identity = age::x25519::Identity::generate();
    let recipient = identity.to_public().to_string();
    (identity, recipient)
}

#[allow(dead_code)]
pub fn single_group(recipients: &[&str], regex: Option<&str>) -> ResolvedPolicy {
    ResolvedPolicy {
        key_groups: vec![KeyGroup::new(recipients.iter().map(|r| r.to_string()).collect())],
        encrypted_regex: regex.map(|r| Regex::new(r).unwrap()),
    }
}

/// Decrypt an archive, verify its MAC, and return the plaintext tree
pub fn decrypt(archive: &str, identity: &age::x25519::Identity) -> Value {
    let mut document: Mapping = serde_yaml_ng::from_str(archive).unwrap();
    let metadata: SopsMetadata =
        serde_yaml_ng::from_value(document.remove("sops").expect("sops block")).unwrap();

    let key = metadata
        .age_recipients()
        .find_map(|entry| unwrap_key(&entry.enc, identity))
        .expect("no recipient entry opens with this identity");

    let mut mac = Sha512::new();
    let tree = walk(Value::Mapping(document), &mut Vec::new(), &key, &mut mac);

    let lastmodified = metadata.last_modified().expect("lastmodified");
    let expected = open(
        &metadata.mac,
        &key,
        &lastmodified.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    assert_eq!(
        Value::String(hex::encode_upper(mac.finalize())),
        expected,
        "MAC mismatch"
    );

    tree
}

fn unwrap_key(enc: &str, identity: &age::x25519::Identity) -> Option<Vec<u8>> {
    let decryptor = age::Decryptor::new(age::armor::ArmoredReader::new(enc.as_bytes())).ok()?;
    let mut reader = decryptor
        .decrypt(std::iter::once(identity as &dyn age::Identity))
        .ok()?;
    let mut key = Vec::new();
    reader.read_to_end(&mut key).ok()?;
    Some(key)
}

fn walk(value: Value, path: &mut Vec<String>, key: &[u8], mac: &mut Sha512) -> Value {
    match value {
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .into_iter()
                .map(|(k, v)| {
                    path.push(k.as_str().map(String::from).unwrap_or_else(|| {
                        serde_yaml_ng::to_string(&k).unwrap().trim().to_string()
                    }));
                    let v = walk(v, path, key, mac);
                    path.pop();
                    (k, v)
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| walk(item, path, key, mac))
                .collect(),
        ),
        Value::Null => Value::Null,
        leaf => {
            let plain = match leaf {
                Value::String(s) if s.starts_with("ENC[AES256_GCM,") => {
                    open(&s, key, &format!("{}:", path.join(":")))
                }
                other => other,
            };
            mac.update(mac_bytes(&plain));
            plain
        }
    }
}

fn mac_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Bool(true) => b"True".to_vec(),
        Value::Bool(false) => b"False".to_vec(),
        Value::Number(n) if n.is_f64() => n.as_f64().unwrap().to_string().into_bytes(),
        Value::Number(n) => n.to_string().into_bytes(),
        other => panic!("unexpected leaf {:?}", other),
    }
}

/// Open one `ENC[...]` envelope and restore its scalar type
fn open(envelope: &str, key: &[u8], additional_data: &str) -> Value {
    let pattern =
        Regex::new(r"^ENC\[AES256_GCM,data:(.*),iv:(.+),tag:(.+),type:(.+)\]$").unwrap();
    let caps = pattern.captures(envelope).expect("envelope format");

    let mut sealed = BASE64.decode(&caps[1]).unwrap();
    sealed.extend(BASE64.decode(&caps[3]).unwrap());
    let iv = BASE64.decode(&caps[2]).unwrap();
    assert_eq!(iv.len(), 32);

    let plain = SopsAesGcm::new_from_slice(key)
        .unwrap()
        .decrypt(
            Nonce::<U32>::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: additional_data.as_bytes(),
            },
        )
        .expect("authentication failed");
    let text = String::from_utf8(plain).unwrap();

    match &caps[4] {
        "str" => Value::String(text),
        "int" => Value::Number(text.parse::<i64>().unwrap().into()),
        "float" => Value::Number(text.parse::<f64>().unwrap().into()),
        "bool" => Value::Bool(text == "True"),
        other => panic!("unknown type {}", other),
    }
}
