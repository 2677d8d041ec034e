//! End-to-end tests: policy file → encrypted archive → decrypted with age identity

mod common;

use common::{decrypt, identity, single_group};
use serde_yaml_ng::Value;
use tresor_sops::{ArchiveMetadata, EncryptionPolicy, Error, StructuredEncryptor};

const KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTi
    server: https://10.0.0.1:6443
  name: prod-a
users:
- name: prod-a-admin
  user:
    client-certificate-data: Y2VydA==
    client-key-data: a2V5
current-context: prod-a-admin@prod-a
"#;

#[test]
fn test_selected_field_encrypted_and_recoverable() {
    let (id, recipient) = identity();
    let policy = EncryptionPolicy::from_yaml(&format!(
        "creation_rules:\n  - age: {}\n    encrypted_regex: ^secret$\n",
        recipient
    ))
    .unwrap();

    let plain = "hello: world\nsecret: society\n";
    let resolved = policy.resolve("test.yaml").unwrap();
    let archive = StructuredEncryptor::new()
        .encrypt(plain.as_bytes(), &resolved)
        .unwrap()
        .to_yaml()
        .unwrap();

    let raw: Value = serde_yaml_ng::from_str(&archive).unwrap();
    assert_eq!(raw["hello"], Value::from("world"));
    assert!(raw["secret"].as_str().unwrap().starts_with("ENC[AES256_GCM,"));
    assert!(!archive.contains("society"));

    let clear = decrypt(&archive, &id);
    assert_eq!(serde_yaml_ng::to_string(&clear).unwrap(), plain);
}

#[test]
fn test_kubeconfig_round_trip() {
    let (id, recipient) = identity();
    let resolved = single_group(&[&recipient], Some("^(certificate-authority-data|client-.*-data)$"));

    let document = StructuredEncryptor::new()
        .encrypt(KUBECONFIG.as_bytes(), &resolved)
        .unwrap();
    assert_eq!(document.encrypted_values(), 3);

    let archive = document.to_yaml().unwrap();
    assert!(archive.contains("server: https://10.0.0.1:6443"));
    assert!(!archive.contains("a2V5"));

    let original: Value = serde_yaml_ng::from_str(KUBECONFIG).unwrap();
    assert_eq!(decrypt(&archive, &id), original);
}

#[test]
fn test_all_leaf_types_round_trip_without_selector() {
    let (id, recipient) = identity();
    let plain = "count: 3\nratio: 0.25\nenabled: false\nname: cp\nempty: null\nlist:\n- 1\n- two\n";

    let archive = StructuredEncryptor::new()
        .encrypt(plain.as_bytes(), &single_group(&[&recipient], None))
        .unwrap()
        .to_yaml()
        .unwrap();

    let original: Value = serde_yaml_ng::from_str(plain).unwrap();
    assert_eq!(decrypt(&archive, &id), original);
}

#[test]
fn test_every_recipient_can_decrypt() {
    let (first, first_recipient) = identity();
    let (second, second_recipient) = identity();
    let plain = "token: abc123\n";

    let archive = StructuredEncryptor::new()
        .encrypt(
            plain.as_bytes(),
            &single_group(&[&first_recipient, &second_recipient], None),
        )
        .unwrap()
        .to_yaml()
        .unwrap();

    let original: Value = serde_yaml_ng::from_str(plain).unwrap();
    assert_eq!(decrypt(&archive, &first), original);
    assert_eq!(decrypt(&archive, &second), original);
}

#[test]
fn test_key_groups_layout() {
    let (ops, ops_recipient) = identity();
    let (_audit, audit_recipient) = identity();
    let policy = EncryptionPolicy::from_yaml(&format!(
        "creation_rules:\n  - path_regex: ^prod/\n    key_groups:\n      - age: [{}]\n      - age: [{}]\n",
        ops_recipient, audit_recipient
    ))
    .unwrap();

    let document = StructuredEncryptor::new()
        .encrypt(b"token: abc\n", &policy.resolve("prod/a/cp.yaml").unwrap())
        .unwrap();
    let metadata = document.metadata();
    assert!(metadata.age.is_empty());
    assert_eq!(metadata.key_groups.len(), 2);
    assert_eq!(metadata.key_groups[0].age[0].recipient, ops_recipient);
    assert_eq!(metadata.key_groups[1].age[0].recipient, audit_recipient);

    let clear = decrypt(&document.to_yaml().unwrap(), &ops);
    assert_eq!(clear["token"], Value::from("abc"));
}

#[test]
fn test_encryption_is_not_deterministic() {
    let (_id, recipient) = identity();
    let policy = single_group(&[&recipient], None);
    let encryptor = StructuredEncryptor::new();

    let a = encryptor.encrypt(b"k: v\n", &policy).unwrap().to_yaml().unwrap();
    let b = encryptor.encrypt(b"k: v\n", &policy).unwrap().to_yaml().unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_last_modified_readable_and_monotonic() {
    let (_id, recipient) = identity();
    let policy = single_group(&[&recipient], None);
    let encryptor = StructuredEncryptor::new();

    let first = encryptor.encrypt(b"k: v\n", &policy).unwrap();
    let second = encryptor.encrypt(b"k: v\n", &policy).unwrap();
    assert!(second.last_modified() >= first.last_modified());

    let archive = second.to_yaml().unwrap();
    assert_eq!(
        ArchiveMetadata::last_modified(archive.as_bytes()).unwrap(),
        Some(second.last_modified())
    );
}

#[test]
fn test_empty_recipient_rule_fails_at_encryption() {
    let policy = EncryptionPolicy::from_yaml("creation_rules:\n  - age: ''\n").unwrap();
    let resolved = policy.resolve("prod/a/cp.yaml").unwrap();
    assert_eq!(resolved.recipient_count(), 0);

    let err = StructuredEncryptor::new()
        .encrypt(b"k: v\n", &resolved)
        .unwrap_err();
    assert!(matches!(err, Error::KeyWrapFailed { .. }));
}

#[test]
fn test_malformed_recipient_fails_key_wrap() {
    let err = StructuredEncryptor::new()
        .encrypt(b"k: v\n", &single_group(&["not-an-age-key"], None))
        .unwrap_err();
    assert!(matches!(err, Error::KeyWrapFailed { .. }));
}

#[test]
fn test_selector_matching_nothing_is_an_error() {
    let (_id, recipient) = identity();
    let err = StructuredEncryptor::new()
        .encrypt(b"hello: world\n", &single_group(&[&recipient], Some("^password$")))
        .unwrap_err();
    assert!(matches!(err, Error::NothingEncrypted { ref regex } if regex == "^password$"));
}
