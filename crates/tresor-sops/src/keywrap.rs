//! Wrapping the data key for age recipients

use crate::cipher::DataKey;
use crate::error::{Error, Result};
use crate::metadata::AgeRecipientMetadata;
use age::armor::{ArmoredWriter, Format};
use std::io::Write;

/// Encrypt the data key to a single age X25519 recipient, ASCII-armored.
///
/// Each recipient gets its own age file so `sops` can list and rotate them
/// independently.
pub(crate) fn wrap_for_recipient(key: &DataKey, recipient: &str) -> Result<AgeRecipientMetadata> {
    let parsed = recipient
        .trim()
        .parse::<age::x25519::Recipient>()
        .map_err(|e| Error::key_wrap(format!("invalid age recipient '{}': {}", recipient, e)))?;

    let encryptor = age::Encryptor::with_recipients(std::iter::once(&parsed as &dyn age::Recipient))
        .map_err(Error::key_wrap)?;

    let mut armored = Vec::new();
    let output = ArmoredWriter::wrap_output(&mut armored, Format::AsciiArmor)
        .map_err(Error::key_wrap)?;
    let mut writer = encryptor.wrap_output(output).map_err(Error::key_wrap)?;
    writer.write_all(key.as_bytes()).map_err(Error::key_wrap)?;
    writer
        .finish()
        .and_then(|armor| armor.finish())
        .map_err(Error::key_wrap)?;

    let enc = String::from_utf8(armored).map_err(Error::key_wrap)?;
    Ok(AgeRecipientMetadata {
        recipient: recipient.trim().to_string(),
        enc,
    })
}

/// Wrap the data key for every recipient of a group
pub(crate) fn wrap_for_group(key: &DataKey, recipients: &[String]) -> Result<Vec<AgeRecipientMetadata>> {
    recipients
        .iter()
        .map(|recipient| wrap_for_recipient(key, recipient))
        .collect()
}
