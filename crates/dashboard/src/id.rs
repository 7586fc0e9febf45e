use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

pub const ID_LEN: usize = 32;

pub fn random(rng: &mut dyn RngCore) -> [u8; ID_LEN] {
    let mut bytes = [0; ID_LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}

pub fn serialize(f: &mut fmt::Formatter<'_>, prefix: &str, bytes: &[u8; ID_LEN]) -> fmt::Result {
    f.write_str(prefix)?;
    f.write_str(&URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidId;

pub fn deserialize(s: &str, prefix: &str) -> Result<[u8; ID_LEN], InvalidId> {
    let b64 = s.strip_prefix(prefix).ok_or(InvalidId)?;
    // Slack for overlong input, rejected by the length check.
    let mut buffer = [0; ID_LEN + 3];
    let decoded = URL_SAFE_NO_PAD
        .decode_slice(b64, &mut buffer)
        .map_err(|_| InvalidId)?;
    if decoded != ID_LEN {
        return Err(InvalidId);
    }
    let mut bytes = [0; ID_LEN];
    bytes.copy_from_slice(&buffer[..ID_LEN]);
    Ok(bytes)
}
