use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the compact JSON encoding, as lowercase hex. Identical runs
/// share a fingerprint.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, String> {
    let canonical =
        serde_json::to_vec(value).map_err(|err| format!("failed to encode result: {err}"))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(to_hex(&hasher.finalize()))
}

pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|err| format!("failed to encode report: {err}"))
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
