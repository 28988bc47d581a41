use axum::http::HeaderMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

// Header set by the hosting platform, trusted over anything the client sends
pub const PLATFORM_FORWARDED_HEADER: &str = "x-vercel-forwarded-for";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

pub const UNKNOWN_CLIENT: &str = "unknown";

// Hex chars of the digest we keep
const KEY_LEN: usize = 16;

// Hashed client address - only ever used as a map key and ledger field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    // Hash a raw address string into a key
    pub fn from_address(address: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(address.trim());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..KEY_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Pick the client address out of the forwarding headers and hash it.
// Never fails: with no usable header every such client shares the "unknown" key.
pub fn identify(headers: &HeaderMap) -> ClientKey {
    let address = header_value(headers, PLATFORM_FORWARDED_HEADER)
        .or_else(|| {
            header_value(headers, FORWARDED_FOR_HEADER)
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .or_else(|| header_value(headers, REAL_IP_HEADER))
        .unwrap_or(UNKNOWN_CLIENT);

    ClientKey::from_address(address)
}

// Present, valid ascii and not blank
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
