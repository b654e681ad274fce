use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// HMAC-SHA256 of `raw_body` keyed by `shared_secret`, lowercase hex.
pub fn sign(raw_body: &[u8], shared_secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(shared_secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `signature_header` against the HMAC of the exact request bytes.
///
/// The header is hex, optionally prefixed with `sha256=`. Comparison goes
/// through `Mac::verify_slice`, which is constant time.
pub fn verify_signature(raw_body: &[u8], signature_header: &str, shared_secret: &str) -> bool {
    if shared_secret.is_empty() {
        return false;
    }

    let provided = signature_header.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(expected) = hex::decode(provided) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(shared_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"order_reference":"ORD1","status":"completed"}"#;

    #[test]
    fn accepts_matching_signature() {
        let signature = sign(BODY, SECRET);
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(BODY, &signature, SECRET));
    }

    #[test]
    fn accepts_prefixed_and_uppercase_hex() {
        let signature = sign(BODY, SECRET);
        assert!(verify_signature(BODY, &format!("sha256={}", signature), SECRET));
        assert!(verify_signature(BODY, &signature.to_uppercase(), SECRET));
    }

    #[test]
    fn rejects_tampered_body() {
        let signature = sign(BODY, SECRET);
        let mut tampered = BODY.to_vec();
        tampered[5] ^= 0x01;
        assert!(!verify_signature(&tampered, &signature, SECRET));
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let signature = sign(BODY, SECRET);
        assert!(!verify_signature(BODY, &signature, "other"));
        assert!(!verify_signature(BODY, "not-hex", SECRET));
        assert!(!verify_signature(BODY, "", SECRET));
        assert!(!verify_signature(BODY, &signature, ""));
    }
}
