//! HMAC signatures for local upload URLs.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, bucket: &str, key: &str, expires: i64, content_type: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(format!("{bucket}/{key}:{expires}:{content_type}").as_bytes());
    mac
}

/// Signs a local upload of `bucket/key` valid until `expires` (unix seconds).
#[must_use]
pub fn sign_upload(secret: &str, bucket: &str, key: &str, expires: i64, content_type: &str) -> String {
    hex::encode(mac(secret, bucket, key, expires, content_type).finalize().into_bytes())
}

/// Verifies a signature produced by [`sign_upload`] in constant time.
///
/// Expired signatures (`expires < now`) are rejected.
#[must_use]
pub fn verify_upload(
    secret: &str,
    bucket: &str,
    key: &str,
    expires: i64,
    content_type: &str,
    signature: &str,
    now: i64,
) -> bool {
    if expires < now {
        return false;
    }
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    mac(secret, bucket, key, expires, content_type)
        .verify_slice(&signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "kan-signing-secret";

    #[test]
    fn test_signature_verifies() {
        let sig = sign_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png");
        assert_eq!(sig.len(), 64);
        assert!(verify_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png", &sig, 999));
        assert!(verify_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png", &sig, 1_000));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let sig = sign_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png");
        assert!(!verify_upload(SECRET, "avatars", "u2/me.png", 1_000, "image/png", &sig, 0));
        assert!(!verify_upload(SECRET, "avatars", "u1/me.png", 2_000, "image/png", &sig, 0));
        assert!(!verify_upload(SECRET, "avatars", "u1/me.png", 1_000, "text/html", &sig, 0));
        assert!(!verify_upload("other", "avatars", "u1/me.png", 1_000, "image/png", &sig, 0));
        assert!(!verify_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png", "zz", 0));
    }

    #[test]
    fn test_signature_expires() {
        let sig = sign_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png");
        assert!(!verify_upload(SECRET, "avatars", "u1/me.png", 1_000, "image/png", &sig, 1_001));
    }
}
