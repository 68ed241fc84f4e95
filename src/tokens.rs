//! Jaskier Shared Pattern — tokens
//! `GenerateToken` / `ValidateToken` interface (spec.md §1: JWT minting
//! lives outside the core). What's implemented here is the minimal opaque
//! signed-token scheme the gateway itself needs for admin-minted client
//! tokens — not a general JWT library. Format: `<uuid>.<hmac-sha256 hex>`,
//! HMAC keyed on the server's auth secret, constant-time compared with
//! `subtle` the same way the teacher compares bearer tokens in `auth.rs`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, id: &uuid::Uuid) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Mint a new opaque client token bound to `secret`.
pub fn generate_token(secret: &str) -> String {
    let id = uuid::Uuid::new_v4();
    let signature = sign(secret, &id);
    format!("{id}.{signature}")
}

/// Validate a token minted by [`generate_token`] against `secret`.
/// Constant-time comparison on the signature half only.
pub fn validate_token(token: &str, secret: &str) -> bool {
    let Some((id_part, sig_part)) = token.split_once('.') else {
        return false;
    };
    let Ok(id) = uuid::Uuid::parse_str(id_part) else {
        return false;
    };
    let expected = sign(secret, &id);
    expected.as_bytes().ct_eq(sig_part.as_bytes()).into()
}
