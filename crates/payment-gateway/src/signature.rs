// crates/payment-gateway/src/signature.rs

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::PaymentError;

type HmacSha256 = Hmac<Sha256>;

/// Payload yang ditandatangani gateway untuk pembayaran: "{order_id}|{payment_id}".
pub fn payment_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

/// HMAC-SHA256 dalam lowercase hex.
pub fn sign(secret: &str, message: &[u8]) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidKey)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn sign_payment(secret: &str, order_id: &str, payment_id: &str) -> Result<String, PaymentError> {
    sign(secret, payment_payload(order_id, payment_id).as_bytes())
}

/// Perbandingan constant-time lewat `verify_slice`. Signature yang bukan hex
/// valid langsung ditolak.
pub fn verify(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&signature).is_ok()
}

pub fn verify_payment(secret: &str, order_id: &str, payment_id: &str, signature_hex: &str) -> bool {
    verify(secret, payment_payload(order_id, payment_id).as_bytes(), signature_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }

    #[test]
    fn test_any_key_length_signs() {
        // HMAC mem-pad / hash key, jadi kosong dan sangat panjang tetap valid
        let empty = sign("", b"payload").unwrap();
        assert_eq!(empty.len(), 64);
        assert!(verify("", b"payload", &empty));

        let long_key = "k".repeat(500);
        let sig = sign(&long_key, b"payload").unwrap();
        assert!(verify(&long_key, b"payload", &sig));
    }

    #[test]
    fn test_payment_signature_roundtrip() {
        let sig = sign_payment("secret", "order_abc", "pay_xyz").unwrap();
        assert!(verify_payment("secret", "order_abc", "pay_xyz", &sig));
        assert!(verify_payment("secret", "order_abc", "pay_xyz", &sig.to_uppercase()));
    }

    #[test]
    fn test_tampering_detected() {
        let sig = sign_payment("secret", "order_abc", "pay_xyz").unwrap();
        assert!(!verify_payment("other-secret", "order_abc", "pay_xyz", &sig));
        assert!(!verify_payment("secret", "order_abc", "pay_evil", &sig));

        let mut flipped = sig.clone().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!verify_payment("secret", "order_abc", "pay_xyz", &flipped));

        assert!(!verify_payment("secret", "order_abc", "pay_xyz", "not-hex"));
        assert!(!verify_payment("secret", "order_abc", "pay_xyz", &sig[..10]));
    }
}
