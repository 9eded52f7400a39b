//! Ed25519 signature decode/verify over the canonical payload.
//!
//! A free `verify_intent` function specialised to `TradeIntent`, since
//! this system has exactly one thing that gets signed.

use crate::canonical::signable_bytes;
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use tessera_types::TradeIntent;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature is not valid base64 or hex")]
    Undecodable,
    #[error("signature is not 64 bytes")]
    WrongLength,
    #[error("session public key is invalid")]
    InvalidKey,
    #[error("signature does not verify")]
    NotVerified,
}

/// Decode `intent.signature`: base64 first, hex as fallback (spec
/// §4.1 step 1).
fn decode_signature(raw: &str) -> Result<[u8; 64], SignatureError> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .or_else(|_| hex::decode(raw).map_err(|_| ()))
        .map_err(|_| SignatureError::Undecodable)?;
    bytes.try_into().map_err(|_| SignatureError::WrongLength)
}

/// Verify `intent`'s signature was produced by `intent.session`.
pub fn verify_intent(intent: &TradeIntent) -> Result<(), SignatureError> {
    let sig_bytes = decode_signature(&intent.signature)?;
    let signature = Ed25519Signature::from_bytes(&sig_bytes);

    let verifying_key = VerifyingKey::from_bytes(intent.session.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;

    let message = signable_bytes(intent);
    verifying_key
        .verify(&message, &signature)
        .map_err(|_| SignatureError::NotVerified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;
    use tessera_types::{Amount, IntentAction, IntentId, ItemId, OwnerId, SessionId, WalletId};

    fn signed_intent() -> (SigningKey, TradeIntent) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying = signing_key.verifying_key();
        let mut intent = TradeIntent {
            id: IntentId("i1".into()),
            session: SessionId(verifying.to_bytes()),
            owner: OwnerId([9u8; 32]),
            item: ItemId("it1".into()),
            from: WalletId([1u8; 32]),
            to: WalletId([2u8; 32]),
            amount: Amount::new(100),
            nonce: 1,
            signature: String::new(),
            created_at: 0,
            game: None,
            listing: None,
            action: IntentAction::Trade,
        };
        let sig = signing_key.sign(&crate::canonical::signable_bytes(&intent));
        intent.signature = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            sig.to_bytes(),
        );
        (signing_key, intent)
    }

    #[test]
    fn valid_signature_verifies() {
        let (_, intent) = signed_intent();
        assert!(verify_intent(&intent).is_ok());
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let (_, mut intent) = signed_intent();
        intent.amount = Amount::new(999);
        assert_eq!(verify_intent(&intent), Err(SignatureError::NotVerified));
    }

    #[test]
    fn hex_signature_is_accepted_as_fallback() {
        let (signing_key, mut intent) = signed_intent();
        let sig = signing_key.sign(&crate::canonical::signable_bytes(&intent));
        intent.signature = hex::encode(sig.to_bytes());
        assert!(verify_intent(&intent).is_ok());
    }
}
