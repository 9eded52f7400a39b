//! The canonical signed intent payload.
//!
//! This serialiser is the single source of truth for what bytes a
//! session key signs: `created_at` and the signature itself are
//! excluded, and every field is written in a fixed order with explicit
//! length-prefixing so no two distinct intents ever serialise to the
//! same bytes, unlike ad-hoc JSON whose field order and whitespace are
//! not guaranteed stable.

use tessera_types::{IntentAction, TradeIntent};

/// Build the exact byte sequence a session key signs for `intent`.
///
/// Layout: each string/bytes field is written as `u32` little-endian
/// length followed by its bytes; `nonce` is a `u64` little-endian.
/// Field order: id, session, owner, item, from, to, amount (decimal
/// string), nonce, action.
pub fn signable_bytes(intent: &TradeIntent) -> Vec<u8> {
    let mut buf = Vec::new();
    push_str(&mut buf, &intent.id.0);
    push_bytes(&mut buf, intent.session.as_bytes());
    push_bytes(&mut buf, intent.owner.as_bytes());
    push_str(&mut buf, &intent.item.0);
    push_bytes(&mut buf, intent.from.as_bytes());
    push_bytes(&mut buf, intent.to.as_bytes());
    push_str(&mut buf, &intent.amount.to_decimal_string());
    buf.extend_from_slice(&intent.nonce.to_le_bytes());
    push_str(&mut buf, action_str(intent.action));
    buf
}

fn action_str(action: IntentAction) -> &'static str {
    action.as_str()
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    push_bytes(buf, s.as_bytes());
}

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{Amount, IntentId, ItemId, OwnerId, SessionId, WalletId};

    fn sample() -> TradeIntent {
        TradeIntent {
            id: IntentId("i1".into()),
            session: SessionId([1u8; 32]),
            owner: OwnerId([2u8; 32]),
            item: ItemId("it1".into()),
            from: WalletId([3u8; 32]),
            to: WalletId([4u8; 32]),
            amount: Amount::new(100),
            nonce: 1,
            signature: String::new(),
            created_at: 0,
            game: None,
            listing: None,
            action: IntentAction::Trade,
        }
    }

    #[test]
    fn excludes_created_at_and_signature() {
        let mut a = sample();
        let mut b = sample();
        a.created_at = 1;
        b.created_at = 2;
        a.signature = "aa".into();
        b.signature = "bb".into();
        assert_eq!(signable_bytes(&a), signable_bytes(&b));
    }

    #[test]
    fn differs_when_a_field_changes() {
        let a = sample();
        let mut b = sample();
        b.nonce = 2;
        assert_ne!(signable_bytes(&a), signable_bytes(&b));
    }
}
