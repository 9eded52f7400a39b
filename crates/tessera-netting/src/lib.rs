//! Tessera Netting — the pure per-item chain-netting kernel (C3).
//!
//! No I/O, no clock, no randomness: `net(intents)` is a deterministic
//! function of its input list's order, computed in one traversal over
//! two running maps (current owner per item, net delta per wallet).

use std::collections::BTreeMap;
use tessera_core::OverflowPolicy;
use tessera_types::{ConservationProof, IntentId, ItemId, NettingResult, Signed128, TradeIntent, WalletId};
use tracing::warn;

/// Net `intents`, in list order.
///
/// Returns `None` only when `overflow` is `AbortBatch` and an overflow
/// occurred; `Some(result)` otherwise (including the `SkipIntent` path,
/// where the offending intent lands in `skipped_ids` and the pass
/// continues).
pub fn net(intents: &[TradeIntent], overflow: OverflowPolicy) -> Option<NettingResult> {
    let mut owner: BTreeMap<ItemId, WalletId> = BTreeMap::new();
    let mut delta: BTreeMap<WalletId, Signed128> = BTreeMap::new();
    let mut consumed_ids: Vec<IntentId> = Vec::new();
    let mut skipped_ids: Vec<IntentId> = Vec::new();

    for intent in intents {
        let current_owner = owner
            .entry(intent.item.clone())
            .or_insert_with(|| intent.from.clone());

        if *current_owner != intent.from {
            skipped_ids.push(intent.id.clone());
            continue;
        }

        let Some(amount) = intent.amount.as_signed() else {
            warn!(intent_id = %intent.id, "amount does not fit in a signed 128-bit delta");
            if overflow == OverflowPolicy::AbortBatch {
                return None;
            }
            skipped_ids.push(intent.id.clone());
            continue;
        };
        let from_entry = delta.entry(intent.from.clone()).or_insert(Signed128::ZERO);
        let Some(next_from) = from_entry.checked_add(amount) else {
            warn!(intent_id = %intent.id, "arithmetic overflow accumulating delta[from]");
            if overflow == OverflowPolicy::AbortBatch {
                return None;
            }
            skipped_ids.push(intent.id.clone());
            continue;
        };

        let to_entry = delta.entry(intent.to.clone()).or_insert(Signed128::ZERO);
        let Some(next_to) = to_entry.checked_sub(amount) else {
            warn!(intent_id = %intent.id, "arithmetic overflow accumulating delta[to]");
            if overflow == OverflowPolicy::AbortBatch {
                return None;
            }
            skipped_ids.push(intent.id.clone());
            continue;
        };

        *delta.get_mut(&intent.from).unwrap() = next_from;
        *delta.get_mut(&intent.to).unwrap() = next_to;
        *owner.get_mut(&intent.item).unwrap() = intent.to.clone();
        consumed_ids.push(intent.id.clone());
    }

    delta.retain(|_, d| !d.is_zero());

    let net_sum = delta
        .values()
        .try_fold(Signed128::ZERO, |acc, d| acc.checked_add(*d));

    let net_sum = match net_sum {
        Some(sum) => sum,
        None => {
            warn!("overflow summing net cash deltas for conservation check");
            if overflow == OverflowPolicy::AbortBatch {
                return None;
            }
            Signed128::ZERO
        }
    };

    Some(NettingResult {
        final_owners: owner,
        net_cash_deltas: delta,
        consumed_ids,
        skipped_ids,
        conservation: ConservationProof::check(net_sum),
    })
}
