//! The allowed action set a session key may be scoped to.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentAction {
    Trade,
    Bid,
    BuyNow,
}

impl IntentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentAction::Trade => "TRADE",
            IntentAction::Bid => "BID",
            IntentAction::BuyNow => "BUY_NOW",
        }
    }
}
