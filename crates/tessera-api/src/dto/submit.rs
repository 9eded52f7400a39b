//! Intent submission (spec §4.1/§6). The wire shape is the domain
//! `TradeIntent` itself; no separate over-the-wire representation is
//! needed since every field is serializable as-is.

use serde::{Deserialize, Serialize};
use tessera_types::TradeIntent;

#[derive(Debug, Deserialize)]
pub struct SubmitIntentRequest(pub TradeIntent);

#[derive(Debug, Serialize)]
pub struct SubmitIntentResponse {
    pub accepted: bool,
}
