use relay_types::{serde_hex, Bitmap, Epoch, H256};
use serde::{Deserialize, Serialize};

/// Aggregated signature over a signing request, produced by an aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationProof {
    pub request_id: H256,
    pub epoch: Epoch,
    pub signers: Bitmap,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
}
