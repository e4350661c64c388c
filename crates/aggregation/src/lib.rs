//! Quorum progress for signing requests.
//!
//! A [`SignatureMap`] records which active validators signed one request and
//! how much voting power they carry. The [`SignatureTracker`] keeps one map
//! per in-flight request behind a lock, and the [`resync`] module defines the
//! request/response shapes used to fetch missing signatures and proofs from
//! peers.

pub mod proof;
pub mod resync;
pub mod signature_map;
pub mod tracker;

pub use proof::AggregationProof;
pub use resync::{
    apply_proofs_response, apply_signatures_response, AcceptedSignature, IndexedSignature,
    ProofSyncStats,
    SignatureSyncStats, WantProofsRequest, WantProofsResponse, WantSignaturesRequest,
    WantSignaturesResponse,
};
pub use signature_map::SignatureMap;
pub use tracker::{SignatureOutcome, SignatureTracker};

use relay_types::H256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Signature from validator {index} already exists")]
    AlreadyExists { index: u32 },

    #[error("Validator index {index} out of range (validator count {total})")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("Voting power of validator {index} overflows the signed total")]
    VotingPowerOverflow { index: u32 },

    #[error("Unknown signing request {request_id:?}")]
    UnknownRequest { request_id: H256 },
}

pub type Result<T> = std::result::Result<T, AggregationError>;
