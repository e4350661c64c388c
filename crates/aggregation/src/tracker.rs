use parking_lot::Mutex;
use relay_types::{Bitmap, Epoch, H256, U256};
use std::collections::HashMap;
use tracing::debug;

use crate::signature_map::SignatureMap;
use crate::{AggregationError, Result};

struct TrackedRequest {
    signatures: SignatureMap,
    quorum_threshold: U256,
    quorum_reached: bool,
}

/// Result of accepting one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureOutcome {
    pub quorum_reached: bool,
    /// True only for the signature that pushed the request over its threshold.
    pub newly_reached: bool,
    pub current_voting_power: U256,
}

/// Signature maps of every in-flight signing request.
#[derive(Default)]
pub struct SignatureTracker {
    requests: Mutex<HashMap<H256, TrackedRequest>>,
}

impl SignatureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `request_id`. Returns `false` if it was already tracked,
    /// in which case the existing map is kept.
    pub fn track(
        &self,
        request_id: H256,
        epoch: Epoch,
        total_validator_count: u32,
        quorum_threshold: U256,
    ) -> bool {
        let mut requests = self.requests.lock();
        if requests.contains_key(&request_id) {
            return false;
        }

        debug!(?request_id, epoch, total_validator_count, "Tracking signing request");
        requests.insert(
            request_id,
            TrackedRequest {
                signatures: SignatureMap::new(request_id, epoch, total_validator_count),
                quorum_threshold,
                quorum_reached: false,
            },
        );
        true
    }

    pub fn add_signature(
        &self,
        request_id: H256,
        index: u32,
        voting_power: U256,
    ) -> Result<SignatureOutcome> {
        let mut requests = self.requests.lock();
        let request = requests
            .get_mut(&request_id)
            .ok_or(AggregationError::UnknownRequest { request_id })?;

        request.signatures.set_validator_present(index, voting_power)?;

        let reached = request
            .signatures
            .threshold_reached(request.quorum_threshold);
        let newly_reached = reached && !request.quorum_reached;
        request.quorum_reached = reached;

        if newly_reached {
            debug!(
                ?request_id,
                signers = request.signatures.signer_count(),
                voting_power = %request.signatures.current_voting_power(),
                "Quorum reached"
            );
        }

        Ok(SignatureOutcome {
            quorum_reached: reached,
            newly_reached,
            current_voting_power: request.signatures.current_voting_power(),
        })
    }

    pub fn contains(&self, request_id: &H256) -> bool {
        self.requests.lock().contains_key(request_id)
    }

    pub fn has_signature(&self, request_id: &H256, index: u32) -> bool {
        self.requests
            .lock()
            .get(request_id)
            .map(|r| r.signatures.is_present(index))
            .unwrap_or(false)
    }

    /// Epoch the request was opened under.
    pub fn epoch_of(&self, request_id: &H256) -> Option<Epoch> {
        self.requests.lock().get(request_id).map(|r| r.signatures.epoch)
    }

    pub fn is_quorum_reached(&self, request_id: &H256) -> Option<bool> {
        self.requests.lock().get(request_id).map(|r| r.quorum_reached)
    }

    pub fn missing(&self, request_id: &H256) -> Result<Bitmap> {
        self.requests
            .lock()
            .get(request_id)
            .map(|r| r.signatures.missing_validators())
            .ok_or(AggregationError::UnknownRequest {
                request_id: *request_id,
            })
    }

    /// Missing signers of every request still short of its quorum.
    pub fn pending(&self) -> Vec<(H256, Bitmap)> {
        let requests = self.requests.lock();
        let mut pending: Vec<_> = requests
            .iter()
            .filter(|(_, r)| !r.quorum_reached)
            .map(|(id, r)| (*id, r.signatures.missing_validators()))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        pending
    }

    /// Ids of every tracked request, ascending.
    pub fn request_ids(&self) -> Vec<H256> {
        let mut ids: Vec<_> = self.requests.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self, request_id: &H256) -> Option<SignatureMap> {
        self.requests
            .lock()
            .get(request_id)
            .map(|r| r.signatures.clone())
    }

    /// Stops tracking `request_id`, returning its final map.
    pub fn finalize(&self, request_id: &H256) -> Option<SignatureMap> {
        self.requests
            .lock()
            .remove(request_id)
            .map(|r| r.signatures)
    }

    /// Drops every request of an epoch before `epoch`. Returns how many went.
    pub fn prune_before(&self, epoch: Epoch) -> usize {
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, r| r.signatures.epoch >= epoch);
        let pruned = before - requests.len();
        if pruned > 0 {
            debug!(epoch, pruned, "Pruned signing requests");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(n: u8) -> H256 {
        H256::repeat_byte(n)
    }

    #[test]
    fn test_track_is_idempotent() {
        let tracker = SignatureTracker::new();
        assert!(tracker.track(id(1), 1, 4, U256::from(10)));
        tracker.add_signature(id(1), 0, U256::from(3)).unwrap();

        assert!(!tracker.track(id(1), 1, 4, U256::from(10)));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.has_signature(&id(1), 0));
    }

    #[test]
    fn test_epoch_of_tracked_request() {
        let tracker = SignatureTracker::new();
        tracker.track(id(1), 7, 2, U256::one());

        assert_eq!(tracker.epoch_of(&id(1)), Some(7));
        assert_eq!(tracker.epoch_of(&id(2)), None);
        tracker.finalize(&id(1));
        assert_eq!(tracker.epoch_of(&id(1)), None);
    }

    #[test]
    fn test_quorum_reported_once() {
        let tracker = SignatureTracker::new();
        tracker.track(id(1), 1, 3, U256::from(671));

        let first = tracker.add_signature(id(1), 0, U256::from(400)).unwrap();
        assert!(!first.quorum_reached);

        let second = tracker.add_signature(id(1), 1, U256::from(300)).unwrap();
        assert!(second.quorum_reached && second.newly_reached);
        assert_eq!(second.current_voting_power, U256::from(700));

        let third = tracker.add_signature(id(1), 2, U256::from(300)).unwrap();
        assert!(third.quorum_reached);
        assert!(!third.newly_reached);
        assert_eq!(tracker.is_quorum_reached(&id(1)), Some(true));
    }

    #[test]
    fn test_unknown_request() {
        let tracker = SignatureTracker::new();
        assert_eq!(
            tracker.add_signature(id(9), 0, U256::one()),
            Err(AggregationError::UnknownRequest { request_id: id(9) })
        );
        assert!(tracker.missing(&id(9)).is_err());
    }

    #[test]
    fn test_pending_excludes_completed_requests() {
        let tracker = SignatureTracker::new();
        tracker.track(id(1), 1, 2, U256::from(5));
        tracker.track(id(2), 1, 2, U256::from(5));
        tracker.add_signature(id(2), 1, U256::from(5)).unwrap();
        tracker.add_signature(id(1), 1, U256::from(1)).unwrap();

        let pending = tracker.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, id(1));
        assert_eq!(pending[0].1.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_finalize_and_prune() {
        let tracker = SignatureTracker::new();
        tracker.track(id(1), 3, 2, U256::one());
        tracker.track(id(2), 5, 2, U256::one());
        tracker.track(id(3), 6, 2, U256::one());

        let finalized = tracker.finalize(&id(3)).unwrap();
        assert_eq!(finalized.epoch, 6);
        assert!(tracker.finalize(&id(3)).is_none());

        assert_eq!(tracker.prune_before(5), 1);
        assert_eq!(tracker.request_ids(), vec![id(2)]);
    }

    #[test]
    fn test_concurrent_signatures_counted_once() {
        let tracker = Arc::new(SignatureTracker::new());
        tracker.track(id(1), 1, 64, U256::from(1_000_000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for index in 0..64 {
                        let _ = tracker.add_signature(id(1), index, U256::from(10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let map = tracker.snapshot(&id(1)).unwrap();
        assert_eq!(map.signer_count(), 64);
        assert_eq!(map.current_voting_power(), U256::from(640));
    }
}
