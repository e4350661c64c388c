use relay_types::{Bitmap, Epoch, H256, U256};
use serde::{Deserialize, Serialize};

use crate::{AggregationError, Result};

/// Signers of one signing request and their accumulated voting power.
///
/// Indices address the active validators of the request's epoch. The map has
/// no interior locking; shared use goes through
/// [`SignatureTracker`](crate::SignatureTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMap {
    pub request_id: H256,
    pub epoch: Epoch,
    signed: Bitmap,
    current_voting_power: U256,
    total_validator_count: u32,
}

impl SignatureMap {
    pub fn new(request_id: H256, epoch: Epoch, total_validator_count: u32) -> Self {
        Self {
            request_id,
            epoch,
            signed: Bitmap::new(),
            current_voting_power: U256::zero(),
            total_validator_count,
        }
    }

    /// Marks `index` as signed and adds its voting power.
    ///
    /// A validator is counted once: repeating an index fails with
    /// [`AggregationError::AlreadyExists`] and leaves the map untouched, as
    /// does a voting power that would overflow the total.
    pub fn set_validator_present(&mut self, index: u32, voting_power: U256) -> Result<()> {
        if index >= self.total_validator_count {
            return Err(AggregationError::IndexOutOfRange {
                index,
                total: self.total_validator_count,
            });
        }
        if self.signed.contains(index) {
            return Err(AggregationError::AlreadyExists { index });
        }

        self.current_voting_power = self
            .current_voting_power
            .checked_add(voting_power)
            .ok_or(AggregationError::VotingPowerOverflow { index })?;
        self.signed.insert(index);
        Ok(())
    }

    pub fn threshold_reached(&self, quorum_threshold: U256) -> bool {
        self.current_voting_power >= quorum_threshold
    }

    /// Indices in `[0, total_validator_count)` that have not signed yet.
    pub fn missing_validators(&self) -> Bitmap {
        self.signed.complement_within(self.total_validator_count)
    }

    pub fn is_present(&self, index: u32) -> bool {
        self.signed.contains(index)
    }

    pub fn signed(&self) -> &Bitmap {
        &self.signed
    }

    pub fn signer_count(&self) -> usize {
        self.signed.len()
    }

    pub fn current_voting_power(&self) -> U256 {
        self.current_voting_power
    }

    pub fn total_validator_count(&self) -> u32 {
        self.total_validator_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(total: u32) -> SignatureMap {
        SignatureMap::new(H256::repeat_byte(1), 3, total)
    }

    #[test]
    fn test_no_double_count() {
        let mut m = map(4);
        m.set_validator_present(0, U256::from(10)).unwrap();

        let err = m.set_validator_present(0, U256::from(10)).unwrap_err();
        assert_eq!(err, AggregationError::AlreadyExists { index: 0 });
        assert_eq!(m.current_voting_power(), U256::from(10));
        assert_eq!(m.signer_count(), 1);
    }

    #[test]
    fn test_missing_validators() {
        let mut m = map(4);
        m.set_validator_present(0, U256::from(1)).unwrap();
        m.set_validator_present(2, U256::from(1)).unwrap();

        let missing: Vec<u32> = m.missing_validators().iter().collect();
        assert_eq!(missing, vec![1, 3]);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut m = map(2);
        assert_eq!(
            m.set_validator_present(2, U256::one()),
            Err(AggregationError::IndexOutOfRange { index: 2, total: 2 })
        );
        assert!(m.signed().is_empty());
    }

    #[test]
    fn test_threshold() {
        let mut m = map(3);
        assert!(m.threshold_reached(U256::zero()));
        assert!(!m.threshold_reached(U256::from(671)));

        m.set_validator_present(1, U256::from(400)).unwrap();
        assert!(!m.threshold_reached(U256::from(671)));
        m.set_validator_present(2, U256::from(271)).unwrap();
        assert!(m.threshold_reached(U256::from(671)));
    }

    #[test]
    fn test_voting_power_beyond_64_bits() {
        let mut m = map(2);
        let big = U256::exp10(30);
        m.set_validator_present(0, big).unwrap();
        m.set_validator_present(1, big).unwrap();
        assert_eq!(m.current_voting_power(), big * 2);
        assert!(m.threshold_reached(big + 1));
    }

    #[test]
    fn test_overflowing_power_is_rejected() {
        let mut m = map(2);
        m.set_validator_present(0, U256::MAX).unwrap();

        assert_eq!(
            m.set_validator_present(1, U256::one()),
            Err(AggregationError::VotingPowerOverflow { index: 1 })
        );
        assert!(!m.is_present(1));
        assert_eq!(m.current_voting_power(), U256::MAX);
    }
}
