use relay_types::{keccak256_concat, NetworkConfig, UintExt, ValidatorSet, H256, U256};
use std::collections::BTreeSet;
use tracing::debug;

use crate::{Result, SchedulerError};

/// Domain separation tag for aggregator selection.
pub const AGGREGATOR_DOMAIN: &[u8] = b"AGGREGATOR";

/// Domain separation tag for committer selection.
pub const COMMITTER_DOMAIN: &[u8] = b"COMMITTER";

/// Role indices into `ValidatorSet::validators`, in assignment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerInfo {
    pub aggregator_indices: Vec<u32>,
    pub committer_indices: Vec<u32>,
}

/// `keccak256(domain || seed || round) mod validator_count`, with `round`
/// encoded as a 32-byte big-endian word.
pub fn role_start_index(seed: &H256, domain: &[u8], round: u64, validator_count: usize) -> usize {
    let hash = keccak256_concat(&[domain, seed.as_bytes(), &round.to_word()]);
    let value = U256::from_big_endian(hash.as_bytes());
    (value % U256::from(validator_count)).as_usize()
}

/// Linear probe from `start`, wrapping around, for the first index not in
/// `used`. Returns `None` only when every index is taken.
pub fn find_next_available_index(
    start: usize,
    validator_count: usize,
    used: &BTreeSet<usize>,
) -> Option<usize> {
    (0..validator_count)
        .map(|offset| (start + offset) % validator_count)
        .find(|index| !used.contains(index))
}

/// Picks `count` distinct indices for one role.
///
/// # Panics
///
/// Panics when `count > validator_count`; callers check the bound first.
pub fn select_indices(seed: &H256, domain: &[u8], count: u64, validator_count: usize) -> Vec<u32> {
    let mut used = BTreeSet::new();
    let mut selected = Vec::with_capacity(count as usize);

    for round in 1..=count {
        let start = role_start_index(seed, domain, round, validator_count);
        let index = match find_next_available_index(start, validator_count, &used) {
            Some(index) => index,
            None => panic!(
                "no free validator index left for {} round {round} ({validator_count} validators)",
                String::from_utf8_lossy(domain)
            ),
        };
        used.insert(index);
        selected.push(index as u32);
    }

    selected
}

/// Derives aggregator and committer indices from the header hash of `set`.
///
/// `set.validators` must already be sorted by operator address; an unsorted
/// set is rejected as is.
pub fn assign_roles(set: &ValidatorSet, config: &NetworkConfig) -> Result<SchedulerInfo> {
    set.ensure_sorted()?;

    let validator_count = set.validators.len();
    if validator_count == 0 {
        return Ok(SchedulerInfo::default());
    }

    for (role, requested) in [
        ("aggregator", config.num_aggregators),
        ("committer", config.num_committers),
    ] {
        if requested > validator_count as u64 {
            return Err(SchedulerError::TooManyRoles {
                role,
                requested,
                available: validator_count,
            });
        }
    }

    let seed = set.header().hash();
    let info = SchedulerInfo {
        aggregator_indices: select_indices(
            &seed,
            AGGREGATOR_DOMAIN,
            config.num_aggregators,
            validator_count,
        ),
        committer_indices: select_indices(
            &seed,
            COMMITTER_DOMAIN,
            config.num_committers,
            validator_count,
        ),
    };

    debug!(
        epoch = set.epoch,
        seed = ?seed,
        aggregators = ?info.aggregator_indices,
        committers = ?info.committer_indices,
        "Assigned scheduler roles"
    );

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use relay_types::{
        Address, KeyTag, TypesError, Validator, ValidatorKey, ValidatorSetStatus,
        VALIDATOR_SET_VERSION,
    };

    fn validator_set(count: u64, capture_timestamp: u64) -> ValidatorSet {
        ValidatorSet {
            version: VALIDATOR_SET_VERSION,
            required_key_tag: KeyTag(0x0f),
            epoch: 1,
            capture_timestamp,
            quorum_threshold: U256::from(1),
            validators: (1..=count)
                .map(|n| Validator {
                    operator: Address::from_low_u64(n),
                    voting_power: U256::from(100),
                    is_active: true,
                    keys: vec![ValidatorKey::new(KeyTag(0x0f), vec![n as u8; 8])],
                    vaults: vec![],
                })
                .collect(),
            status: ValidatorSetStatus::Derived,
            aggregator_indices: vec![],
            committer_indices: vec![],
        }
    }

    fn config(aggregators: u64, committers: u64) -> NetworkConfig {
        NetworkConfig {
            num_aggregators: aggregators,
            num_committers: committers,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_next_wraps_around() {
        let used: BTreeSet<usize> = [4].into_iter().collect();
        assert_eq!(find_next_available_index(4, 5, &used), Some(0));

        let used: BTreeSet<usize> = [1, 2].into_iter().collect();
        assert_eq!(find_next_available_index(1, 5, &used), Some(3));
        assert_eq!(find_next_available_index(0, 5, &used), Some(0));
    }

    #[test]
    fn test_find_next_exhausted() {
        let used: BTreeSet<usize> = (0..3).collect();
        assert_eq!(find_next_available_index(1, 3, &used), None);
    }

    #[test]
    fn test_assign_roles_is_deterministic() {
        let set = validator_set(10, 1000);
        let cfg = config(3, 4);
        let first = assign_roles(&set, &cfg).unwrap();
        for _ in 0..10 {
            assert_eq!(assign_roles(&set, &cfg).unwrap(), first);
        }
        assert_eq!(first.aggregator_indices.len(), 3);
        assert_eq!(first.committer_indices.len(), 4);

        let distinct: BTreeSet<u32> = first.committer_indices.iter().copied().collect();
        assert_eq!(distinct.len(), 4);
        assert!(first.committer_indices.iter().all(|i| *i < 10));
    }

    #[test]
    fn test_assign_roles_depends_on_header() {
        let cfg = config(5, 5);
        let baseline = assign_roles(&validator_set(64, 1000), &cfg).unwrap();
        let changed = (1..=8u64)
            .map(|delta| assign_roles(&validator_set(64, 1000 + delta), &cfg).unwrap())
            .filter(|info| *info != baseline)
            .count();
        assert!(changed > 0);
    }

    #[test]
    fn test_every_validator_selected_when_counts_match() {
        let set = validator_set(6, 1000);
        let info = assign_roles(&set, &config(6, 6)).unwrap();
        let mut aggregators = info.aggregator_indices.clone();
        aggregators.sort();
        assert_eq!(aggregators, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_set_has_no_roles() {
        let set = validator_set(0, 1000);
        let info = assign_roles(&set, &config(3, 3)).unwrap();
        assert!(info.aggregator_indices.is_empty());
        assert!(info.committer_indices.is_empty());
    }

    #[test]
    fn test_too_many_roles_is_rejected() {
        let set = validator_set(2, 1000);
        let err = assign_roles(&set, &config(1, 3)).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::TooManyRoles {
                role: "committer",
                requested: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_unsorted_set_is_rejected() {
        let mut set = validator_set(3, 1000);
        set.validators.swap(0, 2);
        let err = assign_roles(&set, &config(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidValidatorSet(TypesError::UnsortedValidators { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "no free validator index")]
    fn test_select_panics_when_exhausted() {
        select_indices(&H256::zero(), AGGREGATOR_DOMAIN, 4, 3);
    }

    proptest! {
        #[test]
        fn prop_find_next_returns_free_index(
            count in 1usize..64,
            start_seed in any::<usize>(),
            used in proptest::collection::btree_set(0usize..64, 0..63),
        ) {
            let start = start_seed % count;
            let used: BTreeSet<usize> = used.into_iter().filter(|i| *i < count).collect();
            match find_next_available_index(start, count, &used) {
                Some(index) => {
                    prop_assert!(index < count);
                    prop_assert!(!used.contains(&index));
                }
                None => prop_assert_eq!(used.len(), count),
            }
        }
    }
}
