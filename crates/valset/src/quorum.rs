use relay_types::uint::quorum_precision;
use relay_types::{NetworkConfig, U256, U512};

use crate::{Result, ValsetError};

/// `floor(total * percent / 10^18) + 1`.
///
/// The product is computed in 512 bits so it cannot overflow; a result that
/// does not fit back into 256 bits saturates.
pub fn calc_quorum_threshold(total_voting_power: U256, quorum_percent: U256) -> U256 {
    let scaled = total_voting_power.full_mul(quorum_percent) / U512::from(quorum_precision());
    U256::try_from(scaled)
        .unwrap_or(U256::MAX)
        .saturating_add(U256::one())
}

/// Threshold for the config's required header key tag.
pub fn quorum_threshold_for(config: &NetworkConfig, total_voting_power: U256) -> Result<U256> {
    let key_tag = config.required_header_key_tag;
    let percent = config
        .quorum_percent_for(key_tag)
        .filter(|p| !p.is_zero())
        .ok_or(ValsetError::ZeroQuorumThreshold { key_tag })?;
    Ok(calc_quorum_threshold(total_voting_power, percent))
}
