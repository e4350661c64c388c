use relay_types::ValidatorSet;

/// Committer index whose slot covers `now`, ignoring grace periods.
pub fn active_committer_at(set: &ValidatorSet, slot_duration: u64, now: u64) -> Option<u32> {
    let committers = &set.committer_indices;
    if committers.is_empty() || now < set.capture_timestamp {
        return None;
    }
    if slot_duration == 0 || committers.len() == 1 {
        return Some(committers[0]);
    }
    let slot = (now - set.capture_timestamp) / slot_duration;
    Some(committers[(slot % committers.len() as u64) as usize])
}

/// Whether the committer holding `key` may submit at `now`.
///
/// Committers rotate every `slot_duration` seconds starting at the capture
/// timestamp. Within `grace_seconds` of a slot boundary the upcoming
/// committer is already considered active.
pub fn is_active_committer(
    set: &ValidatorSet,
    slot_duration: u64,
    now: u64,
    grace_seconds: u64,
    key: &[u8],
) -> bool {
    let Some(index) = set.committer_position(key) else {
        return false;
    };
    if slot_duration == 0 {
        return true;
    }
    if now < set.capture_timestamp {
        return false;
    }

    let committers = &set.committer_indices;
    if committers.len() == 1 {
        return true;
    }

    let len = committers.len() as u64;
    let elapsed = now - set.capture_timestamp;
    let slot = elapsed / slot_duration;
    if committers[(slot % len) as usize] == index {
        return true;
    }

    let graced_slot = elapsed.saturating_add(grace_seconds) / slot_duration;
    graced_slot != slot && committers[((slot + 1) % len) as usize] == index
}
