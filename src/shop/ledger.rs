//! Debit and credit rules for the experience balance.
//!
//! The balance is an unsigned integer and never underflows: a debit that
//! cannot be covered fails with a typed shortfall before touching the record.
//! Everything here mutates in-memory state only; persisting the record is the
//! caller's responsibility inside its atomic unit.

use crate::shop::errors::EconomyError;
use crate::shop::types::PlayerRecord;

/// Check that `cost` is covered without mutating anything. Used to order the
/// funds gate ahead of item preconditions.
pub fn ensure_affordable(player: &PlayerRecord, cost: u64) -> Result<(), EconomyError> {
    if cost > player.experience {
        return Err(EconomyError::InsufficientFunds {
            needed: cost,
            have: player.experience,
        });
    }
    Ok(())
}

/// Debit `cost` from the balance and add it to the lifetime spend counter.
/// Fails with `InsufficientFunds` and no mutation when the balance is short.
/// Returns the new balance.
pub fn debit(player: &mut PlayerRecord, cost: u64) -> Result<u64, EconomyError> {
    ensure_affordable(player, cost)?;
    player.experience -= cost;
    player.spent_experience += cost;
    Ok(player.experience)
}

/// Credit `amount` to the balance. Always succeeds; saturates instead of
/// wrapping. Returns the new balance.
pub fn credit(player: &mut PlayerRecord, amount: u64) -> u64 {
    player.experience = player.experience.saturating_add(amount);
    player.experience
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_updates_balance_and_lifetime_spend() {
        let mut player = PlayerRecord::new(1, 1, "p");
        player.experience = 20;
        assert_eq!(debit(&mut player, 7).unwrap(), 13);
        assert_eq!(debit(&mut player, 13).unwrap(), 0);
        assert_eq!(player.spent_experience, 20);
    }

    #[test]
    fn test_shortfall_is_typed_and_leaves_record_untouched() {
        let mut player = PlayerRecord::new(1, 1, "p");
        player.experience = 5;
        match debit(&mut player, 7) {
            Err(EconomyError::InsufficientFunds { needed, have }) => {
                assert_eq!(needed, 7);
                assert_eq!(have, 5);
            }
            other => panic!("expected shortfall, got {:?}", other),
        }
        assert_eq!(player.experience, 5);
        assert_eq!(player.spent_experience, 0);
    }

    #[test]
    fn test_zero_debit_is_allowed() {
        let mut player = PlayerRecord::new(1, 1, "p");
        assert_eq!(debit(&mut player, 0).unwrap(), 0);
        assert_eq!(player.spent_experience, 0);
    }

    #[test]
    fn test_credit_saturates_at_the_top() {
        let mut player = PlayerRecord::new(1, 1, "p");
        player.experience = u64::MAX - 1;
        assert_eq!(credit(&mut player, 10), u64::MAX);
    }
}
