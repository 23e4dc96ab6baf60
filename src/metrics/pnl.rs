//! Realized P&L for options-style positions.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{EntryAction, ExitAction, TradeEntry};

/// Per-contract premium is quoted per share; one contract covers 100 shares.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Largest accepted `price * size * 100` for a single leg.
///
/// Keeping both legs under this bound means P&L and journal totals can
/// never overflow `Decimal`.
pub const MAX_NOTIONAL: Decimal = dec!(1000000000000000000);

/// Calculator for realized profit and loss.
pub struct PnlCalculator;

impl PnlCalculator {
    /// Realized P&L for a closed position, rounded to cents.
    ///
    /// - BTO: `(exit - entry) * size * 100`
    /// - STO: `(entry - exit) * size * 100`
    ///
    /// Both legs must be within [`MAX_NOTIONAL`]; the lifecycle and the
    /// storage decoder reject anything larger.
    pub fn realized_pnl(
        action: EntryAction,
        entry_price: Decimal,
        exit_price: Decimal,
        size: u32,
    ) -> Decimal {
        let per_contract = match action {
            EntryAction::Bto => exit_price - entry_price,
            EntryAction::Sto => entry_price - exit_price,
        };
        (per_contract * Decimal::from(size) * CONTRACT_MULTIPLIER).round_dp(2)
    }

    /// Dollar value of one leg, or `None` if it exceeds [`MAX_NOTIONAL`].
    pub fn notional(price: Decimal, size: u32) -> Option<Decimal> {
        price
            .checked_mul(Decimal::from(size))?
            .checked_mul(CONTRACT_MULTIPLIER)
            .filter(|n| n.abs() <= MAX_NOTIONAL)
    }

    /// P&L for an entry, or `None` while it is still open.
    pub fn for_entry(entry: &TradeEntry) -> Option<Decimal> {
        let exit_price = entry.exit_price()?;
        Some(Self::realized_pnl(
            entry.entry_action,
            entry.entry_price,
            exit_price,
            entry.size,
        ))
    }

    /// Label for the closing leg. Not enforced anywhere.
    pub fn expected_exit_action(action: EntryAction) -> ExitAction {
        action.expected_exit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bto_profit() {
        let pnl = PnlCalculator::realized_pnl(EntryAction::Bto, dec!(100.0), dec!(110.0), 10);
        assert_eq!(pnl, dec!(10000.00));
    }

    #[test]
    fn test_sto_profit() {
        let pnl = PnlCalculator::realized_pnl(EntryAction::Sto, dec!(100.0), dec!(90.0), 5);
        assert_eq!(pnl, dec!(5000.00));
    }

    #[test]
    fn test_losses_are_negative() {
        // Debit paid, option expired worthless
        let pnl = PnlCalculator::realized_pnl(EntryAction::Bto, dec!(1.35), dec!(0), 3);
        assert_eq!(pnl, dec!(-405.00));

        // Credit received, bought back higher
        let pnl = PnlCalculator::realized_pnl(EntryAction::Sto, dec!(0.80), dec!(1.10), 2);
        assert_eq!(pnl, dec!(-60.00));
    }

    #[test]
    fn test_rounds_to_cents() {
        let pnl = PnlCalculator::realized_pnl(EntryAction::Bto, dec!(0.12345), dec!(0.12350), 1);
        assert_eq!(pnl, dec!(0.00));
        let pnl = PnlCalculator::realized_pnl(EntryAction::Bto, dec!(0.1), dec!(0.10017), 1);
        assert_eq!(pnl, dec!(0.02));
    }

    #[test]
    fn test_notional_bound() {
        assert_eq!(PnlCalculator::notional(dec!(2.50), 10), Some(dec!(2500.00)));
        assert_eq!(
            PnlCalculator::notional(dec!(10000000000000000), 1),
            Some(MAX_NOTIONAL)
        );
        assert_eq!(PnlCalculator::notional(dec!(10000000000000000.01), 1), None);
        // Would overflow Decimal outright
        assert_eq!(
            PnlCalculator::notional(dec!(1000000000000000000000000000), u32::MAX),
            None
        );
    }

    #[test]
    fn test_extreme_legs_within_bound_do_not_overflow() {
        let top = dec!(10000000000000000);
        let pnl = PnlCalculator::realized_pnl(EntryAction::Sto, top, dec!(0), 1);
        assert_eq!(pnl, MAX_NOTIONAL);
        let pnl = PnlCalculator::realized_pnl(EntryAction::Bto, top, dec!(0), 1);
        assert_eq!(pnl, -MAX_NOTIONAL);
    }

    #[test]
    fn test_expected_exit_action() {
        assert_eq!(PnlCalculator::expected_exit_action(EntryAction::Bto), ExitAction::Stc);
        assert_eq!(PnlCalculator::expected_exit_action(EntryAction::Sto), ExitAction::Btc);
    }
}
