//! Settlement engine: split a deposit into amount due and refund.

use geolease_types::{AccountId, Amount};

use crate::records::Settlement;

/// Compute the settlement for `used_seconds` of use.
///
/// The renter never owes more than the deposit: when `used × price` exceeds
/// it, the amount due is the whole deposit and the refund is zero. This also
/// covers multiplication overflow. `amount_due + refund == deposit` always.
pub fn settle(
    renter: AccountId,
    used_seconds: u64,
    price_per_second: Amount,
    deposit: Amount,
) -> Settlement {
    let amount_due = match price_per_second.checked_mul(used_seconds) {
        Some(due) if due <= deposit => due,
        _ => deposit,
    };
    let refund = deposit.saturating_sub(amount_due);

    Settlement {
        renter,
        used_seconds,
        amount_due,
        refund,
        deposit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn renter() -> AccountId {
        AccountId::from_label("renter")
    }

    fn amount(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    #[test]
    fn refunds_unused_deposit() {
        let s = settle(renter(), 3_600, amount("0.00001"), amount("0.05"));
        assert_eq!(s.amount_due, amount("0.036"));
        assert_eq!(s.refund, amount("0.014"));
    }

    #[test]
    fn clamps_to_deposit() {
        let s = settle(renter(), 3_600, amount("0.00001"), amount("0.01"));
        assert_eq!(s.amount_due, amount("0.01"));
        assert_eq!(s.refund, Amount::ZERO);
    }

    #[test]
    fn exact_deposit_leaves_no_refund() {
        let s = settle(renter(), 1_000, amount("0.00001"), amount("0.01"));
        assert_eq!(s.amount_due, amount("0.01"));
        assert_eq!(s.refund, Amount::ZERO);
    }

    #[test]
    fn overflowing_charge_clamps() {
        let s = settle(renter(), u64::MAX, Amount::from_base(u128::MAX), amount("1"));
        assert_eq!(s.amount_due, amount("1"));
        assert_eq!(s.refund, Amount::ZERO);
    }

    proptest! {
        #[test]
        fn due_plus_refund_equals_deposit(
            used in any::<u64>(),
            price in any::<u64>(),
            deposit in any::<u64>(),
        ) {
            let deposit = Amount::from_base(u128::from(deposit) * 1_000);
            let s = settle(renter(), used, Amount::from_base(u128::from(price)), deposit);
            prop_assert_eq!(s.amount_due.checked_add(s.refund), Some(deposit));
            prop_assert!(s.amount_due <= deposit);
        }
    }
}
