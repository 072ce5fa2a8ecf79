//! The ledger aggregate and its guarded transitions.
//!
//! [`LedgerState`] owns the single rental record, the asset configuration,
//! and the held funds. Each transition checks every guard before touching
//! state; callers that need all-or-nothing semantics across a failed
//! transfer apply the transition to a staged copy (see `InMemoryLedger`).

use std::collections::BTreeMap;

use geolease_types::{within_zone, AccountId, Amount, Position, Timestamp};

use crate::accounting::used_seconds;
use crate::config::AssetConfig;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::records::{Rental, Settlement};
use crate::settlement::settle;

/// Who is calling, what value they attached, and the ledger time of the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub sender: AccountId,
    pub value: Amount,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(sender: AccountId, now: Timestamp) -> Self {
        Self {
            sender,
            value: Amount::ZERO,
            now,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// Funds held by the ledger plus the amounts paid out to accounts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Treasury {
    held: Amount,
    credited: BTreeMap<AccountId, Amount>,
}

impl Treasury {
    pub fn held(&self) -> Amount {
        self.held
    }

    /// Total paid out to `account` so far.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.credited.get(account).copied().unwrap_or_default()
    }

    fn receive(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.held = self
            .held
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("held balance"))?;
        Ok(())
    }

    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let remaining = self
            .held
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                needed: amount.to_string(),
                held: self.held.to_string(),
            })?;
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow("account balance"))?;

        self.held = remaining;
        self.credited.insert(to.clone(), credited);
        Ok(())
    }
}

/// The ledger aggregate: asset config, the one rental record, and funds.
#[derive(Clone, Debug)]
pub struct LedgerState {
    asset: AssetConfig,
    rental: Option<Rental>,
    treasury: Treasury,
}

impl LedgerState {
    pub fn new(asset: AssetConfig) -> Self {
        Self {
            asset,
            rental: None,
            treasury: Treasury::default(),
        }
    }

    pub fn asset(&self) -> &AssetConfig {
        &self.asset
    }

    /// The latest rental record, active or not.
    pub fn rental(&self) -> Option<&Rental> {
        self.rental.as_ref()
    }

    pub fn active_rental(&self) -> Option<&Rental> {
        self.rental.as_ref().filter(|r| r.is_active)
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    /// Start a rental of `duration_secs` at `position`; the attached value
    /// becomes the deposit.
    pub fn rent(
        &mut self,
        call: &CallContext,
        duration_secs: u64,
        position: Position,
    ) -> Result<(Rental, LedgerEvent), LedgerError> {
        if self.active_rental().is_some() {
            return Err(LedgerError::AlreadyRented);
        }
        if duration_secs == 0 {
            return Err(LedgerError::InvalidDuration);
        }
        if call.value < self.asset.min_deposit {
            return Err(LedgerError::DepositTooLow);
        }
        if !within_zone(&position, &self.asset.zone) {
            return Err(LedgerError::NotWithinAllowedZone);
        }
        let end_time = call
            .now
            .checked_add_secs(duration_secs)
            .ok_or(LedgerError::InvalidDuration)?;

        self.treasury.receive(call.value)?;

        let rental = Rental {
            renter: call.sender.clone(),
            start_time: call.now,
            end_time,
            deposit: call.value,
            paused_duration: 0,
            last_paused_at: None,
            is_active: true,
            is_paused: false,
        };
        self.rental = Some(rental.clone());

        let event = LedgerEvent::RentalStarted {
            renter: call.sender.clone(),
            duration_secs,
            deposit: call.value,
        };
        Ok((rental, event))
    }

    pub fn pause_rental(&mut self, call: &CallContext) -> Result<(Rental, LedgerEvent), LedgerError> {
        let rental = self.renter_rental_mut(&call.sender)?;
        if rental.is_paused {
            return Err(LedgerError::AlreadyPaused);
        }

        rental.is_paused = true;
        rental.last_paused_at = Some(call.now);

        let event = LedgerEvent::RentalPaused {
            renter: rental.renter.clone(),
            at: call.now,
        };
        Ok((rental.clone(), event))
    }

    pub fn resume_rental(&mut self, call: &CallContext) -> Result<(Rental, LedgerEvent), LedgerError> {
        let rental = self.renter_rental_mut(&call.sender)?;
        let paused_at = match (rental.is_paused, rental.last_paused_at) {
            (true, Some(at)) => at,
            _ => return Err(LedgerError::NotPaused),
        };

        let interval = call.now.saturating_secs_since(paused_at);
        rental.paused_duration = rental
            .paused_duration
            .checked_add(interval)
            .ok_or(LedgerError::ArithmeticOverflow("paused duration"))?;
        rental.is_paused = false;

        let event = LedgerEvent::RentalResumed {
            renter: rental.renter.clone(),
            at: call.now,
        };
        Ok((rental.clone(), event))
    }

    /// Terminate the rental and settle the deposit.
    ///
    /// The rental is deactivated before any funds move. A failing transfer
    /// returns an error with this aggregate partially updated, so callers
    /// must discard it (the in-memory ledger works on a staged copy).
    pub fn return_equipment(
        &mut self,
        call: &CallContext,
    ) -> Result<(Settlement, LedgerEvent), LedgerError> {
        let now = call.now;
        let price = self.asset.price_per_second;
        let lessor = self.asset.lessor.clone();

        let rental = self.renter_rental_mut(&call.sender)?;
        let used = used_seconds(rental, now);
        let settlement = settle(rental.renter.clone(), used, price, rental.deposit);

        rental.is_active = false;
        rental.is_paused = false;

        self.treasury.transfer(&lessor, settlement.amount_due)?;
        self.treasury.transfer(&settlement.renter, settlement.refund)?;

        let event = LedgerEvent::RentalEnded {
            renter: settlement.renter.clone(),
            used_seconds: settlement.used_seconds,
            amount_paid: settlement.amount_due,
            refund: settlement.refund,
        };
        Ok((settlement, event))
    }

    /// Sweep the whole held balance to the owner. Only allowed with no
    /// active rental, so a live deposit can never be taken.
    pub fn emergency_withdraw(
        &mut self,
        call: &CallContext,
    ) -> Result<(Amount, LedgerEvent), LedgerError> {
        if call.sender != self.asset.owner {
            return Err(LedgerError::NotOwner);
        }
        if self.active_rental().is_some() {
            return Err(LedgerError::ActiveRentalExists);
        }

        let amount = self.treasury.held();
        let owner = self.asset.owner.clone();
        self.treasury.transfer(&owner, amount)?;

        let event = LedgerEvent::EmergencyWithdraw { to: owner, amount };
        Ok((amount, event))
    }

    fn renter_rental_mut(&mut self, sender: &AccountId) -> Result<&mut Rental, LedgerError> {
        let rental = self
            .rental
            .as_mut()
            .filter(|r| r.is_active)
            .ok_or(LedgerError::NoActiveRental)?;
        if &rental.renter != sender {
            return Err(LedgerError::NotRenter);
        }
        Ok(rental)
    }
}
