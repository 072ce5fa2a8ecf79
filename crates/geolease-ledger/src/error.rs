/// Errors produced by ledger operations.
///
/// Guard rejections leave the ledger untouched and display the exact reason
/// string a caller surfaces to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("already rented")]
    AlreadyRented,

    #[error("invalid duration")]
    InvalidDuration,

    #[error("deposit too low")]
    DepositTooLow,

    #[error("not within allowed zone")]
    NotWithinAllowedZone,

    #[error("no active rental")]
    NoActiveRental,

    #[error("already paused")]
    AlreadyPaused,

    #[error("not paused")]
    NotPaused,

    #[error("not renter")]
    NotRenter,

    #[error("not owner")]
    NotOwner,

    #[error("active rental exists")]
    ActiveRentalExists,

    #[error("insufficient ledger funds: need {needed}, held {held}")]
    InsufficientFunds { needed: String, held: String },

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}
