//! Domain layer: payment entities with no framework dependencies.

pub mod transaction;

pub use transaction::{
    NewTransaction, PaymentMethod, StatusChange, Transaction, TransactionStatus, Transition,
    TransitionError,
};
