pub mod domain;
pub mod ledger;

pub use ledger::CustomerLedger;
