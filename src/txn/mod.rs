//! Transaction coordinator: trx-id allocation, active-set bookkeeping,
//! begin/commit/rollback (spec §4.5, §9).

mod coordinator;

pub use coordinator::TrxCoordinator;
