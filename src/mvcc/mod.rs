//! MVCC engine: transactions, ReadViews, version chains, undo, and purge
//! (spec §4.5).

mod engine;
mod purge;
mod read_view;
mod trx;
mod undo;

pub use engine::{MvccEngine, VersionHead};
pub use purge::{PendingPurge, PurgeWorker};
pub use read_view::ReadView;
pub use trx::{IsolationLevel, Transaction, TrxStatus};
pub use undo::{RollPtr, UndoImage, UndoManager, UndoRecord};
