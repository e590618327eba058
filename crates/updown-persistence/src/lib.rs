//! Paper-trade audit log.
//!
//! Records are appended as JSON Lines so an interrupted write only loses
//! the line in flight. On startup the log is scanned for positions that
//! were opened but never settled.

pub mod error;
pub mod record;
pub mod recovery;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use record::{OpportunityRecord, PaperRecord, PriceMoveRecord};
pub use recovery::{find_orphans, read_records};
pub use writer::PaperLogWriter;
