//! Database models
//!
//! Row structs live in models.rs, the sink-facing union of all of them and
//! its identity and stream keys in record.rs.

mod models;
mod record;
mod table;

pub use models::*;
pub use record::{HistoryStream, IdentityKey, Provenance, Record};
pub use table::Table;
