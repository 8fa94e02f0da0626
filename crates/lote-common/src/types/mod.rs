//! Common types used across Lote
//!
//! [`record`] holds the candidate rows moved between stores, [`frame`] the
//! header/record/footer envelope published on a date topic.

pub mod date;
pub mod frame;
pub mod record;

pub use date::ExtractionDate;
pub use frame::{BatchFooter, BatchHeader, BatchId, Envelope};
pub use record::{Record, Status};
