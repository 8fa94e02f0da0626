//! Lote Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the Lote workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`LoteError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` setup ([`logging`])
//! - **Types**: candidate records and the header/record/footer framing
//!   exchanged over the message channel ([`types`])
//!
//! # Example
//!
//! ```no_run
//! use lote_common::types::{BatchHeader, Envelope, ExtractionDate};
//!
//! fn frame_header() -> lote_common::Result<Vec<u8>> {
//!     let date: ExtractionDate = "2025-01-02".parse()?;
//!     let header = BatchHeader::new("concurso02012025_101500_ab12cd34", 3, date);
//!     Envelope::Header(header).encode()
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LoteError, Result};
