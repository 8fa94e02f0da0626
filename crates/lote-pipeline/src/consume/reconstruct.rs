//! Frame reconstruction
//!
//! ```text
//! AwaitingHeader --header--> Collecting --matching footer--> Terminated
//!                                       --second header---> Terminated (header left unread)
//! ```
//!
//! Records seen before any header are kept apart as orphans. The validity
//! flag only tracks in-frame records and never resets once tripped.

use lote_common::types::{BatchFooter, BatchHeader, Envelope, Record};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingHeader,
    Collecting,
    Terminated,
}

/// What the consumer should do after feeding one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Message consumed, keep reading
    Continue,
    /// Message consumed and it closed the frame
    Terminated,
    /// Frame closed by this message, which belongs to the next frame and
    /// must not be committed
    Deferred,
}

/// A reconstructed batch, ready for validation
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub header: Option<BatchHeader>,
    pub footer: Option<BatchFooter>,
    /// Records observed between header and footer, in arrival order
    pub records: Vec<Record>,
    /// Records observed before any header
    pub orphans: Vec<Record>,
    /// False once any in-frame record had an invalid status
    pub all_valid: bool,
    /// Payloads that were not a recognizable envelope
    pub unrecognized: u64,
}

impl Frame {
    /// Every record observed, orphans first.
    pub fn all_records(&self) -> Vec<Record> {
        self.orphans.iter().chain(self.records.iter()).cloned().collect()
    }

    pub fn records_seen(&self) -> u64 {
        (self.orphans.len() + self.records.len()) as u64
    }

    /// The records to insert: the in-frame records, but only when none was
    /// invalid. Materialized here, after termination, never while reading.
    pub fn into_accepted(self) -> Vec<Record> {
        if self.all_valid {
            self.records
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug)]
pub struct Reconstructor {
    state: State,
    frame: Frame,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingHeader,
            frame: Frame {
                all_valid: true,
                ..Frame::default()
            },
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Decode and feed a raw payload. Undecodable payloads are counted and skipped.
    pub fn push_payload(&mut self, payload: &[u8]) -> Step {
        match Envelope::decode(payload) {
            Ok(envelope) => self.push(envelope),
            Err(e) => {
                self.frame.unrecognized += 1;
                warn!(error = %e, size = payload.len(), "Skipping unrecognized message");
                Step::Continue
            },
        }
    }

    pub fn push(&mut self, envelope: Envelope) -> Step {
        match (self.state, envelope) {
            (State::Terminated, envelope) => {
                debug!(kind = envelope.kind(), "Frame already terminated, message left for the next run");
                Step::Deferred
            },

            (State::AwaitingHeader, Envelope::Header(header)) => {
                debug!(lote = %header.lote, total_esperado = header.total_esperado, "Header received");
                self.frame.header = Some(header);
                self.state = State::Collecting;
                Step::Continue
            },
            (State::AwaitingHeader, Envelope::Record(record)) => {
                self.frame.orphans.push(record);
                Step::Continue
            },
            (State::AwaitingHeader, Envelope::Footer(footer)) => {
                warn!(lote = %footer.lote, "Footer without a header, ignored");
                Step::Continue
            },

            (State::Collecting, Envelope::Record(record)) => {
                if self.frame.all_valid && !record.is_valid() {
                    debug!(id = record.id, status = ?record.status, "First invalid record, batch will be rejected");
                    self.frame.all_valid = false;
                }
                self.frame.records.push(record);
                Step::Continue
            },
            (State::Collecting, Envelope::Footer(footer)) => {
                let matches = self
                    .frame
                    .header
                    .as_ref()
                    .is_some_and(|h| h.lote == footer.lote);
                if matches {
                    debug!(lote = %footer.lote, total_processado = footer.total_processado, "Footer received");
                    self.frame.footer = Some(footer);
                    self.state = State::Terminated;
                    Step::Terminated
                } else {
                    warn!(lote = %footer.lote, "Footer for another batch, ignored");
                    Step::Continue
                }
            },
            (State::Collecting, Envelope::Header(header)) => {
                warn!(next = %header.lote, "New header before footer, closing current batch");
                self.state = State::Terminated;
                Step::Deferred
            },
        }
    }

    pub fn finish(self) -> Frame {
        self.frame
    }
}
