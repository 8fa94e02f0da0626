//! Quarantine of rejected batches
//!
//! A rejected batch leaves three traces: the `lote_erro_<lote>.json`
//! artifact, one poison message per record on the error topic, and the
//! `ids_linha_kafka_<lote>.txt` list of minted ids. Each step runs whatever
//! happened to the previous ones.

use chrono::Local;
use lote_common::types::{BatchId, ExtractionDate, Record};
use tracing::{info, instrument, warn};

use crate::audit::models::poison_id_list;
use crate::audit::{paths, Auditor, PoisonMessage, QuarantineArtifact};
use crate::cancel::Interrupt;
use crate::channel::{ChannelError, MessageChannel, Publisher};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuarantineReport {
    pub artifact_written: bool,
    pub published: u64,
    pub failed: u64,
    /// `<lote>_<index>` for every record, in encounter order
    pub ids: Vec<String>,
    pub ids_written: bool,
}

pub struct Quarantine<'a> {
    pub channel: &'a dyn MessageChannel,
    pub auditor: &'a Auditor,
    pub error_topic: &'a str,
}

impl Quarantine<'_> {
    #[instrument(skip_all, fields(date = %date, lote = %lote, records = records.len()))]
    pub async fn run(
        &self,
        date: ExtractionDate,
        lote: &BatchId,
        motivo: &str,
        records: Vec<Record>,
        interrupt: &Interrupt,
    ) -> QuarantineReport {
        let mut report = QuarantineReport {
            ids: (0..records.len()).map(|i| lote.line_id(i)).collect(),
            ..QuarantineReport::default()
        };

        let artifact = QuarantineArtifact::new(date, lote.clone(), motivo, records);
        report.artifact_written = self
            .auditor
            .persist_json(&paths::quarantine(date, lote), &artifact)
            .await;

        match interrupt.guard(self.channel.publisher(self.error_topic)).await {
            Ok(Ok(mut publisher)) => {
                let (published, failed) = self
                    .publish_all(publisher.as_mut(), &artifact.registros_com_erro, &report.ids, motivo, interrupt)
                    .await;
                report.published = published;
                report.failed = failed;
            },
            Ok(Err(e)) => {
                warn!(error = %e, topic = self.error_topic, "Error topic unavailable, no poison messages sent");
                report.failed = report.ids.len() as u64;
            },
            Err(e) => {
                warn!(error = %e, "Quarantine interrupted before publishing");
                report.failed = report.ids.len() as u64;
            },
        }

        let listing = poison_id_list(date, lote, motivo, &report.ids, Local::now());
        report.ids_written = self
            .auditor
            .persist_text(&paths::poison_ids(date, lote), listing)
            .await;

        info!(
            published = report.published,
            failed = report.failed,
            artifact_written = report.artifact_written,
            ids_written = report.ids_written,
            "Batch quarantined"
        );
        report
    }

    async fn publish_all(
        &self,
        publisher: &mut dyn Publisher,
        records: &[Record],
        ids: &[String],
        motivo: &str,
        interrupt: &Interrupt,
    ) -> (u64, u64) {
        let (mut published, mut failed) = (0u64, 0u64);
        for (record, id) in records.iter().zip(ids) {
            if interrupt.is_interrupted() {
                let left = (ids.len() as u64).saturating_sub(published + failed);
                warn!(left, "Quarantine interrupted, remaining poison messages not sent");
                return (published, failed + left);
            }

            let message = PoisonMessage {
                id_linha_kafka: id.clone(),
                payload: record.clone(),
                motivo: motivo.to_string(),
                timestamp: Local::now(),
            };

            let sent = match serde_json::to_vec(&message) {
                Ok(bytes) => publisher.publish(&bytes).await,
                Err(e) => Err(ChannelError::Publish {
                    topic: self.error_topic.to_string(),
                    reason: e.to_string(),
                }),
            };

            match sent {
                Ok(()) => published += 1,
                Err(e) => {
                    warn!(id_linha_kafka = %id, error = %e, "Poison message not sent");
                    failed += 1;
                },
            }
        }
        (published, failed)
    }
}
