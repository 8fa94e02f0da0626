//! Producer side of the batch protocol
//!
//! Publishes one framed batch per invocation: a header announcing the
//! counted total, every source row for the date, then a footer carrying the
//! number of rows actually sent. Rows are paged out of the store so at most
//! one page is held in memory.

use chrono::Local;
use lote_common::types::{BatchFooter, BatchHeader, BatchId, Envelope, ExtractionDate};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::audit::{format_elapsed, paths, Auditor, ErrorCategory, ExtractionLog, LoadLog};
use crate::cancel::Interrupt;
use crate::channel::{date_topic, ChannelError, ChannelResult, MessageChannel, Publisher};
use crate::config::BatchConfig;
use crate::consume::{MSG_LOAD_ERRORS, MSG_STORE_DOWN};
use crate::error::{PipelineError, Result};
use crate::store::RecordStore;

pub const MSG_PRODUCER_INIT: &str = "Erro ao inicializar produtor Kafka";
pub const MSG_SEND_HEADER: &str = "Erro ao enviar header para Kafka";
pub const MSG_SEND_RECORD: &str = "Erro ao enviar registro para Kafka";
pub const MSG_SEND_FOOTER: &str = "Erro ao enviar footer para Kafka";

#[derive(Debug, Clone)]
pub struct ExtractReport {
    pub date: ExtractionDate,
    pub lote: BatchId,
    /// Rows counted before publishing, announced in the header
    pub expected: u64,
    /// Rows read back from the store
    pub extracted: u64,
    /// Rows published, announced in the footer
    pub sent: u64,
    pub failed: u64,
}

pub struct Extractor<'a> {
    pub store: &'a dyn RecordStore,
    pub channel: &'a dyn MessageChannel,
    pub auditor: &'a Auditor,
    pub config: &'a BatchConfig,
}

impl Extractor<'_> {
    #[instrument(skip_all, fields(date = %date, lote = tracing::field::Empty))]
    pub async fn run(&self, date: ExtractionDate, interrupt: &Interrupt) -> Result<ExtractReport> {
        let started = Instant::now();
        let topic = date_topic(&self.config.topic_prefix, date);

        let expected = match interrupt.guard(self.store.count_by_date(date)).await? {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Counting source rows failed");
                self.auditor
                    .record_error(
                        date,
                        ErrorCategory::Banco,
                        MSG_STORE_DOWN,
                        &e,
                        json!({"operacao": "contar_registros", "data": date}),
                    )
                    .await;
                return Err(e.into());
            },
        };

        if expected == 0 {
            warn!("No source rows for this date");
            return Err(PipelineError::NotFound { date });
        }

        let mut publisher = match interrupt.guard(self.channel.publisher(&topic)).await? {
            Ok(publisher) => publisher,
            Err(e) => {
                error!(error = %e, topic = %topic, "Producer unavailable");
                self.auditor
                    .record_error(
                        date,
                        ErrorCategory::Kafka,
                        MSG_PRODUCER_INIT,
                        &e,
                        json!({"operacao": "inicializar_produtor", "data": date, "topico": topic}),
                    )
                    .await;
                return Err(e.into());
            },
        };

        let lote = BatchId::mint();
        Span::current().record("lote", tracing::field::display(&lote));
        info!(topic = %topic, expected, "Starting extraction");

        let header = BatchHeader::new(lote.clone(), expected, date);
        let envelope = Envelope::Header(header.clone());
        if let Err(e) = send(publisher.as_mut(), &topic, &envelope, interrupt).await? {
            error!(error = %e, "Header not published, aborting");
            self.auditor
                .record_error(
                    date,
                    ErrorCategory::Kafka,
                    MSG_SEND_HEADER,
                    &e,
                    json!({"operacao": "enviar_header", "data": date, "header": header}),
                )
                .await;
            return Err(e.into());
        }

        let load_started = Instant::now();
        let (extracted, sent, failed) = self
            .publish_records(publisher.as_mut(), &topic, date, interrupt)
            .await?;

        let footer = BatchFooter::new(lote.clone(), sent, date);
        let envelope = Envelope::Footer(footer.clone());
        if let Err(e) = send(publisher.as_mut(), &topic, &envelope, interrupt).await? {
            error!(error = %e, "Footer not published, aborting");
            self.auditor
                .record_error(
                    date,
                    ErrorCategory::Kafka,
                    MSG_SEND_FOOTER,
                    &e,
                    json!({"operacao": "enviar_footer", "data": date, "footer": footer}),
                )
                .await;
            return Err(e.into());
        }
        let tempo_envio = format_elapsed(load_started.elapsed());

        self.auditor
            .persist_json(
                &paths::extraction(date, &lote),
                &ExtractionLog {
                    data: date,
                    lote: lote.clone(),
                    total_extraido: extracted,
                    tempo_execucao: format_elapsed(started.elapsed()),
                    timestamp: Local::now(),
                },
            )
            .await;
        self.auditor
            .persist_json(
                &paths::load(date, &lote),
                &LoadLog {
                    header,
                    footer,
                    tempo_envio,
                    timestamp: Local::now(),
                },
            )
            .await;

        if sent != expected {
            let err = PipelineError::LoadMismatch {
                lote: lote.clone(),
                expected,
                sent,
            };
            error!(expected, sent, failed, "Load mismatch");
            self.auditor
                .record_error(
                    date,
                    ErrorCategory::Kafka,
                    MSG_LOAD_ERRORS,
                    &err,
                    json!({
                        "operacao": "validacao_carga",
                        "data": date,
                        "lote": lote,
                        "total_esperado": expected,
                        "total_enviado": sent,
                    }),
                )
                .await;
            return Err(err);
        }

        info!(sent, elapsed = %format_elapsed(started.elapsed()), "Extraction complete");
        Ok(ExtractReport {
            date,
            lote,
            expected,
            extracted,
            sent,
            failed,
        })
    }

    /// Page through the date's rows and publish each one. Returns
    /// `(extracted, sent, failed)`.
    async fn publish_records(
        &self,
        publisher: &mut dyn Publisher,
        topic: &str,
        date: ExtractionDate,
        interrupt: &Interrupt,
    ) -> Result<(u64, u64, u64)> {
        let page_size = self.config.extract_page_size.max(1);
        let progress_every = self.config.publish_batch_size.max(1);
        let mut offset = 0u64;
        let (mut sent, mut failed) = (0u64, 0u64);

        loop {
            let page = match interrupt
                .guard(self.store.query_by_date(date, offset, page_size))
                .await?
            {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, offset, "Reading source page failed");
                    self.auditor
                        .record_error(
                            date,
                            ErrorCategory::Banco,
                            MSG_STORE_DOWN,
                            &e,
                            json!({"operacao": "consultar_registros", "data": date, "offset": offset}),
                        )
                        .await;
                    return Err(e.into());
                },
            };

            let fetched = page.len() as u64;
            debug!(offset, fetched, "Source page read");

            for record in page {
                let envelope = Envelope::Record(record);
                match send(publisher, topic, &envelope, interrupt).await? {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(error = %e, "Record not published, continuing");
                        let registro = match &envelope {
                            Envelope::Record(record) => json!(record),
                            _ => serde_json::Value::Null,
                        };
                        self.auditor
                            .record_error(
                                date,
                                ErrorCategory::Kafka,
                                MSG_SEND_RECORD,
                                &e,
                                json!({"operacao": "enviar_registro", "data": date, "registro": registro}),
                            )
                            .await;
                    },
                }

                if (sent + failed) % progress_every == 0 {
                    info!(sent, failed, "Publish progress");
                }
            }

            offset += fetched;
            if fetched < page_size {
                break;
            }
        }

        Ok((offset, sent, failed))
    }
}

/// Encode and publish one envelope. The outer result only carries
/// cancellation; the inner one is the channel's answer.
async fn send(
    publisher: &mut dyn Publisher,
    topic: &str,
    envelope: &Envelope,
    interrupt: &Interrupt,
) -> Result<ChannelResult<()>> {
    let bytes = match envelope.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            return Ok(Err(ChannelError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }))
        },
    };
    interrupt.guard(publisher.publish(&bytes)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::channel::MemoryChannel;
    use crate::store::MemoryStore;
    use lote_common::types::{Record, Status};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_zero_sizes_fall_back_to_one() {
        let date: ExtractionDate = "2025-01-02".parse().unwrap();
        let store = MemoryStore::with_records(
            (1..=3).map(|i| Record::new(i, format!("Candidato_{i}_2025-01-02"), Some(Status::Approved), date.as_naive())),
        );
        let channel = MemoryChannel::new();
        let auditor = Auditor::new(Arc::new(MemoryAuditSink::new()));
        let config = BatchConfig {
            extract_page_size: 0,
            publish_batch_size: 0,
            ..BatchConfig::default()
        };

        let report = Extractor {
            store: &store,
            channel: &channel,
            auditor: &auditor,
            config: &config,
        }
        .run(date, &Interrupt::never())
        .await
        .unwrap();

        assert_eq!(report.sent, 3);
        assert_eq!(channel.messages("concurso_2025-01-02").len(), 5);
    }
}
