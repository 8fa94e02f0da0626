//! Consumer side of the batch protocol
//!
//! One invocation drains the date topic until a frame terminates, validates
//! it, then either inserts the batch or quarantines it. The group offset is
//! committed once the outcome has been handled, so a crash in between
//! replays the whole frame.

use chrono::Local;
use lote_common::types::{BatchId, ExtractionDate, Record};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::audit::{format_elapsed, paths, Auditor, ConsumptionLog, ConsumptionStatus, ErrorCategory};
use crate::cancel::Interrupt;
use crate::channel::{date_topic, MessageChannel, Subscription};
use crate::config::{BatchConfig, PROGRESS_EVERY};
use crate::error::{PipelineError, Result};
use crate::quarantine::{Quarantine, QuarantineReport};
use crate::sink;
use crate::store::RecordStore;
use crate::validate::{validate, Verdict};

mod reconstruct;

pub use reconstruct::{Frame, Reconstructor, State, Step};

pub const MSG_STORE_DOWN: &str = "O banco de dados está fora do ar! Sua Integração foi abortada";
pub const MSG_LOAD_ERRORS: &str = "Ocorreram erros na carga";
pub const MSG_CONSUMER_INIT: &str = "Erro ao inicializar consumidor Kafka";
pub const MSG_CONSUMER_READ: &str = "Erro ao ler mensagem do Kafka";
pub const MOTIVO_ORPHANS: &str = "Registro recebido antes do header";

/// Appended to the batch id of the quarantine holding an accepted batch's orphans.
pub const ORPHAN_SUFFIX: &str = "_orfaos";

/// Summary of a consume invocation whose batch was accepted
#[derive(Debug, Clone)]
pub struct ConsumeReport {
    pub date: ExtractionDate,
    pub lote: BatchId,
    /// Records read, orphans included
    pub total_consumido: u64,
    pub inserted: u64,
    pub messages_read: u64,
    pub unrecognized: u64,
    pub status: ConsumptionStatus,
}

/// Where the drain loop stopped
struct Drained {
    frame: Frame,
    messages_read: u64,
    /// Offset of the last message that belongs to this frame
    last_consumed: Option<u64>,
}

pub struct Consumer<'a> {
    pub store: &'a dyn RecordStore,
    pub channel: &'a dyn MessageChannel,
    pub auditor: &'a Auditor,
    pub config: &'a BatchConfig,
}

impl Consumer<'_> {
    #[instrument(skip_all, fields(date = %date, lote = tracing::field::Empty))]
    pub async fn run(&self, date: ExtractionDate, interrupt: &Interrupt) -> Result<ConsumeReport> {
        let started = Instant::now();
        let topic = date_topic(&self.config.topic_prefix, date);
        info!(topic = %topic, group = %self.config.consumer_group, "Starting consumption");

        let mut subscription = match interrupt
            .guard(self.channel.subscribe(&topic, &self.config.consumer_group))
            .await?
        {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, topic = %topic, "Subscription failed");
                self.auditor
                    .record_error(
                        date,
                        ErrorCategory::Kafka,
                        MSG_CONSUMER_INIT,
                        &e,
                        json!({"operacao": "inicializar_consumidor", "data": date, "topico": topic}),
                    )
                    .await;
                return Err(e.into());
            },
        };

        let drained = match self.drain(subscription.as_mut(), interrupt).await {
            Ok(drained) => drained,
            Err(PipelineError::Cancelled) => {
                warn!("Consumption cancelled while reading, nothing committed");
                return Err(PipelineError::Cancelled);
            },
            Err(e) => {
                error!(error = %e, "Reading the topic failed");
                self.auditor
                    .record_error(
                        date,
                        ErrorCategory::Kafka,
                        MSG_CONSUMER_READ,
                        &e,
                        json!({"operacao": "consumir_mensagens", "data": date, "topico": topic}),
                    )
                    .await;
                return Err(e);
            },
        };

        let Drained {
            frame,
            messages_read,
            last_consumed,
        } = drained;

        let lote = frame
            .header
            .as_ref()
            .map(|h| h.lote.clone())
            .unwrap_or_else(BatchId::headerless);
        Span::current().record("lote", tracing::field::display(&lote));

        let total_consumido = frame.records_seen();
        let unrecognized = frame.unrecognized;
        let verdict = validate(&frame);
        debug!(?verdict, total_consumido, messages_read, "Frame validated");

        let (status, outcome) = match verdict.clone().into_error(lote.clone()) {
            None => self.accept(date, &lote, frame, interrupt).await,
            Some(rejection) => self.reject(date, &lote, &verdict, rejection, frame, interrupt).await,
        };

        let outcome = match status {
            ConsumptionStatus::FalhaBanco | ConsumptionStatus::Cancelado => {
                warn!(%status, "Offset not committed, batch will be read again");
                outcome
            },
            _ => self.commit(subscription.as_mut(), last_consumed, outcome).await,
        };

        let log = ConsumptionLog {
            data: date,
            lote: lote.clone(),
            total_consumido,
            tempo_processamento: format_elapsed(started.elapsed()),
            status,
            timestamp: Local::now(),
        };
        self.auditor
            .persist_json(&paths::consumption(date, &lote), &log)
            .await;

        let inserted = outcome?;
        info!(
            inserted,
            total_consumido,
            messages_read,
            elapsed = %log.tempo_processamento,
            "Batch accepted"
        );

        Ok(ConsumeReport {
            date,
            lote,
            total_consumido,
            inserted,
            messages_read,
            unrecognized,
            status,
        })
    }

    async fn drain(&self, subscription: &mut dyn Subscription, interrupt: &Interrupt) -> Result<Drained> {
        let mut reconstructor = Reconstructor::new();
        let mut messages_read = 0u64;
        let mut last_consumed = None;

        loop {
            if messages_read >= self.config.max_messages {
                warn!(max_messages = self.config.max_messages, "Message bound reached, closing frame");
                break;
            }

            let Some(delivery) = interrupt.guard(subscription.next()).await?? else {
                debug!(messages_read, "Topic drained");
                break;
            };
            messages_read += 1;

            if messages_read % PROGRESS_EVERY == 0 {
                info!(messages_read, state = ?reconstructor.state(), "Consumption progress");
            }

            match reconstructor.push_payload(&delivery.payload) {
                Step::Continue => last_consumed = Some(delivery.offset),
                Step::Terminated => {
                    last_consumed = Some(delivery.offset);
                    break;
                },
                Step::Deferred => break,
            }
        }

        Ok(Drained {
            frame: reconstructor.finish(),
            messages_read,
            last_consumed,
        })
    }

    async fn accept(
        &self,
        date: ExtractionDate,
        lote: &BatchId,
        mut frame: Frame,
        interrupt: &Interrupt,
    ) -> (ConsumptionStatus, Result<u64>) {
        let orphans = std::mem::take(&mut frame.orphans);
        if !orphans.is_empty() {
            let label = BatchId::from(format!("{lote}{ORPHAN_SUFFIX}"));
            warn!(orphans = orphans.len(), "Records before the header, quarantined apart");
            self.quarantine(date, &label, MOTIVO_ORPHANS, orphans, interrupt)
                .await;
            if interrupt.is_interrupted() {
                warn!("Consumption cancelled while quarantining orphans, nothing inserted");
                return (ConsumptionStatus::Cancelado, Err(PipelineError::Cancelled));
            }
        }

        let records = frame.into_accepted();
        let result = sink::commit(self.store, &records, self.config.insert_batch_size, interrupt).await;

        let status = match &result {
            Ok(_) => ConsumptionStatus::Sucesso,
            Err(PipelineError::Cancelled) => ConsumptionStatus::Cancelado,
            Err(PipelineError::PartialCommit { .. }) => ConsumptionStatus::CommitParcial,
            Err(_) => ConsumptionStatus::FalhaBanco,
        };

        if let Err(e) = &result {
            let mensagem = match status {
                ConsumptionStatus::FalhaBanco => Some(MSG_STORE_DOWN),
                ConsumptionStatus::CommitParcial => Some(MSG_LOAD_ERRORS),
                _ => None,
            };
            if let Some(mensagem) = mensagem {
                self.auditor
                    .record_error(
                        date,
                        ErrorCategory::Banco,
                        mensagem,
                        e,
                        json!({"operacao": "inserir_processados", "data": date, "lote": lote, "total": records.len()}),
                    )
                    .await;
            }
        }

        (status, result)
    }

    async fn reject(
        &self,
        date: ExtractionDate,
        lote: &BatchId,
        verdict: &Verdict,
        err: PipelineError,
        frame: Frame,
        interrupt: &Interrupt,
    ) -> (ConsumptionStatus, Result<u64>) {
        let status = verdict.consumption_status();
        let motivo = verdict.motivo();
        warn!(motivo = %motivo, "Batch rejected");

        let report = self
            .quarantine(date, lote, &motivo, frame.all_records(), interrupt)
            .await;

        if interrupt.is_interrupted() {
            warn!(
                published = report.published,
                failed = report.failed,
                "Consumption cancelled while quarantining, batch will be read again"
            );
            return (ConsumptionStatus::Cancelado, Err(PipelineError::Cancelled));
        }

        self.auditor
            .record_error(
                date,
                ErrorCategory::Validacao,
                MSG_LOAD_ERRORS,
                &err,
                json!({
                    "operacao": "validacao_carga",
                    "data": date,
                    "lote": lote,
                    "motivo": motivo,
                    "publicados": report.published,
                    "falhas": report.failed,
                }),
            )
            .await;

        (status, Err(err))
    }

    async fn quarantine(
        &self,
        date: ExtractionDate,
        lote: &BatchId,
        motivo: &str,
        records: Vec<Record>,
        interrupt: &Interrupt,
    ) -> QuarantineReport {
        Quarantine {
            channel: self.channel,
            auditor: self.auditor,
            error_topic: &self.config.error_topic,
        }
        .run(date, lote, motivo, records, interrupt)
        .await
    }

    /// Commit the frame's last offset. A commit failure turns an otherwise
    /// finished invocation into [`PipelineError::ChannelUnavailable`], except
    /// for a partial commit, which keeps its own error.
    async fn commit(
        &self,
        subscription: &mut dyn Subscription,
        last_consumed: Option<u64>,
        outcome: Result<u64>,
    ) -> Result<u64> {
        let Some(offset) = last_consumed else {
            return outcome;
        };

        match subscription.commit(offset).await {
            Ok(()) => {
                debug!(offset, "Offset committed");
                outcome
            },
            Err(e) => {
                error!(error = %e, offset, "Offset commit failed, batch will be read again");
                match outcome {
                    Err(partial @ PipelineError::PartialCommit { .. }) => Err(partial),
                    _ => Err(PipelineError::ChannelUnavailable(e)),
                }
            },
        }
    }
}
