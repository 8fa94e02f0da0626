//! Extractor integration tests, plus extract-then-consume round trips

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use lote_common::types::{Envelope, Record, Status};
use lote_pipeline::config::BatchConfig;
use lote_pipeline::store::{MemoryStore, Table};
use lote_pipeline::PipelineError;

mod common;
use common::{day, Harness, DATE};

fn source(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|i| {
            let status = if i % 2 == 0 { Status::Rejected } else { Status::Approved };
            Record::new(i, format!("Candidato_{i}_{DATE}"), Some(status), day())
        })
        .collect()
}

fn small_pages() -> BatchConfig {
    BatchConfig {
        extract_page_size: 10,
        publish_batch_size: 4,
        insert_batch_size: 7,
        ..BatchConfig::default()
    }
}

// ============================================================================
// Framing
// ============================================================================

#[tokio::test]
async fn test_extract_publishes_framed_batch() {
    let h = Harness::build(MemoryStore::with_records(source(25)), small_pages());

    let report = h.pipeline.extract(DATE).await.unwrap();

    assert_eq!(report.expected, 25);
    assert_eq!(report.extracted, 25);
    assert_eq!(report.sent, 25);
    assert!(report.lote.as_str().starts_with("concurso"));

    let published = h.published();
    assert_eq!(published.len(), 27);
    match (&published[0], &published[26]) {
        (Envelope::Header(header), Envelope::Footer(footer)) => {
            assert_eq!(header.lote, report.lote);
            assert_eq!(footer.lote, report.lote);
            assert_eq!(header.total_esperado, 25);
            assert_eq!(footer.total_processado, 25);
        },
        other => panic!("unexpected framing {other:?}"),
    }

    // records keep id order across pages
    let ids: Vec<i64> = published[1..26]
        .iter()
        .map(|e| match e {
            Envelope::Record(r) => r.id,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(ids, (1..=25).collect::<Vec<_>>());

    let lote = report.lote.as_str();
    let extraction = h.audit.json(&format!("{DATE}/extracao_{lote}.json")).unwrap();
    assert_eq!(extraction["total_extraido"], 25);
    let load = h.audit.json(&format!("{DATE}/kafka_carga_{lote}.json")).unwrap();
    assert_eq!(load["header"]["total_esperado"], 25);
    assert_eq!(load["footer"]["total_processado"], 25);
}

#[tokio::test]
async fn test_extract_only_reads_its_date() {
    let mut records = source(3);
    let other_day = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
    records.push(Record::new(4, "Candidato_4_2025-01-03", Some(Status::Approved), other_day));
    let h = Harness::with_source(records);

    let report = h.pipeline.extract(DATE).await.unwrap();

    assert_eq!(report.sent, 3);
    assert!(h.channel.messages("concurso_2025-01-03").is_empty());
}

#[tokio::test]
async fn test_page_size_multiple_of_total() {
    let h = Harness::build(MemoryStore::with_records(source(20)), small_pages());
    let report = h.pipeline.extract(DATE).await.unwrap();
    assert_eq!(report.sent, 20);
}

#[tokio::test]
async fn test_reextract_mints_new_batch() {
    let h = Harness::with_source(source(2));

    let first = h.pipeline.extract(DATE).await.unwrap();
    let second = h.pipeline.extract(DATE).await.unwrap();

    assert_ne!(first.lote, second.lote);
    assert_eq!(h.published().len(), 8);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_no_records_is_not_found() {
    let h = Harness::new();

    let err = h.pipeline.extract(DATE).await.unwrap_err();

    assert!(matches!(err, PipelineError::NotFound { .. }));
    assert!(h.published().is_empty());
}

#[tokio::test]
async fn test_store_down_aborts_with_banco_artifact() {
    let h = Harness::with_source(source(3));
    h.store.set_unavailable(true);

    let err = h.pipeline.extract(DATE).await.unwrap_err();

    assert!(matches!(err, PipelineError::StoreUnavailable(_)));
    let artifact = h.artifact("erros_BANCO_").unwrap();
    assert_eq!(artifact["categoria"], "BANCO");
    assert_eq!(
        artifact["mensagem"],
        "O banco de dados está fora do ar! Sua Integração foi abortada"
    );
    assert_eq!(artifact["payload"]["operacao"], "contar_registros");
    assert!(h.published().is_empty());
}

#[tokio::test]
async fn test_channel_down_aborts_with_kafka_artifact() {
    let h = Harness::with_source(source(3));
    h.channel.set_unavailable(true);

    let err = h.pipeline.extract(DATE).await.unwrap_err();

    assert!(matches!(err, PipelineError::ChannelUnavailable(_)));
    let artifact = h.artifact("erros_KAFKA_").unwrap();
    assert_eq!(artifact["mensagem"], "Erro ao inicializar produtor Kafka");
    assert_eq!(artifact["payload"]["operacao"], "inicializar_produtor");
}

#[tokio::test]
async fn test_header_failure_aborts() {
    let h = Harness::with_source(source(3));
    h.channel.fail_publish_calls([0]);

    let err = h.pipeline.extract(DATE).await.unwrap_err();

    assert!(matches!(err, PipelineError::ChannelUnavailable(_)));
    assert!(h.published().is_empty());
    assert_eq!(h.artifact("erros_KAFKA_").unwrap()["mensagem"], "Erro ao enviar header para Kafka");
    assert!(h.audit.find("extracao_").is_none());
}

#[tokio::test]
async fn test_record_failure_is_skipped_and_reported() {
    let h = Harness::with_source(source(5));
    // call 0 is the header, call 2 the second record
    h.channel.fail_publish_calls([2]);

    let err = h.pipeline.extract(DATE).await.unwrap_err();

    match err {
        PipelineError::LoadMismatch { expected, sent, .. } => assert_eq!((expected, sent), (5, 4)),
        other => panic!("unexpected {other:?}"),
    }

    let published = h.published();
    assert_eq!(published.len(), 6);
    assert!(matches!(published.last(), Some(Envelope::Footer(f)) if f.total_processado == 4));

    let messages: Vec<String> = h
        .audit
        .paths()
        .iter()
        .filter(|p| p.contains("/erros_KAFKA_"))
        .map(|p| h.audit.json(p).unwrap()["mensagem"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(messages.len(), 2);
    assert!(messages.contains(&"Erro ao enviar registro para Kafka".to_string()));
    assert!(messages.contains(&"Ocorreram erros na carga".to_string()));

    // the summaries are still written
    assert!(h.audit.find("extracao_").is_some());
    assert!(h.audit.find("kafka_carga_").is_some());
}

#[tokio::test]
async fn test_footer_failure_aborts() {
    let h = Harness::with_source(source(2));
    h.channel.fail_publish_calls([3]);

    let err = h.pipeline.extract(DATE).await.unwrap_err();

    assert!(matches!(err, PipelineError::ChannelUnavailable(_)));
    assert_eq!(h.published().len(), 3);
    assert_eq!(h.artifact("erros_KAFKA_").unwrap()["mensagem"], "Erro ao enviar footer para Kafka");

    // downstream sees a frame without a footer
    let err = h.pipeline.consume(DATE).await.unwrap_err();
    assert!(matches!(err, PipelineError::FooterMissing { .. }));
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn test_round_trip_accepts_every_record() {
    let h = Harness::build(MemoryStore::with_records(source(25)), small_pages());

    let extracted = h.pipeline.extract(DATE).await.unwrap();
    let consumed = h.pipeline.consume(DATE).await.unwrap();

    assert_eq!(consumed.lote, extracted.lote);
    assert_eq!(consumed.inserted, 25);

    let mut names: Vec<String> = h.store.rows(Table::Validated).into_iter().map(|r| r.nome).collect();
    names.sort();
    let mut expected: Vec<String> = source(25).into_iter().map(|r| r.nome).collect();
    expected.sort();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn test_round_trip_with_lost_record_is_rejected() {
    let h = Harness::with_source(source(4));
    h.channel.fail_publish_calls([1]);

    h.pipeline.extract(DATE).await.unwrap_err();
    let err = h.pipeline.consume(DATE).await.unwrap_err();

    assert!(matches!(err, PipelineError::CountMismatch { expected: 4, declared: 3, observed: 3, .. }));
    assert!(h.validated().is_empty());
}
