//! Integration tests for a full run against in-process sources, readers and
//! stores. No network, no pdfium.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fundprice_ingest::store::{price_from_value, LATEST_UNIT_FIELD};
use fundprice_ingest::{
    Attachment, AttachmentSource, DocPath, Document, DocumentReader, DocumentStore,
    ExtractionOutcome, FundRegistry, JsonFileStore, KnownFund, MemoryStore, MessageHandle,
    Pipeline, PipelineConfig, PipelineError, ReaderError, RecordOutcome, RejectReason,
    RunOutcome, RunResponse, SearchQuery, SetOptions, StoreError,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Mailbox with fixed messages; records which message was fetched.
struct StaticSource {
    messages: Vec<MessageHandle>,
    attachments: HashMap<String, Vec<Attachment>>,
    fail_search: bool,
    fetched: Mutex<Vec<String>>,
}

impl StaticSource {
    fn empty() -> Self {
        Self {
            messages: Vec::new(),
            attachments: HashMap::new(),
            fail_search: false,
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn with_message(mut self, id: &str, hour: u32, attachments: Vec<Attachment>) -> Self {
        self.messages.push(MessageHandle {
            id: id.to_string(),
            received_at: Utc.with_ymd_and_hms(2025, 6, 18, hour, 0, 0).unwrap(),
        });
        self.attachments.insert(id.to_string(), attachments);
        self
    }

    fn failing() -> Self {
        Self {
            fail_search: true,
            ..Self::empty()
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttachmentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn search_recent(&self, _query: &SearchQuery) -> Result<Vec<MessageHandle>, PipelineError> {
        if self.fail_search {
            return Err(PipelineError::SourceAuth {
                service: "static".into(),
                detail: "invalid_grant".into(),
            });
        }
        Ok(self.messages.clone())
    }

    async fn fetch_attachments(&self, message: &MessageHandle) -> Result<Vec<Attachment>, PipelineError> {
        self.fetched.lock().unwrap().push(message.id.clone());
        Ok(self.attachments.get(&message.id).cloned().unwrap_or_default())
    }
}

/// Reader that replays scripted answers, then repeats the last one.
struct ScriptedReader {
    replies: Mutex<VecDeque<Result<String, ReaderError>>>,
    last: Mutex<Option<Result<String, ReaderError>>>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<tokio::time::Instant>>,
    delay: Duration,
}

impl ScriptedReader {
    fn new(replies: Vec<Result<String, ReaderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn answering(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(vec![Ok(text.to_string())].into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentReader for ScriptedReader {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn read(&self, _attachment: &Attachment, _instruction: &str) -> Result<String, ReaderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(tokio::time::Instant::now());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().unwrap_or_else(|| Ok("[]".to_string()))
    }

    async fn ask(&self, _prompt: &str) -> Result<String, ReaderError> {
        Ok("ok".to_string())
    }
}

/// Memory store whose writes fail for one fund.
struct FailingStore {
    inner: MemoryStore,
    failing_fund: String,
}

impl FailingStore {
    fn check(&self, path: &DocPath) -> Result<(), StoreError> {
        if path.as_str().contains(&self.failing_fund) {
            return Err(StoreError::Backend {
                path: path.to_string(),
                detail: "deadline exceeded".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &DocPath, value: Document, options: SetOptions) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.set(path, value, options).await
    }

    async fn update(&self, path: &DocPath, partial: Document) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.update(path, partial).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn registry() -> FundRegistry {
    FundRegistry::new(vec![
        KnownFund::new("A", "Fund A"),
        KnownFund::new("B", "Fund B"),
        KnownFund::new("C", "Fund C"),
    ])
}

fn config() -> PipelineConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    PipelineConfig::builder()
        .sender("reports@fiduciary.example")
        .registry(registry())
        .extraction_delay_ms(0)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

fn fund_doc(name: &str) -> Document {
    json!({ "name": name }).as_object().cloned().unwrap()
}

/// Store with fund documents for `ids`.
fn seeded_store(ids: &[&str]) -> MemoryStore {
    MemoryStore::with_documents(
        ids.iter()
            .map(|id| (DocPath::fund(id).unwrap(), fund_doc(&format!("Fund {id}")))),
    )
}

fn pdf(name: &str) -> Attachment {
    Attachment::new(name, b"%PDF-1.4 test".to_vec())
}

fn report_source() -> StaticSource {
    StaticSource::empty().with_message("m1", 14, vec![pdf("valor_unidad.pdf")])
}

fn pipeline_with(
    config: PipelineConfig,
    source: Arc<StaticSource>,
    reader: Option<Arc<ScriptedReader>>,
    store: Arc<dyn DocumentStore>,
) -> Pipeline {
    Pipeline::with_reader(
        Arc::new(config),
        source,
        reader.map(|r| r as Arc<dyn DocumentReader>),
        store,
    )
}

const TWO_FUNDS: &str = r#"```json
[
  {"fundId": "A", "date": "2025-06-18", "price": 1234.54},
  {"fundId": "B", "date": "2025-06-18", "price": 123.54}
]
```"#;

async fn stored(store: &dyn DocumentStore, path: DocPath) -> Document {
    store.get(&path).await.unwrap().expect("document exists")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn saves_two_funds_from_fenced_reply() {
    let store = Arc::new(seeded_store(&["A", "B"]));
    let source = Arc::new(report_source());
    let reader = ScriptedReader::answering(TWO_FUNDS);
    let pipeline = pipeline_with(config(), source, Some(reader.clone()), store.clone());

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.outcome, RunOutcome::Saved);
    assert_eq!((summary.saved, summary.rejected, summary.errored), (2, 0, 0));
    assert_eq!(summary.message_id.as_deref(), Some("m1"));
    assert_eq!(reader.calls(), 1);

    let fund_a = stored(store.as_ref(), DocPath::fund("A").unwrap()).await;
    assert_eq!(price_from_value(&fund_a[LATEST_UNIT_FIELD]), Some(dec!(1234.54)));
    assert_eq!(fund_a["name"], json!("Fund A"));

    let hist_b = stored(store.as_ref(), DocPath::price_history("B", "2025-06-18").unwrap()).await;
    assert_eq!(hist_b["date"], json!("2025-06-18"));
    assert_eq!(price_from_value(&hist_b["price"]), Some(dec!(123.54)));
}

#[tokio::test]
async fn running_twice_converges_to_same_state() {
    let store = Arc::new(seeded_store(&["A", "B"]));
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(TWO_FUNDS)),
        store.clone(),
    );

    assert_ok!(pipeline.run().await);
    let first = store.snapshot();
    assert_ok!(pipeline.run().await);

    assert_eq!(store.snapshot(), first);
    assert_eq!(store.count_prefix("priceHistory/A/"), 1);
    assert_eq!(store.count_prefix("priceHistory/B/"), 1);
}

#[tokio::test]
async fn rerun_with_new_price_overwrites_the_same_entry() {
    let store = Arc::new(seeded_store(&["A"]));
    for price in ["1.5", "2.75"] {
        let reply = format!(r#"[{{"fundId": "A", "date": "2025-06-18", "price": {price}}}]"#);
        let pipeline = pipeline_with(
            config(),
            Arc::new(report_source()),
            Some(ScriptedReader::answering(&reply)),
            store.clone(),
        );
        assert_ok!(pipeline.run().await);
    }

    assert_eq!(store.count_prefix("priceHistory/A/"), 1);
    let hist = stored(store.as_ref(), DocPath::price_history("A", "2025-06-18").unwrap()).await;
    assert_eq!(price_from_value(&hist["price"]), Some(dec!(2.75)));
    let fund = stored(store.as_ref(), DocPath::fund("A").unwrap()).await;
    assert_eq!(price_from_value(&fund[LATEST_UNIT_FIELD]), Some(dec!(2.75)));
}

#[tokio::test]
async fn missing_fund_document_does_not_block_others() {
    // C is a known fund but has no document in storage.
    let reply = r#"[
        {"fundId": "A", "date": "2025-06-18", "price": 10.5},
        {"fundId": "C", "date": "2025-06-18", "price": 11},
        {"fundId": "B", "date": "2025-06-18", "price": 12}
    ]"#;
    let store = Arc::new(seeded_store(&["A", "B"]));
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(reply)),
        store.clone(),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!((summary.saved, summary.rejected, summary.errored), (2, 1, 0));

    let outcomes = &summary.reconcile.as_ref().unwrap().outcomes;
    assert_eq!(outcomes[1].fund_id, "C");
    assert_eq!(outcomes[1].outcome, RecordOutcome::MissingFund);
    assert!(store.get(&DocPath::fund("C").unwrap()).await.unwrap().is_none());
    assert_eq!(store.count_prefix("priceHistory/C/"), 0);
}

#[tokio::test]
async fn storage_failure_is_recorded_per_record() {
    let store = Arc::new(FailingStore {
        inner: seeded_store(&["A", "B"]),
        failing_fund: "B".into(),
    });
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(TWO_FUNDS)),
        store.clone(),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!((summary.saved, summary.rejected, summary.errored), (1, 0, 1));
    let outcomes = &summary.reconcile.as_ref().unwrap().outcomes;
    assert!(matches!(&outcomes[1].outcome, RecordOutcome::Errored { message } if message.contains("deadline exceeded")));

    let response = RunResponse::from_result(&Ok(summary));
    assert!(response.success);
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn validator_filters_bad_items() {
    let reply = r#"Here is the table:
    [
        {"fundId": "A", "date": "2025-06-18", "price": "1,234.54"},
        {"fundId": "Z", "date": "2025-06-18", "price": 1},
        {"fundId": "B", "date": "18/06/2025", "price": 2},
        {"fundId": "B", "date": "2025-06-18", "price": -3},
        {"idFund": "B", "date": "2025/06/18", "price": "7.25"},
        "not an object"
    ]"#;
    let store = Arc::new(seeded_store(&["A", "B"]));
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(reply)),
        store.clone(),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.saved, 1);
    assert_eq!(summary.rejected, 5);

    let reasons: Vec<&str> = summary.attachments[0]
        .rejects
        .iter()
        .map(|r| r.reason.code())
        .collect();
    assert!(reasons.contains(&"unknown_fund"));
    assert!(reasons.contains(&"invalid_date"));
    assert!(reasons.contains(&"negative_price"));
    assert!(reasons.contains(&"not_an_object"));
    assert!(summary.attachments[0]
        .rejects
        .iter()
        .any(|r| r.reason == RejectReason::UnknownFund("Z".into())));

    let hist = stored(store.as_ref(), DocPath::price_history("B", "2025-06-18").unwrap()).await;
    assert_eq!(price_from_value(&hist["price"]), Some(dec!(7.25)));
}

#[tokio::test]
async fn precision_survives_storage() {
    let reply = r#"[{"fundId": "A", "date": "2025-06-18", "price": 123.54777}]"#;
    let store = Arc::new(seeded_store(&["A"]));
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(reply)),
        store.clone(),
    );

    assert_ok!(pipeline.run().await);
    let fund = stored(store.as_ref(), DocPath::fund("A").unwrap()).await;
    assert_eq!(fund[LATEST_UNIT_FIELD].to_string(), "123.54777");
    assert_eq!(price_from_value(&fund[LATEST_UNIT_FIELD]), Some(dec!(123.54777)));
}

#[tokio::test]
async fn garbage_reply_saves_nothing() {
    let store = Arc::new(seeded_store(&["A", "B"]));
    let before = store.snapshot();
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering("I could not read this document.")),
        store.clone(),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.outcome, RunOutcome::NothingToSave);
    assert_eq!(summary.attachments[0].extraction.status(), "parse_failed");
    match &summary.attachments[0].extraction.outcome {
        ExtractionOutcome::ParseFailed { raw_response, .. } => {
            assert_eq!(raw_response, "I could not read this document.")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn no_messages_skips_extraction_and_storage() {
    let store = Arc::new(seeded_store(&["A"]));
    let reader = ScriptedReader::answering(TWO_FUNDS);
    let pipeline = pipeline_with(
        config(),
        Arc::new(StaticSource::empty()),
        Some(reader.clone()),
        store.clone(),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.outcome, RunOutcome::NoAttachment);
    assert!(summary.message_id.is_none());
    assert!(summary.reconcile.is_none());
    assert_eq!(reader.calls(), 0);
    assert_eq!(store.snapshot().len(), 1);
}

#[tokio::test]
async fn message_without_pdf_is_no_attachment() {
    let source = Arc::new(StaticSource::empty().with_message(
        "m1",
        14,
        vec![Attachment::new("logo.png", vec![0x89, 0x50])],
    ));
    let reader = ScriptedReader::answering(TWO_FUNDS);
    let pipeline = pipeline_with(
        config(),
        source,
        Some(reader.clone()),
        Arc::new(seeded_store(&["A"])),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.outcome, RunOutcome::NoAttachment);
    assert_eq!(summary.message_id.as_deref(), Some("m1"));
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn newest_message_is_processed() {
    let source = Arc::new(
        StaticSource::empty()
            .with_message("older", 9, vec![pdf("old.pdf")])
            .with_message("newest", 15, vec![pdf("new.pdf")])
            .with_message("middle", 12, vec![pdf("mid.pdf")]),
    );
    let pipeline = pipeline_with(
        config(),
        source.clone(),
        Some(ScriptedReader::answering(TWO_FUNDS)),
        Arc::new(seeded_store(&["A", "B"])),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(source.fetched(), vec!["newest".to_string()]);
    assert_eq!(summary.attachments[0].extraction.filename, "new.pdf");
}

#[tokio::test]
async fn every_pdf_of_the_message_is_extracted() {
    let source = Arc::new(StaticSource::empty().with_message(
        "m1",
        14,
        vec![pdf("part1.pdf"), Attachment::new("notes.txt", b"hi".to_vec()), pdf("PART2.PDF")],
    ));
    let reader = ScriptedReader::new(vec![
        Ok(r#"[{"fundId": "A", "date": "2025-06-18", "price": 1}]"#.into()),
        Ok(r#"[{"fundId": "B", "date": "2025-06-18", "price": 2}]"#.into()),
    ]);
    let pipeline = pipeline_with(
        config(),
        source,
        Some(reader.clone()),
        Arc::new(seeded_store(&["A", "B"])),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(reader.calls(), 2);
    assert_eq!(summary.attachments.len(), 2);
    assert_eq!(summary.saved, 2);
}

#[tokio::test]
async fn service_errors_are_retried() {
    let reader = ScriptedReader::new(vec![
        Err(ReaderError::Service {
            backend: "scripted".into(),
            message: "HTTP 503: overloaded".into(),
        }),
        Ok(TWO_FUNDS.to_string()),
    ]);
    let config = PipelineConfig::builder()
        .sender("reports@fiduciary.example")
        .registry(registry())
        .extraction_delay_ms(0)
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let pipeline = pipeline_with(
        config,
        Arc::new(report_source()),
        Some(reader.clone()),
        Arc::new(seeded_store(&["A", "B"])),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(reader.calls(), 2);
    assert_eq!(summary.attachments[0].attempts, 2);
    assert_eq!(summary.saved, 2);
}

#[tokio::test]
async fn service_error_without_retries_is_reported() {
    let reader = ScriptedReader::new(vec![Err(ReaderError::Auth {
        backend: "scripted".into(),
        detail: "invalid api key".into(),
    })]);
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(reader.clone()),
        Arc::new(seeded_store(&["A", "B"])),
    );

    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(reader.calls(), 1);
    assert_eq!(summary.outcome, RunOutcome::NothingToSave);
    assert!(summary.attachments[0].extraction.is_service_error());
}

#[tokio::test]
async fn missing_reader_reports_extraction_unavailable() {
    let store = Arc::new(seeded_store(&["A", "B"]));
    let pipeline = pipeline_with(config(), Arc::new(report_source()), None, store.clone());

    let result = pipeline.run().await;
    let summary = assert_ok!(result.as_ref().map_err(|e| e.to_string()));
    assert_eq!(summary.outcome, RunOutcome::ExtractionUnavailable);
    assert_eq!(summary.attachments[0].extraction.status(), "ai_not_configured");
    assert_eq!(store.count_prefix("priceHistory/"), 0);

    let response = RunResponse::from_result(&result);
    assert!(response.success);
    assert!(response.message.contains("OPENAI_API_KEY"));
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["data"]["outcome"], json!("extraction_unavailable"));
}

#[tokio::test]
async fn source_failure_is_fatal() {
    let store = Arc::new(seeded_store(&["A"]));
    let pipeline = pipeline_with(
        config(),
        Arc::new(StaticSource::failing()),
        Some(ScriptedReader::answering(TWO_FUNDS)),
        store,
    );

    let result = pipeline.run().await;
    assert!(matches!(result, Err(PipelineError::SourceAuth { .. })));

    let response = RunResponse::from_result(&result);
    assert!(!response.success);
    assert_eq!(response.status_code(), 500);
    assert_eq!(response.message, "There was a problem processing the report emails");
    assert!(response.error.unwrap().contains("invalid_grant"));
}

#[tokio::test]
async fn run_budget_is_enforced() {
    let config = PipelineConfig::builder()
        .sender("reports@fiduciary.example")
        .registry(registry())
        .run_timeout_secs(1)
        .api_timeout_secs(30)
        .build()
        .unwrap();
    let pipeline = pipeline_with(
        config,
        Arc::new(report_source()),
        Some(ScriptedReader::slow(TWO_FUNDS, Duration::from_secs(5))),
        Arc::new(seeded_store(&["A", "B"])),
    );

    let err = assert_err!(pipeline.run_with_timeout().await);
    assert!(matches!(err, PipelineError::Timeout { secs: 1 }));
}

#[tokio::test]
async fn json_file_store_persists_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mpfi-qa-firestore-db.json");

    let store = JsonFileStore::open(&path).await.unwrap();
    for id in ["A", "B"] {
        store
            .set(&DocPath::fund(id).unwrap(), fund_doc(id), SetOptions::merge())
            .await
            .unwrap();
    }
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(TWO_FUNDS)),
        Arc::new(store),
    );
    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.saved, 2);

    let reopened = JsonFileStore::open(&path).await.unwrap();
    let fund = stored(&reopened, DocPath::fund("A").unwrap()).await;
    assert_eq!(price_from_value(&fund[LATEST_UNIT_FIELD]), Some(dec!(1234.54)));

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        raw["priceHistory/B/historical/2025-06-18"],
        json!({ "date": "2025-06-18", "price": 123.54 })
    );
}

#[tokio::test]
async fn long_price_is_exact_through_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mpfi-qa-firestore-db.json");
    let store = JsonFileStore::open(&path).await.unwrap();
    store
        .set(&DocPath::fund("A").unwrap(), fund_doc("A"), SetOptions::merge())
        .await
        .unwrap();

    let reply = r#"[
        {"fundId": "A", "date": "2025-06-18", "price": 121231233.54777123},
        {"fundId": "A", "date": "2025-06-17", "price": "12345678.123456789"}
    ]"#;
    let pipeline = pipeline_with(
        config(),
        Arc::new(report_source()),
        Some(ScriptedReader::answering(reply)),
        Arc::new(store),
    );
    assert_eq!(assert_ok!(pipeline.run().await).saved, 2);

    let reopened = JsonFileStore::open(&path).await.unwrap();
    let newest = stored(&reopened, DocPath::price_history("A", "2025-06-18").unwrap()).await;
    assert_eq!(price_from_value(&newest["price"]), Some(dec!(121231233.54777123)));
    let older = stored(&reopened, DocPath::price_history("A", "2025-06-17").unwrap()).await;
    assert_eq!(price_from_value(&older["price"]), Some(dec!(12345678.123456789)));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("121231233.54777123"));
    assert!(text.contains("12345678.123456789"));
}

fn two_pdf_source() -> StaticSource {
    StaticSource::empty().with_message("m1", 14, vec![pdf("part1.pdf"), pdf("part2.pdf")])
}

fn delayed_config(delay_ms: u64) -> PipelineConfig {
    PipelineConfig::builder()
        .sender("reports@fiduciary.example")
        .registry(registry())
        .extraction_delay_ms(delay_ms)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn extraction_calls_are_spaced_by_the_delay() {
    let reader = ScriptedReader::answering(TWO_FUNDS);
    let pipeline = pipeline_with(
        delayed_config(1500),
        Arc::new(two_pdf_source()),
        Some(reader.clone()),
        Arc::new(seeded_store(&["A", "B"])),
    );

    assert_ok!(pipeline.run().await);
    let times = reader.call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn no_delay_without_a_reader() {
    let pipeline = pipeline_with(
        delayed_config(60_000),
        Arc::new(two_pdf_source()),
        None,
        Arc::new(seeded_store(&["A", "B"])),
    );

    let start = tokio::time::Instant::now();
    let summary = assert_ok!(pipeline.run().await);
    assert_eq!(summary.outcome, RunOutcome::ExtractionUnavailable);
    assert_eq!(summary.attachments.len(), 2);
    assert!(start.elapsed() < Duration::from_secs(1));
}
