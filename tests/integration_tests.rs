//! End-to-end tests of the engine and the analyst
//!
//! Extraction is replaced by a fixed page source and the LLM by a scripted
//! generator, so ingestion, persistence and prompting run offline.

use lease_rag::api::analysis::{LeaseAnalyst, NO_DOCUMENT_MESSAGE, RiskCategory};
use lease_rag::api::llm::AnswerGenerator;
use lease_rag::config::Config;
use lease_rag::error::Result;
use lease_rag::ml::HashingEmbedder;
use lease_rag::text::diff::ChangeKind;
use lease_rag::text::pdf::ExtractionStrategy;
use lease_rag::utils::document_id;
use lease_rag::{IngestReport, LeaseEngine};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Pages keyed by the first bytes of the file, so each PDF has its own text
struct FixturePages;

impl ExtractionStrategy for FixturePages {
    fn name(&self) -> &str {
        "fixture"
    }

    fn min_chars(&self) -> usize {
        1
    }

    fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path)?;
        if bytes.starts_with(b"%PDF amended") {
            Ok(amended_pages())
        } else {
            Ok(lease_pages())
        }
    }
}

fn lease_pages() -> Vec<String> {
    vec![
        "1 Premises\nLandlord leases to Tenant the warehouse on Main Street.\n\n2 Term\nThe term is five years from the commencement date.".to_string(),
        "3 Rent\nTenant pays the monthly rent in advance on the first day.\n\n4 Security Deposit\nTenant deposits two months rent as security.".to_string(),
    ]
}

fn amended_pages() -> Vec<String> {
    vec![
        "1 Premises\nLandlord leases to Tenant the warehouse on Main Street.\n\n2 Term\nThe term is ten years from the commencement date and may be renewed once.".to_string(),
        "3 Rent\nTenant pays the monthly rent in advance on the first day.\n\n5 Signage\nTenant may install one exterior sign.".to_string(),
    ]
}

fn engine(root: &Path) -> LeaseEngine {
    let mut config = Config::default();
    config.storage.root = root.to_path_buf();
    LeaseEngine::with_strategies(
        config,
        vec![Box::new(FixturePages)],
        Arc::new(HashingEmbedder::new(128)),
    )
    .unwrap()
}

#[test]
fn test_ingest_is_idempotent() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path());

    let first = engine.ingest_bytes(b"%PDF lease one")?;
    assert_eq!(first.doc_id, document_id(b"%PDF lease one"));
    assert_eq!(first.clause_count, 4);
    assert_eq!(first.chunk_count, 4);
    assert_eq!(first.strategy.as_deref(), Some("fixture"));
    assert!(!first.reused);

    let second = engine.ingest_bytes(b"%PDF lease one")?;
    assert_eq!(
        second,
        IngestReport {
            reused: true,
            ..first.clone()
        }
    );
    assert_eq!(engine.store().list_documents()?, vec![first.doc_id.clone()]);
    Ok(())
}

#[test]
fn test_index_survives_restart_in_document_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let report = engine(dir.path()).ingest_bytes(b"%PDF lease one")?;
    let built: Vec<String> = engine(dir.path())
        .index(&report.doc_id)?
        .chunks
        .iter()
        .map(|c| c.text.clone())
        .collect();

    // Fresh engine, same working directory
    let reopened = engine(dir.path());
    assert!(reopened.is_available(&report.doc_id));
    let again = reopened.ingest_bytes(b"%PDF lease one")?;
    assert!(again.reused);

    let index = reopened.index(&report.doc_id)?;
    let texts: Vec<String> = index.chunks.iter().map(|c| c.text.clone()).collect();
    assert_eq!(texts, built);
    assert!(texts[0].starts_with("1 Premises"));
    assert!(texts[3].starts_with("4 Security Deposit"));
    let pages: Vec<Option<u32>> = index.chunks.iter().map(|c| c.metadata.page).collect();
    assert_eq!(pages, vec![Some(1), Some(1), Some(2), Some(2)]);
    Ok(())
}

#[test]
fn test_invalidate_forces_rebuild() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path());
    let report = engine.ingest_bytes(b"%PDF lease one")?;

    assert!(engine.invalidate(&report.doc_id)?);
    assert!(!engine.store().has_index(&report.doc_id));
    assert!(engine.is_available(&report.doc_id));

    let rebuilt = engine.ingest_bytes(b"%PDF lease one")?;
    assert!(!rebuilt.reused);
    Ok(())
}

#[test]
fn test_search_and_topic_clauses() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path());
    let report = engine.ingest_bytes(b"%PDF lease one")?;

    let hits = engine.search(&report.doc_id, "security deposit")?;
    assert!(hits.len() <= engine.config().retrieval.max_results);
    let mut ids: Vec<usize> = hits.iter().map(|h| h.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), hits.len());

    let clauses = engine.clauses_for_topic(&report.doc_id, "security deposit")?;
    assert!(!clauses.is_empty());
    assert!(clauses.len() <= report.chunk_count);
    Ok(())
}

#[test]
fn test_unknown_document_is_not_available() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    let missing = document_id(b"never ingested");
    assert!(!engine.is_available(&missing));
    assert!(engine.index(&missing).is_err());
}

#[test]
fn test_diff_documents() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("base.pdf");
    let amended = dir.path().join("amended.pdf");
    std::fs::write(&base, b"%PDF original")?;
    std::fs::write(&amended, b"%PDF amended")?;

    let engine = engine(&dir.path().join("work"));
    let changes = engine.diff_documents(&base, &amended)?;
    let summary: Vec<(ChangeKind, &str)> = changes
        .iter()
        .map(|c| (c.kind, c.clause_no.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ChangeKind::Modified, "2"),
            (ChangeKind::Removed, "4"),
            (ChangeKind::Added, "5"),
        ]
    );
    Ok(())
}

/// Replays canned responses and records every user message
struct ScriptedGenerator {
    responses: Mutex<Vec<String>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    fn new(responses: &[&str], prompts: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            responses: Mutex::new(responses.iter().rev().map(|r| r.to_string()).collect()),
            prompts,
        }
    }
}

impl AnswerGenerator for ScriptedGenerator {
    fn generate(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().push(user.to_string());
        Ok(self.responses.lock().pop().unwrap_or_default())
    }
}

fn analyst(root: &Path, responses: &[&str]) -> (LeaseAnalyst, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let generator = ScriptedGenerator::new(responses, Arc::clone(&prompts));
    (
        LeaseAnalyst::new(Arc::new(engine(root)), Box::new(generator)),
        prompts,
    )
}

#[test]
fn test_analyst_without_document() {
    let dir = tempfile::tempdir().unwrap();
    let (analyst, prompts) = analyst(dir.path(), &["unused"]);
    let missing = document_id(b"never ingested");

    assert_eq!(analyst.ask(&missing, "What is the rent?").unwrap(), NO_DOCUMENT_MESSAGE);
    assert_eq!(
        analyst.detect_abnormalities(&missing).unwrap(),
        vec![NO_DOCUMENT_MESSAGE.to_string()]
    );
    let report = analyst.evaluate_risks(&missing).unwrap();
    assert!(report.scores.iter().all(|s| s.score.is_none()));
    assert!(prompts.lock().is_empty());
}

#[test]
fn test_analyst_answers_from_context() {
    let dir = tempfile::tempdir().unwrap();
    let (analyst, prompts) = analyst(dir.path(), &["Two months rent."]);
    let report = analyst.engine().ingest_bytes(b"%PDF lease one").unwrap();

    let answer = analyst.ask(&report.doc_id, "How large is the deposit?").unwrap();
    assert_eq!(answer, "Two months rent.");

    let prompts = prompts.lock();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("Context:\n"));
    assert!(prompts[0].ends_with("Question: How large is the deposit?"));
}

#[test]
fn test_analyst_parses_fenced_risk_scores() {
    let dir = tempfile::tempdir().unwrap();
    let response = r#"```json
{"cash_flow_adjustments": {"score": 8, "explanation": "Net lease."},
 "collateral_and_insurance": {"score": 6, "explanation": "Two months deposit."}}
```"#;
    let (analyst, _) = analyst(dir.path(), &[response]);
    let report = analyst.engine().ingest_bytes(b"%PDF lease one").unwrap();

    let risks = analyst.evaluate_risks(&report.doc_id).unwrap();
    assert_eq!(risks.scores.len(), RiskCategory::ALL.len());
    assert_eq!(risks.get(RiskCategory::CashFlowAdjustments).unwrap().score, Some(8));
    let collateral = risks.get(RiskCategory::CollateralAndInsurance).unwrap();
    assert_eq!(collateral.explanation, "Two months deposit.");
    assert_eq!(risks.get(RiskCategory::FutureCashFlow).unwrap().score, None);
}

#[test]
fn test_analyst_degrades_on_unparseable_output() {
    let dir = tempfile::tempdir().unwrap();
    let (analyst, _) = analyst(dir.path(), &["I think it is fine.", "Not JSON either."]);
    let report = analyst.engine().ingest_bytes(b"%PDF lease one").unwrap();

    assert_eq!(
        analyst.detect_abnormalities(&report.doc_id).unwrap(),
        vec!["Could not parse LLM response.".to_string()]
    );
    let risks = analyst.evaluate_risks(&report.doc_id).unwrap();
    assert!(risks.scores.iter().all(|s| s.score.is_none()));
    assert!(risks.scores.iter().all(|s| s.explanation == "Could not parse response."));
}

#[test]
fn test_analyst_lists_abnormalities() {
    let dir = tempfile::tempdir().unwrap();
    let (analyst, _) = analyst(
        dir.path(),
        &["[\"Clause 4 requires two months rent as deposit.\"]"],
    );
    let report = analyst.engine().ingest_bytes(b"%PDF lease one").unwrap();

    assert_eq!(
        analyst.detect_abnormalities(&report.doc_id).unwrap(),
        vec!["Clause 4 requires two months rent as deposit.".to_string()]
    );
}
