//! Lease analysis features built on retrieval
//!
//! Question answering, risk scoring and abnormality detection feed retrieved
//! context to an [`AnswerGenerator`]. Model output that is not the requested
//! JSON degrades to placeholder results instead of failing the call.

use crate::api::engine::LeaseEngine;
use crate::api::llm::AnswerGenerator;
use crate::error::{LeaseError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Returned by every analysis when the identity has no PDF and no index
pub const NO_DOCUMENT_MESSAGE: &str = "No document available yet. Please upload a PDF first.";

const UNPARSED_RISK: &str = "Could not parse response.";
const UNPARSED_ABNORMALITIES: &str = "Could not parse LLM response.";

const ANSWER_PROMPT: &str = "You are a contract analyst reviewing a commercial lease agreement. \
Answer the user's question in plain English using only the provided context. \
If the context does not contain the answer, say so.";

const ABNORMALITY_PROMPT: &str = "You are an expert lease reviewer. Identify unusual, uncommon or \
non-standard clauses in this lease, such as non-standard financial penalties, strange renewal \
conditions or unexpected maintenance responsibilities. Only report items that deviate from common \
practice. If everything is normal, return [\"No abnormalities found.\"].\n\n\
Return the output as a JSON list of strings, for example:\n\
[\"Clause 7 requires the tenant to cover 100% of HVAC replacement costs, which is unusual.\"]";

const ABNORMALITY_QUERY: &str =
    "unusual non-standard penalty renewal condition maintenance responsibility obligation";

/// General risk categories, scored from the lessor's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    CashFlowAdjustments,
    FutureCashFlow,
    InflationInterestRateExposure,
    UseAndExclusivityClauses,
    DefaultAndTerminationClauses,
    CollateralAndInsurance,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 6] = [
        RiskCategory::CashFlowAdjustments,
        RiskCategory::FutureCashFlow,
        RiskCategory::InflationInterestRateExposure,
        RiskCategory::UseAndExclusivityClauses,
        RiskCategory::DefaultAndTerminationClauses,
        RiskCategory::CollateralAndInsurance,
    ];

    /// JSON key the model is asked to use
    pub fn key(&self) -> &'static str {
        match self {
            RiskCategory::CashFlowAdjustments => "cash_flow_adjustments",
            RiskCategory::FutureCashFlow => "future_cash_flow",
            RiskCategory::InflationInterestRateExposure => "inflation/interest_rate_exposure",
            RiskCategory::UseAndExclusivityClauses => "use_and_exclusivity_clauses",
            RiskCategory::DefaultAndTerminationClauses => "default_and_termination_clauses",
            RiskCategory::CollateralAndInsurance => "collateral_and_insurance",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            RiskCategory::CashFlowAdjustments => {
                "lease structure (gross, single, double or triple net), capital expenditure \
                 obligations for roof, HVAC and structure, tenant improvement allowances, \
                 co-tenancy clauses, free rent periods and concessions"
            }
            RiskCategory::FutureCashFlow => {
                "renewal options and their rates, lease length and turnover risk, scheduled \
                 rent escalations, fixed or CPI-linked increases"
            }
            RiskCategory::InflationInterestRateExposure => {
                "how escalations, renewal options and cash flow adjustments hold up under high \
                 inflation or changing interest rates"
            }
            RiskCategory::UseAndExclusivityClauses => {
                "permitted use, exclusive use rights, sublease and assignment rights, \
                 subordination non-disturbance and attornment agreements"
            }
            RiskCategory::DefaultAndTerminationClauses => {
                "early termination rights, default triggers, cure periods and eviction"
            }
            RiskCategory::CollateralAndInsurance => {
                "security deposit, personal or corporate guarantees, letters of credit, \
                 tenant and landlord insurance requirements"
            }
        }
    }

    fn matches_key(&self, key: &str) -> bool {
        let normalized: String = key
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        normalized == self.key()
    }
}

/// Score and explanation for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub category: RiskCategory,
    /// 1 (high risk) to 10 (low risk); `None` when unavailable
    pub score: Option<u8>,
    pub explanation: String,
}

/// Scores for every category, in [`RiskCategory::ALL`] order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub scores: Vec<RiskScore>,
}

impl RiskReport {
    /// Every category unscored with the same explanation
    pub fn placeholder(explanation: &str) -> Self {
        Self {
            scores: RiskCategory::ALL
                .iter()
                .map(|&category| RiskScore {
                    category,
                    score: None,
                    explanation: explanation.to_string(),
                })
                .collect(),
        }
    }

    /// Interpret a model response as a risk report
    pub fn parse(raw: &str) -> Result<Self> {
        let value = parse_json_response(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| LeaseError::Parse("risk response is not a JSON object".to_string()))?;

        let scores = RiskCategory::ALL
            .iter()
            .map(|&category| {
                let entry = object
                    .iter()
                    .find(|(key, _)| category.matches_key(key))
                    .map(|(_, value)| value);
                let score = entry
                    .and_then(|e| e.get("score"))
                    .and_then(Value::as_u64)
                    .filter(|s| (1..=10).contains(s))
                    .map(|s| s as u8);
                let explanation = entry
                    .and_then(|e| e.get("explanation"))
                    .and_then(Value::as_str)
                    .unwrap_or(UNPARSED_RISK)
                    .to_string();
                RiskScore {
                    category,
                    score,
                    explanation,
                }
            })
            .collect();

        Ok(Self { scores })
    }

    pub fn get(&self, category: RiskCategory) -> Option<&RiskScore> {
        self.scores.iter().find(|s| s.category == category)
    }
}

/// Strip an optional markdown code fence and parse JSON
pub fn parse_json_response(raw: &str) -> Result<Value> {
    let mut cleaned = raw.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    cleaned = cleaned.trim().strip_suffix("```").unwrap_or(cleaned).trim();

    serde_json::from_str(cleaned).map_err(|e| LeaseError::Parse(format!("invalid JSON: {}", e)))
}

fn parse_string_list(raw: &str) -> Result<Vec<String>> {
    match parse_json_response(raw)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(LeaseError::Parse(format!("expected a string, got {}", other))),
            })
            .collect(),
        other => Err(LeaseError::Parse(format!("expected a JSON list, got {}", other))),
    }
}

fn risk_prompt() -> String {
    let mut prompt = String::from(
        "You are a risk analyst for a firm buying or structuring commercial real-estate deals. \
         Evaluate the lease from the perspective of the lessor. Score each category from 1 \
         (high risk) to 10 (low risk) and explain each score.\n\nCategories:\n",
    );
    for category in RiskCategory::ALL {
        prompt.push_str(&format!("- {}: {}\n", category.key(), category.guidance()));
    }
    prompt.push_str(
        "\nReturn only a JSON object with one entry per category key, each of the form \
         {\"score\": int, \"explanation\": str}. No commentary or markdown.",
    );
    prompt
}

/// LLM-backed analyses of an ingested lease
pub struct LeaseAnalyst {
    engine: Arc<LeaseEngine>,
    generator: Box<dyn AnswerGenerator>,
}

impl LeaseAnalyst {
    pub fn new(engine: Arc<LeaseEngine>, generator: Box<dyn AnswerGenerator>) -> Self {
        Self { engine, generator }
    }

    pub fn engine(&self) -> &LeaseEngine {
        &self.engine
    }

    /// Answer a question from hybrid-retrieved context
    pub fn ask(&self, doc_id: &str, question: &str) -> Result<String> {
        if !self.engine.is_available(doc_id) {
            return Ok(NO_DOCUMENT_MESSAGE.to_string());
        }
        let context = self.engine.context(doc_id, question)?;
        self.generator.generate(
            ANSWER_PROMPT,
            &format!("Context:\n{}\n\nQuestion: {}", context, question),
        )
    }

    /// Score the six general risk categories
    pub fn evaluate_risks(&self, doc_id: &str) -> Result<RiskReport> {
        if !self.engine.is_available(doc_id) {
            return Ok(RiskReport::placeholder(NO_DOCUMENT_MESSAGE));
        }

        // One retrieval per category, merged without duplicates
        let mut seen = HashSet::new();
        let mut passages = Vec::new();
        for category in RiskCategory::ALL {
            for hit in self.engine.search(doc_id, category.guidance())? {
                if seen.insert(hit.id) {
                    passages.push(hit);
                }
            }
        }
        passages.sort_by_key(|hit| hit.id);
        let context = crate::api::retriever::join_context(&passages);

        let raw = self.generator.generate(
            &risk_prompt(),
            &format!("Context:\n{}\n\nEvaluate the lease risks.", context),
        )?;
        match RiskReport::parse(&raw) {
            Ok(report) => Ok(report),
            Err(e) => {
                log::warn!("Risk evaluation for {} not parsed: {}", doc_id, e);
                Ok(RiskReport::placeholder(UNPARSED_RISK))
            }
        }
    }

    /// List non-standard clauses
    pub fn detect_abnormalities(&self, doc_id: &str) -> Result<Vec<String>> {
        if !self.engine.is_available(doc_id) {
            return Ok(vec![NO_DOCUMENT_MESSAGE.to_string()]);
        }
        let context = self.engine.context(doc_id, ABNORMALITY_QUERY)?;
        let raw = self.generator.generate(
            ABNORMALITY_PROMPT,
            &format!("Context:\n{}\n\nIdentify abnormalities.", context),
        )?;
        match parse_string_list(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                log::warn!("Abnormality response for {} not parsed: {}", doc_id, e);
                Ok(vec![UNPARSED_ABNORMALITIES.to_string()])
            }
        }
    }

    /// Formatted clauses about a topic; no LLM call
    pub fn clauses_for_topic(&self, doc_id: &str, topic: &str) -> Result<Vec<String>> {
        if !self.engine.is_available(doc_id) {
            return Ok(vec![NO_DOCUMENT_MESSAGE.to_string()]);
        }
        self.engine.clauses_for_topic(doc_id, topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_response_strips_fences() {
        let value = parse_json_response("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value["a"], 1);
        let value = parse_json_response("```\n[1, 2]\n```").unwrap();
        assert_eq!(value[1], 2);
        assert!(matches!(parse_json_response("Sure! Here it is"), Err(LeaseError::Parse(_))));
    }

    #[test]
    fn test_risk_report_parse() {
        let raw = r#"```json
        {
          "cash _flow_adjustments": {"score": 7, "explanation": "Triple net lease."},
          "future_cash_flow": {"score": 4, "explanation": "Short term, no escalations."},
          "inflation/interest_rate_exposure": {"score": 11, "explanation": "Out of range."},
          "use_and_exclusivity_clauses": {"score": 6, "explanation": "Broad permitted use."},
          "default_and_termination_clauses": {"score": 5, "explanation": "30 day cure."}
        }
        ```"#;
        let report = RiskReport::parse(raw).unwrap();
        assert_eq!(report.scores.len(), 6);

        let cash = report.get(RiskCategory::CashFlowAdjustments).unwrap();
        assert_eq!(cash.score, Some(7));
        assert_eq!(cash.explanation, "Triple net lease.");

        let inflation = report.get(RiskCategory::InflationInterestRateExposure).unwrap();
        assert_eq!(inflation.score, None);

        let collateral = report.get(RiskCategory::CollateralAndInsurance).unwrap();
        assert_eq!(collateral.score, None);
        assert_eq!(collateral.explanation, UNPARSED_RISK);
    }

    #[test]
    fn test_risk_report_rejects_non_object() {
        assert!(RiskReport::parse("[1, 2, 3]").is_err());
        let placeholder = RiskReport::placeholder(UNPARSED_RISK);
        assert!(placeholder.scores.iter().all(|s| s.score.is_none()));
    }

    #[test]
    fn test_parse_string_list() {
        assert_eq!(
            parse_string_list("[\"Clause 7 is unusual.\"]").unwrap(),
            vec!["Clause 7 is unusual.".to_string()]
        );
        assert!(parse_string_list("{\"a\": 1}").is_err());
        assert!(parse_string_list("[1]").is_err());
    }

    #[test]
    fn test_risk_prompt_names_every_category() {
        let prompt = risk_prompt();
        for category in RiskCategory::ALL {
            assert!(prompt.contains(category.key()));
        }
    }
}
