//! AI delegate
//!
//! The external model service behind the AI node handlers. A delegate
//! turns an [`AiRequest`] into raw model text; the functions in this
//! module parse that text into typed records. Model output wrapped in
//! markdown code fences is unwrapped before parsing, and anything that
//! still fails to parse becomes [`DelegateError::Malformed`].

use std::time::Duration;

use apex_engine::{descriptor, EngineError, WorkflowDefinition, WorkflowGraph};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Delegate failures
#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("AI delegate is not configured")]
    NotConfigured,

    #[error("AI delegate request failed: {0}")]
    Transport(String),

    #[error("AI delegate returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed AI response: {0}")]
    Malformed(String),
}

impl From<DelegateError> for EngineError {
    fn from(e: DelegateError) -> Self {
        EngineError::delegate(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AiOperation {
    AnalyzeDocument,
    EvaluateNecessity,
    DetectAnomaly,
    GenerateWorkflow,
    Chat,
}

/// One call to the delegate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub operation: AiOperation,
    pub payload: Value,
}

impl AiRequest {
    pub fn analyze_document(content: &str, fields: &[String]) -> Self {
        Self {
            operation: AiOperation::AnalyzeDocument,
            payload: json!({ "content": content, "fields": fields }),
        }
    }

    pub fn evaluate_necessity(claim: &Value, guidelines: &str) -> Self {
        Self {
            operation: AiOperation::EvaluateNecessity,
            payload: json!({ "claim": claim, "guidelines": guidelines }),
        }
    }

    pub fn detect_anomaly(claim: &Value, benchmarks: &str) -> Self {
        Self {
            operation: AiOperation::DetectAnomaly,
            payload: json!({ "claim": claim, "benchmarks": benchmarks }),
        }
    }

    pub fn generate_workflow(description: &str) -> Self {
        Self {
            operation: AiOperation::GenerateWorkflow,
            payload: json!({ "description": description }),
        }
    }

    pub fn chat(message: &str, context: Option<&str>) -> Self {
        Self {
            operation: AiOperation::Chat,
            payload: json!({ "message": message, "context": context }),
        }
    }

    fn text(&self, key: &str) -> String {
        match self.payload.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }

    /// Render the model prompt for this request
    pub fn prompt(&self) -> String {
        const JSON_ONLY: &str = "Return ONLY valid JSON, no markdown or explanation.";
        match self.operation {
            AiOperation::AnalyzeDocument => {
                let fields: Vec<String> = self
                    .payload
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|fields| {
                        fields
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|f| format!("- {}", f))
                            .collect()
                    })
                    .unwrap_or_default();
                format!(
                    "Analyze the following healthcare document and extract these fields:\n{}\n\n\
                     Document content:\n{}\n\n\
                     Respond with a JSON object containing the extracted fields. \
                     Use null for fields that cannot be determined.\n{}",
                    fields.join("\n"),
                    self.text("content"),
                    JSON_ONLY
                )
            }
            AiOperation::EvaluateNecessity => format!(
                "You are a medical necessity reviewer for healthcare claims. Evaluate the following \
                 claim based on the provided clinical guidelines.\n\n\
                 Claim Data:\n{}\n\nClinical Guidelines:\n{}\n\n\
                 Provide your evaluation as a JSON object:\n\
                 {{\"decision\": \"approve\" | \"deny\" | \"review\", \"confidence\": 0.0 to 1.0, \
                 \"reasoning\": \"...\", \"factors\": [{{\"factor\": \"...\", \
                 \"impact\": \"positive\" | \"negative\" | \"neutral\", \"weight\": 0.0 to 1.0}}], \
                 \"suggestedActions\": [\"...\"]}}\n\n\
                 Be conservative - recommend \"review\" for uncertain cases.\n{}",
                self.text("claim"),
                self.text("guidelines"),
                JSON_ONLY
            ),
            AiOperation::DetectAnomaly => format!(
                "You are a fraud detection analyst for healthcare claims. Analyze the following claim \
                 for anomalies or suspicious patterns.\n\n\
                 Current Claim:\n{}\n\nHistorical Patterns & Benchmarks:\n{}\n\n\
                 Provide your analysis as a JSON object:\n\
                 {{\"isAnomaly\": true | false, \"score\": 0.0 to 1.0, \
                 \"patterns\": [{{\"type\": \"...\", \"description\": \"...\", \
                 \"severity\": \"low\" | \"medium\" | \"high\" | \"critical\"}}], \
                 \"recommendation\": \"...\"}}\n{}",
                self.text("claim"),
                self.text("benchmarks"),
                JSON_ONLY
            ),
            AiOperation::GenerateWorkflow => {
                let node_types: Vec<String> = descriptor::catalog()
                    .iter()
                    .map(|m| format!("{}: {} - {}", m.node_type, m.label, m.description))
                    .collect();
                format!(
                    "You are an expert healthcare workflow designer. Based on the following description, \
                     generate a workflow structure for a healthcare claims/benefits administration system.\n\n\
                     Available node types:\n{}\n\nUser request: \"{}\"\n\n\
                     Respond with a JSON object: {{\"name\": \"...\", \"description\": \"...\", \
                     \"nodes\": [{{\"id\": \"...\", \"type\": \"nodeType from list above\", \
                     \"position\": {{\"x\": 0, \"y\": 0}}, \"data\": {{\"label\": \"...\", \
                     \"nodeType\": \"same as type\", \"config\": {{}}}}}}], \
                     \"edges\": [{{\"id\": \"...\", \"source\": \"...\", \"target\": \"...\", \
                     \"sourceHandle\": \"true | false (branching nodes only)\"}}]}}\n\n\
                     Space nodes ~250px apart horizontally, ~150px vertically. Only use valid node types \
                     from the list. Include appropriate HITL checkpoints for human oversight.\n{}",
                    node_types.join("\n"),
                    self.text("description"),
                    JSON_ONLY
                )
            }
            AiOperation::Chat => {
                let context = self.text("context");
                format!(
                    "You are an AI assistant helping users build healthcare claims and benefits workflows.\n{}\n\n\
                     User message: \"{}\"\n\n\
                     Provide a helpful, concise response. For complex requests, break down the steps clearly.",
                    context,
                    self.text("message")
                )
            }
        }
    }
}

/// External model service
#[async_trait]
pub trait AiDelegate: Send + Sync {
    /// Raw model text for a request
    async fn complete(&self, request: &AiRequest) -> Result<String, DelegateError>;
}

/// One factor weighed in a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationFactor {
    pub factor: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Medical-necessity verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRecommendation {
    /// `approve`, `deny` or `review`
    pub decision: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub factors: Vec<RecommendationFactor>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

impl AiRecommendation {
    pub fn is_approval(&self) -> bool {
        self.decision.eq_ignore_ascii_case("approve")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyPattern {
    #[serde(rename = "type", default)]
    pub pattern_type: String,
    pub description: String,
    #[serde(default)]
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyDetection {
    pub is_anomaly: bool,
    /// Higher is more suspicious
    pub score: f64,
    #[serde(default)]
    pub patterns: Vec<AnomalyPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Workflow drafted from a natural-language description
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedWorkflow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub graph: WorkflowGraph,
}

impl GeneratedWorkflow {
    /// Wrap as a draft definition
    pub fn into_definition(self) -> WorkflowDefinition {
        let name = if self.name.trim().is_empty() {
            "Generated workflow".to_string()
        } else {
            self.name
        };
        WorkflowDefinition::new(name, self.description).with_graph(self.graph)
    }
}

/// Unwrap model text from a surrounding markdown code fence
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) along with the opening fence
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest.trim_start_matches("json"),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse model text as JSON of type `T`
pub fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, DelegateError> {
    serde_json::from_str(strip_code_fences(text)).map_err(|e| {
        log::warn!("Unparseable AI response ({}): {:.200}", e, text);
        DelegateError::Malformed(e.to_string())
    })
}

/// Extract the requested fields from a document; absent fields are null
pub async fn analyze_document(
    delegate: &dyn AiDelegate,
    content: &str,
    fields: &[String],
) -> Result<Map<String, Value>, DelegateError> {
    let text = delegate.complete(&AiRequest::analyze_document(content, fields)).await?;
    let mut extracted: Map<String, Value> = parse_response(&text)?;
    for field in fields {
        extracted.entry(field.clone()).or_insert(Value::Null);
    }
    Ok(extracted)
}

pub async fn evaluate_necessity(
    delegate: &dyn AiDelegate,
    claim: &Value,
    guidelines: &str,
) -> Result<AiRecommendation, DelegateError> {
    let text = delegate
        .complete(&AiRequest::evaluate_necessity(claim, guidelines))
        .await?;
    parse_response(&text)
}

pub async fn detect_anomaly(
    delegate: &dyn AiDelegate,
    claim: &Value,
    benchmarks: &str,
) -> Result<AnomalyDetection, DelegateError> {
    let text = delegate.complete(&AiRequest::detect_anomaly(claim, benchmarks)).await?;
    parse_response(&text)
}

/// Draft a workflow graph from a description
///
/// Unknown node types are kept so validation can report them.
pub async fn generate_workflow(delegate: &dyn AiDelegate, description: &str) -> Result<GeneratedWorkflow, DelegateError> {
    let text = delegate.complete(&AiRequest::generate_workflow(description)).await?;
    let generated: GeneratedWorkflow = parse_response(&text)?;
    log::info!(
        "Generated workflow '{}' with {} nodes and {} edges",
        generated.name,
        generated.graph.nodes.len(),
        generated.graph.edges.len()
    );
    Ok(generated)
}

pub async fn chat(delegate: &dyn AiDelegate, message: &str, context: Option<&str>) -> Result<String, DelegateError> {
    let text = delegate.complete(&AiRequest::chat(message, context)).await?;
    Ok(text.trim().to_string())
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for [`HttpAiDelegate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DelegateConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Delegate backed by a `generateContent` HTTP endpoint
pub struct HttpAiDelegate {
    client: reqwest::Client,
    config: DelegateConfig,
}

impl HttpAiDelegate {
    pub fn new(config: DelegateConfig) -> Result<Self, DelegateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DelegateError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl AiDelegate for HttpAiDelegate {
    async fn complete(&self, request: &AiRequest) -> Result<String, DelegateError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(DelegateError::NotConfigured)?;

        let url = self.url();
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt() }] }]
        });

        log::debug!(
            "Sending {:?} request to {} (model '{}')",
            request.operation,
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DelegateError::Transport(format!("{}: {}", self.config.endpoint, e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DelegateError::Status { status, body });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| DelegateError::Malformed(e.to_string()))?;
        parsed
            .text()
            .ok_or_else(|| DelegateError::Malformed("response contained no candidate text".to_string()))
    }
}
