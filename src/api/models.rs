//! API request and response models.
//!
//! Inbound bodies are typed records validated at the boundary by their
//! `validate` methods; nothing reaches the upstream client unvalidated.

use crate::core::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use utoipa::ToSchema;

/// Temperature used when a request does not set one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Accepted sampling temperature range.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=2.0;

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a role name, returning `None` for anything outside the three known roles.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"role": "user", "content": "Hello!"}))]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Check sampling parameters shared by every endpoint.
pub fn validate_sampling(temperature: Option<f64>, max_tokens: Option<u32>) -> Result<()> {
    if let Some(temperature) = temperature {
        if !TEMPERATURE_RANGE.contains(&temperature) {
            return Err(AppError::BadRequest(format!(
                "temperature must be between {} and {}, got {}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end(),
                temperature
            )));
        }
    }
    if max_tokens == Some(0) {
        return Err(AppError::BadRequest(
            "max_tokens must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "messages": [
        {"role": "system", "content": "You are a helpful assistant."},
        {"role": "user", "content": "Hello!"}
    ],
    "temperature": 0.7,
    "stream": false
}))]
pub struct ChatCompletionRequest {
    /// Message history, oldest first
    pub messages: Vec<Message>,

    /// Model to use, defaults to the configured model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatCompletionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(AppError::BadRequest(
                "messages must contain at least one message".to_string(),
            ));
        }
        validate_sampling(self.temperature, self.max_tokens)
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// Token usage statistics as reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}))]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Non-streaming chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatCompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
}

/// Treatment plan as supplied with a domain chat request. Both fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TreatmentPlanInput {
    #[serde(default)]
    pub treatment_type: Option<String>,
    #[serde(default)]
    pub treatment_detail: Option<String>,
}

/// Medication as supplied with a domain chat request. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MedicationInput {
    #[serde(default)]
    pub medication_name: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub side_effects: Option<String>,
}

/// Earlier conversation turn. Turns with an unknown role or blank content are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PriorTurn {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl PriorTurn {
    /// Convert to a message if the turn is a non-empty user or assistant turn.
    pub fn to_message(&self) -> Option<Message> {
        let role = Role::parse(self.role.as_deref()?)?;
        let content = self.content.as_deref()?;
        if role == Role::System || content.trim().is_empty() {
            return None;
        }
        Some(Message::new(role, content))
    }
}

/// Structured medical-record chat request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "disease_name": "糖尿病视网膜病变",
    "disease_category": "视网膜疾病",
    "result": "轻度糖尿病视网膜病变，建议定期复查，控制血糖。",
    "remark": "患者需要定期监测血糖和眼部状况",
    "treatment_plan": {"treatment_detail": "每天使用人工泪液，定期复查"},
    "medications": [{"medication_name": "人工泪液", "dosage": "每次1-2滴", "frequency": "每天4次"}],
    "question": "这个药有什么副作用？",
    "stream": false
}))]
pub struct DomainChatRequest {
    /// Name of the diagnosed disease
    pub disease_name: String,
    /// Category of the disease
    pub disease_category: String,
    /// Examination result
    pub result: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub treatment_plan: Option<TreatmentPlanInput>,
    #[serde(default)]
    pub medications: Option<Vec<MedicationInput>>,
    #[serde(default)]
    pub previous_conversations: Option<Vec<PriorTurn>>,
    /// Patient's question
    pub question: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl DomainChatRequest {
    pub fn validate(&self) -> Result<()> {
        require_non_blank("disease_name", &self.disease_name)?;
        require_non_blank("disease_category", &self.disease_category)?;
        require_non_blank("result", &self.result)?;
        require_non_blank("question", &self.question)?;
        validate_sampling(self.temperature, self.max_tokens)
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// A reference scraped from the tail of a model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Citation {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

/// Non-streaming domain chat response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainChatResponse {
    pub response_id: String,
    pub content: String,
    pub references: Vec<Citation>,
    /// UTC timestamp, RFC 3339
    pub created_at: String,
}

/// One event of a streaming domain chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DomainChatChunk {
    pub response_id: String,
    /// 1-based position within the stream
    pub chunk_index: u64,
    pub content: String,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Patient demographics for recommendation requests.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatientInfo {
    pub name: String,
    pub sex: String,
    pub age: u32,
}

/// Structured diagnosis + patient request for treatment recommendations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "disease_name": "糖尿病视网膜病变",
    "disease_category": "视网膜疾病",
    "result": "轻度糖尿病视网膜病变",
    "patient_info": {"name": "张三", "sex": "男", "age": 21},
    "stream": false
}))]
pub struct RecommendationRequest {
    pub disease_name: String,
    pub disease_category: String,
    pub result: String,
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl RecommendationRequest {
    pub fn validate(&self) -> Result<()> {
        require_non_blank("disease_name", &self.disease_name)?;
        require_non_blank("disease_category", &self.disease_category)?;
        require_non_blank("result", &self.result)?;
        validate_sampling(self.temperature, self.max_tokens)
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// A recommended medication. `side_effects` must be present as a key but may be null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Medication {
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub side_effects: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TreatmentPlan {
    pub treatment_type: String,
    pub treatment_detail: String,
}

/// Validated treatment recommendation decoded from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Recommendation {
    pub medications: Vec<Medication>,
    pub treatment_plan: TreatmentPlan,
}

/// Error response for API errors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": {
        "message": "temperature must be between 0 and 2, got 3",
        "type": "invalid_request_error",
        "code": 400
    }
}))]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Error detail in API error responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: u16,
}

/// Liveness payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"status": "ok"}))]
pub struct HealthResponse {
    pub status: String,
}
