//! Operation request types
//!
//! An `OperationRequest` is created once by the caller and consumed once by the
//! executor. All fields are private so a request cannot change after routing.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Maximum allowed payload length in characters
pub const MAX_PAYLOAD_CHARS: usize = 100_000;

/// Maximum total characters across all context keys and string values
pub const MAX_CONTEXT_CHARS: usize = 100_000;

/// Correlation id tying a request to its decisions, verdicts and outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the UUID value
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two backend execution paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Low-level model endpoint
    Direct,
    /// Intermediary path adding tool-calling and orchestration
    Broker,
}

impl Route {
    pub const ALL: [Route; 2] = [Route::Direct, Route::Broker];

    /// The other route
    pub fn alternate(self) -> Self {
        match self {
            Self::Direct => Self::Broker,
            Self::Broker => Self::Direct,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Broker => "broker",
        }
    }

    /// Stable index for per-route fixed-size tables
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Direct => 0,
            Self::Broker => 1,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "broker" => Ok(Self::Broker),
            other => Err(format!(
                "unknown route '{}', expected 'direct' or 'broker'",
                other
            )),
        }
    }
}

/// Latency tier governing the maximum wall-clock budget of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    Emergency,
    Critical,
    Standard,
    Background,
}

impl OperationClass {
    pub const ALL: [OperationClass; 4] = [
        OperationClass::Emergency,
        OperationClass::Critical,
        OperationClass::Standard,
        OperationClass::Background,
    ];

    /// Hard upper bound on the class budget
    pub fn max_budget(self) -> Duration {
        Duration::from_secs(match self {
            Self::Emergency => 5,
            Self::Critical => 10,
            Self::Standard => 30,
            Self::Background => 60,
        })
    }

    /// Budget for PII detection + redaction, which sits on the critical path
    pub fn redaction_budget(self) -> Duration {
        match self {
            Self::Emergency => Duration::from_millis(500),
            _ => Duration::from_secs(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Critical => "critical",
            Self::Standard => "standard",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    TimedOut,
    /// Compliance verdict denied the attempt; no backend call was made
    Denied,
    /// No route could be chosen (no rule, or both routes unavailable)
    Unroutable,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Denied => "denied",
            Self::Unroutable => "unroutable",
        }
    }
}

/// Request priority, the second half of the routing rule key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text plus structured context sent to a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    text: String,
    context: serde_json::Map<String, serde_json::Value>,
}

impl Payload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: serde_json::Map::new(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Map<String, serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.context
    }

    /// Enforce the size caps that keep PII scanning inside its budget
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the text or the context is too large.
    pub fn validate(&self) -> AppResult<()> {
        check_limits(&self.text, &self.context).map_err(AppError::Validation)
    }
}

fn check_limits(
    text: &str,
    context: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), String> {
    // Count Unicode characters, not bytes
    let char_count = text.chars().count();
    if char_count > MAX_PAYLOAD_CHARS {
        return Err(format!(
            "text exceeds maximum length of {} characters (got {})",
            MAX_PAYLOAD_CHARS, char_count
        ));
    }

    let context_chars = context
        .iter()
        .map(|(key, value)| key.chars().count() + value_chars(value))
        .sum::<usize>();
    if context_chars > MAX_CONTEXT_CHARS {
        return Err(format!(
            "context exceeds maximum size of {} characters (got {})",
            MAX_CONTEXT_CHARS, context_chars
        ));
    }
    Ok(())
}

/// Characters the PII scanner will look at inside a JSON value
fn value_chars(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::String(s) => s.chars().count(),
        serde_json::Value::Array(items) => items.iter().map(value_chars).sum(),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, value)| key.chars().count() + value_chars(value))
            .sum(),
        _ => 0,
    }
}

/// Inbound AI-support operation
#[derive(Debug, Clone)]
pub struct OperationRequest {
    id: CorrelationId,
    operation_class: OperationClass,
    priority: Priority,
    payload: Payload,
    required_region: Option<String>,
    consent_ref: Option<String>,
}

impl OperationRequest {
    /// Create a request with a fresh correlation id and normal priority
    pub fn new(operation_class: OperationClass, payload: Payload) -> Self {
        Self {
            id: CorrelationId::new(),
            operation_class,
            priority: Priority::default(),
            payload,
            required_region: None,
            consent_ref: None,
        }
    }

    pub fn with_id(mut self, id: CorrelationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_required_region(mut self, region: impl Into<String>) -> Self {
        self.required_region = Some(region.into());
        self
    }

    pub fn with_consent_ref(mut self, consent_ref: impl Into<String>) -> Self {
        self.consent_ref = Some(consent_ref.into());
        self
    }

    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn operation_class(&self) -> OperationClass {
        self.operation_class
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn required_region(&self) -> Option<&str> {
        self.required_region.as_deref()
    }

    pub fn consent_ref(&self) -> Option<&str> {
        self.consent_ref.as_deref()
    }
}

/// HTTP body for `POST /v1/operations`
///
/// Validation is enforced during deserialization - invalid instances cannot exist.
#[derive(Debug, Clone)]
pub struct OperationBody {
    operation_class: OperationClass,
    priority: Priority,
    text: String,
    context: serde_json::Map<String, serde_json::Value>,
    required_region: Option<String>,
    consent_ref: Option<String>,
}

impl OperationBody {
    /// Bind the body to a correlation id, producing the immutable request
    pub fn into_request(self, id: CorrelationId) -> OperationRequest {
        let mut request = OperationRequest::new(
            self.operation_class,
            Payload::new(self.text).with_context(self.context),
        )
        .with_id(id)
        .with_priority(self.priority);
        request.required_region = self.required_region;
        request.consent_ref = self.consent_ref;
        request
    }
}

impl<'de> Deserialize<'de> for OperationBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawOperationBody {
            operation_class: OperationClass,
            #[serde(default)]
            priority: Priority,
            text: String,
            #[serde(default)]
            context: serde_json::Map<String, serde_json::Value>,
            #[serde(default)]
            required_region: Option<String>,
            #[serde(default)]
            consent_ref: Option<String>,
        }

        let raw = RawOperationBody::deserialize(deserializer)?;

        if raw.text.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "text cannot be empty or contain only whitespace",
            ));
        }

        check_limits(&raw.text, &raw.context).map_err(serde::de::Error::custom)?;

        if let Some(region) = &raw.required_region
            && region.trim().is_empty()
        {
            return Err(serde::de::Error::custom(
                "required_region cannot be empty when provided",
            ));
        }

        Ok(OperationBody {
            operation_class: raw.operation_class,
            priority: raw.priority,
            text: raw.text,
            context: raw.context,
            required_region: raw.required_region,
            consent_ref: raw.consent_ref,
        })
    }
}
