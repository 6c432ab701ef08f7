//! Value objects shared by the analyzer, the verification service and the
//! storage adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message id reported when the audit record could not be written.
pub const PENDING_MESSAGE_ID: &str = "pending";

// ── Consent level ────────────────────────────────────────────────

/// Classification of a message's consent signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentLevel {
    /// Clear affirmative signal.
    Explicit,
    /// Hedged or unclear signal; needs caution.
    Ambiguous,
    /// Refusal or stop signal.
    Negative,
    /// No consent signal at all.
    None,
}

impl ConsentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Ambiguous => "ambiguous",
            Self::Negative => "negative",
            Self::None => "none",
        }
    }

    /// Strict parse for user input; unknown names are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Some(Self::Explicit),
            "ambiguous" => Some(Self::Ambiguous),
            "negative" => Some(Self::Negative),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Parse stored values; anything unrecognized reads as `none`.
    pub fn from_str_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::None)
    }
}

impl fmt::Display for ConsentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Message type ─────────────────────────────────────────────────

/// Kind of message about to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    Voice,
    File,
    Document,
    Sticker,
    /// Anything the chat layer sends that we do not recognise.
    Other(String),
}

impl MessageType {
    /// Parse a caller-supplied type tag. Never fails; unknown tags become
    /// [`MessageType::Other`].
    pub fn parse(raw: &str) -> Self {
        let tag = raw.trim().to_lowercase();
        match tag.as_str() {
            "" | "text" | "txt" | "message" => Self::Text,
            "image" | "photo" | "picture" | "img" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "voice" | "voice_note" => Self::Voice,
            "file" => Self::File,
            "document" | "doc" => Self::Document,
            "sticker" => Self::Sticker,
            _ => Self::Other(tag),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::File => "file",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Other(tag) => tag,
        }
    }

    /// Media and attachment kinds always need explicit confirmation.
    /// Unrecognised kinds are treated as sensitive.
    pub fn is_sensitive(&self) -> bool {
        !matches!(self, Self::Text | Self::Sticker)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Suggested action ─────────────────────────────────────────────

/// Advisory label for the send flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    /// Clear consent and nothing sensitive.
    Allow,
    /// Ask the user to confirm before sending.
    Confirm,
    /// Signal unclear; a human should look.
    Review,
    /// Refusal detected; do not send.
    Block,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Confirm => "confirm",
            Self::Review => "review",
            Self::Block => "block",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "allow" => Self::Allow,
            "confirm" => Self::Confirm,
            "block" => Self::Block,
            _ => Self::Review,
        }
    }
}

// ── Analysis ─────────────────────────────────────────────────────

/// Optional knobs for a single `analyze` call.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub message_type: Option<MessageType>,
}

impl AnalyzeOptions {
    pub fn with_message_type(message_type: MessageType) -> Self {
        Self {
            message_type: Some(message_type),
        }
    }
}

/// Verdict produced by the analyzer for one message.
///
/// Built in one go by `ConsentAnalyzer::analyze` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentAnalysis {
    pub consent_level: ConsentLevel,
    /// Heuristic strength of the signal (0-100).
    pub confidence: u8,
    /// Matched trigger terms in discovery order.
    pub keywords: Vec<String>,
    /// Conversational context tag supplied by the caller.
    pub context: String,
    pub requires_confirmation: bool,
    pub suggested_action: SuggestedAction,
    /// Deterministic rationale naming the decisive rule.
    pub explanation: String,
    pub timestamp: DateTime<Utc>,
}

// ── Verification ─────────────────────────────────────────────────

/// Per-attempt lifecycle: `Pending → Analyzed → {Persisted | DegradedPersisted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Pending,
    Analyzed,
    /// Audit record written; `message_id` is a real identifier.
    Persisted,
    /// Audit write failed; `message_id` is [`PENDING_MESSAGE_ID`].
    DegradedPersisted,
}

/// Outcome handed back to the send flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentVerificationResult {
    /// Whether the send may proceed unattended.
    pub verified: bool,
    pub analysis: ConsentAnalysis,
    pub message_id: String,
    pub state: VerificationState,
}

impl ConsentVerificationResult {
    pub fn is_degraded(&self) -> bool {
        self.state == VerificationState::DegradedPersisted
    }
}

/// Analysis plus identity, as handed to `save_verification`.
///
/// `message_id` is a placeholder (usually empty) until a backend assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayload {
    #[serde(default)]
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub analysis: ConsentAnalysis,
    pub verified: bool,
}

/// Row written to the audit backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Backend-assigned id; `None` until written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender_id: String,
    pub recipient_id: String,
    pub message_type: String,
    pub context: String,
    pub consent_level: ConsentLevel,
    pub confidence: u8,
    pub keywords: Vec<String>,
    pub requires_confirmation: bool,
    pub suggested_action: SuggestedAction,
    pub explanation: String,
    pub verified: bool,
    pub analyzed_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// Flatten a payload into an unsaved audit row.
    pub fn from_payload(payload: &VerificationPayload) -> Self {
        let analysis = &payload.analysis;
        Self {
            id: None,
            sender_id: payload.sender_id.clone(),
            recipient_id: payload.recipient_id.clone(),
            message_type: payload.message_type.as_str().to_string(),
            context: analysis.context.clone(),
            consent_level: analysis.consent_level,
            confidence: analysis.confidence,
            keywords: analysis.keywords.clone(),
            requires_confirmation: analysis.requires_confirmation,
            suggested_action: analysis.suggested_action,
            explanation: analysis.explanation.clone(),
            verified: payload.verified,
            analyzed_at: analysis.timestamp,
            recorded_at: Utc::now(),
        }
    }
}
