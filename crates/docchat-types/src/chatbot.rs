//! Chatbots, their documents, settings and analytics.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatbot {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ChatbotSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<ChatbotAnalytics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Completed => write!(f, "completed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A source document uploaded to a chatbot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub chatbot_id: String,
    pub organization_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub chunks_count: u32,
    /// Null while the server is still processing the upload.
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSettings {
    pub primary_color: String,
    pub font_family: String,
    pub border_radius: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorSettings {
    pub welcome_message: String,
    pub placeholder: String,
    pub max_messages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSettings {
    pub typing: bool,
    pub timestamps: bool,
    pub file_upload: bool,
}

/// Widget appearance and behavior for a chatbot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatbotSettings {
    pub theme: ThemeSettings,
    pub behavior: BehaviorSettings,
    pub features: FeatureSettings,
}

/// Partial settings update; each section is replaced as a whole when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehaviorSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCount {
    pub question: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotAnalytics {
    pub total_messages: u64,
    pub total_sessions: u64,
    pub average_session_length: f64,
    pub satisfaction_score: f64,
    #[serde(default)]
    pub top_questions: Vec<QuestionCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub average_response_time: f64,
    pub total_messages: u64,
    pub unique_users: u64,
    pub satisfaction_score: f64,
    #[serde(default)]
    pub top_questions: Vec<QuestionCount>,
}

/// Snippets for embedding a chatbot widget in a web page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedCode {
    pub embed_code: String,
    pub iframe_code: String,
}

/// Reporting window for chatbot analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalyticsPeriod {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl AnalyticsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsPeriod::Week => "7d",
            AnalyticsPeriod::Month => "30d",
            AnalyticsPeriod::Quarter => "90d",
        }
    }
}

impl FromStr for AnalyticsPeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            _ => Err(format!("Unknown analytics period: {value} (expected 7d, 30d or 90d)")),
        }
    }
}

impl fmt::Display for AnalyticsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File format for chat history exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown export format: {value} (expected csv or json)")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
