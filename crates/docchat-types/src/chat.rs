//! Chat replies and conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Answer from `POST /api/chat/:chatbotId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    /// Server-side processing time in milliseconds.
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// Result of a dry-run message sent through `/test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub response: String,
    pub processing_time: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryPage {
    pub messages: Vec<HistoryMessage>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
}

/// Pagination and filters for `GET /api/chatbots/:id/history`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl HistoryQuery {
    /// Query-string pairs for the set filters, in a stable order.
    ///
    /// Zero page/limit values and empty strings are skipped.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page.filter(|p| *p > 0) {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            pairs.push(("limit", limit.to_string()));
        }
        let text_filters = [
            ("search", &self.search),
            ("startDate", &self.start_date),
            ("endDate", &self.end_date),
        ];
        for (key, value) in text_filters {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                pairs.push((key, value.to_string()));
            }
        }
        pairs
    }
}
