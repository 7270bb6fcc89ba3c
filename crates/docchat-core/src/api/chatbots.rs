//! Chatbot, document, chat and analytics endpoints.

use std::path::{Path, PathBuf};

use docchat_types::{
    AnalyticsPeriod, ChatHistoryPage, ChatReply, Chatbot, ChatbotAnalytics, ChatbotForm,
    ChatbotPatch, ChatbotSettings, Document, EmbedCode, ExportFormat, HistoryQuery,
    PerformanceMetrics, SettingsPatch, TestResult,
};
use serde::de::IgnoredAny;
use serde_json::json;

use super::{ApiClient, ApiRequest, ApiResult, ProgressFn, UploadFile, segment};

/// Multipart field the document endpoint reads.
pub const DOCUMENT_FIELD: &str = "pdf";

pub struct ChatbotsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ChatbotsApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ApiResult<Vec<Chatbot>> {
        self.client.get("/api/chatbots").await?.into_data()
    }

    pub async fn get(&self, id: &str) -> ApiResult<Chatbot> {
        self.client
            .get(&format!("/api/chatbots/{}", segment(id)))
            .await?
            .into_data()
    }

    pub async fn create(&self, form: &ChatbotForm) -> ApiResult<Chatbot> {
        self.client.post("/api/chatbots", form).await?.into_data()
    }

    pub async fn update(&self, id: &str, patch: &ChatbotPatch) -> ApiResult<Chatbot> {
        self.client
            .put(&format!("/api/chatbots/{}", segment(id)), patch)
            .await?
            .into_data()
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        self.client
            .delete::<IgnoredAny>(&format!("/api/chatbots/{}", segment(id)))
            .await?;
        Ok(())
    }

    /// Flips the active flag and returns the updated chatbot.
    pub async fn toggle(&self, id: &str) -> ApiResult<Chatbot> {
        self.client
            .request(ApiRequest::patch(format!(
                "/api/chatbots/{}/toggle",
                segment(id)
            )))
            .await?
            .into_data()
    }

    pub async fn clone_chatbot(&self, id: &str, name: &str) -> ApiResult<Chatbot> {
        self.client
            .post(
                &format!("/api/chatbots/{}/clone", segment(id)),
                &json!({ "name": name }),
            )
            .await?
            .into_data()
    }

    pub async fn documents(&self, chatbot_id: &str) -> ApiResult<Vec<Document>> {
        self.client
            .get(&format!("/api/chatbots/{}/documents", segment(chatbot_id)))
            .await?
            .into_data()
    }

    pub async fn upload_document(
        &self,
        chatbot_id: &str,
        file: UploadFile,
        progress: Option<ProgressFn>,
    ) -> ApiResult<Document> {
        self.client
            .upload_multiple(
                &format!("/api/chatbots/{}/documents", segment(chatbot_id)),
                vec![file],
                Some(DOCUMENT_FIELD),
                progress,
            )
            .await?
            .into_data()
    }

    pub async fn delete_document(&self, document_id: &str) -> ApiResult<()> {
        self.client
            .delete::<IgnoredAny>(&format!("/api/documents/{}", segment(document_id)))
            .await?;
        Ok(())
    }

    pub async fn embed_code(&self, chatbot_id: &str) -> ApiResult<EmbedCode> {
        self.client
            .get(&format!("/api/chatbots/{}/embed-code", segment(chatbot_id)))
            .await?
            .into_data()
    }

    pub async fn chat(&self, chatbot_id: &str, message: &str) -> ApiResult<ChatReply> {
        self.client
            .post(
                &format!("/api/chat/{}", segment(chatbot_id)),
                &json!({ "message": message }),
            )
            .await?
            .into_data()
    }

    pub async fn settings(&self, chatbot_id: &str) -> ApiResult<ChatbotSettings> {
        self.client
            .get(&format!("/api/chatbots/{}/settings", segment(chatbot_id)))
            .await?
            .into_data()
    }

    pub async fn update_settings(
        &self,
        chatbot_id: &str,
        patch: &SettingsPatch,
    ) -> ApiResult<ChatbotSettings> {
        self.client
            .put(
                &format!("/api/chatbots/{}/settings", segment(chatbot_id)),
                patch,
            )
            .await?
            .into_data()
    }

    pub async fn analytics(
        &self,
        chatbot_id: &str,
        period: AnalyticsPeriod,
    ) -> ApiResult<ChatbotAnalytics> {
        let path = format!("/api/chatbots/{}/analytics", segment(chatbot_id));
        let request = ApiRequest::get(path).query("period", period.as_str());
        self.client.request(request).await?.into_data()
    }

    pub async fn history(
        &self,
        chatbot_id: &str,
        query: &HistoryQuery,
    ) -> ApiResult<ChatHistoryPage> {
        let request = query.to_pairs().into_iter().fold(
            ApiRequest::get(format!("/api/chatbots/{}/history", segment(chatbot_id))),
            |request, (key, value)| request.query(key, value),
        );
        self.client.request(request).await?.into_data()
    }

    /// Saves the chat history export into `dir` as
    /// `chatbot-<id>-history.<format>`.
    pub async fn export_history(
        &self,
        chatbot_id: &str,
        format: ExportFormat,
        dir: &Path,
    ) -> ApiResult<PathBuf> {
        let path = format!("/api/chatbots/{}/export", segment(chatbot_id));
        let request = ApiRequest::get(path).query("format", format.as_str());
        let filename = export_file_name(chatbot_id, format);
        self.client.download(request, dir, Some(&filename)).await
    }

    pub async fn test_chatbot(&self, chatbot_id: &str, message: &str) -> ApiResult<TestResult> {
        self.client
            .post(
                &format!("/api/chatbots/{}/test", segment(chatbot_id)),
                &json!({ "message": message }),
            )
            .await?
            .into_data()
    }

    pub async fn performance_metrics(&self, chatbot_id: &str) -> ApiResult<PerformanceMetrics> {
        self.client
            .get(&format!("/api/chatbots/{}/metrics", segment(chatbot_id)))
            .await?
            .into_data()
    }
}

pub fn export_file_name(chatbot_id: &str, format: ExportFormat) -> String {
    format!("chatbot-{chatbot_id}-history.{}", format.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_file_name() {
        assert_eq!(
            export_file_name("c42", ExportFormat::Json),
            "chatbot-c42-history.json"
        );
        assert_eq!(
            export_file_name("c42", ExportFormat::default()),
            "chatbot-c42-history.csv"
        );
    }
}
