//! Wire types shared by the docchat client and CLI.
//!
//! Field names follow the server's camelCase JSON. Partial-update patches
//! serialize only the fields that are set, so they double as request bodies.

pub mod chat;
pub mod chatbot;
pub mod forms;
pub mod identity;

pub use chat::{
    ChatHistoryPage, ChatReply, HistoryMessage, HistoryQuery, MessageMetadata, Sender, TestResult,
};
pub use chatbot::{
    AnalyticsPeriod, BehaviorSettings, Chatbot, ChatbotAnalytics, ChatbotSettings, Document,
    DocumentStatus, EmbedCode, ExportFormat, FeatureSettings, PerformanceMetrics, QuestionCount,
    SettingsPatch, ThemeSettings,
};
pub use forms::{
    ChangePasswordForm, ChatbotForm, ChatbotPatch, LoginForm, RegisterForm, ResetPasswordForm,
};
pub use identity::{
    ActiveSession, AuthPayload, Organization, OrganizationPatch, Profile, ProfilePatch,
    RefreshedToken, Role, TwoFactorSetup, User, UserPatch,
};
