//! `/api/auth` endpoints.
//!
//! These only talk to the server. Callers decide what goes into the
//! session store (e.g. `set_auth` after a successful login).

use docchat_types::{
    ActiveSession, AuthPayload, ChangePasswordForm, LoginForm, Profile, RefreshedToken,
    RegisterForm, ResetPasswordForm, TwoFactorSetup, UserPatch,
};
use serde::de::IgnoredAny;
use serde_json::json;

use super::{ApiClient, ApiRequest, ApiResult, segment};

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(super) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn register(&self, form: &RegisterForm) -> ApiResult<AuthPayload> {
        self.client
            .post("/api/auth/register", form)
            .await?
            .into_data()
    }

    pub async fn login(&self, form: &LoginForm) -> ApiResult<AuthPayload> {
        self.client
            .post("/api/auth/login", form)
            .await?
            .into_data()
    }

    pub async fn logout(&self) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/logout")).await
    }

    pub async fn refresh_token(&self) -> ApiResult<RefreshedToken> {
        self.client
            .request(ApiRequest::post("/api/auth/refresh"))
            .await?
            .into_data()
    }

    pub async fn change_password(&self, form: &ChangePasswordForm) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/change-password").json_body(form)?)
            .await
    }

    pub async fn forgot_password(&self, email: &str) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/forgot-password").json(json!({ "email": email })))
            .await
    }

    pub async fn reset_password(&self, form: &ResetPasswordForm) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/reset-password").json_body(form)?)
            .await
    }

    pub async fn verify_email(&self, token: &str) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/verify-email").json(json!({ "token": token })))
            .await
    }

    pub async fn resend_verification(&self) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/resend-verification"))
            .await
    }

    pub async fn get_profile(&self) -> ApiResult<Profile> {
        self.client.get("/api/auth/profile").await?.into_data()
    }

    pub async fn update_profile(&self, patch: &UserPatch) -> ApiResult<Profile> {
        self.client
            .put("/api/auth/profile", patch)
            .await?
            .into_data()
    }

    pub async fn enable_2fa(&self) -> ApiResult<TwoFactorSetup> {
        self.client
            .request(ApiRequest::post("/api/auth/2fa/enable"))
            .await?
            .into_data()
    }

    pub async fn verify_2fa(&self, token: &str) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/2fa/verify").json(json!({ "token": token })))
            .await
    }

    pub async fn disable_2fa(&self, token: &str) -> ApiResult<()> {
        self.ack(ApiRequest::post("/api/auth/2fa/disable").json(json!({ "token": token })))
            .await
    }

    pub async fn sessions(&self) -> ApiResult<Vec<ActiveSession>> {
        self.client.get("/api/auth/sessions").await?.into_data()
    }

    pub async fn revoke_session(&self, session_id: &str) -> ApiResult<()> {
        let path = format!("/api/auth/sessions/{}", segment(session_id));
        self.ack(ApiRequest::delete(path)).await
    }

    pub async fn revoke_all_sessions(&self) -> ApiResult<()> {
        self.ack(ApiRequest::delete("/api/auth/sessions")).await
    }

    /// Sends a request whose response carries no payload we use.
    async fn ack(&self, request: ApiRequest) -> ApiResult<()> {
        self.client.request::<IgnoredAny>(request).await?;
        Ok(())
    }
}
