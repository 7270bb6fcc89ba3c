//! Sign-in, account and device-session commands.

use anyhow::{Context, Result};
use docchat_core::logging::mask_token;
use docchat_types::{
    AuthPayload, ChangePasswordForm, LoginForm, Profile, ProfilePatch, RegisterForm,
    ResetPasswordForm, UserPatch,
};
use serde_json::json;

use super::{password_or_prompt, print_json};
use crate::cli::App;

pub async fn login(app: &App, email: &str, password: Option<String>) -> Result<()> {
    let form = LoginForm {
        email: email.to_string(),
        password: password_or_prompt(password)?,
    };
    let payload = app.client.auth().login(&form).await?;
    sign_in(app, payload)
}

pub async fn register(
    app: &App,
    full_name: String,
    email: String,
    organization_name: String,
    password: Option<String>,
) -> Result<()> {
    let form = RegisterForm {
        full_name,
        email,
        password: password_or_prompt(password)?,
        organization_name,
    };
    let payload = app.client.auth().register(&form).await?;
    sign_in(app, payload)
}

fn sign_in(app: &App, payload: AuthPayload) -> Result<()> {
    let email = payload.user.email.clone();
    let organization = payload.organization.name.clone();
    tracing::debug!(token = %mask_token(&payload.token), "Signed in");
    app.session.set_auth(payload).context("save session")?;
    println!("✓ Logged in as {email} ({organization})");
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    if !app.session.is_authenticated() {
        println!("Not logged in.");
        return Ok(());
    }
    // The local session goes away even if the server call fails.
    if let Err(err) = app.client.auth().logout().await {
        tracing::warn!(error = %err, "Server logout failed");
    }
    app.session.clear_auth().context("clear saved session")?;
    println!("✓ Logged out");
    Ok(())
}

pub fn whoami(app: &App) -> Result<()> {
    let session = app.session.snapshot();
    if !session.is_authenticated() {
        println!("Not logged in.");
        return Ok(());
    }
    if app.json {
        return print_json(&json!({
            "user": session.user,
            "organization": session.organization,
            "profile": session.profile,
        }));
    }

    if let Some(user) = &session.user {
        println!("{} <{}>", user.full_name, user.email);
    }
    if let Some(organization) = &session.organization {
        println!("Organization: {} ({})", organization.name, organization.slug);
    }
    if let Some(profile) = &session.profile {
        println!("Role: {}", profile.role);
    }
    Ok(())
}

pub async fn profile(app: &App) -> Result<()> {
    let profile = app.client.auth().get_profile().await?;
    app.session
        .update_profile(profile_patch(&profile))
        .context("save profile")?;
    if app.json {
        return print_json(&profile);
    }
    println!("{} <{}>", profile.full_name, profile.email);
    println!("Role: {}", profile.role);
    if let Some(organization) = &profile.organization {
        println!("Organization: {}", organization.name);
    }
    Ok(())
}

pub async fn update_profile(
    app: &App,
    full_name: Option<String>,
    avatar: Option<String>,
) -> Result<()> {
    if full_name.is_none() && avatar.is_none() {
        anyhow::bail!("Nothing to update: pass --name and/or --avatar");
    }
    let patch = UserPatch {
        full_name,
        avatar,
        ..UserPatch::default()
    };
    let profile = app.client.auth().update_profile(&patch).await?;
    app.session
        .update_user(patch)
        .context("save user")?;
    app.session
        .update_profile(profile_patch(&profile))
        .context("save profile")?;
    println!("✓ Profile updated");
    Ok(())
}

fn profile_patch(profile: &Profile) -> ProfilePatch {
    ProfilePatch {
        role: Some(profile.role),
        email: Some(profile.email.clone()),
        full_name: Some(profile.full_name.clone()),
        avatar: profile.avatar.clone(),
        updated_at: Some(profile.updated_at),
    }
}

pub async fn refresh(app: &App) -> Result<()> {
    let session = app.session.snapshot();
    let (Some(user), Some(organization), Some(profile)) =
        (session.user, session.organization, session.profile)
    else {
        anyhow::bail!("Not logged in. Run `docchat login` first.");
    };

    let refreshed = app.client.auth().refresh_token().await?;
    app.session
        .set_auth(AuthPayload {
            user,
            organization,
            profile,
            token: refreshed.token,
        })
        .context("save refreshed token")?;
    println!("✓ Token refreshed");
    Ok(())
}

pub async fn change_password(app: &App, current: String, new: String) -> Result<()> {
    let form = ChangePasswordForm {
        current_password: current,
        new_password: new,
    };
    app.client.auth().change_password(&form).await?;
    println!("✓ Password changed");
    Ok(())
}

pub async fn forgot_password(app: &App, email: &str) -> Result<()> {
    app.client.auth().forgot_password(email).await?;
    println!("If {email} has an account, a reset link is on its way.");
    Ok(())
}

pub async fn reset_password(app: &App, token: String, password: String) -> Result<()> {
    app.client
        .auth()
        .reset_password(&ResetPasswordForm { token, password })
        .await?;
    println!("✓ Password reset. You can now log in.");
    Ok(())
}

pub async fn verify_email(app: &App, token: &str) -> Result<()> {
    app.client.auth().verify_email(token).await?;
    println!("✓ Email verified");
    Ok(())
}

pub async fn resend_verification(app: &App) -> Result<()> {
    app.client.auth().resend_verification().await?;
    println!("Verification email sent.");
    Ok(())
}

pub async fn enable_2fa(app: &App) -> Result<()> {
    let setup = app.client.auth().enable_2fa().await?;
    if app.json {
        return print_json(&setup);
    }
    println!("Add this secret to your authenticator app:");
    println!("  {}", setup.secret);
    println!();
    println!("Then confirm with `docchat account 2fa verify <code>`.");
    Ok(())
}

pub async fn verify_2fa(app: &App, code: &str) -> Result<()> {
    app.client.auth().verify_2fa(code).await?;
    println!("✓ Two-factor authentication enabled");
    Ok(())
}

pub async fn disable_2fa(app: &App, code: &str) -> Result<()> {
    app.client.auth().disable_2fa(code).await?;
    println!("✓ Two-factor authentication disabled");
    Ok(())
}

pub async fn sessions(app: &App) -> Result<()> {
    let sessions = app.client.auth().sessions().await?;
    if app.json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        println!("No active sessions.");
    }
    for session in sessions {
        let marker = if session.current { "  (this device)" } else { "" };
        println!(
            "{}  {}  {}  {}{}",
            session.id, session.device, session.location, session.last_active, marker
        );
    }
    Ok(())
}

pub async fn revoke(app: &App, id: Option<&str>, all: bool) -> Result<()> {
    match (id, all) {
        (_, true) => {
            app.client.auth().revoke_all_sessions().await?;
            println!("✓ Signed out all devices");
        }
        (Some(id), false) => {
            app.client.auth().revoke_session(id).await?;
            println!("✓ Revoked session {id}");
        }
        (None, false) => anyhow::bail!("Pass a session id or --all"),
    }
    Ok(())
}
