//! Out-of-band password reset.
//!
//! Two independent flows:
//! - link based: a signed reset token (1h) mailed as a link, nothing stored;
//! - code based: a six-digit code in the identity's reset slot that moves
//!   `PENDING -> VERIFIED` before the password may be replaced.
//!
//! Neither flow looks at the account status or at the sign-in code slot.

use chrono::{DateTime, Duration, Utc};
use service_core::token::TokenService;
use std::sync::Arc;

use crate::{
    db::CredentialStore,
    models::{Identity, ResetCode, ResetStatus},
    services::{
        MessageTemplate, NotificationChannels, OutboundMessage, ServiceError, VerificationEngine,
    },
    utils::{check_password_policy, hash_password, normalize_email, Password},
};

#[derive(Clone)]
pub struct PasswordResetService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    channels: NotificationChannels,
    frontend_url: String,
    code_ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        channels: NotificationChannels,
        frontend_url: String,
        code_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            tokens,
            channels,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            code_ttl: Duration::minutes(code_ttl_minutes),
        }
    }

    /// Mail a reset link and return the token it carries.
    pub async fn request_reset(&self, email: &str) -> Result<String, ServiceError> {
        let identity = self.find_by_email(email).await?;

        let token = self.tokens.issue_password_reset(&identity.id)?;
        let link = format!("{}/reset-password?token={}", self.frontend_url, token);

        self.send(
            &identity,
            MessageTemplate::PasswordResetLink,
            &link,
            self.tokens.reset_ttl_minutes(),
        )
        .await?;

        tracing::info!(identity_id = %identity.id, "Password reset link sent");
        Ok(token)
    }

    /// Replace the password of the identity named by a reset token.
    pub async fn change_with_token(
        &self,
        token: &str,
        new_password: &str,
        confirm_new_password: &str,
    ) -> Result<(), ServiceError> {
        let password = check_new_password(new_password, confirm_new_password)?;

        let identity_id = self
            .tokens
            .verify_password_reset(token)
            .map_err(|_| ServiceError::InvalidToken)?;

        let password_hash = hash_password(&password).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;

        if !self
            .store
            .update_password(&identity_id, password_hash.as_str())
            .await?
        {
            return Err(ServiceError::NotFound("User"));
        }

        tracing::info!(identity_id = %identity_id, "Password reset with link");
        Ok(())
    }

    /// Put a fresh code in the reset slot and mail it.
    pub async fn request_code(&self, email: &str) -> Result<(), ServiceError> {
        self.request_code_at(email, Utc::now()).await
    }

    pub async fn request_code_at(&self, email: &str, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let identity = self.find_by_email(email).await?;

        let slot = ResetCode {
            code: VerificationEngine::generate_code(),
            status: ResetStatus::Pending,
            expires_at: now + self.code_ttl,
        };
        if !self.store.set_reset_code(&identity.id, &slot).await? {
            return Err(ServiceError::NotFound("User"));
        }

        self.send(
            &identity,
            MessageTemplate::PasswordResetCode,
            &slot.code,
            self.code_ttl.num_minutes(),
        )
        .await?;

        tracing::info!(identity_id = %identity.id, "Password reset code sent");
        Ok(())
    }

    /// `PENDING -> VERIFIED` when the supplied code matches before expiry.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        self.verify_code_at(email, code, Utc::now()).await
    }

    pub async fn verify_code_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let identity = self.find_by_email(email).await?;
        let slot = identity
            .reset
            .as_ref()
            .filter(|slot| slot.status == ResetStatus::Pending)
            .ok_or(ServiceError::CodeMismatch)?;

        if now > slot.expires_at {
            return Err(ServiceError::CodeExpired);
        }
        if slot.code != code.trim() {
            return Err(ServiceError::CodeMismatch);
        }

        if !self
            .store
            .mark_reset_code_verified(&identity.id, &slot.code)
            .await?
        {
            return Err(ServiceError::CodeMismatch);
        }

        Ok(())
    }

    /// Replace the password once the reset code has been verified. Clears the
    /// reset slot in the same write.
    pub async fn change_with_code(
        &self,
        email: &str,
        new_password: &str,
        confirm_new_password: &str,
    ) -> Result<(), ServiceError> {
        self.change_with_code_at(email, new_password, confirm_new_password, Utc::now())
            .await
    }

    pub async fn change_with_code_at(
        &self,
        email: &str,
        new_password: &str,
        confirm_new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let password = check_new_password(new_password, confirm_new_password)?;
        let identity = self.find_by_email(email).await?;

        let slot = identity
            .reset
            .as_ref()
            .filter(|slot| slot.status == ResetStatus::Verified)
            .ok_or(ServiceError::ResetNotVerified)?;
        if now > slot.expires_at {
            return Err(ServiceError::CodeExpired);
        }

        let password_hash = hash_password(&password).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;

        if !self
            .store
            .replace_password_after_reset(&identity.id, password_hash.as_str())
            .await?
        {
            return Err(ServiceError::ResetNotVerified);
        }

        tracing::info!(identity_id = %identity.id, "Password reset with code");
        Ok(())
    }

    async fn find_by_email(&self, raw: &str) -> Result<Identity, ServiceError> {
        let email = normalize_email(raw).ok_or(ServiceError::InvalidEmailFormat)?;
        self.store
            .find_identity_by_email(&email)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    async fn send(
        &self,
        identity: &Identity,
        template: MessageTemplate,
        payload: &str,
        valid_for_minutes: i64,
    ) -> Result<(), ServiceError> {
        let message = OutboundMessage::new(&identity.email, template, payload, valid_for_minutes);
        self.channels.email.send(&message).await.map_err(|e| {
            tracing::error!(identity_id = %identity.id, error = %e, "Failed to send reset email");
            ServiceError::DependencyFailure("Failed to send the password reset email".to_string())
        })
    }
}

fn check_new_password(new_password: &str, confirm: &str) -> Result<Password, ServiceError> {
    if new_password != confirm {
        return Err(ServiceError::PasswordMismatch);
    }
    let password = Password::new(new_password);
    check_password_policy(&password).map_err(ServiceError::WeakPassword)?;
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCredentialStore;
    use crate::models::{CodePurpose, IdentityStatus, OneTimeCode};
    use crate::services::MockChannel;
    use crate::utils::{verify_password, PasswordHashString};
    use service_core::token::{TokenConfig, TokenPurpose};

    struct Fixture {
        service: PasswordResetService,
        store: Arc<InMemoryCredentialStore>,
        email: Arc<MockChannel>,
        tokens: TokenService,
        identity_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCredentialStore::new());
        let identity = Identity::new(
            "Ana".to_string(),
            "ana@test.com".to_string(),
            "3001234567".to_string(),
            hash_password(&Password::new("Abcdef1!"))
                .unwrap()
                .into_string(),
            "role-1".to_string(),
            None,
        );
        store.insert_identity(&identity).await.unwrap();

        let email = Arc::new(MockChannel::new());
        let tokens =
            TokenService::new(&TokenConfig::new("reset-service-test-secret-0123456789")).unwrap();
        let service = PasswordResetService::new(
            store.clone(),
            tokens.clone(),
            NotificationChannels::new(email.clone(), Arc::new(MockChannel::new())),
            "https://app.test/".to_string(),
            15,
        );

        Fixture {
            service,
            store,
            email,
            tokens,
            identity_id: identity.id,
        }
    }

    async fn password_is(f: &Fixture, password: &str) -> bool {
        let identity = f
            .store
            .find_identity_by_id(&f.identity_id)
            .await
            .unwrap()
            .unwrap();
        verify_password(
            &Password::new(password),
            &PasswordHashString::new(identity.password_hash),
        )
        .is_ok()
    }

    #[tokio::test]
    async fn reset_link_works_on_pending_accounts() {
        let f = fixture().await;
        let token = f.service.request_reset("ANA@test.com").await.unwrap();

        let sent = f.email.last_payload_to("ana@test.com").unwrap();
        assert_eq!(sent, format!("https://app.test/reset-password?token={}", token));

        f.service
            .change_with_token(&token, "Newpass1!", "Newpass1!")
            .await
            .unwrap();
        assert!(password_is(&f, "Newpass1!").await);

        let identity = f
            .store
            .find_identity_by_id(&f.identity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.status, IdentityStatus::Pending);
    }

    #[tokio::test]
    async fn link_change_checks_input_before_the_token() {
        let f = fixture().await;

        assert!(matches!(
            f.service.change_with_token("garbage", "Newpass1!", "Other1!!").await,
            Err(ServiceError::PasswordMismatch)
        ));
        assert!(matches!(
            f.service.change_with_token("garbage", "weak", "weak").await,
            Err(ServiceError::WeakPassword(_))
        ));
        assert!(matches!(
            f.service.change_with_token("garbage", "Newpass1!", "Newpass1!").await,
            Err(ServiceError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn expired_or_session_tokens_are_invalid() {
        let f = fixture().await;
        let expired = f
            .tokens
            .issue_at(
                &f.identity_id,
                TokenPurpose::PasswordReset,
                Utc::now() - Duration::minutes(61),
            )
            .unwrap();
        assert!(matches!(
            f.service.change_with_token(&expired, "Newpass1!", "Newpass1!").await,
            Err(ServiceError::InvalidToken)
        ));

        let session = f.tokens.issue_session(&f.identity_id).unwrap();
        assert!(matches!(
            f.service.change_with_token(&session, "Newpass1!", "Newpass1!").await,
            Err(ServiceError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.service.request_reset("nobody@test.com").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.request_reset("nobody").await,
            Err(ServiceError::InvalidEmailFormat)
        ));
    }

    #[tokio::test]
    async fn code_flow_requires_verification_before_change() {
        let f = fixture().await;
        f.service.request_code("ana@test.com").await.unwrap();

        assert!(matches!(
            f.service
                .change_with_code("ana@test.com", "Newpass1!", "Newpass1!")
                .await,
            Err(ServiceError::ResetNotVerified)
        ));

        let code = f.email.last_payload_to("ana@test.com").unwrap();
        f.service.verify_code("ana@test.com", &code).await.unwrap();
        f.service
            .change_with_code("ana@test.com", "Newpass1!", "Newpass1!")
            .await
            .unwrap();
        assert!(password_is(&f, "Newpass1!").await);

        // Slot is cleared; a second change needs a new code.
        assert!(matches!(
            f.service
                .change_with_code("ana@test.com", "Another1!", "Another1!")
                .await,
            Err(ServiceError::ResetNotVerified)
        ));
    }

    #[tokio::test]
    async fn reset_code_expires_after_fifteen_minutes() {
        let f = fixture().await;
        let issued = Utc::now();
        f.service
            .request_code_at("ana@test.com", issued)
            .await
            .unwrap();
        let code = f.email.last_payload_to("ana@test.com").unwrap();

        let late = issued + Duration::minutes(15) + Duration::seconds(1);
        assert!(matches!(
            f.service.verify_code_at("ana@test.com", &code, late).await,
            Err(ServiceError::CodeExpired)
        ));

        let in_time = issued + Duration::minutes(14) + Duration::seconds(59);
        f.service
            .verify_code_at("ana@test.com", &code, in_time)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reset_and_sign_in_codes_never_cross() {
        let f = fixture().await;
        f.store
            .set_verification_code(
                &f.identity_id,
                &OneTimeCode {
                    code: "111111".to_string(),
                    purpose: CodePurpose::SecondFactor,
                    expires_at: Utc::now() + Duration::minutes(15),
                },
            )
            .await
            .unwrap();

        f.service.request_code("ana@test.com").await.unwrap();
        assert!(matches!(
            f.service.verify_code("ana@test.com", "111111").await,
            Err(ServiceError::CodeMismatch)
        ));

        let identity = f
            .store
            .find_identity_by_id(&f.identity_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            identity.verification.map(|v| v.code).as_deref(),
            Some("111111")
        );
    }
}
