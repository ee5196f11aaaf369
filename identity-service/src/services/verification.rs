//! Verification code engine.
//!
//! Issues six-digit single-use codes into an identity's verification slot,
//! dispatches them over a [`NotificationChannel`](super::NotificationChannel)
//! and checks supplied codes. A code may be checked any number of times until
//! it matches or expires; a failed check never changes state.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

use crate::db::CredentialStore;
use crate::models::{CodePurpose, Identity, OneTimeCode};
use crate::services::{
    ContactMethod, MessageTemplate, NotificationChannels, OutboundMessage, ServiceError,
};

pub const CODE_LENGTH: usize = 6;
pub const DEFAULT_CODE_TTL_MINUTES: i64 = 15;

/// Why a supplied code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeError {
    Expired,
    Mismatch,
}

impl From<CodeError> for ServiceError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::Expired => ServiceError::CodeExpired,
            CodeError::Mismatch => ServiceError::CodeMismatch,
        }
    }
}

#[derive(Clone)]
pub struct VerificationEngine {
    store: Arc<dyn CredentialStore>,
    channels: NotificationChannels,
    ttl: Duration,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        channels: NotificationChannels,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            channels,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Uniformly random, zero-padded.
    pub fn generate_code() -> String {
        let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{:0width$}", n, width = CODE_LENGTH)
    }

    /// Store a fresh code on the identity and return it. Sends nothing.
    pub async fn issue(
        &self,
        identity: &Identity,
        purpose: CodePurpose,
    ) -> Result<String, ServiceError> {
        self.issue_at(identity, purpose, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        identity: &Identity,
        purpose: CodePurpose,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let slot = OneTimeCode {
            code: Self::generate_code(),
            purpose,
            expires_at: now + self.ttl,
        };

        let stored = self.store.set_verification_code(&identity.id, &slot).await?;
        if !stored {
            return Err(ServiceError::NotFound("User"));
        }

        tracing::debug!(
            identity_id = %identity.id,
            purpose = purpose.as_str(),
            "Verification code issued"
        );
        Ok(slot.code)
    }

    /// Send `code` to the identity over `method`. Failure is reported, never
    /// retried; the caller decides whether to compensate.
    pub async fn dispatch(
        &self,
        identity: &Identity,
        code: &str,
        method: ContactMethod,
        purpose: CodePurpose,
    ) -> Result<(), ServiceError> {
        let (destination, template) = match method {
            ContactMethod::Email => (
                identity.email.as_str(),
                match purpose {
                    CodePurpose::SecondFactor => MessageTemplate::AuthenticationCode,
                    CodePurpose::SignupVerify | CodePurpose::Resend => {
                        MessageTemplate::VerificationCode
                    }
                },
            ),
            ContactMethod::Sms => (identity.phone.as_str(), MessageTemplate::SmsCode),
        };

        let message = OutboundMessage::new(destination, template, code, self.ttl.num_minutes());
        let channel = self.channels.for_method(method);

        if let Err(e) = channel.send(&message).await {
            tracing::error!(
                identity_id = %identity.id,
                channel = channel.name(),
                error = %e,
                "Failed to dispatch verification code"
            );
            return Err(ServiceError::DependencyFailure(
                "Failed to send the verification code".to_string(),
            ));
        }

        metrics::counter!(
            "identity_codes_issued_total",
            "purpose" => purpose.as_str(),
            "channel" => method.as_str()
        )
        .increment(1);

        Ok(())
    }

    /// Pure check of a supplied code against a slot.
    ///
    /// An empty slot or a code issued for another purpose counts as a
    /// mismatch. `now == expires_at` is still valid.
    pub fn check(
        slot: Option<&OneTimeCode>,
        supplied: &str,
        accepted: &[CodePurpose],
        now: DateTime<Utc>,
    ) -> Result<(), CodeError> {
        let slot = slot.ok_or(CodeError::Mismatch)?;

        if !accepted.contains(&slot.purpose) {
            return Err(CodeError::Mismatch);
        }

        if now > slot.expires_at {
            return Err(CodeError::Expired);
        }

        if slot.code != supplied.trim() {
            return Err(CodeError::Mismatch);
        }

        Ok(())
    }

    /// Check the code and clear the slot in one conditional write. With
    /// `activate`, a `PENDING` identity becomes `ACTIVE` in that same write.
    pub async fn verify_and_consume(
        &self,
        identity: &Identity,
        supplied: &str,
        accepted: &[CodePurpose],
        activate: bool,
    ) -> Result<(), ServiceError> {
        self.verify_and_consume_at(identity, supplied, accepted, activate, Utc::now())
            .await
    }

    pub async fn verify_and_consume_at(
        &self,
        identity: &Identity,
        supplied: &str,
        accepted: &[CodePurpose],
        activate: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        Self::check(identity.verification.as_ref(), supplied, accepted, now)?;

        // Lost a race with another consumer or a re-issue.
        let consumed = self
            .store
            .consume_verification_code(&identity.id, supplied.trim(), activate)
            .await?;
        if !consumed {
            return Err(ServiceError::CodeMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCredentialStore;
    use crate::models::IdentityStatus;
    use crate::services::MockChannel;

    struct Fixture {
        engine: VerificationEngine,
        store: Arc<InMemoryCredentialStore>,
        email: Arc<MockChannel>,
        sms: Arc<MockChannel>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCredentialStore::new());
        let email = Arc::new(MockChannel::new());
        let sms = Arc::new(MockChannel::new());
        let engine = VerificationEngine::new(
            store.clone(),
            NotificationChannels::new(email.clone(), sms.clone()),
            DEFAULT_CODE_TTL_MINUTES,
        );
        Fixture {
            engine,
            store,
            email,
            sms,
        }
    }

    async fn pending_identity(store: &InMemoryCredentialStore) -> Identity {
        let identity = Identity::new(
            "Ana".to_string(),
            "ana@test.com".to_string(),
            "3001234567".to_string(),
            "hash".to_string(),
            "role-1".to_string(),
            None,
        );
        store.insert_identity(&identity).await.unwrap();
        identity
    }

    async fn reload(store: &InMemoryCredentialStore, id: &str) -> Identity {
        store.find_identity_by_id(id).await.unwrap().unwrap()
    }

    #[test]
    fn generated_codes_are_six_ascii_digits() {
        for _ in 0..200 {
            let code = VerificationEngine::generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn check_distinguishes_expired_from_mismatch() {
        let issued = Utc::now();
        let slot = OneTimeCode {
            code: "123456".to_string(),
            purpose: CodePurpose::SignupVerify,
            expires_at: issued + Duration::minutes(15),
        };
        let accepted = [CodePurpose::SignupVerify];

        let almost = issued + Duration::minutes(14) + Duration::seconds(59);
        assert!(VerificationEngine::check(Some(&slot), "123456", &accepted, almost).is_ok());

        let late = issued + Duration::minutes(15) + Duration::seconds(1);
        assert_eq!(
            VerificationEngine::check(Some(&slot), "123456", &accepted, late),
            Err(CodeError::Expired)
        );

        assert_eq!(
            VerificationEngine::check(Some(&slot), "654321", &accepted, almost),
            Err(CodeError::Mismatch)
        );
        assert_eq!(
            VerificationEngine::check(Some(&slot), "123456", &[CodePurpose::SecondFactor], almost),
            Err(CodeError::Mismatch)
        );
        assert_eq!(
            VerificationEngine::check(None, "123456", &accepted, almost),
            Err(CodeError::Mismatch)
        );
    }

    #[tokio::test]
    async fn consuming_activates_and_clears_the_slot() {
        let f = fixture();
        let identity = pending_identity(&f.store).await;

        let code = f
            .engine
            .issue(&identity, CodePurpose::SignupVerify)
            .await
            .unwrap();
        let identity = reload(&f.store, &identity.id).await;

        f.engine
            .verify_and_consume(&identity, &code, &[CodePurpose::SignupVerify], true)
            .await
            .unwrap();

        let after = reload(&f.store, &identity.id).await;
        assert_eq!(after.status, IdentityStatus::Active);
        assert!(after.verification.is_none());
    }

    #[tokio::test]
    async fn a_consumed_code_never_verifies_again() {
        let f = fixture();
        let identity = pending_identity(&f.store).await;
        let code = f
            .engine
            .issue(&identity, CodePurpose::SignupVerify)
            .await
            .unwrap();
        let snapshot = reload(&f.store, &identity.id).await;

        f.engine
            .verify_and_consume(&snapshot, &code, &[CodePurpose::SignupVerify], true)
            .await
            .unwrap();

        // Stale snapshot still holds the code; the conditional write refuses it.
        let stale = f
            .engine
            .verify_and_consume(&snapshot, &code, &[CodePurpose::SignupVerify], true)
            .await;
        assert!(matches!(stale, Err(ServiceError::CodeMismatch)));

        let fresh = reload(&f.store, &identity.id).await;
        for _ in 0..2 {
            let again = f
                .engine
                .verify_and_consume(&fresh, &code, &[CodePurpose::SignupVerify], true)
                .await;
            assert!(matches!(again, Err(ServiceError::CodeMismatch)));
        }
    }

    #[tokio::test]
    async fn expired_code_is_refused_and_left_in_place() {
        let f = fixture();
        let identity = pending_identity(&f.store).await;
        let issued = Utc::now() - Duration::minutes(16);
        let code = f
            .engine
            .issue_at(&identity, CodePurpose::SignupVerify, issued)
            .await
            .unwrap();
        let identity = reload(&f.store, &identity.id).await;

        let result = f
            .engine
            .verify_and_consume(&identity, &code, &[CodePurpose::SignupVerify], true)
            .await;
        assert!(matches!(result, Err(ServiceError::CodeExpired)));

        let after = reload(&f.store, &identity.id).await;
        assert_eq!(after.status, IdentityStatus::Pending);
        assert!(after.verification.is_some());
    }

    #[tokio::test]
    async fn dispatch_picks_destination_and_template_by_channel() {
        let f = fixture();
        let identity = pending_identity(&f.store).await;

        f.engine
            .dispatch(&identity, "111111", ContactMethod::Email, CodePurpose::SecondFactor)
            .await
            .unwrap();
        f.engine
            .dispatch(&identity, "222222", ContactMethod::Sms, CodePurpose::SecondFactor)
            .await
            .unwrap();

        let email = f.email.sent();
        assert_eq!(email.len(), 1);
        assert_eq!(email[0].destination, "ana@test.com");
        assert_eq!(email[0].template, MessageTemplate::AuthenticationCode);

        let sms = f.sms.sent();
        assert_eq!(sms[0].destination, "3001234567");
        assert_eq!(sms[0].template, MessageTemplate::SmsCode);
    }

    #[tokio::test]
    async fn dispatched_message_carries_the_configured_ttl() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let email = Arc::new(MockChannel::new());
        let engine = VerificationEngine::new(
            store.clone(),
            NotificationChannels::new(email.clone(), Arc::new(MockChannel::new())),
            5,
        );
        let identity = pending_identity(&store).await;

        engine
            .dispatch(&identity, "111111", ContactMethod::Email, CodePurpose::SignupVerify)
            .await
            .unwrap();

        let sent = email.sent();
        assert_eq!(sent[0].valid_for_minutes, 5);
        assert!(sent[0].text_body().contains("expires in 5 minutes"));
    }

    #[tokio::test]
    async fn dispatch_failure_is_a_dependency_failure() {
        let f = fixture();
        let identity = pending_identity(&f.store).await;
        f.sms.set_failing(true);

        let result = f
            .engine
            .dispatch(&identity, "111111", ContactMethod::Sms, CodePurpose::SignupVerify)
            .await;
        assert!(matches!(result, Err(ServiceError::DependencyFailure(_))));
    }
}
