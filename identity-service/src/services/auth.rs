//! Sign-up and two-factor sign-in.
//!
//! Sign-in runs `credentials -> code issued -> authenticated`. Nothing about
//! the intermediate state is held in memory: the issued code lives in the
//! identity's verification slot until it is consumed or replaced.

use service_core::token::TokenService;
use std::sync::Arc;

use crate::{
    db::CredentialStore,
    dtos::auth::{
        ChangePasswordRequest, CodeRequest, MeResponse, ResendCodeRequest, SessionResponse,
        SigninRequest, SignupRequest, SignupResponse,
    },
    models::{CodePurpose, Identity},
    services::{ContactMethod, PermissionResolver, ServiceError, VerificationEngine},
    utils::{
        check_password_policy, hash_password, normalize_email, normalize_phone, verify_password,
        Password, PasswordHashString,
    },
};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    engine: VerificationEngine,
    tokens: TokenService,
    resolver: PermissionResolver,
    default_role: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        engine: VerificationEngine,
        tokens: TokenService,
        resolver: PermissionResolver,
        default_role: String,
    ) -> Self {
        Self {
            store,
            engine,
            tokens,
            resolver,
            default_role,
        }
    }

    /// Create a `PENDING` identity and email it a sign-up code. If the code
    /// cannot be issued or delivered the new identity is deleted again.
    pub async fn signup(&self, req: SignupRequest) -> Result<SignupResponse, ServiceError> {
        let email = normalize_email(&req.email).ok_or(ServiceError::InvalidEmailFormat)?;
        let phone = normalize_phone(&req.number)
            .ok_or_else(|| ServiceError::Validation("Invalid phone number".to_string()))?;
        let location_id = req.location_id.trim().to_string();
        if location_id.is_empty() {
            return Err(ServiceError::Validation("Location is required".to_string()));
        }

        let password = Password::new(req.current_password);
        check_password_policy(&password).map_err(ServiceError::WeakPassword)?;

        if self.store.find_identity_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        if self.store.find_identity_by_phone(&phone).await?.is_some() {
            return Err(ServiceError::PhoneAlreadyRegistered);
        }

        let role = self
            .store
            .find_role_by_name(&self.default_role)
            .await?
            .ok_or(ServiceError::RoleNotFound)?;

        let password_hash = hash_password(&password).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;

        let identity = Identity::new(
            req.fullname.trim().to_string(),
            email,
            phone,
            password_hash.into_string(),
            role.id,
            Some(location_id),
        );

        // The store re-checks uniqueness, so a concurrent sign-up still
        // surfaces as a conflict here.
        self.store.insert_identity(&identity).await?;

        if let Err(e) = self.send_signup_code(&identity).await {
            tracing::warn!(
                identity_id = %identity.id,
                error = %e,
                "Rolling back sign-up after failed code delivery"
            );
            if let Err(rollback) = self.store.delete_identity(&identity.id).await {
                tracing::error!(
                    identity_id = %identity.id,
                    error = %rollback,
                    "Failed to roll back sign-up"
                );
            }
            return Err(match e {
                ServiceError::DependencyFailure(msg) => ServiceError::DependencyFailure(msg),
                other => ServiceError::DependencyFailure(format!(
                    "Failed to send the verification code: {}",
                    other
                )),
            });
        }

        tracing::info!(identity_id = %identity.id, "Identity registered");

        Ok(SignupResponse {
            message: "Account created. Check your email for the verification code".to_string(),
            user_id: identity.id,
            email: identity.email,
        })
    }

    async fn send_signup_code(&self, identity: &Identity) -> Result<(), ServiceError> {
        let code = self.engine.issue(identity, CodePurpose::SignupVerify).await?;
        self.engine
            .dispatch(identity, &code, ContactMethod::Email, CodePurpose::SignupVerify)
            .await
    }

    /// Consume a sign-up (or resent) code and activate the account.
    pub async fn verify_signup(&self, req: CodeRequest) -> Result<(), ServiceError> {
        let identity = self.find_by_email(&req.email).await?;

        self.engine
            .verify_and_consume(
                &identity,
                &req.code,
                &[CodePurpose::SignupVerify, CodePurpose::Resend],
                true,
            )
            .await?;

        tracing::info!(identity_id = %identity.id, "Identity verified");
        Ok(())
    }

    /// Replace the outstanding sign-up code of a `PENDING` account.
    pub async fn resend_code(&self, req: ResendCodeRequest) -> Result<String, ServiceError> {
        let method = match req.method_contact.as_deref() {
            Some(raw) => raw.parse::<ContactMethod>()?,
            None => ContactMethod::Email,
        };

        let identity = self.find_by_email(&req.email).await?;
        if identity.is_active() {
            return Err(ServiceError::Validation(
                "The account is already verified".to_string(),
            ));
        }

        let code = self.engine.issue(&identity, CodePurpose::Resend).await?;
        self.engine
            .dispatch(&identity, &code, method, CodePurpose::Resend)
            .await?;

        Ok(code_sent_message(method).to_string())
    }

    /// First sign-in step: check the password and send a second-factor code.
    ///
    /// A failed dispatch leaves the issued code in place and is reported as a
    /// server error; no record was created, so nothing is rolled back.
    pub async fn signin(&self, req: SigninRequest) -> Result<String, ServiceError> {
        let result = self.check_credentials_and_send_code(req).await;
        if let Err(e) = &result {
            metrics::counter!("identity_signins_total", "outcome" => signin_outcome(e))
                .increment(1);
        }
        result
    }

    async fn check_credentials_and_send_code(
        &self,
        req: SigninRequest,
    ) -> Result<String, ServiceError> {
        let identity = self.find_by_email(&req.email).await?;

        verify_password(
            &Password::new(req.current_password),
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .map_err(|_| ServiceError::BadCredentials)?;

        if !identity.is_active() {
            return Err(ServiceError::AccountNotActive);
        }

        let method: ContactMethod = req.method_contact.parse()?;

        let code = self.engine.issue(&identity, CodePurpose::SecondFactor).await?;
        self.engine
            .dispatch(&identity, &code, method, CodePurpose::SecondFactor)
            .await?;

        tracing::info!(
            identity_id = %identity.id,
            channel = method.as_str(),
            "Second-factor code sent"
        );
        Ok(code_sent_message(method).to_string())
    }

    /// Second sign-in step: consume the code and mint a session token.
    ///
    /// Role and permissions are returned for display only. The token carries
    /// nothing but the identity id.
    pub async fn second_factor(&self, req: CodeRequest) -> Result<SessionResponse, ServiceError> {
        let result = self.complete_second_factor(req).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => signin_outcome(e),
        };
        metrics::counter!("identity_signins_total", "outcome" => outcome).increment(1);
        result
    }

    async fn complete_second_factor(
        &self,
        req: CodeRequest,
    ) -> Result<SessionResponse, ServiceError> {
        let identity = self.find_by_email(&req.email).await?;
        if !identity.is_active() {
            return Err(ServiceError::AccountNotActive);
        }

        self.engine
            .verify_and_consume(&identity, &req.code, &[CodePurpose::SecondFactor], false)
            .await?;

        let token = self.tokens.issue_session(&identity.id)?;
        let (role, permissions) = self.resolver.resolve_role(&identity).await?;

        tracing::info!(identity_id = %identity.id, "Session granted");

        Ok(SessionResponse {
            message: "Signed in successfully".to_string(),
            token,
            expires_in: self.tokens.session_ttl_seconds(),
            role: role.name,
            permissions: permissions.into_iter().map(Into::into).collect(),
        })
    }

    /// Password change for a signed-in identity.
    pub async fn change_password(
        &self,
        identity_id: &str,
        req: ChangePasswordRequest,
    ) -> Result<(), ServiceError> {
        if req.new_password != req.confirm_new_password {
            return Err(ServiceError::PasswordMismatch);
        }
        if req.new_password == req.current_password {
            return Err(ServiceError::SamePassword);
        }

        let new_password = Password::new(req.new_password);
        check_password_policy(&new_password).map_err(ServiceError::WeakPassword)?;

        let identity = self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        verify_password(
            &Password::new(req.current_password),
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .map_err(|_| ServiceError::BadCredentials)?;

        let password_hash = hash_password(&new_password).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
        })?;

        if !self
            .store
            .update_password(&identity.id, password_hash.as_str())
            .await?
        {
            return Err(ServiceError::NotFound("User"));
        }

        tracing::info!(identity_id = %identity.id, "Password changed");
        Ok(())
    }

    pub async fn me(&self, identity_id: &str) -> Result<MeResponse, ServiceError> {
        let identity = self
            .store
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        let role = self
            .store
            .find_role_by_id(&identity.role_id)
            .await?
            .ok_or(ServiceError::RoleNotFound)?
            .name;

        Ok(MeResponse {
            id: identity.id,
            fullname: identity.fullname,
            email: identity.email,
            phone: identity.phone,
            status: identity.status.as_str().to_string(),
            role,
            location_id: identity.location_id,
        })
    }

    /// Format is checked before the lookup, so a malformed address is never
    /// reported as unknown.
    async fn find_by_email(&self, raw: &str) -> Result<Identity, ServiceError> {
        let email = normalize_email(raw).ok_or(ServiceError::InvalidEmailFormat)?;
        self.store
            .find_identity_by_email(&email)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }
}

fn code_sent_message(method: ContactMethod) -> &'static str {
    match method {
        ContactMethod::Sms => "Check the SMS code sent to your phone number",
        ContactMethod::Email => "Check the code sent to your email",
    }
}

fn signin_outcome(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::BadCredentials => "bad_credentials",
        ServiceError::NotFound(_) | ServiceError::InvalidEmailFormat => "unknown_identity",
        ServiceError::AccountNotActive => "not_active",
        ServiceError::CodeExpired | ServiceError::CodeMismatch => "bad_code",
        ServiceError::DependencyFailure(_) => "dispatch_failed",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCredentialStore;
    use crate::models::{IdentityStatus, Role};
    use crate::services::{MockChannel, NotificationChannels};
    use service_core::token::TokenConfig;

    struct Fixture {
        auth: AuthService,
        store: Arc<InMemoryCredentialStore>,
        email: Arc<MockChannel>,
        sms: Arc<MockChannel>,
        tokens: TokenService,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .insert_role(&Role::new("CUSTOMER".to_string(), String::new(), vec![]))
            .await
            .unwrap();

        let email = Arc::new(MockChannel::new());
        let sms = Arc::new(MockChannel::new());
        let engine = VerificationEngine::new(
            store.clone(),
            NotificationChannels::new(email.clone(), sms.clone()),
            15,
        );
        let tokens =
            TokenService::new(&TokenConfig::new("auth-service-test-secret-0123456789ab")).unwrap();
        let auth = AuthService::new(
            store.clone(),
            engine,
            tokens.clone(),
            PermissionResolver::new(store.clone()),
            "CUSTOMER".to_string(),
        );

        Fixture {
            auth,
            store,
            email,
            sms,
            tokens,
        }
    }

    fn signup_request() -> SignupRequest {
        SignupRequest {
            fullname: "Ana".to_string(),
            email: "ANA@Test.com".to_string(),
            current_password: "Abcdef1!".to_string(),
            number: "3001234567".to_string(),
            location_id: "city-1".to_string(),
        }
    }

    async fn active_identity(f: &Fixture) -> String {
        let created = f.auth.signup(signup_request()).await.unwrap();
        let code = f.email.last_payload_to("ana@test.com").unwrap();
        f.auth
            .verify_signup(CodeRequest {
                email: "ana@test.com".to_string(),
                code,
            })
            .await
            .unwrap();
        created.user_id
    }

    #[tokio::test]
    async fn signup_normalizes_email_and_stays_pending() {
        let f = fixture().await;
        let created = f.auth.signup(signup_request()).await.unwrap();
        assert_eq!(created.email, "ana@test.com");

        let identity = f
            .store
            .find_identity_by_id(&created.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.status, IdentityStatus::Pending);
        assert_eq!(identity.location_id.as_deref(), Some("city-1"));
    }

    #[tokio::test]
    async fn signup_is_rolled_back_when_the_code_cannot_be_sent() {
        let f = fixture().await;
        f.email.set_failing(true);

        let result = f.auth.signup(signup_request()).await;
        assert!(matches!(result, Err(ServiceError::DependencyFailure(_))));
        assert!(f
            .store
            .find_identity_by_email("ana@test.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let f = fixture().await;
        f.auth.signup(signup_request()).await.unwrap();

        let mut again = signup_request();
        again.email = " ana@TEST.com ".to_string();
        again.number = "3009999999".to_string();
        assert!(matches!(
            f.auth.signup(again).await,
            Err(ServiceError::EmailAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn weak_password_is_refused_before_anything_is_stored() {
        let f = fixture().await;
        let mut req = signup_request();
        req.current_password = "abcdefg".to_string();

        assert!(matches!(
            f.auth.signup(req).await,
            Err(ServiceError::WeakPassword(_))
        ));
        assert!(f.store.list_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn signin_then_second_factor_yields_a_session() {
        let f = fixture().await;
        let id = active_identity(&f).await;

        let message = f
            .auth
            .signin(SigninRequest {
                email: "ana@test.com".to_string(),
                current_password: "Abcdef1!".to_string(),
                method_contact: "sms".to_string(),
            })
            .await
            .unwrap();
        assert!(message.starts_with("Check the SMS code sent"));

        let code = f.sms.last_payload_to("3001234567").unwrap();
        let session = f
            .auth
            .second_factor(CodeRequest {
                email: "ana@test.com".to_string(),
                code,
            })
            .await
            .unwrap();

        assert_eq!(f.tokens.verify_session(&session.token).unwrap(), id);
        assert_eq!(session.role, "CUSTOMER");
    }

    #[tokio::test]
    async fn signin_rejects_bad_input_in_order() {
        let f = fixture().await;
        active_identity(&f).await;

        let req = |email: &str, password: &str, method: &str| SigninRequest {
            email: email.to_string(),
            current_password: password.to_string(),
            method_contact: method.to_string(),
        };

        assert!(matches!(
            f.auth.signin(req("not-an-email", "Abcdef1!", "sms")).await,
            Err(ServiceError::InvalidEmailFormat)
        ));
        assert!(matches!(
            f.auth.signin(req("nobody@test.com", "Abcdef1!", "sms")).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.auth.signin(req("ana@test.com", "Wrong1!!", "sms")).await,
            Err(ServiceError::BadCredentials)
        ));
        assert!(matches!(
            f.auth.signin(req("ana@test.com", "Abcdef1!", "pigeon")).await,
            Err(ServiceError::UnsupportedChannel)
        ));
    }

    #[tokio::test]
    async fn signup_code_does_not_work_as_a_second_factor() {
        let f = fixture().await;
        f.auth.signup(signup_request()).await.unwrap();
        let id = f
            .store
            .find_identity_by_email("ana@test.com")
            .await
            .unwrap()
            .unwrap()
            .id;
        f.store
            .set_identity_status(&id, IdentityStatus::Active)
            .await
            .unwrap();

        let code = f.email.last_payload_to("ana@test.com").unwrap();
        let result = f
            .auth
            .second_factor(CodeRequest {
                email: "ana@test.com".to_string(),
                code,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::CodeMismatch)));
    }

    #[tokio::test]
    async fn change_password_requires_a_different_password() {
        let f = fixture().await;
        let id = active_identity(&f).await;

        let result = f
            .auth
            .change_password(
                &id,
                ChangePasswordRequest {
                    current_password: "Abcdef1!".to_string(),
                    new_password: "Abcdef1!".to_string(),
                    confirm_new_password: "Abcdef1!".to_string(),
                },
            )
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, ServiceError::SamePassword));
        assert_eq!(err.to_string(), "The new password has to be different");
    }

    #[tokio::test]
    async fn change_password_checks_the_current_one() {
        let f = fixture().await;
        let id = active_identity(&f).await;

        let wrong = f
            .auth
            .change_password(
                &id,
                ChangePasswordRequest {
                    current_password: "Nope123!".to_string(),
                    new_password: "Newpass1!".to_string(),
                    confirm_new_password: "Newpass1!".to_string(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(ServiceError::BadCredentials)));

        f.auth
            .change_password(
                &id,
                ChangePasswordRequest {
                    current_password: "Abcdef1!".to_string(),
                    new_password: "Newpass1!".to_string(),
                    confirm_new_password: "Newpass1!".to_string(),
                },
            )
            .await
            .unwrap();

        let old = f
            .auth
            .signin(SigninRequest {
                email: "ana@test.com".to_string(),
                current_password: "Abcdef1!".to_string(),
                method_contact: "email".to_string(),
            })
            .await;
        assert!(matches!(old, Err(ServiceError::BadCredentials)));
    }

    #[tokio::test]
    async fn me_reports_a_missing_role_instead_of_an_empty_name() {
        let f = fixture().await;
        let id = active_identity(&f).await;

        let me = f.auth.me(&id).await.unwrap();
        assert_eq!(me.role, "CUSTOMER");

        f.store.set_identity_role(&id, "deleted-role").await.unwrap();
        let dangling = f.auth.me(&id).await;
        assert!(matches!(dangling, Err(ServiceError::RoleNotFound)));
    }
}
