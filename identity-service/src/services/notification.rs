//! Outbound channels for codes and reset links.
//!
//! Transports are injected as [`NotificationChannel`] trait objects so flows
//! never reach for a process-wide mailer or SMS client.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::config::{SmsConfig, SmtpConfig};
use crate::services::ServiceError;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not enabled: {0}")]
    NotEnabled(&'static str),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

/// Delivery channel chosen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactMethod {
    Email,
    Sms,
}

impl ContactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactMethod::Email => "email",
            ContactMethod::Sms => "sms",
        }
    }
}

impl std::str::FromStr for ContactMethod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(ContactMethod::Email),
            "sms" => Ok(ContactMethod::Sms),
            _ => Err(ServiceError::UnsupportedChannel),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTemplate {
    /// Email: confirm a new account.
    VerificationCode,
    /// Email: second factor at sign-in.
    AuthenticationCode,
    /// SMS: any code, one fixed wording.
    SmsCode,
    PasswordResetLink,
    PasswordResetCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Email address or phone number.
    pub destination: String,
    pub template: MessageTemplate,
    /// The code or link being delivered.
    pub payload: String,
    /// How long the payload stays usable, quoted in the message text.
    pub valid_for_minutes: i64,
}

impl OutboundMessage {
    pub fn new(
        destination: &str,
        template: MessageTemplate,
        payload: &str,
        valid_for_minutes: i64,
    ) -> Self {
        Self {
            destination: destination.to_string(),
            template,
            payload: payload.to_string(),
            valid_for_minutes,
        }
    }

    /// `"15 minutes"`, `"1 hour"`, `"2 hours"`.
    fn validity(&self) -> String {
        let minutes = self.valid_for_minutes;
        match (minutes / 60, minutes % 60) {
            (1, 0) => "1 hour".to_string(),
            (hours, 0) if hours > 1 => format!("{} hours", hours),
            _ if minutes == 1 => "1 minute".to_string(),
            _ => format!("{} minutes", minutes),
        }
    }

    pub fn subject(&self) -> &'static str {
        match self.template {
            MessageTemplate::VerificationCode => "Verify your account",
            MessageTemplate::AuthenticationCode => "Your sign-in code",
            MessageTemplate::SmsCode => "Your code",
            MessageTemplate::PasswordResetLink | MessageTemplate::PasswordResetCode => {
                "Reset your password"
            }
        }
    }

    pub fn text_body(&self) -> String {
        match self.template {
            MessageTemplate::VerificationCode => format!(
                "Welcome! Use this code to verify your account: {}\n\nThe code expires in {}. If you didn't sign up, please ignore this email.",
                self.payload,
                self.validity()
            ),
            MessageTemplate::AuthenticationCode => format!(
                "Your sign-in code is {}\n\nThe code expires in {}. If you didn't try to sign in, change your password.",
                self.payload,
                self.validity()
            ),
            MessageTemplate::SmsCode => format!(
                "Your verification code is {}. It expires in {}.",
                self.payload,
                self.validity()
            ),
            MessageTemplate::PasswordResetLink => format!(
                "We received a request to reset your password. Visit the following link to set a new one:\n\n{}\n\nThe link expires in {}. If you didn't request this, please ignore this email.",
                self.payload,
                self.validity()
            ),
            MessageTemplate::PasswordResetCode => format!(
                "Use this code to reset your password: {}\n\nThe code expires in {}. If you didn't request this, please ignore this email.",
                self.payload,
                self.validity()
            ),
        }
    }

    pub fn html_body(&self) -> String {
        let content = match self.template {
            MessageTemplate::PasswordResetLink => format!(
                r#"<p>We received a request to reset your password. Click the link below to set a new one:</p>
                <p><a href="{0}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">Reset Password</a></p>
                <p style="color: #666; font-size: 12px;">This link will expire in {1}. If you didn't request this, please ignore this email.</p>"#,
                self.payload,
                self.validity()
            ),
            _ => format!(
                r#"<p>{0}</p>
                <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{1}</p>
                <p style="color: #666; font-size: 12px;">This code will expire in {2}.</p>"#,
                self.subject(),
                self.payload,
                self.validity()
            ),
        };

        format!(
            r#"<html><body style="font-family: Arial, sans-serif;"><h2>{}</h2>{}</body></html>"#,
            self.subject(),
            content
        )
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// The email and SMS channels a flow can dispatch through.
#[derive(Clone)]
pub struct NotificationChannels {
    pub email: Arc<dyn NotificationChannel>,
    pub sms: Arc<dyn NotificationChannel>,
}

impl NotificationChannels {
    pub fn new(email: Arc<dyn NotificationChannel>, sms: Arc<dyn NotificationChannel>) -> Self {
        Self { email, sms }
    }

    pub fn for_method(&self, method: ContactMethod) -> &Arc<dyn NotificationChannel> {
        match method {
            ContactMethod::Email => &self.email,
            ContactMethod::Sms => &self.sms,
        }
    }
}

/// SMTP email channel.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        let from = config.from.parse::<Mailbox>().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid SMTP_FROM address: {}", e))
        })?;

        tracing::info!(host = %config.host, "Email channel initialized with SMTP relay");

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let to: Mailbox = message
            .destination
            .parse()
            .map_err(|e| ChannelError::InvalidRecipient(format!("{}", e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text_body()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body()),
                    ),
            )
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        self.transport.send(email).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to send email");
            ChannelError::SendFailed(e.to_string())
        })?;

        tracing::info!(template = ?message.template, "Email sent successfully");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    sender: &'a str,
    to: &'a str,
    message: String,
}

/// HTTP SMS gateway channel.
pub struct SmsChannel {
    config: SmsConfig,
    client: Client,
}

impl SmsChannel {
    pub fn new(config: SmsConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build SMS client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if !self.config.enabled {
            return Err(ChannelError::NotEnabled("sms"));
        }

        let request = SmsRequest {
            sender: &self.config.sender_id,
            to: &message.destination,
            message: message.text_body(),
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("authkey", self.config.auth_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Failed to reach SMS gateway: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "SMS gateway returned error status {}: {}",
                status, body
            )));
        }

        tracing::info!("SMS sent successfully");
        Ok(())
    }
}

/// Records every message instead of sending it. Can be switched to fail.
#[derive(Default)]
pub struct MockChannel {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Payload of the most recent message to `destination`.
    pub fn last_payload_to(&self, destination: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.destination == destination)
            .map(|m| m.payload)
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("mock channel is failing".to_string()));
        }

        tracing::info!(template = ?message.template, "[MOCK] Message would be sent");
        self.sent
            .lock()
            .map_err(|e| ChannelError::SendFailed(format!("mock lock poisoned: {}", e)))?
            .push(message.clone());
        Ok(())
    }
}
