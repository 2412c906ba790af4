//! Templated email delivery.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.
//! Template names are the ones stored on email records
//! (`plan`, `carpool-matching-sign-up`).

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use serde_json::Map;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use commuter_core::Email;

use crate::config::EmailConfig;
use crate::models::email::{DeliveryResult, EmailOptions};

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailerError {
    /// Options carry no template name.
    #[error("email template is required")]
    MissingTemplate,

    /// Options carry no usable recipient address.
    #[error("recipient email address is required")]
    MissingRecipient,

    /// No template with this name exists.
    #[error("unknown email template: {0}")]
    UnknownTemplate(String),

    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Renders and delivers one email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, options: &EmailOptions) -> Result<DeliveryResult, MailerError>;
}

/// Known email templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    Plan,
    CarpoolMatchingSignUp,
}

impl EmailTemplate {
    /// Look up a template by its stored name.
    ///
    /// # Errors
    ///
    /// Returns `MailerError::UnknownTemplate` for any other name.
    pub fn from_name(name: &str) -> Result<Self, MailerError> {
        match name {
            "plan" => Ok(Self::Plan),
            "carpool-matching-sign-up" => Ok(Self::CarpoolMatchingSignUp),
            other => Err(MailerError::UnknownTemplate(other.to_string())),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::CarpoolMatchingSignUp => "carpool-matching-sign-up",
        }
    }

    /// Render the plain text and HTML bodies.
    ///
    /// # Errors
    ///
    /// Returns `MailerError::Template` if rendering fails.
    pub fn render(self, ctx: &TemplateContext<'_>) -> Result<(String, String), MailerError> {
        Ok(match self {
            Self::Plan => (PlanEmailText { ctx }.render()?, PlanEmailHtml { ctx }.render()?),
            Self::CarpoolMatchingSignUp => (
                CarpoolEmailText { ctx }.render()?,
                CarpoolEmailHtml { ctx }.render()?,
            ),
        })
    }
}

/// Values every template may reference.
#[derive(Debug)]
pub struct TemplateContext<'a> {
    pub name: &'a str,
    pub application_name: &'a str,
    pub link: &'a str,
    pub organization: &'a str,
    pub organization_url: &'a str,
    pub survey: Option<&'a str>,
}

impl<'a> TemplateContext<'a> {
    #[must_use]
    pub fn from_options(options: &'a EmailOptions) -> Self {
        let name = options
            .name
            .as_deref()
            .or_else(|| options.to.as_ref().and_then(|to| to.name.as_deref()))
            .unwrap_or_default();

        Self {
            name,
            application_name: options.application_name.as_deref().unwrap_or_default(),
            link: options.link.as_deref().unwrap_or_default(),
            organization: options.organization.as_deref().unwrap_or_default(),
            organization_url: options.organization_url.as_deref().unwrap_or_default(),
            survey: options.survey.as_deref(),
        }
    }
}

#[derive(Template)]
#[template(path = "email/plan.html")]
struct PlanEmailHtml<'a> {
    ctx: &'a TemplateContext<'a>,
}

#[derive(Template)]
#[template(path = "email/plan.txt")]
struct PlanEmailText<'a> {
    ctx: &'a TemplateContext<'a>,
}

#[derive(Template)]
#[template(path = "email/carpool_matching_sign_up.html")]
struct CarpoolEmailHtml<'a> {
    ctx: &'a TemplateContext<'a>,
}

#[derive(Template)]
#[template(path = "email/carpool_matching_sign_up.txt")]
struct CarpoolEmailText<'a> {
    ctx: &'a TemplateContext<'a>,
}

/// Check that options name a known template and a parseable recipient.
///
/// # Errors
///
/// Returns `MissingTemplate`, `UnknownTemplate` or `MissingRecipient`.
pub fn validate(options: &EmailOptions) -> Result<(EmailTemplate, Email), MailerError> {
    let template = options
        .template
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or(MailerError::MissingTemplate)?;
    let template = EmailTemplate::from_name(template)?;
    let to = options
        .recipient_email()
        .ok_or(MailerError::MissingRecipient)?;
    Ok((template, to))
}

/// SMTP mailer.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a new SMTP mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured or the sender
    /// address is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, MailerError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        let address = config
            .from_address
            .parse()
            .map_err(|_| MailerError::InvalidAddress(config.from_address.clone()))?;

        Ok(Self {
            transport,
            from: Mailbox::new(Some(config.from_name.clone()), address),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip_all, fields(template = ?options.template))]
    async fn send(&self, options: &EmailOptions) -> Result<DeliveryResult, MailerError> {
        let (template, to) = validate(options)?;
        let ctx = TemplateContext::from_options(options);
        let (text, html) = template.render(&ctx)?;

        let address = to
            .as_str()
            .parse()
            .map_err(|_| MailerError::InvalidAddress(to.to_string()))?;
        let recipient_name = options.to.as_ref().and_then(|r| r.name.clone());
        let message_id = format!("<{}@{}>", Uuid::new_v4().simple(), self.from.email.domain());

        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(recipient_name, address))
            .subject(options.subject.clone().unwrap_or_default())
            .message_id(Some(message_id.clone()))
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )?;

        let response = self.transport.send(message).await?;

        let mut details = Map::new();
        details.insert("smtp_code".to_string(), response.code().to_string().into());
        tracing::info!(to = %to, template = template.name(), "Email sent successfully");

        Ok(DeliveryResult {
            id: Some(message_id),
            status: Some("sent".to_string()),
            details,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::email::Recipient;

    fn options() -> EmailOptions {
        EmailOptions {
            application_name: Some("Commute Planner".to_string()),
            link: Some("https://planner.example.com/planner/abc123".to_string()),
            name: Some("Ada Lovelace".to_string()),
            organization: Some("Metro Commuter Services".to_string()),
            organization_url: Some("https://metro.example.com".to_string()),
            template: Some("plan".to_string()),
            subject: Some("Your plan".to_string()),
            survey: Some("https://survey.example.com/s/1".to_string()),
            to: Some(Recipient {
                name: Some("Ada Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
            }),
            ..EmailOptions::default()
        }
    }

    #[test]
    fn test_template_names() {
        for template in [EmailTemplate::Plan, EmailTemplate::CarpoolMatchingSignUp] {
            assert_eq!(EmailTemplate::from_name(template.name()).unwrap(), template);
        }
        assert!(matches!(
            EmailTemplate::from_name("invite-manager"),
            Err(MailerError::UnknownTemplate(_))
        ));
    }

    #[test]
    fn test_validate_requires_template_and_recipient() {
        assert!(validate(&options()).is_ok());

        let mut missing_template = options();
        missing_template.template = Some("  ".to_string());
        assert!(matches!(
            validate(&missing_template),
            Err(MailerError::MissingTemplate)
        ));

        let mut missing_to = options();
        missing_to.to = Some(Recipient {
            name: Some("Ada".to_string()),
            email: None,
        });
        assert!(matches!(validate(&missing_to), Err(MailerError::MissingRecipient)));

        let mut bad_to = options();
        bad_to.to = Some(Recipient {
            name: None,
            email: Some("not-an-address".to_string()),
        });
        assert!(matches!(validate(&bad_to), Err(MailerError::MissingRecipient)));
    }

    #[test]
    fn test_plan_renders_link_and_survey() {
        let options = options();
        let ctx = TemplateContext::from_options(&options);
        let (text, html) = EmailTemplate::Plan.render(&ctx).unwrap();

        assert!(text.contains("Hi Ada Lovelace,"));
        assert!(text.contains("https://planner.example.com/planner/abc123"));
        assert!(text.contains("https://survey.example.com/s/1"));
        assert!(html.contains("View your commute plan"));
    }

    #[test]
    fn test_plan_without_survey_omits_it() {
        let mut options = options();
        options.survey = None;
        let ctx = TemplateContext::from_options(&options);
        let (text, _) = EmailTemplate::Plan.render(&ctx).unwrap();
        assert!(!text.contains("survey"));
    }

    #[test]
    fn test_name_falls_back_to_recipient() {
        let mut options = options();
        options.name = None;
        let ctx = TemplateContext::from_options(&options);
        assert_eq!(ctx.name, "Ada Lovelace");

        let (text, _) = EmailTemplate::CarpoolMatchingSignUp.render(&ctx).unwrap();
        assert!(text.contains("carpool matching with Metro Commuter Services"));
    }
}
