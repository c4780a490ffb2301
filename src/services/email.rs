use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::time::Duration;

/// Outbound mail. Failures are logged by callers and never fail a request.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_welcome_email(
        &self,
        to_email: &str,
        first_name: Option<&str>,
        organization_name: &str,
    ) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| anyhow::anyhow!("Failed to build SMTP transport: {}", e))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), anyhow::Error> {
        let email = Message::builder()
            .from(self.from_email.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        // SMTP transport is blocking; keep it off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email)).await?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(anyhow::anyhow!("SMTP send failed: {}", e))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_welcome_email(
        &self,
        to_email: &str,
        first_name: Option<&str>,
        organization_name: &str,
    ) -> Result<(), anyhow::Error> {
        let greeting = match first_name {
            Some(name) => format!("Hi {name},"),
            None => "Hi,".to_string(),
        };

        let html_body = format!(
            r#"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Welcome to {organization_name}</h2>
                    <p>{greeting}</p>
                    <p>Your organization <strong>{organization_name}</strong> is set up and your 30-day trial has started.</p>
                    <p>You can sign in and start adding displays right away.</p>
                </body>
            </html>"#,
        );

        let plain_body = format!(
            "{greeting}\n\nYour organization {organization_name} is set up and your 30-day trial has started.\n\nYou can sign in and start adding displays right away.",
        );

        self.send_email(
            to_email,
            &format!("Welcome to {organization_name}"),
            &plain_body,
            &html_body,
        )
        .await
    }
}

#[derive(Clone, Default)]
pub struct MockEmailService;

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_welcome_email(
        &self,
        _to_email: &str,
        _first_name: Option<&str>,
        _organization_name: &str,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_transport_from_config() {
        let config = crate::config::SmtpConfig {
            host: "smtp.example.com".to_string(),
            user: "mailer@example.com".to_string(),
            password: "app-password".to_string(),
        };

        assert!(SmtpEmailService::new(&config).is_ok());
    }
}
