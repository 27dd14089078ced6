use async_trait::async_trait;

/// Delivers password-reset links out of band.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_password_reset(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> anyhow::Result<()>;
}

/// Writes the reset link to the log instead of sending mail.
pub struct LoggingNotifier {
    reset_url_base: String,
}

impl LoggingNotifier {
    pub fn new(reset_url_base: impl Into<String>) -> Self {
        Self {
            reset_url_base: reset_url_base.into(),
        }
    }

    pub fn reset_url(&self, token: &str) -> String {
        format!("{}?token={}", self.reset_url_base, token)
    }
}

#[async_trait]
impl ResetNotifier for LoggingNotifier {
    async fn send_password_reset(
        &self,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            username,
            email = to_email,
            reset_url = %self.reset_url(token),
            token,
            "password reset requested; link is valid for one hour"
        );
        Ok(())
    }
}
