use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use tracing::{debug, info};

/// A plain-text message ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

pub fn confirmation_email(from: &str, to: &str, confirm_url: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: "Confirm your email".to_string(),
        text: format!("Hello! Follow this link to confirm your email address: {confirm_url}"),
    }
}

pub fn password_reset_email(from: &str, to: &str, new_password: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: "Your password has been reset".to_string(),
        text: format!("Your new password for signing in: {new_password}"),
    }
}

/// Delivers through a JSON mail API.
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    url: String,
    key: String,
}

impl HttpMailer {
    pub fn new(url: &str, key: &str) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .user_agent(concat!("accounts/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let t0 = Instant::now();
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(&email)
            .send()
            .await
            .context("mail api request")?;

        let status = res.status();
        let body = res.text().await.context("read mail api response")?;
        debug!(%status, elapsed_ms = t0.elapsed().as_millis() as u64, "mail api responded");

        if !status.is_success() {
            anyhow::bail!("mail api error: HTTP {status}: {body}");
        }
        info!(to = ?email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Logs messages instead of delivering them. Used when no mail API is configured.
/// Bodies can hold credentials, so only the envelope is written.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl LogMailer {
    fn envelope(email: &OutgoingEmail) -> String {
        format!(
            "{} -> {}: {} ({} bytes)",
            email.from,
            email.to.join(", "),
            email.subject,
            email.text.len()
        )
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        info!(envelope = %Self::envelope(&email), "email send stub");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every message for later assertions.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    pub struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: OutgoingEmail) -> anyhow::Result<()> {
            anyhow::bail!("mail transport unavailable")
        }
    }
}
