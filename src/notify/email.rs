use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AlertNotice, ChannelKind, CrisisChannel};

/// SMTP delivery for one stakeholder party. Returns `None` unless both the
/// shared SMTP settings and this party's recipient are configured.
pub struct EmailChannel {
    kind: ChannelKind,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    pub fn from_env(kind: ChannelKind) -> Option<Self> {
        let to_var = match kind {
            ChannelKind::Counselor => "CRISIS_EMAIL_COUNSELOR",
            ChannelKind::MonitoringTeam => "CRISIS_EMAIL_TEAM",
            ChannelKind::Guardian => "CRISIS_EMAIL_GUARDIAN",
            ChannelKind::Institution => "CRISIS_EMAIL_INSTITUTION",
        };
        let to_addr = std::env::var(to_var).ok()?;
        let host = std::env::var("SMTP_HOST").ok()?;
        let user = std::env::var("SMTP_USER").ok()?;
        let pass = std::env::var("SMTP_PASS").ok()?;
        let from_addr = std::env::var("CRISIS_EMAIL_FROM").ok()?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .ok()?
            .credentials(Credentials::new(user, pass))
            .build();
        let from = from_addr.parse().ok()?;
        let to = to_addr.parse().ok()?;

        Some(Self {
            kind,
            mailer,
            from,
            to,
        })
    }
}

#[async_trait]
impl CrisisChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, notice: &AlertNotice) -> Result<()> {
        let subject = format!(
            "Crisis alert #{} ({})",
            notice.alert_id, notice.risk_source
        );
        let body = format!(
            "A high-risk message was detected.\n\n\
             Alert ID: {}\nStudent: {}\nSource: {}\nTime (UTC): {}\n\n\
             Message excerpt:\n{}\n",
            notice.alert_id,
            notice.user_id,
            notice.risk_source,
            notice.created_at.to_rfc3339(),
            notice.message_excerpt,
        );

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build alert email")?;

        self.mailer.send(msg).await.context("send alert email")?;
        Ok(())
    }
}
