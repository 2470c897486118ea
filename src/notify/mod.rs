//! Stakeholder notification channels for crisis alerts.
//!
//! Four parties are notified for every alert: the student's assigned
//! counselor, the platform monitoring team, the guardian contact, and the
//! institution contact. Each party maps to exactly one channel; channels
//! are best-effort and a failure in one never blocks the others.

pub mod email;
pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use email::EmailChannel;
use webhook::WebhookChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Counselor,
    MonitoringTeam,
    Guardian,
    Institution,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Counselor,
        ChannelKind::MonitoringTeam,
        ChannelKind::Guardian,
        ChannelKind::Institution,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Counselor => "counselor",
            ChannelKind::MonitoringTeam => "monitoring_team",
            ChannelKind::Guardian => "guardian",
            ChannelKind::Institution => "institution",
        }
    }
}

/// What a channel gets to see about an alert. The excerpt is capped by the
/// dispatcher; channels never receive the full conversation.
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub alert_id: u64,
    pub user_id: String,
    pub risk_source: String,
    pub message_excerpt: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CrisisChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, notice: &AlertNotice) -> Result<()>;
}

/// Fallback channel when no transport is configured for a party: the alert
/// still lands in the structured log stream.
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl CrisisChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, notice: &AlertNotice) -> Result<()> {
        info!(
            channel = self.kind.as_str(),
            alert_id = notice.alert_id,
            user_id = %notice.user_id,
            source = %notice.risk_source,
            "crisis alert (no transport configured for this party)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelOutcome {
    pub kind: ChannelKind,
    pub delivered: bool,
}

/// One channel per stakeholder party, resolved at startup.
pub struct NotifierMux {
    channels: Vec<Arc<dyn CrisisChannel>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Arc<dyn CrisisChannel>>) -> Self {
        Self { channels }
    }

    /// Log-only channels for every party. Default for local runs and tests.
    pub fn noop() -> Self {
        Self::new(
            ChannelKind::ALL
                .iter()
                .map(|&k| Arc::new(LogChannel::new(k)) as Arc<dyn CrisisChannel>)
                .collect(),
        )
    }

    /// Resolve each party's transport from the environment: SMTP where a
    /// recipient is configured, the team webhook for monitoring if set,
    /// structured logs otherwise.
    pub fn from_env() -> Self {
        let mut channels: Vec<Arc<dyn CrisisChannel>> = Vec::with_capacity(4);
        for kind in ChannelKind::ALL {
            if let Some(ch) = EmailChannel::from_env(kind) {
                channels.push(Arc::new(ch));
                continue;
            }
            if kind == ChannelKind::MonitoringTeam {
                if let Some(ch) = WebhookChannel::from_env() {
                    channels.push(Arc::new(ch));
                    continue;
                }
            }
            channels.push(Arc::new(LogChannel::new(kind)));
        }
        Self::new(channels)
    }

    /// Attempt every channel in sequence. Failures are logged and counted;
    /// the returned outcomes record who actually got through.
    pub async fn dispatch_all(&self, notice: &AlertNotice) -> Vec<ChannelOutcome> {
        let mut outcomes = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let kind = channel.kind();
            let delivered = match channel.send(notice).await {
                Ok(()) => {
                    info!(
                        channel = kind.as_str(),
                        alert_id = notice.alert_id,
                        "crisis notification delivered"
                    );
                    true
                }
                Err(e) => {
                    warn!(
                        channel = kind.as_str(),
                        alert_id = notice.alert_id,
                        error = %e,
                        "crisis notification failed"
                    );
                    metrics::counter!(
                        "crisis_notify_failures_total",
                        "channel" => kind.as_str()
                    )
                    .increment(1);
                    false
                }
            };
            outcomes.push(ChannelOutcome { kind, delivered });
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingChannel(ChannelKind);

    #[async_trait]
    impl CrisisChannel for FailingChannel {
        fn kind(&self) -> ChannelKind {
            self.0
        }

        async fn send(&self, _notice: &AlertNotice) -> Result<()> {
            Err(anyhow::anyhow!("transport down"))
        }
    }

    fn notice() -> AlertNotice {
        AlertNotice {
            alert_id: 1,
            user_id: "u1".into(),
            risk_source: "keyword_match".into(),
            message_excerpt: "…".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_block_the_rest() {
        let mux = NotifierMux::new(vec![
            Arc::new(FailingChannel(ChannelKind::Counselor)),
            Arc::new(LogChannel::new(ChannelKind::MonitoringTeam)),
            Arc::new(LogChannel::new(ChannelKind::Guardian)),
            Arc::new(LogChannel::new(ChannelKind::Institution)),
        ]);
        let outcomes = mux.dispatch_all(&notice()).await;
        assert_eq!(outcomes.len(), 4);
        assert!(!outcomes[0].delivered);
        assert!(outcomes[1..].iter().all(|o| o.delivered));
    }

    #[tokio::test]
    async fn noop_mux_covers_every_party() {
        let outcomes = NotifierMux::noop().dispatch_all(&notice()).await;
        let kinds: Vec<_> = outcomes.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, ChannelKind::ALL.to_vec());
        assert!(outcomes.iter().all(|o| o.delivered));
    }
}
