use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{AlertNotice, ChannelKind, CrisisChannel};

/// JSON webhook for the monitoring team, with bounded exponential retry.
#[derive(Clone)]
pub struct WebhookChannel {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookChannel {
    pub fn from_env() -> Option<Self> {
        std::env::var("CRISIS_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    alert_id: u64,
    user_id: &'a str,
    risk_source: &'a str,
    message_excerpt: &'a str,
    created_at: String,
}

#[async_trait]
impl CrisisChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::MonitoringTeam
    }

    async fn send(&self, notice: &AlertNotice) -> Result<()> {
        let payload = WebhookPayload {
            alert_id: notice.alert_id,
            user_id: &notice.user_id,
            risk_source: &notice.risk_source,
            message_excerpt: &notice.message_excerpt,
            created_at: notice.created_at.to_rfc3339(),
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(anyhow!("crisis webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("crisis webhook request failed: {e}"));
                }
            }
        }
    }
}
