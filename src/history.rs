//! Conversation, mood and journal history. The pipeline only ever reads a
//! small recent window and appends risk-labeled turns; storage consistency
//! belongs to whichever backend implements [`HistoryStore`].
//!
//! The bundled [`MemoryHistory`] keeps everything in process memory. It is
//! the default for local runs and tests; a database-backed store plugs in
//! behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::risk::RiskLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub sender: Sender,
    pub text: String,
    pub risk_label: RiskLabel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodEntry {
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent first.
    async fn recent_moods(&self, user_id: &str, limit: usize) -> Result<Vec<MoodEntry>>;

    /// Risk labels of the user's recent chat turns, most recent first.
    async fn recent_risk_labels(&self, user_id: &str, limit: usize) -> Result<Vec<RiskLabel>>;

    /// Texts of the user's recent chat turns (both sides), most recent first.
    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<String>>;

    /// Full turns for client display, most recent first.
    async fn chat_history(&self, user_id: &str, limit: usize) -> Result<Vec<ChatTurn>>;

    async fn persist_chat_turn(
        &self,
        user_id: &str,
        sender: Sender,
        text: &str,
        risk_label: RiskLabel,
    ) -> Result<()>;

    async fn record_mood(&self, user_id: &str, score: i32) -> Result<()>;

    async fn record_journal(&self, user_id: &str, content: &str) -> Result<()>;

    async fn journal_history(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>>;
}

#[derive(Default)]
struct UserRecord {
    turns: Vec<ChatTurn>,
    moods: Vec<MoodEntry>,
    journals: Vec<JournalEntry>,
}

/// In-process store. One mutex over a per-user map is enough at the
/// request rates this serves.
#[derive(Default)]
pub struct MemoryHistory {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&UserRecord) -> T) -> T {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        match users.get(user_id) {
            Some(record) => f(record),
            None => f(&UserRecord::default()),
        }
    }

    fn with_user_mut<T>(&self, user_id: &str, f: impl FnOnce(&mut UserRecord) -> T) -> T {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        f(users.entry(user_id.to_string()).or_default())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn recent_moods(&self, user_id: &str, limit: usize) -> Result<Vec<MoodEntry>> {
        Ok(self.with_user(user_id, |r| {
            r.moods.iter().rev().take(limit).cloned().collect()
        }))
    }

    async fn recent_risk_labels(&self, user_id: &str, limit: usize) -> Result<Vec<RiskLabel>> {
        Ok(self.with_user(user_id, |r| {
            r.turns
                .iter()
                .rev()
                .filter(|t| t.sender == Sender::User)
                .take(limit)
                .map(|t| t.risk_label)
                .collect()
        }))
    }

    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.with_user(user_id, |r| {
            r.turns
                .iter()
                .rev()
                .take(limit)
                .map(|t| t.text.clone())
                .collect()
        }))
    }

    async fn chat_history(&self, user_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        Ok(self.with_user(user_id, |r| {
            r.turns.iter().rev().take(limit).cloned().collect()
        }))
    }

    async fn persist_chat_turn(
        &self,
        user_id: &str,
        sender: Sender,
        text: &str,
        risk_label: RiskLabel,
    ) -> Result<()> {
        self.with_user_mut(user_id, |r| {
            r.turns.push(ChatTurn {
                sender,
                text: text.to_string(),
                risk_label,
                created_at: Utc::now(),
            });
        });
        Ok(())
    }

    async fn record_mood(&self, user_id: &str, score: i32) -> Result<()> {
        self.with_user_mut(user_id, |r| {
            r.moods.push(MoodEntry {
                score,
                created_at: Utc::now(),
            });
        });
        Ok(())
    }

    async fn record_journal(&self, user_id: &str, content: &str) -> Result<()> {
        self.with_user_mut(user_id, |r| {
            r.journals.push(JournalEntry {
                content: content.to_string(),
                created_at: Utc::now(),
            });
        });
        Ok(())
    }

    async fn journal_history(&self, user_id: &str, limit: usize) -> Result<Vec<JournalEntry>> {
        Ok(self.with_user(user_id, |r| {
            r.journals.iter().rev().take(limit).cloned().collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn turns_come_back_most_recent_first() {
        let store = MemoryHistory::new();
        for (i, label) in [RiskLabel::Low, RiskLabel::Medium, RiskLabel::High]
            .iter()
            .enumerate()
        {
            store
                .persist_chat_turn("u1", Sender::User, &format!("msg {i}"), *label)
                .await
                .unwrap();
        }
        let msgs = store.recent_messages("u1", 2).await.unwrap();
        assert_eq!(msgs, vec!["msg 2".to_string(), "msg 1".to_string()]);

        let labels = store.recent_risk_labels("u1", 10).await.unwrap();
        assert_eq!(labels[0], RiskLabel::High);
    }

    #[tokio::test]
    async fn risk_labels_exclude_bot_turns() {
        let store = MemoryHistory::new();
        store
            .persist_chat_turn("u1", Sender::User, "hi", RiskLabel::High)
            .await
            .unwrap();
        store
            .persist_chat_turn("u1", Sender::Bot, "hello", RiskLabel::Low)
            .await
            .unwrap();
        let labels = store.recent_risk_labels("u1", 10).await.unwrap();
        assert_eq!(labels, vec![RiskLabel::High]);
        // Message texts still include both sides.
        assert_eq!(store.recent_messages("u1", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_user_has_empty_history() {
        let store = MemoryHistory::new();
        assert!(store.recent_moods("ghost", 5).await.unwrap().is_empty());
        assert!(store.chat_history("ghost", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn moods_and_journals_round_trip() {
        let store = MemoryHistory::new();
        store.record_mood("u1", 4).await.unwrap();
        store.record_mood("u1", 8).await.unwrap();
        let moods = store.recent_moods("u1", 5).await.unwrap();
        assert_eq!(moods.len(), 2);
        assert_eq!(moods[0].score, 8);

        store.record_journal("u1", "long day").await.unwrap();
        let journals = store.journal_history("u1", 5).await.unwrap();
        assert_eq!(journals[0].content, "long day");
    }
}
