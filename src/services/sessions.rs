use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::redis::RedisHandle;

#[derive(Debug, Error)]
pub(crate) enum SessionStoreError {
    #[error("session backend error: {0}")]
    Backend(String),
    #[error("stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key-value store for ephemeral sessions. Entries expire after their TTL.
#[async_trait]
pub(crate) trait SessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionStoreError>;
    async fn save(&self, key: &str, value: String, ttl: Duration) -> Result<(), SessionStoreError>;
}

pub(crate) async fn load_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &str,
) -> Result<Option<T>, SessionStoreError> {
    match store.load(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub(crate) async fn save_json<T: Serialize>(
    store: &dyn SessionStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), SessionStoreError> {
    store.save(key, serde_json::to_string(value)?, ttl).await
}

#[derive(Default)]
pub(crate) struct MemorySessionStore {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, (expires_at, _)| *expires_at > now);
        Ok(entries.get(key).map(|(_, value)| value.clone()))
    }

    async fn save(&self, key: &str, value: String, ttl: Duration) -> Result<(), SessionStoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, (expires_at, _)| *expires_at > now);
        entries.insert(key.to_string(), (now + ttl, value));
        Ok(())
    }
}

pub(crate) struct RedisSessionStore {
    redis: RedisHandle,
}

impl RedisSessionStore {
    pub(crate) fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }

    fn namespaced(key: &str) -> String {
        format!("gradeflow:session:{key}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        self.redis
            .get_string(&Self::namespaced(key))
            .await
            .map_err(|err| SessionStoreError::Backend(err.to_string()))
    }

    async fn save(&self, key: &str, value: String, ttl: Duration) -> Result<(), SessionStoreError> {
        self.redis
            .set_with_ttl(&Self::namespaced(key), &value, ttl.as_secs().max(1))
            .await
            .map_err(|err| SessionStoreError::Backend(err.to_string()))
    }
}

/// Per-session async mutexes; entries vanish once no guard or waiter holds them.
#[derive(Default)]
pub(crate) struct SessionLocks {
    locks: std::sync::Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl SessionLocks {
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, weak| weak.strong_count() > 0);
        locks.len()
    }
}

pub(crate) fn interview_key(id: &str) -> String {
    format!("interview:{id}")
}

pub(crate) fn teacher_key(id: &str) -> String {
    format!("teacher:{id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct InterviewSession {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) created_at: String,
    pub(crate) interview_type: String,
    pub(crate) difficulty: String,
    pub(crate) conversation_history: Vec<serde_json::Value>,
    pub(crate) stats: BTreeMap<String, f64>,
}

impl InterviewSession {
    pub(crate) fn new(
        id: String,
        owner_id: String,
        created_at: String,
        interview_type: Option<String>,
        difficulty: Option<String>,
    ) -> Self {
        let stats = ["questions_asked", "corrections_made", "duration"]
            .into_iter()
            .map(|name| (name.to_string(), 0.0))
            .collect();

        Self {
            id,
            owner_id,
            created_at,
            interview_type: non_blank(interview_type).unwrap_or_else(|| "technical".to_string()),
            difficulty: non_blank(difficulty).unwrap_or_else(|| "medium".to_string()),
            conversation_history: Vec::new(),
            stats,
        }
    }

    pub(crate) fn apply_update(
        &mut self,
        entry: Option<serde_json::Value>,
        stats: BTreeMap<String, f64>,
    ) {
        if let Some(entry) = entry {
            self.conversation_history.push(entry);
        }
        self.stats.extend(stats);
    }

    /// Logs an analyzed answer and counts it when it carried corrections.
    pub(crate) fn record_analysis(&mut self, response: &str, analysis: &str, has_corrections: bool) {
        self.conversation_history.push(serde_json::json!({
            "role": "user",
            "content": response,
        }));
        self.conversation_history.push(serde_json::json!({
            "role": "analysis",
            "content": analysis,
            "has_corrections": has_corrections,
        }));
        if has_corrections {
            *self.stats.entry("corrections_made".to_string()).or_insert(0.0) += 1.0;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConversationEntry {
    pub(crate) role: String,
    pub(crate) content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeneratedPaper {
    pub(crate) id: String,
    pub(crate) created_at: String,
    pub(crate) content: String,
    pub(crate) num_questions: u32,
    pub(crate) difficulty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GradedAnswer {
    pub(crate) id: String,
    pub(crate) student_name: String,
    pub(crate) question: String,
    pub(crate) answer: String,
    pub(crate) grading: String,
    pub(crate) score: String,
    pub(crate) created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TeacherStats {
    pub(crate) questions_asked: u64,
    pub(crate) papers_generated: u64,
    pub(crate) answers_graded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TeacherSession {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) created_at: String,
    pub(crate) syllabus: String,
    pub(crate) pyq: String,
    pub(crate) conversation_history: Vec<ConversationEntry>,
    pub(crate) generated_papers: Vec<GeneratedPaper>,
    pub(crate) graded_answers: Vec<GradedAnswer>,
    pub(crate) stats: TeacherStats,
}

impl TeacherSession {
    pub(crate) fn new(
        id: String,
        owner_id: String,
        created_at: String,
        syllabus: String,
        pyq: String,
    ) -> Self {
        Self {
            id,
            owner_id,
            created_at,
            syllabus,
            pyq,
            conversation_history: Vec::new(),
            generated_papers: Vec::new(),
            graded_answers: Vec::new(),
            stats: TeacherStats::default(),
        }
    }

    pub(crate) fn has_material(&self) -> bool {
        !self.syllabus.is_empty() || !self.pyq.is_empty()
    }

    /// Combined reference material shown to the generator.
    pub(crate) fn reference_material(&self) -> String {
        format!("Syllabus:\n{}\n\nPrevious Year Questions:\n{}", self.syllabus, self.pyq)
    }

    pub(crate) fn record_exchange(&mut self, question: &str, answer: &str) {
        self.conversation_history
            .push(ConversationEntry { role: "student".to_string(), content: question.to_string() });
        self.conversation_history
            .push(ConversationEntry { role: "teacher".to_string(), content: answer.to_string() });
        self.stats.questions_asked += 1;
    }

    pub(crate) fn record_paper(&mut self, paper: GeneratedPaper) {
        self.generated_papers.push(paper);
        self.stats.papers_generated += 1;
    }

    pub(crate) fn record_grade(&mut self, graded: GradedAnswer) {
        self.graded_answers.push(graded);
        self.stats.answers_graded += 1;
    }

    pub(crate) fn find_paper(&self, paper_id: &str) -> Option<&GeneratedPaper> {
        self.generated_papers.iter().find(|paper| paper.id == paper_id)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
