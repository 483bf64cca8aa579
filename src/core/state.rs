use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::extraction::TextExtractor;
use crate::services::generation::TextGenerator;
use crate::services::rendering::DocumentRenderer;
use crate::services::sessions::{SessionLocks, SessionStore};
use crate::services::storage::FileStore;

/// External capabilities the handlers depend on, swappable in tests.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) extractor: Arc<dyn TextExtractor>,
    pub(crate) renderer: Arc<dyn DocumentRenderer>,
    pub(crate) files: Arc<dyn FileStore>,
    pub(crate) sessions: Arc<dyn SessionStore>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    collaborators: Collaborators,
    session_locks: SessionLocks,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState {
                settings,
                db,
                redis,
                collaborators,
                session_locks: SessionLocks::default(),
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn generator(&self) -> &dyn TextGenerator {
        self.inner.collaborators.generator.as_ref()
    }

    pub(crate) fn extractor(&self) -> &dyn TextExtractor {
        self.inner.collaborators.extractor.as_ref()
    }

    pub(crate) fn renderer(&self) -> &dyn DocumentRenderer {
        self.inner.collaborators.renderer.as_ref()
    }

    pub(crate) fn files(&self) -> &dyn FileStore {
        self.inner.collaborators.files.as_ref()
    }

    pub(crate) fn sessions(&self) -> &dyn SessionStore {
        self.inner.collaborators.sessions.as_ref()
    }

    pub(crate) fn session_locks(&self) -> &SessionLocks {
        &self.inner.session_locks
    }
}
