//! In-memory browser history and the process-wide router singleton.
//!
//! The singleton has an explicit lifecycle: [`install`] at application start,
//! [`teardown`] when the page goes away (and between tests).

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};

use crate::canonical::CanonicalUrl;

lazy_static! {
    static ref SINGLETON: RwLock<Option<Arc<HistoryRouter>>> = RwLock::new(None);
}

#[derive(Debug)]
struct History {
    entries: Vec<CanonicalUrl>,
    cursor: usize,
}

/// Address bar plus back/forward stack.
#[derive(Debug)]
pub struct HistoryRouter {
    inner: Mutex<History>,
}

impl HistoryRouter {
    pub fn new(initial: CanonicalUrl) -> Self {
        Self {
            inner: Mutex::new(History { entries: vec![initial], cursor: 0 }),
        }
    }

    pub fn current(&self) -> CanonicalUrl {
        let h = self.inner.lock();
        h.entries[h.cursor].clone()
    }

    /// New entry after the current one; forward entries are discarded. Pushing the current
    /// location again is a no-op.
    pub fn push(&self, url: CanonicalUrl) {
        let mut h = self.inner.lock();
        if h.entries[h.cursor] == url {
            return;
        }
        let keep = h.cursor + 1;
        h.entries.truncate(keep);
        h.entries.push(url);
        h.cursor += 1;
    }

    pub fn replace(&self, url: CanonicalUrl) {
        let mut h = self.inner.lock();
        let cursor = h.cursor;
        h.entries[cursor] = url;
    }

    pub fn back(&self) -> Option<CanonicalUrl> {
        let mut h = self.inner.lock();
        if h.cursor == 0 {
            return None;
        }
        h.cursor -= 1;
        Some(h.entries[h.cursor].clone())
    }

    pub fn forward(&self) -> Option<CanonicalUrl> {
        let mut h = self.inner.lock();
        if h.cursor + 1 >= h.entries.len() {
            return None;
        }
        h.cursor += 1;
        Some(h.entries[h.cursor].clone())
    }

    /// Number of history entries, including forward ones.
    pub fn depth(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// Create the shared router at `initial`, replacing any previous one.
pub fn install(initial: CanonicalUrl) -> Arc<HistoryRouter> {
    let router = Arc::new(HistoryRouter::new(initial));
    *SINGLETON.write() = Some(router.clone());
    tracing::debug!(url = %router.current(), "router installed");
    router
}

pub fn singleton() -> Option<Arc<HistoryRouter>> {
    SINGLETON.read().clone()
}

/// Drop the shared router. Sessions still holding a handle keep working on their copy.
pub fn teardown() {
    if SINGLETON.write().take().is_some() {
        tracing::debug!("router torn down");
    }
}
