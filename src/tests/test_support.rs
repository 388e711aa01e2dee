use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};

use crate::{LoginRedirect, MemoryTokenStore, SessionManager, TokenPair, TokenStore};

pub fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair {
        access: access.to_string(),
        refresh: refresh.to_string(),
    }
}

/// Session backed by an in-memory store plus a counter of login redirects.
pub struct TestSession {
    pub session: Arc<SessionManager>,
    pub store: Arc<MemoryTokenStore>,
    pub redirects: Arc<AtomicUsize>,
}

impl TestSession {
    pub fn new(tokens: Option<TokenPair>) -> Self {
        let store = Arc::new(match tokens {
            Some(pair) => MemoryTokenStore::with_pair(&pair),
            None => MemoryTokenStore::new(),
        });
        let redirects = Arc::new(AtomicUsize::new(0));
        let counter = redirects.clone();
        let redirect: Arc<dyn LoginRedirect> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let session = Arc::new(SessionManager::new(
            store.clone() as Arc<dyn TokenStore>,
            redirect,
        ));
        Self {
            session,
            store,
            redirects,
        }
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

struct VecWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl std::io::Write for VecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.lines.lock().unwrap();
        guard.push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn make_subscriber(lines: Arc<Mutex<Vec<String>>>) -> impl tracing::Subscriber + Send + Sync {
    let writer_lines = lines.clone();
    Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    )
}

pub fn capture_logs() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let guard = set_default(make_subscriber(lines.clone()));
    (lines, guard)
}

pub fn drain_logs(lines: Arc<Mutex<Vec<String>>>) -> Vec<String> {
    lines.lock().unwrap().clone()
}
