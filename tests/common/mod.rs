#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use session_gate::{ApiClient, Config, LoginRedirect, MemoryTokenStore, TokenPair, TokenStore};
use tracing::subscriber::{DefaultGuard, set_default};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Registry, fmt};

pub fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair {
        access: access.to_string(),
        refresh: refresh.to_string(),
    }
}

pub struct Harness {
    pub client: ApiClient,
    pub store: Arc<MemoryTokenStore>,
    redirects: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(base_url: &str, timeout_secs: Option<u64>, tokens: Option<TokenPair>) -> Self {
        let store = Arc::new(match tokens {
            Some(pair) => MemoryTokenStore::with_pair(&pair),
            None => MemoryTokenStore::new(),
        });
        let redirects = Arc::new(AtomicUsize::new(0));
        let counter = redirects.clone();
        let redirect: Arc<dyn LoginRedirect> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let client = ApiClient::new(
            Config::from_values(base_url, timeout_secs),
            store.clone() as Arc<dyn TokenStore>,
            redirect,
        )
        .expect("client");
        Self {
            client,
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

pub fn capture_logs() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let writer_lines = lines.clone();
    let subscriber = Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    );
    let guard = set_default(subscriber);
    (lines, guard)
}
