//! Scripted browser backend shared by the integration tests

#![allow(dead_code)]

use coderender::{BrowserBackend, BrowserSession, Error, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Default)]
pub struct FakeBackend {
    pub launches: AtomicUsize,
    pub fail_launch: AtomicBool,
    /// The next session launched dies during its first capture
    pub next_dies_on_capture: AtomicBool,
    /// How long every capture of sessions launched from now on blocks
    pub capture_delay_ms: AtomicU64,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_session(&self) -> Option<Arc<FakeSession>> {
        self.sessions.lock().unwrap().last().cloned()
    }

    /// Every document any session captured, in capture order
    pub fn documents(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| s.documents.lock().unwrap().clone())
            .collect()
    }
}

impl BrowserBackend for FakeBackend {
    fn launch(&self) -> Result<Arc<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::LaunchError("no chrome here".to_string()));
        }

        let session = Arc::new(FakeSession {
            alive: AtomicBool::new(true),
            dies_on_capture: AtomicBool::new(self.next_dies_on_capture.swap(false, Ordering::SeqCst)),
            closed: AtomicBool::new(false),
            capture_delay: Duration::from_millis(self.capture_delay_ms.load(Ordering::SeqCst)),
            alive_checks: AtomicUsize::new(0),
            documents: Mutex::new(Vec::new()),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub struct FakeSession {
    pub alive: AtomicBool,
    pub dies_on_capture: AtomicBool,
    pub closed: AtomicBool,
    pub capture_delay: Duration,
    /// How often the renderer asked whether this session is alive
    pub alive_checks: AtomicUsize,
    pub documents: Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn alive_checks(&self) -> usize {
        self.alive_checks.load(Ordering::SeqCst)
    }
}

impl BrowserSession for FakeSession {
    fn is_alive(&self) -> bool {
        self.alive_checks.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }

    fn capture(&self, document: &Path, selector: &str) -> Result<Vec<u8>> {
        assert_eq!(selector, ".code-container");
        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }
        if self.dies_on_capture.swap(false, Ordering::SeqCst) {
            self.kill();
            return Err(Error::RenderError("target crashed".to_string()));
        }
        if !self.is_alive() {
            return Err(Error::RenderError("connection closed".to_string()));
        }

        let html = std::fs::read_to_string(document)?;
        self.documents.lock().unwrap().push(html);
        Ok(FAKE_PNG.to_vec())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.kill();
        Ok(())
    }
}
