//! Browser-backed rendering
//!
//! One browser process is shared by every request. It is started lazily,
//! replaced once if a capture fails because it died, and torn down on
//! [`BrowserRenderer::stop`]. Each request gets its own short-lived tab, so
//! requests do not queue behind each other except while the process is
//! being (re)started.
//!
//! Backends are synchronous; their calls run on tokio's blocking pool and
//! never under the state lock, apart from the launch itself.

#[cfg(feature = "cdp")]
pub mod cdp;

use crate::template::CODE_SELECTOR;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Starts browser processes
pub trait BrowserBackend: Send + Sync {
    /// Launch a new browser process. Blocking.
    fn launch(&self) -> Result<Arc<dyn BrowserSession>>;
}

/// A running browser process
pub trait BrowserSession: Send + Sync {
    /// Whether the process still answers. Blocking; only asked after a
    /// failed capture.
    fn is_alive(&self) -> bool;

    /// Load the HTML file at `document` in a fresh tab, wait until it has
    /// finished rendering and return a PNG of the element matching
    /// `selector` (the whole page when nothing matches). Blocking.
    fn capture(&self, document: &Path, selector: &str) -> Result<Vec<u8>>;

    /// Release pages and connections; the process exits once the session
    /// is dropped.
    fn close(&self) -> Result<()>;
}

/// Lifecycle of the shared browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Uninitialized,
    Starting,
    Ready,
    /// Ready, with at least one capture in flight
    Rendering,
    Closing,
    Closed,
}

struct Slot {
    state: BrowserState,
    session: Option<Arc<dyn BrowserSession>>,
}

/// Owns the shared browser and turns documents into PNG files
pub struct BrowserRenderer {
    backend: Arc<dyn BrowserBackend>,
    scratch_dir: PathBuf,
    slot: Mutex<Slot>,
    in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BrowserRenderer {
    /// Images (and the transient HTML they are drawn from) go to `scratch_dir`.
    pub fn new(backend: Arc<dyn BrowserBackend>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            scratch_dir: scratch_dir.into(),
            slot: Mutex::new(Slot {
                state: BrowserState::Uninitialized,
                session: None,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub async fn state(&self) -> BrowserState {
        let state = self.slot.lock().await.state;
        if state == BrowserState::Ready && self.in_flight.load(Ordering::SeqCst) > 0 {
            BrowserState::Rendering
        } else {
            state
        }
    }

    /// Launch the browser now instead of on the first render.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.ensure_session(&mut slot).await.map(|_| ())
    }

    /// Returns the live session and whether it was launched by this call.
    async fn ensure_session(&self, slot: &mut Slot) -> Result<(Arc<dyn BrowserSession>, bool)> {
        if matches!(slot.state, BrowserState::Closing | BrowserState::Closed) {
            return Err(Error::Closed);
        }

        if let Some(session) = &slot.session {
            return Ok((session.clone(), false));
        }

        slot.state = BrowserState::Starting;

        let backend = self.backend.clone();
        let launched = tokio::task::spawn_blocking(move || backend.launch())
            .await
            .map_err(Error::from)
            .and_then(|res| res);

        match launched {
            Ok(session) => {
                info!("Browser started");
                slot.session = Some(session.clone());
                slot.state = BrowserState::Ready;
                Ok((session, true))
            }
            Err(e) => {
                error!("Failed to start browser: {}", e);
                slot.state = BrowserState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Render `document` and return the path of the written PNG.
    ///
    /// A missing or dead browser is relaunched, at most once per call.
    pub async fn render(&self, document: &str) -> Result<PathBuf> {
        let (session, launched) = {
            let mut slot = self.slot.lock().await;
            self.ensure_session(&mut slot).await?
        };

        let _guard = InFlight::enter(&self.in_flight);
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        let html_path = self.scratch_dir.join(format!("{}.html", token));
        tokio::fs::write(&html_path, document).await?;

        let captured = match capture(session.clone(), html_path.clone()).await {
            Ok(png) => Ok(png),
            Err(failure) if !launched && !failure.alive => {
                warn!("Capture failed because the browser died ({}), relaunching once", failure.error);
                match self.replace(&session).await {
                    Ok(session) => capture(session, html_path.clone()).await.map_err(|f| f.error),
                    Err(e) => Err(e),
                }
            }
            Err(failure) => Err(failure.error),
        };

        if let Err(e) = tokio::fs::remove_file(&html_path).await {
            debug!("Could not remove {}: {}", html_path.display(), e);
        }

        let png = captured?;
        let png_path = self.scratch_dir.join(format!("{}.png", token));
        tokio::fs::write(&png_path, &png).await?;
        debug!("Wrote {} ({} bytes)", png_path.display(), png.len());
        Ok(png_path)
    }

    /// Drop `dead` from the slot (unless another request already replaced
    /// it) and hand back a live session.
    async fn replace(&self, dead: &Arc<dyn BrowserSession>) -> Result<Arc<dyn BrowserSession>> {
        let mut slot = self.slot.lock().await;
        if slot.session.as_ref().is_some_and(|s| Arc::ptr_eq(s, dead)) {
            slot.session = None;
        }
        self.ensure_session(&mut slot).await.map(|(s, _)| s)
    }

    /// Close the browser. Later calls to `start`/`render` fail with
    /// [`Error::Closed`].
    pub async fn stop(&self) -> Result<()> {
        let session = {
            let mut slot = self.slot.lock().await;
            if slot.state == BrowserState::Closed {
                return Ok(());
            }
            slot.state = BrowserState::Closing;
            slot.session.take()
        };

        let result = match session {
            Some(session) => tokio::task::spawn_blocking(move || session.close())
                .await
                .map_err(Error::from)
                .and_then(|res| res),
            None => Ok(()),
        };

        self.slot.lock().await.state = BrowserState::Closed;
        info!("Browser closed");
        result
    }
}

struct CaptureFailure {
    error: Error,
    /// Whether the browser still answered after the failure
    alive: bool,
}

/// Capture on the blocking pool. The liveness check only runs after a
/// failure, on the same blocking thread.
async fn capture(session: Arc<dyn BrowserSession>, document: PathBuf) -> std::result::Result<Vec<u8>, CaptureFailure> {
    let joined = tokio::task::spawn_blocking(move || {
        session.capture(&document, CODE_SELECTOR).map_err(|error| CaptureFailure {
            alive: session.is_alive(),
            error,
        })
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => Err(CaptureFailure {
            error: Error::from(e),
            alive: true,
        }),
    }
}
