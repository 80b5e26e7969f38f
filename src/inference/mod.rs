//! Summarization model backends and their load/unload lifecycle.
//!
//! Loading a model is expensive (tens of seconds to minutes), so the
//! [`ModelManager`] keeps at most one loaded handle and only drops it when
//! told to. The manager is owned by the task worker and never shared;
//! exclusive use of the handle follows from that single owner.

pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tracing::{info, warn};

use crate::{AppError, Result};

/// Prompt pair sent to the model for one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System-level instructions.
    pub system: String,
    /// User message carrying the page content.
    pub user: String,
}

/// A model that can be loaded, queried, and unloaded.
pub trait InferenceBackend: Send + Sync {
    /// Loaded model state; valid until passed back to [`unload`](Self::unload).
    type Handle: Send + Sync + 'static;

    /// Perform the expensive model load.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Inference`] if the model cannot be made ready.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Self::Handle>> + Send + '_>>;

    /// Tear down a loaded model, freeing its device and memory state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Inference`] if teardown fails; the handle is
    /// consumed either way.
    fn unload(&self, handle: Self::Handle)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Generate a completion for `request` with a loaded model.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Inference`] on generation failure.
    fn complete<'a>(
        &'a self,
        handle: &'a Self::Handle,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Owner of the single active model handle.
///
/// Not synchronized: only the task worker calls it.
pub struct ModelManager<B: InferenceBackend> {
    backend: B,
    active: Option<B::Handle>,
}

impl<B: InferenceBackend> ModelManager<B> {
    /// Wrap a backend; nothing is loaded until [`acquire`](Self::acquire).
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: None,
        }
    }

    /// Return the active handle, loading the model first if needed.
    ///
    /// Calling this while a handle is held returns the same handle without
    /// reloading. A failed load leaves the manager unloaded so a later call
    /// can retry.
    ///
    /// # Errors
    ///
    /// Returns the backend's load error.
    pub async fn acquire(&mut self) -> Result<&B::Handle> {
        if self.active.is_none() {
            info!("loading summarization model");
            let started = Instant::now();
            let handle = self.backend.load().await?;
            info!(
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "summarization model loaded"
            );
            self.active = Some(handle);
        }

        self.active
            .as_ref()
            .ok_or_else(|| AppError::Inference("model handle missing after load".into()))
    }

    /// Unload the active model, if any. A no-op when nothing is loaded.
    ///
    /// # Errors
    ///
    /// Returns the backend's unload error. The manager is unloaded
    /// afterwards regardless.
    pub async fn release(&mut self) -> Result<()> {
        let Some(handle) = self.active.take() else {
            return Ok(());
        };

        info!("releasing summarization model");
        if let Err(err) = self.backend.unload(handle).await {
            warn!(%err, "model teardown reported an error");
            return Err(err);
        }
        info!("summarization model released");
        Ok(())
    }

    /// Whether a model handle is currently held.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    /// Backend together with the active handle, when loaded.
    #[must_use]
    pub fn loaded(&self) -> Option<(&B, &B::Handle)> {
        self.active.as_ref().map(|handle| (&self.backend, handle))
    }

    /// The wrapped backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
