//! Unit tests for `ModelManager` lazy acquire and idempotent release.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use link_digest::inference::{CompletionRequest, InferenceBackend, ModelManager};
use link_digest::{AppError, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Default)]
struct Counts {
    loads: AtomicUsize,
    unloads: AtomicUsize,
    fail_load: AtomicBool,
    fail_unload: AtomicBool,
}

struct CountingBackend(Arc<Counts>);

impl InferenceBackend for CountingBackend {
    type Handle = usize;

    fn load(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            if self.0.fail_load.load(Ordering::SeqCst) {
                return Err(AppError::Inference("load failed".into()));
            }
            Ok(self.0.loads.fetch_add(1, Ordering::SeqCst) + 1)
        })
    }

    fn unload(&self, _handle: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.0.unloads.fetch_add(1, Ordering::SeqCst);
            if self.0.fail_unload.load(Ordering::SeqCst) {
                return Err(AppError::Inference("teardown failed".into()));
            }
            Ok(())
        })
    }

    fn complete<'a>(
        &'a self,
        handle: &'a usize,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(format!("{handle}:{}", request.user)) })
    }
}

fn manager() -> (ModelManager<CountingBackend>, Arc<Counts>) {
    let counts = Arc::new(Counts::default());
    (ModelManager::new(CountingBackend(Arc::clone(&counts))), counts)
}

#[tokio::test]
async fn nothing_loaded_until_first_acquire() {
    let (manager, counts) = manager();

    assert!(!manager.is_loaded());
    assert!(manager.loaded().is_none());
    assert_eq!(counts.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn acquire_is_idempotent_while_loaded() {
    let (mut manager, counts) = manager();

    let first = *manager.acquire().await.expect("first acquire");
    let second = *manager.acquire().await.expect("second acquire");

    assert_eq!(first, second, "same handle returned");
    assert_eq!(counts.loads.load(Ordering::SeqCst), 1);
    assert!(manager.is_loaded());
}

#[tokio::test]
async fn release_then_acquire_loads_again() {
    let (mut manager, counts) = manager();

    manager.acquire().await.expect("acquire");
    manager.release().await.expect("release");
    assert!(!manager.is_loaded());

    let handle = *manager.acquire().await.expect("reacquire");
    assert_eq!(handle, 2);
    assert_eq!(counts.loads.load(Ordering::SeqCst), 2);
    assert_eq!(counts.unloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn release_without_load_is_noop() {
    let (mut manager, counts) = manager();

    manager.release().await.expect("noop release");
    manager.release().await.expect("noop release again");

    assert_eq!(counts.unloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_load_leaves_manager_unloaded() {
    let (mut manager, counts) = manager();
    counts.fail_load.store(true, Ordering::SeqCst);

    let err = manager.acquire().await.expect_err("load fails");
    assert_eq!(err.to_string(), "inference: load failed");
    assert!(!manager.is_loaded());

    counts.fail_load.store(false, Ordering::SeqCst);
    manager.acquire().await.expect("retry succeeds");
    assert!(manager.is_loaded());
}

#[tokio::test]
async fn failed_unload_still_drops_handle() {
    let (mut manager, counts) = manager();
    counts.fail_unload.store(true, Ordering::SeqCst);

    manager.acquire().await.expect("acquire");
    let err = manager.release().await.expect_err("teardown error surfaces");

    assert!(err.to_string().contains("teardown failed"));
    assert!(!manager.is_loaded());
    manager.release().await.expect("second release is a no-op");
    assert_eq!(counts.unloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn loaded_exposes_backend_and_handle() {
    let (mut manager, _counts) = manager();
    manager.acquire().await.expect("acquire");

    let (backend, handle) = manager.loaded().expect("loaded");
    let request = CompletionRequest {
        system: String::new(),
        user: "page".into(),
    };
    let text = backend.complete(handle, &request).await.expect("complete");

    assert_eq!(text, "1:page");
}
