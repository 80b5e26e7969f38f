//! End-to-end pipeline tests: listener → queue → worker → replies.
//!
//! Uses in-memory doubles for Slack, page retrieval, and the model so the
//! ordering, failure isolation, and model reuse guarantees can be checked
//! without network access.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use link_digest::config::TriggerMode;
use link_digest::orchestrator::listener::{EventListener, ListenerOutcome};
use link_digest::slack::{ReplySink, REACTION_DONE, REACTION_WORKING};

use super::test_helpers::{fast_settings, harness, mention, wait_until, Harness, SinkCall};

const SUMMARY: &str = "**💡 In one line**\nA short summary.\n- first point\n- second point";

fn listener_for(h: &Harness) -> EventListener {
    EventListener::new(
        h.sender.clone(),
        Arc::clone(&h.sink) as Arc<dyn ReplySink>,
        TriggerMode::Mention,
        "UBOT",
        None,
    )
}

/// A mention with one link produces exactly one formatted summary in the
/// originating thread.
#[tokio::test]
async fn mention_with_link_gets_summary_in_thread() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://example.com/a", "A", "Lorem ipsum dolor sit amet.");
    let listener = listener_for(&h);

    let outcome = listener
        .handle(mention("<@UBOT> summarize <https://example.com/a>"))
        .await;
    assert_eq!(outcome, ListenerOutcome::Enqueued(1));

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());

    assert!(wait_until(|| sink.final_replies().len() == 1).await);
    ct.cancel();
    let stats = handle.await.expect("worker joins");

    let replies = sink.final_replies();
    let reply = &replies[0];
    assert!(reply.starts_with("\u{1f4dd} *A*"), "got: {reply}");
    assert!(reply.contains("<https://example.com/a|"));
    assert!(reply.contains("*💡 In one line*"));
    assert!(reply.contains("• first point"));
    assert!(!reply.contains("**"));

    let threads: Vec<String> = sink
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            SinkCall::Post { thread_ts, .. } => Some(thread_ts),
            _ => None,
        })
        .collect();
    assert!(threads.iter().all(|ts| ts == "1700000000.000100"));

    assert_eq!(stats.summarized, 1);
    assert_eq!(h.counters.loads(), 1);
    assert_eq!(h.counters.completions(), 1);
}

/// Two links in one message are answered in the order they appear.
#[tokio::test]
async fn links_are_answered_in_message_order() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://a.example/x", "First", "alpha body");
    h.fetcher.page("https://b.example/y", "Second", "beta body");
    let listener = listener_for(&h);

    listener
        .handle(mention(
            "<@UBOT> <https://a.example/x> then <https://b.example/y|b>",
        ))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 2).await);
    ct.cancel();
    handle.await.expect("worker joins");

    let replies = sink.final_replies();
    assert!(replies[0].contains("*First*"));
    assert!(replies[1].contains("*Second*"));
    assert_eq!(
        h.fetcher.calls(),
        vec!["https://a.example/x", "https://b.example/y"]
    );
}

/// Tasks from separate events are processed in arrival order.
#[tokio::test]
async fn separate_events_are_processed_in_arrival_order() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    for (i, name) in ["one", "two", "three"].iter().enumerate() {
        h.fetcher
            .page(&format!("https://example.com/{i}"), name, "body text");
    }
    let listener = listener_for(&h);
    for i in 0..3 {
        listener
            .handle(mention(&format!("<@UBOT> <https://example.com/{i}>")))
            .await;
    }

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 3).await);
    ct.cancel();
    handle.await.expect("worker joins");

    let replies = sink.final_replies();
    assert!(replies[0].contains("*one*"));
    assert!(replies[1].contains("*two*"));
    assert!(replies[2].contains("*three*"));
}

/// A failed fetch yields a fetch failure reply and never touches the model.
#[tokio::test]
async fn fetch_failure_skips_inference() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.fail("https://example.com/missing", "HTTP 404 Not Found");
    let listener = listener_for(&h);
    listener
        .handle(mention("<@UBOT> <https://example.com/missing>"))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 1).await);
    ct.cancel();
    let stats = handle.await.expect("worker joins");

    let reply = &sink.final_replies()[0];
    assert!(reply.contains("Could not fetch https://example.com/missing"));
    assert!(reply.contains("HTTP 404 Not Found"));
    assert_eq!(h.counters.loads(), 0);
    assert_eq!(h.counters.completions(), 0);
    assert_eq!(stats.failed, 1);
}

/// A page with no usable text is reported without loading the model.
#[tokio::test]
async fn blank_page_reports_empty_content() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://example.com/blank", "Blank", "   \n\n  ");
    let listener = listener_for(&h);
    listener
        .handle(mention("<@UBOT> <https://example.com/blank>"))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 1).await);
    ct.cancel();
    handle.await.expect("worker joins");

    assert!(sink.final_replies()[0].contains("No readable text"));
    assert_eq!(h.counters.loads(), 0);
}

/// A burst of tasks shares a single model load.
#[tokio::test]
async fn burst_loads_model_once() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    for i in 0..4 {
        h.fetcher
            .page(&format!("https://example.com/{i}"), "T", "body text");
    }
    let listener = listener_for(&h);
    listener
        .handle(mention(
            "<@UBOT> <https://example.com/0> <https://example.com/1> \
             <https://example.com/2> <https://example.com/3>",
        ))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 4).await);
    ct.cancel();
    handle.await.expect("worker joins");

    assert_eq!(h.counters.loads(), 1);
    assert_eq!(h.counters.completions(), 4);
    assert_eq!(h.counters.unloads(), 1, "released on shutdown");
}

/// A panicking task is reported and the next task still succeeds.
#[tokio::test]
async fn panicking_task_does_not_stop_the_worker() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.panic_on("https://example.com/boom");
    h.fetcher.page("https://example.com/ok", "Fine", "body text");
    let listener = listener_for(&h);
    listener
        .handle(mention(
            "<@UBOT> <https://example.com/boom> <https://example.com/ok>",
        ))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 2).await);
    ct.cancel();
    let stats = handle.await.expect("worker survives the panic");

    let replies = sink.final_replies();
    assert!(replies[0].contains("unexpected error"));
    assert!(replies[1].contains("*Fine*"));
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.summarized, 1);
}

/// A generation failure is reported and the loaded model is reused.
#[tokio::test]
async fn inference_failure_is_reported_per_task() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://example.com/a", "A", "body text");
    h.counters
        .fail_completions
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let listener = listener_for(&h);
    listener
        .handle(mention("<@UBOT> <https://example.com/a>"))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 1).await);
    ct.cancel();
    handle.await.expect("worker joins");

    let reply = &sink.final_replies()[0];
    assert!(reply.contains("Summarization failed for https://example.com/a"));
    assert!(reply.contains("generation timed out"));
}

/// A failed model load fails the task; the next task retries the load.
#[tokio::test]
async fn failed_load_is_retried_by_next_task() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://example.com/a", "A", "body text");
    h.fetcher.page("https://example.com/b", "B", "body text");
    h.counters
        .fail_loads
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let listener = listener_for(&h);
    listener
        .handle(mention("<@UBOT> <https://example.com/a>"))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let counters = Arc::clone(&h.counters);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 1).await);
    assert!(sink.final_replies()[0].contains("out of device memory"));

    counters
        .fail_loads
        .store(false, std::sync::atomic::Ordering::SeqCst);
    listener
        .handle(mention("<@UBOT> <https://example.com/b>"))
        .await;
    assert!(wait_until(|| sink.final_replies().len() == 2).await);
    ct.cancel();
    handle.await.expect("worker joins");

    assert!(sink.final_replies()[1].contains("*B*"));
    assert_eq!(counters.loads(), 1);
}

/// Progress reactions: hourglass while working, check mark on success.
#[tokio::test]
async fn reactions_track_task_progress() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://example.com/a", "A", "body text");
    let listener = listener_for(&h);
    listener
        .handle(mention("<@UBOT> <https://example.com/a>"))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 1).await);
    ct.cancel();
    handle.await.expect("worker joins");

    let reactions: Vec<SinkCall> = sink
        .calls()
        .into_iter()
        .filter(|call| !matches!(call, SinkCall::Post { .. }))
        .collect();
    let ts = "1700000000.000100".to_owned();
    assert_eq!(
        reactions,
        vec![
            SinkCall::AddReaction {
                ts: ts.clone(),
                name: REACTION_WORKING.into()
            },
            SinkCall::RemoveReaction {
                ts: ts.clone(),
                name: REACTION_WORKING.into()
            },
            SinkCall::AddReaction {
                ts,
                name: REACTION_DONE.into()
            },
        ]
    );
}

/// Reply delivery failures are logged and do not stop the worker.
#[tokio::test]
async fn delivery_failure_does_not_stop_the_worker() {
    let h = harness(SUMMARY, fast_settings(Duration::from_secs(60)));
    h.fetcher.page("https://example.com/a", "A", "body text");
    h.fetcher.page("https://example.com/b", "B", "body text");
    h.sink.fail_posts();
    let listener = listener_for(&h);
    listener
        .handle(mention(
            "<@UBOT> <https://example.com/a> <https://example.com/b>",
        ))
        .await;

    let ct = CancellationToken::new();
    let sink = Arc::clone(&h.sink);
    let handle = h.worker.spawn(ct.clone());
    assert!(wait_until(|| sink.final_replies().len() == 2).await);
    ct.cancel();
    let stats = handle.await.expect("worker joins");

    assert_eq!(stats.summarized, 2);
}
