//! Panel behavior under virtual time.
//!
//! Most tests run on a paused clock: `sleep` advances time deterministically
//! and lets every surface actor drain its queues first. Races between
//! concurrent reveals run on a real multi-thread runtime.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::testing::{ChannelFactory, ScriptedEngine};
use super::*;
use crate::core::DocumentId;
use crate::render::RenderErrorKind;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

async fn sleep(n: u64) {
    tokio::time::sleep(ms(n)).await;
}

fn doc(name: &str) -> DocumentId {
    DocumentId::new(format!("file:///{name}"))
}

fn settings(debounce_ms: u64) -> RegistrySettings {
    RegistrySettings {
        debounce: ms(debounce_ms),
        ..RegistrySettings::default()
    }
}

fn registry(
    factory: &Arc<ChannelFactory>,
    engine: &ScriptedEngine,
    settings: RegistrySettings,
) -> PanelRegistry {
    PanelRegistry::new(factory.clone(), Arc::new(engine.clone()), settings)
}

fn with_content(content: &str) -> RevealOptions {
    RevealOptions {
        content: Some(content.to_string()),
        ..RevealOptions::default()
    }
}

// =============================================================================
// Debounce and generations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_debounced_edits_render_final_text_once() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::with_delay(ms(5));
    let registry = registry(&factory, &engine, settings(50));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), with_content("digraph{a->b}"))
        .await
        .unwrap();
    sleep(20).await;
    assert_eq!(engine.calls(), vec!["digraph{a->b}"]);

    handle.request_render("digraph{a->b->c}").unwrap();
    sleep(10).await;
    handle.request_render("digraph{a->b->c->d}").unwrap();
    sleep(100).await;

    assert_eq!(engine.calls(), vec!["digraph{a->b}", "digraph{a->b->c->d}"]);
    let results = factory.frontend(handle.id()).outbox.render_results();
    assert_eq!(results.len(), 2);
    let (generation, body, error) = results.last().cloned().unwrap();
    assert_eq!(generation, 3);
    assert_eq!(body.as_deref(), Some("<svg>digraph{a->b->c->d}</svg>"));
    assert!(error.is_none());
    assert_eq!(handle.ready_state(), ReadyState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_burst_collapses_to_single_render() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let handle = registry
        .reveal_or_create(None, RevealOptions::default())
        .await
        .unwrap();
    for i in 0..10 {
        handle.request_render(format!("digraph{{n{i}}}")).unwrap();
        sleep(5).await;
    }
    sleep(100).await;

    assert_eq!(engine.calls(), vec!["digraph{n9}"]);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_in_flight_result_is_dropped() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    engine.push_delays([ms(100)]);
    let registry = registry(&factory, &engine, settings(10));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), with_content("digraph{1}"))
        .await
        .unwrap();
    sleep(1).await;
    handle.request_render("digraph{2}").unwrap();
    sleep(300).await;

    // The second render waits for the first to finish, then wins.
    assert_eq!(engine.calls(), vec!["digraph{1}", "digraph{2}"]);
    let results = factory.frontend(handle.id()).outbox.render_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 2);
    assert_eq!(results[0].1.as_deref(), Some("<svg>digraph{2}</svg>"));
}

#[tokio::test(start_paused = true)]
async fn test_applied_generations_never_decrease() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    engine.push_delays([ms(40), ms(5), ms(30), ms(1)]);
    let registry = registry(&factory, &engine, settings(0));

    let handle = registry
        .reveal_or_create(None, with_content("digraph{0}"))
        .await
        .unwrap();
    for i in 1..8 {
        handle.request_render(format!("digraph{{{i}}}")).unwrap();
        sleep(7).await;
    }
    sleep(200).await;

    let generations: Vec<u64> = factory
        .frontend(handle.id())
        .outbox
        .render_results()
        .iter()
        .map(|(generation, _, _)| *generation)
        .collect();
    assert!(!generations.is_empty());
    assert!(generations.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(generations.last(), Some(&8));
}

// =============================================================================
// Readiness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_requests_before_ready_render_once_on_handshake() {
    let factory = Arc::new(ChannelFactory::manual());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let pending = tokio::spawn({
        let registry = registry.clone();
        async move {
            registry
                .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
                .await
        }
    });
    sleep(1).await;

    let handle = registry.get_panel(&doc("a.dot")).unwrap();
    assert_eq!(handle.ready_state(), ReadyState::Created);
    handle.request_render("digraph{x}").unwrap();
    handle.request_render("digraph{y}").unwrap();
    sleep(500).await;
    assert!(engine.calls().is_empty());
    assert!(!pending.is_finished());

    let frontend = factory.frontend(handle.id());
    frontend.connect();
    sleep(1).await;
    assert_eq!(handle.ready_state(), ReadyState::AwaitingReady);
    assert!(frontend.outbox.messages().is_empty());

    frontend.ready();
    sleep(1).await;
    assert_eq!(engine.calls(), vec!["digraph{y}"]);
    assert_eq!(pending.await.unwrap().unwrap().id(), handle.id());
    assert_eq!(
        frontend.outbox.kinds(),
        vec!["renderRequest", "renderResult"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_seeded_search_is_sent_before_first_render() {
    let factory = Arc::new(ChannelFactory::manual());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let pending = tokio::spawn({
        let registry = registry.clone();
        async move {
            let options = RevealOptions {
                search: Some("b".into()),
                ..with_content("digraph{a->b}")
            };
            registry.reveal_or_create(None, options).await
        }
    });
    sleep(1).await;

    let frontend = factory.frontend(SurfaceId(1));
    frontend.connect();
    frontend.ready();
    let handle = pending.await.unwrap().unwrap();
    sleep(1).await;

    assert_eq!(handle.title(), "Graphviz Preview");
    assert_eq!(
        frontend.outbox.kinds(),
        vec!["searchApply", "renderRequest", "renderResult"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_fails_creation() {
    let factory = Arc::new(ChannelFactory::manual());
    let engine = ScriptedEngine::default();
    let registry = registry(
        &factory,
        &engine,
        RegistrySettings {
            ready_timeout: Some(ms(100)),
            ..settings(50)
        },
    );

    let err = registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::CreationFailed(_)));
    assert!(registry.is_empty());
    sleep(1).await;
    assert!(factory.frontend(SurfaceId(1)).outbox.is_disposed());
}

// =============================================================================
// Multiplicity
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_panel_policy_reuses_surface() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let first = registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap();
    let second = registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap();
    sleep(1).await;

    assert_eq!(first.id(), second.id());
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.frontend(first.id()).outbox.reveals(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reveals_share_one_surface() {
    const TASKS: usize = 4;

    for _ in 0..200 {
        let factory = Arc::new(ChannelFactory::auto_ready());
        let engine = ScriptedEngine::default();
        let registry = registry(&factory, &engine, settings(50));
        let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));

        let tasks: Vec<_> = (0..TASKS)
            .map(|_| {
                let registry = registry.clone();
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    registry
                        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
                        .await
                        .unwrap()
                        .id()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.dedup();

        assert_eq!(ids.len(), 1, "concurrent reveals produced {ids:?}");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_panel(&doc("a.dot")).unwrap().id(), ids[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_multiple_panel_policy_creates_new_surfaces() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let options = || RevealOptions {
        allow_multiple_panels: Some(true),
        ..RevealOptions::default()
    };
    let first = registry
        .reveal_or_create(Some(doc("a.dot")), options())
        .await
        .unwrap();
    let second = registry
        .reveal_or_create(Some(doc("a.dot")), options())
        .await
        .unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get_panel(&doc("a.dot")).unwrap().id(), second.id());

    second.dispose();
    assert_eq!(registry.get_panel(&doc("a.dot")).unwrap().id(), first.id());
}

#[tokio::test(start_paused = true)]
async fn test_unbound_surfaces_are_never_reused() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let a = registry
        .reveal_or_create(None, RevealOptions::default())
        .await
        .unwrap();
    let b = registry
        .reveal_or_create(None, RevealOptions::default())
        .await
        .unwrap();
    assert_ne!(a.id(), b.id());
    assert!(a.document().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reveal_existing_seeds_content_and_search() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), with_content("digraph{a}"))
        .await
        .unwrap();
    sleep(1).await;
    let frontend = factory.frontend(handle.id());
    frontend.send(SurfaceMessage::SearchRequest { term: "a".into() });
    sleep(1).await;
    frontend.outbox.clear();

    let called = Arc::new(Mutex::new(None));
    let options = RevealOptions {
        callback: Some(Box::new({
            let called = Arc::clone(&called);
            move |surface: &SurfaceHandle| *called.lock() = Some(surface.id())
        })),
        ..with_content("digraph{b}")
    };
    registry
        .reveal_or_create(Some(doc("a.dot")), options)
        .await
        .unwrap();
    sleep(1).await;

    assert_eq!(*called.lock(), Some(handle.id()));
    // Resync shows the stored search term, then the seeded content renders.
    assert_eq!(
        frontend.outbox.kinds(),
        vec!["renderResult", "searchApply", "renderRequest", "renderResult"]
    );
    assert_eq!(engine.calls(), vec!["digraph{a}", "digraph{b}"]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_syntax_error_keeps_previous_artifact() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), with_content("digraph{a->b}"))
        .await
        .unwrap();
    sleep(10).await;
    handle.request_render("digraph{a->").unwrap();
    sleep(100).await;

    let frontend = factory.frontend(handle.id());
    let results = frontend.outbox.render_results();
    let (generation, body, error) = results.last().cloned().unwrap();
    assert_eq!(generation, 2);
    assert!(body.is_none());
    assert_eq!(error.unwrap().kind, RenderErrorKind::SyntaxError);

    // The surface still holds the last good artifact alongside the error.
    frontend.outbox.clear();
    handle.reveal().unwrap();
    sleep(1).await;
    let (generation, body, error) = frontend.outbox.render_results()[0].clone();
    assert_eq!(generation, 2);
    assert_eq!(body.as_deref(), Some("<svg>digraph{a->b}</svg>"));
    assert!(error.is_some());
    assert_eq!(handle.ready_state(), ReadyState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_creation_failure_leaves_registry_unchanged() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap();
    factory.fail_creation(true);
    let err = registry
        .reveal_or_create(Some(doc("b.dot")), RevealOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PanelError::CreationFailed(_)));
    assert_eq!(registry.len(), 1);
    assert!(registry.get_panel(&doc("b.dot")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transport_close_disposes_and_unregisters() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap();
    factory.frontend(handle.id()).close();
    sleep(1).await;

    assert_eq!(handle.ready_state(), ReadyState::Disposed);
    assert!(registry.get_panel(&doc("a.dot")).is_none());
    assert!(matches!(
        handle.request_render("digraph{}"),
        Err(PanelError::Disposed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_disposes_surface() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(0));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap();
    factory.frontend(handle.id()).outbox.break_channel();
    handle.request_render("digraph{}").unwrap();
    sleep(5).await;

    assert!(handle.is_disposed());
    assert!(registry.is_empty());
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dispose_drops_in_flight_result() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::with_delay(ms(100));
    let registry = registry(&factory, &engine, settings(50));

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), with_content("digraph{a}"))
        .await
        .unwrap();
    sleep(10).await;
    assert_eq!(engine.calls().len(), 1);

    handle.dispose();
    assert!(registry.get_panel(&doc("a.dot")).is_none());
    assert!(registry.is_empty());
    assert!(handle.request_render("digraph{b}").is_err());

    sleep(500).await;
    let outbox = factory.frontend(handle.id()).outbox;
    assert!(outbox.is_disposed());
    assert!(outbox.render_results().is_empty());
    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_disposes_every_surface() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let a = registry
        .reveal_or_create(Some(doc("a.dot")), RevealOptions::default())
        .await
        .unwrap();
    let b = registry
        .reveal_or_create(None, RevealOptions::default())
        .await
        .unwrap();

    registry.shutdown().await;
    assert!(registry.is_empty());
    assert!(a.is_disposed() && b.is_disposed());
    assert!(factory.frontend(a.id()).outbox.is_disposed());
    assert!(factory.frontend(b.id()).outbox.is_disposed());
}

// =============================================================================
// Message handling override
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_callback_handler_intercepts_messages() {
    let factory = Arc::new(ChannelFactory::auto_ready());
    let engine = ScriptedEngine::default();
    let registry = registry(&factory, &engine, settings(50));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = RevealOptions {
        callback: Some(Box::new({
            let seen = Arc::clone(&seen);
            move |surface: &SurfaceHandle| {
                surface
                    .set_message_handler(move |msg: &SurfaceMessage, surface: &SurfaceHandle| {
                        seen.lock().push(msg.kind());
                        if let SurfaceMessage::Custom { payload } = msg {
                            let _ = surface.post_message(payload.clone());
                        }
                        Disposition::Handled
                    })
                    .unwrap();
            }
        })),
        ..RevealOptions::default()
    };

    let handle = registry
        .reveal_or_create(Some(doc("a.dot")), options)
        .await
        .unwrap();
    let frontend = factory.frontend(handle.id());
    frontend.send(SurfaceMessage::SearchRequest { term: "x".into() });
    frontend.send(SurfaceMessage::Custom {
        payload: serde_json::json!({"ping": 1}),
    });
    sleep(1).await;

    // Ready is observed but the handshake still completes.
    assert_eq!(handle.ready_state(), ReadyState::Ready);
    assert_eq!(*seen.lock(), vec!["ready", "searchRequest", "custom"]);
    assert_eq!(
        frontend.outbox.messages(),
        vec![HostMessage::Custom {
            payload: serde_json::json!({"ping": 1})
        }]
    );

    // The intercepted search request was not stored.
    frontend.outbox.clear();
    handle.reveal().unwrap();
    sleep(1).await;
    assert!(frontend.outbox.messages().is_empty());
}
