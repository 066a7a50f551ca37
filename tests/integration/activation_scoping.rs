//! Activation nesting, override, cleanup on failure and worker hand-off

use nsload::activation::{self, ActivationSnapshot, ActivationStack};
use nsload::{ActivationError, NamespaceError, NamespaceService, NamespaceServiceExt};

use crate::integration::test_utils::{code, registry};

#[test]
fn test_same_namespace_nests_by_count() {
    let registry = registry();
    registry.add_namespace("ns1", &[code("a.A", b"a")]).unwrap();
    let ns1 = registry.get_context("ns1").unwrap();

    let mut stack = ActivationStack::new();
    assert_eq!(stack.push(&ns1), 1);
    assert_eq!(stack.push(&ns1), 2);
    assert_eq!(stack.pop("ns1").unwrap(), 1);
    assert_eq!(stack.pop("ns1").unwrap(), 0);
    assert!(stack.current().is_none());
}

#[test]
fn test_override_and_restore() {
    let registry = registry();
    registry.add_namespace("ns1", &[]).unwrap();
    registry.add_namespace("ns2", &[]).unwrap();

    registry.setup_namespace(Some("ns1")).unwrap();
    registry.setup_namespace(Some("ns2")).unwrap();
    assert_eq!(activation::current_namespace().as_deref(), Some("ns2"));
    assert_eq!(activation::depth(), 2);

    registry.cleanup_namespace(Some("ns2")).unwrap();
    assert_eq!(activation::current_namespace().as_deref(), Some("ns1"));
    registry.cleanup_namespace(Some("ns1")).unwrap();
    assert!(activation::current().is_none());
}

#[test]
fn test_pop_without_push_is_an_error() {
    assert_eq!(
        activation::pop("ns1").unwrap_err(),
        ActivationError::NotActive("ns1".to_string())
    );
}

#[test]
fn test_scoped_body_failure_still_unwinds() {
    let registry = registry();
    registry.add_namespace("ns1", &[]).unwrap();

    let result: Result<Result<(), String>, NamespaceError> =
        registry.call_scoped(Some("ns1"), || Err("body failed".to_string()));
    assert_eq!(result.unwrap(), Err("body failed".to_string()));
    assert!(activation::is_clear());

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = registry.run_scoped(Some("ns1"), || panic!("boom"));
    }));
    assert!(panicked.is_err());
    assert!(activation::is_clear());
}

#[test]
fn test_nested_scopes_restore_outer() {
    let registry = registry();
    registry.add_namespace("outer", &[]).unwrap();
    registry.add_namespace("inner", &[]).unwrap();

    let observed = registry
        .call_scoped(Some("outer"), || {
            let inner = registry
                .call_scoped(Some("inner"), activation::current_namespace)
                .unwrap();
            (inner, activation::current_namespace())
        })
        .unwrap();
    assert_eq!(
        observed,
        (Some("inner".to_string()), Some("outer".to_string()))
    );
}

#[test]
fn test_activation_does_not_leak_to_spawned_threads() {
    let registry = registry();
    registry.add_namespace("ns1", &[]).unwrap();
    let context = registry.get_context("ns1").unwrap();

    let _guard = activation::enter(&context);
    let seen = std::thread::spawn(activation::current_namespace)
        .join()
        .unwrap();
    assert_eq!(seen, None);
}

#[test]
fn test_snapshot_reestablished_on_worker() {
    let registry = registry();
    registry.add_namespace("ns1", &[code("a.A", b"payload")]).unwrap();
    let context = registry.get_context("ns1").unwrap();

    let snapshot = activation::call_scoped(&context, ActivationSnapshot::capture);
    let bytes = std::thread::spawn(move || {
        snapshot.call(|| {
            activation::current()
                .map(|ctx| ctx.resolve("a.A").unwrap().into_bytes())
                .unwrap_or_default()
        })
    })
    .join()
    .unwrap();
    assert_eq!(bytes, b"payload");
}

#[test]
fn test_worker_pool_thread_reset_between_tasks() {
    let registry = registry();
    registry.add_namespace("ns1", &[]).unwrap();
    let context = registry.get_context("ns1").unwrap();

    // one blocking thread, so every task below lands on the same OS thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(1)
        .build()
        .unwrap();

    runtime.block_on(async move {
        // a task that pushes without popping leaves its frame on the thread
        let leaking = tokio::task::spawn_blocking(move || {
            activation::push(&context);
            std::thread::current().id()
        })
        .await
        .unwrap();

        let (thread, leftover, cleared) = tokio::task::spawn_blocking(|| {
            let leftover = activation::current_namespace();
            (std::thread::current().id(), leftover, activation::clear())
        })
        .await
        .unwrap();
        assert_eq!(thread, leaking);
        assert_eq!(leftover.as_deref(), Some("ns1"));
        assert_eq!(cleared, 1);

        let (thread, clear) = tokio::task::spawn_blocking(|| {
            (std::thread::current().id(), activation::is_clear())
        })
        .await
        .unwrap();
        assert_eq!(thread, leaking);
        assert!(clear);
    });
}

#[test]
fn test_clear_resets_leftover_frames() {
    let registry = registry();
    registry.add_namespace("ns1", &[]).unwrap();
    registry.setup_namespace(Some("ns1")).unwrap();

    assert_eq!(activation::clear(), 1);
    assert!(activation::is_clear());
}
