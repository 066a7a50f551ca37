//! Child-first and parent-first resolution against a host source

use nsload::{
    CodeSource, NamespaceRegistry, ResolutionOrder, StaticCodeSource,
};
use nsload::bridge::directory::DriverDirectory;
use std::sync::Arc;

use crate::integration::test_utils::{archive, code};

fn host() -> Arc<dyn CodeSource> {
    Arc::new(
        StaticCodeSource::from_definitions(
            "host",
            &[
                code("app.Shared", b"host-shared"),
                code("host.Only", b"host-only"),
                archive("host-res", &[("settings.conf", b"host-settings")]),
            ],
        )
        .unwrap(),
    )
}

fn registry_with_host(host: &Arc<dyn CodeSource>) -> NamespaceRegistry {
    NamespaceRegistry::builder()
        .plugins(Arc::new(DriverDirectory::new()))
        .host(Arc::clone(host))
        .build()
}

fn tenant_resources() -> Vec<nsload::ResourceDefinition> {
    vec![
        code("app.Shared", b"tenant-shared"),
        code("tenant.Only", b"tenant-only"),
        archive("tenant-res", &[("settings.conf", b"tenant-settings")]),
    ]
}

#[test]
fn test_child_first_returns_local_content() {
    let host = host();
    let registry = registry_with_host(&host);
    registry
        .add_namespace_with_order("ns1", &tenant_resources(), ResolutionOrder::ChildFirst)
        .unwrap();
    let context = registry.get_context("ns1").unwrap();

    let shared = context.resolve("app.Shared").unwrap();
    assert_eq!(shared.bytes(), b"tenant-shared");
    assert_eq!(shared.defining_context(), context.id());

    let inherited = context.resolve("host.Only").unwrap();
    assert_eq!(inherited.bytes(), b"host-only");
    assert_eq!(inherited.defining_context(), host.identity());
}

#[test]
fn test_parent_first_returns_parent_content() {
    let host = host();
    let registry = registry_with_host(&host);
    registry
        .add_namespace_with_order("ns1", &tenant_resources(), ResolutionOrder::ParentFirst)
        .unwrap();
    let context = registry.get_context("ns1").unwrap();

    assert_eq!(context.resolve("app.Shared").unwrap().bytes(), b"host-shared");
    // a parent miss falls back to local content
    assert_eq!(context.resolve("tenant.Only").unwrap().bytes(), b"tenant-only");
}

#[test]
fn test_data_files_follow_the_same_order() {
    let host = host();
    let registry = registry_with_host(&host);
    registry
        .add_namespace_with_order("child", &tenant_resources(), ResolutionOrder::ChildFirst)
        .unwrap();
    registry
        .add_namespace_with_order("parent", &tenant_resources(), ResolutionOrder::ParentFirst)
        .unwrap();

    let child = registry.get_context("child").unwrap();
    let parent = registry.get_context("parent").unwrap();
    assert_eq!(
        child.find_resource("settings.conf").unwrap().bytes(),
        b"tenant-settings"
    );
    assert_eq!(
        parent.find_resource("settings.conf").unwrap().bytes(),
        b"host-settings"
    );

    let all: Vec<Vec<u8>> = child
        .find_resources("settings.conf")
        .unwrap()
        .into_iter()
        .map(|a| a.into_bytes())
        .collect();
    assert_eq!(all, vec![b"tenant-settings".to_vec(), b"host-settings".to_vec()]);
}

#[test]
fn test_enumerate_covers_whole_chain() {
    let host = host();
    let registry = registry_with_host(&host);
    registry
        .add_namespace_with_order("ns1", &tenant_resources(), ResolutionOrder::ParentFirst)
        .unwrap();
    let context = registry.get_context("ns1").unwrap();

    let owners: Vec<_> = context
        .enumerate("app.Shared")
        .unwrap()
        .iter()
        .map(|a| a.defining_context())
        .collect();
    assert_eq!(owners, vec![host.identity(), context.id()]);
}

#[test]
fn test_code_and_data_with_same_base_name_do_not_collide() {
    let registry = NamespaceRegistry::builder()
        .plugins(Arc::new(DriverDirectory::new()))
        .build();
    registry
        .add_namespace(
            "ns1",
            &[archive(
                "lib",
                &[("app/Config.class", b"code"), ("app.Config", b"data")],
            )],
        )
        .unwrap();
    let context = registry.get_context("ns1").unwrap();

    assert_eq!(context.resolve("app.Config").unwrap().bytes(), b"code");
    assert_eq!(context.find_resource("app.Config").unwrap().bytes(), b"data");
}

#[test]
fn test_namespace_without_host_only_sees_itself() {
    let registry = NamespaceRegistry::builder()
        .plugins(Arc::new(DriverDirectory::new()))
        .build();
    registry.add_namespace("ns1", &tenant_resources()).unwrap();
    let context = registry.get_context("ns1").unwrap();

    assert!(context.resolve("host.Only").unwrap_err().is_not_found());
    assert!(context.enumerate("host.Only").unwrap().is_empty());
}
