//! Driver directory kept in step with namespace lifecycle

use nsload::bridge::directory::{DriverDirectory, PluginHandle, PluginRegistration};
use nsload::bridge::ExternalRegistryBridge;
use nsload::{
    BridgeConfig, CodeSource, ContextState, DriverRegistryEntry, NamespaceRegistry,
    PluginRegistry, RegistryError, StaticCodeSource,
};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::integration::test_utils::{archive, registry_with_directory};

fn driver_bundle(provider_path: &str, provider_id: &str) -> nsload::ResourceDefinition {
    let manifest = format!("# drivers\n{}\n", provider_id);
    archive(
        "driver.jar",
        &[
            ("META-INF/", b""),
            ("META-INF/services/sql.Driver", manifest.as_bytes()),
            (provider_path, b"driver body"),
        ],
    )
}

#[test]
fn test_add_registers_and_remove_deregisters() {
    let (registry, directory) = registry_with_directory();
    registry
        .add_namespace("ns1", &[driver_bundle("acme/Driver.class", "acme.Driver")])
        .unwrap();
    let context = registry.get_context("ns1").unwrap();

    let providers = directory.providers("sql.Driver");
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].provider, "acme.Driver");
    assert_eq!(providers[0].owner, context.id());
    assert_eq!(providers[0].namespace, "ns1");

    registry.remove_namespace("ns1");
    assert!(directory.is_empty());
}

#[test]
fn test_replacement_moves_ownership_to_new_context() {
    let (registry, directory) = registry_with_directory();
    registry
        .add_namespace("ns1", &[driver_bundle("acme/Driver.class", "acme.Driver")])
        .unwrap();
    let old = registry.get_context("ns1").unwrap();

    registry
        .add_namespace("ns1", &[driver_bundle("acme/Driver.class", "acme.Driver")])
        .unwrap();
    let new = registry.get_context("ns1").unwrap();

    assert!(directory.owned_by(old.id()).is_empty());
    assert_eq!(directory.owned_by(new.id()).len(), 1);
    assert_eq!(directory.len(), 1);
}

#[test]
fn test_other_namespaces_keep_their_drivers() {
    let (registry, directory) = registry_with_directory();
    registry
        .add_namespace("ns1", &[driver_bundle("one/Driver.class", "one.Driver")])
        .unwrap();
    registry
        .add_namespace("ns2", &[driver_bundle("two/Driver.class", "two.Driver")])
        .unwrap();
    assert_eq!(directory.len(), 2);

    registry.remove_namespace("ns1");
    let remaining = directory.entries();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].provider, "two.Driver");
}

#[test]
fn test_second_cleanup_removes_nothing() {
    let directory = Arc::new(DriverDirectory::new());
    let bridge = ExternalRegistryBridge::new(directory.clone(), BridgeConfig::default());
    let (registry, _) = registry_with_directory();
    registry
        .add_namespace("ns1", &[driver_bundle("acme/Driver.class", "acme.Driver")])
        .unwrap();
    let context = registry.get_context("ns1").unwrap();

    assert_eq!(bridge.initialize(&context), 1);
    assert_eq!(bridge.cleanup(context.id(), "ns1"), 1);
    assert_eq!(bridge.cleanup(context.id(), "ns1"), 0);
}

#[test]
fn test_host_drivers_are_not_claimed_by_namespaces() {
    let directory = Arc::new(DriverDirectory::new());
    let host: Arc<dyn CodeSource> = Arc::new(
        StaticCodeSource::from_definitions(
            "host",
            &[driver_bundle("host/Driver.class", "host.Driver")],
        )
        .unwrap(),
    );
    let registry = NamespaceRegistry::builder()
        .plugins(directory.clone())
        .host(Arc::clone(&host))
        .build();

    // the tenant bundle only carries a manifest naming the host's driver
    registry
        .add_namespace(
            "ns1",
            &[archive(
                "tenant.jar",
                &[("META-INF/services/sql.Driver", b"host.Driver\n")],
            )],
        )
        .unwrap();
    assert!(directory.is_empty());
}

#[test]
fn test_custom_service_names() {
    let directory = Arc::new(DriverDirectory::new());
    let registry = NamespaceRegistry::builder()
        .plugins(directory.clone())
        .bridge(BridgeConfig {
            services: vec!["app.Plugin".to_string()],
            ..BridgeConfig::default()
        })
        .build();
    registry
        .add_namespace(
            "ns1",
            &[archive(
                "plugins.jar",
                &[
                    ("META-INF/services/app.Plugin", b"p.First\np.Second\n"),
                    ("META-INF/services/sql.Driver", b"p.First\n"),
                    ("p/First.class", b"1"),
                    ("p/Second.class", b"2"),
                ],
            )],
        )
        .unwrap();

    assert_eq!(directory.providers("app.Plugin").len(), 2);
    assert!(directory.providers("sql.Driver").is_empty());
}

/// Directory whose first registration waits until the test lets it through
struct GatedDirectory {
    inner: DriverDirectory,
    gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl PluginRegistry for GatedDirectory {
    fn register(&self, registration: PluginRegistration) -> Result<PluginHandle, RegistryError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        self.inner.register(registration)
    }

    fn deregister(&self, handle: PluginHandle) -> Result<(), RegistryError> {
        self.inner.deregister(handle)
    }

    fn entries(&self) -> Vec<DriverRegistryEntry> {
        self.inner.entries()
    }
}

#[test]
fn test_remove_during_registration_leaves_no_entries() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let directory = Arc::new(GatedDirectory {
        inner: DriverDirectory::new(),
        gate: Mutex::new(Some((entered_tx, release_rx))),
    });
    let registry = Arc::new(
        NamespaceRegistry::builder()
            .plugins(directory.clone())
            .build(),
    );

    let adder = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            registry
                .add_namespace("ns1", &[driver_bundle("acme/Driver.class", "acme.Driver")])
                .unwrap();
        })
    };

    // registration is parked; the namespace is already published
    entered_rx.recv().unwrap();
    let context = registry.get_context("ns1").unwrap();
    let remover = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || registry.remove_namespace("ns1"))
    };
    thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    adder.join().unwrap();
    assert!(remover.join().unwrap());

    assert!(!registry.has_namespace("ns1"));
    assert_eq!(context.state(), ContextState::Disposed);
    assert!(directory.entries().is_empty());
}
