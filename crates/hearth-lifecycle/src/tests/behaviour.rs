//! Behaviour-driven tests for device lifecycle management.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::test_doubles::{Journal, RecordingFactory, device, uid};
use crate::{
    BindingStatus, BoundedCaller, DeviceLifecycleManager, HandlerFactory, MemoryStatusStore,
};

// ---------------------------------------------------------------------------
// Typed wrappers for Gherkin step parameters
// ---------------------------------------------------------------------------

/// A quoted string value from a feature file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Quoted(String);

impl FromStr for Quoted {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim_matches('"').to_owned()))
    }
}

impl Quoted {
    fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    manager: Option<DeviceLifecycleManager>,
    store: Arc<MemoryStatusStore>,
    journal: Journal,
    factories: HashMap<String, Arc<dyn HandlerFactory>>,
}

impl TestWorld {
    fn manager(&self) -> &DeviceLifecycleManager {
        self.manager
            .as_ref()
            .expect("a lifecycle manager must be configured first")
    }

    fn factory(&self, name: &Quoted) -> Arc<dyn HandlerFactory> {
        self.factories
            .get(name.as_str())
            .map(Arc::clone)
            .unwrap_or_else(|| panic!("factory '{}' was not declared", name.as_str()))
    }

    fn add_factory(&self, name: &Quoted) {
        self.manager()
            .add_handler_factory(self.factory(name))
            .expect("add factory");
        self.manager().wait_idle();
    }

    fn status(&self, device_uid: &Quoted) -> Option<BindingStatus> {
        self.manager().binding_status(&uid(device_uid.as_str()))
    }
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a lifecycle manager with a status store")]
fn given_manager(world: &mut TestWorld) {
    let caller = BoundedCaller::new("behaviour", 1).expect("caller starts");
    world.manager = Some(
        DeviceLifecycleManager::builder(caller)
            .status_store(world.store.clone())
            .build(),
    );
}

#[given("a factory {name} for {device_type}")]
fn given_factory(world: &mut TestWorld, name: Quoted, device_type: Quoted) {
    let factory = RecordingFactory::new(name.as_str(), &world.journal)
        .supporting(device_type.as_str())
        .shared();
    world.factories.insert(name.0, factory);
}

#[given("a failing factory {name} for {device_type}")]
fn given_failing_factory(world: &mut TestWorld, name: Quoted, device_type: Quoted) {
    let factory = RecordingFactory::new(name.as_str(), &world.journal)
        .supporting(device_type.as_str())
        .failing()
        .shared();
    world.factories.insert(name.0, factory);
}

#[given("factory {name} is added")]
fn given_factory_added(world: &mut TestWorld, name: Quoted) {
    world.add_factory(&name);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("factory {name} is added")]
fn when_factory_added(world: &mut TestWorld, name: Quoted) {
    world.add_factory(&name);
}

#[when("factory {name} is removed")]
fn when_factory_removed(world: &mut TestWorld, name: Quoted) {
    let factory = world.factory(&name);
    world
        .manager()
        .remove_handler_factory(&factory)
        .expect("remove factory");
    world.manager().wait_idle();
}

#[when("device {device_uid} is registered")]
fn when_registered(world: &mut TestWorld, device_uid: Quoted) {
    world
        .manager()
        .register_device(device(device_uid.as_str()))
        .expect("register device");
    world.manager().wait_idle();
}

#[when("device {device_uid} is enabled")]
fn when_enabled(world: &mut TestWorld, device_uid: Quoted) {
    world
        .manager()
        .set_enabled(&uid(device_uid.as_str()), true)
        .expect("enable device");
    world.manager().wait_idle();
}

#[when("device {device_uid} is disabled")]
fn when_disabled(world: &mut TestWorld, device_uid: Quoted) {
    world
        .manager()
        .set_enabled(&uid(device_uid.as_str()), false)
        .expect("disable device");
    world.manager().wait_idle();
}

#[when("the manager is activated")]
fn when_activated(world: &mut TestWorld) {
    world.manager().activate().expect("activate");
    world.manager().wait_idle();
}

#[when("the manager is deactivated")]
fn when_deactivated(world: &mut TestWorld) {
    world.manager().deactivate();
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("device {device_uid} is bound to {name}")]
fn then_bound(world: &mut TestWorld, device_uid: Quoted, name: Quoted) {
    assert_eq!(
        world.status(&device_uid),
        Some(BindingStatus::Bound {
            factory: name.0.clone()
        })
    );
}

#[then("device {device_uid} is unbound")]
fn then_unbound(world: &mut TestWorld, device_uid: Quoted) {
    assert_eq!(world.status(&device_uid), Some(BindingStatus::Unbound));
}

#[then("device {device_uid} failed in {name}")]
fn then_failed(world: &mut TestWorld, device_uid: Quoted, name: Quoted) {
    let status = world.status(&device_uid);
    assert!(
        matches!(&status, Some(BindingStatus::Failed { factory, .. }) if factory == name.as_str()),
        "expected failure in '{}', got {status:?}",
        name.as_str()
    );
}

#[then("factory {name} has not been consulted")]
fn then_not_consulted(world: &mut TestWorld, name: Quoted) {
    let prefix = format!("supports:{}:", name.as_str());
    assert_eq!(world.journal.count(&prefix), 0, "{:?}", world.journal.entries());
}

#[then("device {device_uid} is reported as enabled")]
fn then_reported_enabled(world: &mut TestWorld, device_uid: Quoted) {
    assert!(world.manager().is_enabled(&uid(device_uid.as_str())));
}

#[then("device {device_uid} is reported as disabled")]
fn then_reported_disabled(world: &mut TestWorld, device_uid: Quoted) {
    assert!(!world.manager().is_enabled(&uid(device_uid.as_str())));
}

#[then("the status store record count is {count}")]
fn then_store_records(world: &mut TestWorld, count: usize) {
    assert_eq!(world.store.len(), count);
}

#[then("the handler from {name} for {device_uid} was disposed")]
fn then_disposed(world: &mut TestWorld, name: Quoted, device_uid: Quoted) {
    let entry = format!("dispose:{}:{}", name.as_str(), device_uid.as_str());
    assert_eq!(world.journal.count(&entry), 1, "{:?}", world.journal.entries());
}

#[then("registering device {device_uid} is rejected as closed")]
fn then_rejected_closed(world: &mut TestWorld, device_uid: Quoted) {
    let error = world
        .manager()
        .register_device(device(device_uid.as_str()))
        .expect_err("manager is shut down");
    assert!(error.is_closed(), "unexpected error: {error}");
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "A factory added after activation binds a waiting device"
)]
fn late_factory_binding(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "Capability checks wait for activation"
)]
fn activation_gate(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "Handler construction failure is recorded on the device"
)]
fn construction_failure(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "Disabling and enabling a device"
)]
fn enablement_round_trip(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "Unknown devices are enabled by default"
)]
fn unknown_device_enabled(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "Removing a factory releases its handlers"
)]
fn factory_removal(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/device_lifecycle.feature",
    name = "Operations fail after deactivation"
)]
fn deactivation(world: TestWorld) {
    drop(world);
}
