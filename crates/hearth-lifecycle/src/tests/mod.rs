//! Crate-level integration and BDD tests.

use std::sync::Arc;
use std::time::Duration;

use crate::test_doubles::{Journal, RecordingFactory, device, uid};
use crate::{
    BoundedCaller, DeviceLifecycleManager, EventFilter, EventKind, LifecycleEvent,
    MemoryStatusStore, ModulePrefixResolver,
};

mod behaviour;

#[test]
fn events_follow_a_device_through_its_lifecycle() {
    let journal = Journal::default();
    let manager = DeviceLifecycleManager::builder(
        BoundedCaller::new("integration", 2).expect("caller starts"),
    )
    .status_store(Arc::new(MemoryStatusStore::new()))
    .resolver(Arc::new(ModulePrefixResolver))
    .build();
    let bulb = uid("hue:bulb:7");
    let events = manager.subscribe(EventFilter::all().for_uid(bulb.clone()));

    manager
        .add_handler_factory(
            RecordingFactory::new("hue", &journal)
                .supporting("hue:bulb")
                .shared(),
        )
        .expect("add factory");
    manager.activate().expect("activate");
    manager.register_device(device("hue:bulb:7")).expect("register");
    manager.wait_idle();
    manager.set_enabled(&bulb, false).expect("disable");
    manager.wait_idle();
    manager.unregister_device(&bulb).expect("unregister");
    manager.deactivate();

    let kinds: Vec<EventKind> = events.drain().iter().map(LifecycleEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Added,
            EventKind::Bound,
            EventKind::Disabled,
            EventKind::Unbound,
            EventKind::Removed,
        ]
    );
    assert!(events.next_timeout(Duration::from_millis(10)).is_none());
}

#[test]
fn concurrent_registrations_bind_every_device_once() {
    let journal = Journal::default();
    let manager = Arc::new(DeviceLifecycleManager::new(
        BoundedCaller::new("concurrent", 3).expect("caller starts"),
    ));
    manager
        .add_handler_factory(
            RecordingFactory::new("hue", &journal)
                .supporting("hue:bulb")
                .shared(),
        )
        .expect("add factory");
    manager.activate().expect("activate");

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let shared = Arc::clone(&manager);
            std::thread::spawn(move || {
                for index in 0..10 {
                    let raw = format!("hue:bulb:{worker}-{index}");
                    shared.register_device(device(&raw)).expect("register");
                    shared.register_device(device(&raw)).expect("re-register");
                }
            })
        })
        .collect();
    for handle in workers {
        handle.join().expect("registration thread");
    }
    manager.wait_idle();

    assert_eq!(manager.devices().len(), 40);
    assert_eq!(journal.count("create:hue:"), 40);
}
