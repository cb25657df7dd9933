//! Coordination of device registration, handler binding and enablement.
//!
//! Public operations only touch the registries and enqueue work. Every
//! predicate evaluation, handler construction and handler disposal runs on
//! the [`BoundedCaller`], so slow or misbehaving extension code never blocks
//! the thread that registered a device. Work is submitted while the
//! registry lock is held; once [`DeviceLifecycleManager::deactivate`] flips
//! the state under that lock, no further submissions can race the drain.
//! Events raised by an operation are published under the same lock, so they
//! precede any event raised by the work it schedules.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::caller::{BoundedCaller, CallerError};
use crate::device::Device;
use crate::enablement::Enablement;
use crate::errors::LifecycleError;
use crate::events::{EventBus, EventFilter, EventKind, EventSubscription, LifecycleEvent};
use crate::handler::{DeviceHandler, HandlerError, HandlerFactory};
use crate::registry::{BindingState, BindingStatus, DeviceRegistry, FactoryRegistry, Insertion};
use crate::resolver::{CapabilityResolver, ModuleIdentity};
use crate::store::StatusStore;
use crate::uid::{DeviceTypeUid, DeviceUid};

pub(crate) const LIFECYCLE_TARGET: &str = "hearth::lifecycle";

/// Phase of the manager itself.
///
/// Factories may be registered in any phase before shutdown, but
/// `supports` is never consulted until the manager is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registrations are recorded but no matching happens.
    Created,
    /// Matching and binding run on the caller.
    Activated,
    /// Shut down; every mutation fails with the closed error.
    Deactivated,
}

/// Factories a matching pass is allowed to consult.
enum Candidates {
    All,
    Only(Arc<dyn HandlerFactory>),
    AddedAfter(u64),
}

struct Registries {
    state: LifecycleState,
    devices: DeviceRegistry,
    factories: FactoryRegistry,
    next_attempt: u64,
}

impl Registries {
    fn new() -> Self {
        Self {
            state: LifecycleState::Created,
            devices: DeviceRegistry::default(),
            factories: FactoryRegistry::default(),
            next_attempt: 0,
        }
    }

    const fn is_active(&self) -> bool {
        matches!(self.state, LifecycleState::Activated)
    }

    fn candidates(&self, candidates: &Candidates) -> Vec<Arc<dyn HandlerFactory>> {
        match candidates {
            Candidates::All => self.factories.snapshot(),
            Candidates::Only(factory) if self.factories.contains(factory) => {
                vec![Arc::clone(factory)]
            }
            Candidates::Only(_) => Vec::new(),
            Candidates::AddedAfter(epoch) => self.factories.added_after(*epoch),
        }
    }
}

struct Shared {
    registries: Mutex<Registries>,
    caller: BoundedCaller,
    enablement: Enablement,
    resolver: Option<Arc<dyn CapabilityResolver>>,
    events: EventBus,
}

/// Builder for [`DeviceLifecycleManager`].
pub struct LifecycleManagerBuilder {
    caller: BoundedCaller,
    store: Option<Arc<dyn StatusStore>>,
    resolver: Option<Arc<dyn CapabilityResolver>>,
}

impl LifecycleManagerBuilder {
    /// Persists enablement through `store`. Without one every device is
    /// treated as enabled and enablement writes are dropped.
    #[must_use]
    pub fn status_store(mut self, store: Arc<dyn StatusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Annotates diagnostics with the module that owns each device type.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn CapabilityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Finishes construction. The manager starts in [`LifecycleState::Created`].
    #[must_use]
    pub fn build(self) -> DeviceLifecycleManager {
        DeviceLifecycleManager {
            shared: Arc::new(Shared {
                registries: Mutex::new(Registries::new()),
                caller: self.caller,
                enablement: Enablement::new(self.store),
                resolver: self.resolver,
                events: EventBus::new(),
            }),
        }
    }
}

/// Owns the device and factory registries and drives handler binding.
///
/// Dropping the manager deactivates it, which disposes every bound handler
/// and drains the caller.
pub struct DeviceLifecycleManager {
    shared: Arc<Shared>,
}

impl DeviceLifecycleManager {
    /// Creates a manager without a status store or resolver.
    #[must_use]
    pub fn new(caller: BoundedCaller) -> Self {
        Self::builder(caller).build()
    }

    /// Starts a builder around `caller`.
    #[must_use]
    pub const fn builder(caller: BoundedCaller) -> LifecycleManagerBuilder {
        LifecycleManagerBuilder {
            caller,
            store: None,
            resolver: None,
        }
    }

    /// Records a device and, once activated, schedules handler matching.
    ///
    /// Registering an identical definition again is idempotent, except that
    /// an unbound or failed device gets a fresh matching pass.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidBridge`] for a self-bridged device,
    /// [`LifecycleError::Conflict`] when a different definition already uses
    /// the UID, and [`LifecycleError::CallerClosed`] after deactivation.
    pub fn register_device(&self, device: Device) -> Result<(), LifecycleError> {
        let uid = device.uid().clone();
        if device.bridge() == Some(&uid) {
            return Err(LifecycleError::invalid_bridge(uid));
        }
        let mut registries = self.shared.lock();
        self.shared.ensure_open(&registries)?;
        match registries.devices.insert(device) {
            Insertion::Conflict => return Err(LifecycleError::conflict(uid)),
            Insertion::Inserted => {
                info!(target: LIFECYCLE_TARGET, uid = %uid, "device registered");
                self.shared
                    .events
                    .publish(&LifecycleEvent::now(EventKind::Added, uid.clone()));
            }
            Insertion::Unchanged => {
                debug!(target: LIFECYCLE_TARGET, uid = %uid, "device re-registered unchanged");
            }
        }
        let retry = registries
            .devices
            .get(&uid)
            .is_some_and(|entry| entry.state.accepts_matching());
        if registries.is_active() && retry {
            self.shared.submit_matching(uid, Candidates::All)?;
        }
        Ok(())
    }

    /// Forgets a device and schedules disposal of its handler, if any.
    ///
    /// Unknown UIDs are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CallerClosed`] after deactivation.
    pub fn unregister_device(&self, uid: &DeviceUid) -> Result<(), LifecycleError> {
        let mut registries = self.shared.lock();
        self.shared.ensure_open(&registries)?;
        let Some(mut entry) = registries.devices.remove(uid) else {
            debug!(target: LIFECYCLE_TARGET, uid = %uid, "ignoring unknown device");
            return Ok(());
        };
        info!(
            target: LIFECYCLE_TARGET,
            uid = %uid,
            bridge = ?entry.device.bridge().map(DeviceUid::as_str),
            "device unregistered"
        );
        self.shared
            .events
            .publish(&LifecycleEvent::now(EventKind::Removed, uid.clone()));
        if let Some((factory, handler)) = entry.state.take_bound() {
            self.shared.submit_release(uid.clone(), &factory, handler)?;
        }
        Ok(())
    }

    /// Appends a factory to the matching order.
    ///
    /// When activated, every unbound or failed device is offered to the new
    /// factory alone; bound devices keep their handler. Adding the same
    /// factory twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CallerClosed`] after deactivation.
    pub fn add_handler_factory(&self, factory: Arc<dyn HandlerFactory>) -> Result<(), LifecycleError> {
        let mut registries = self.shared.lock();
        self.shared.ensure_open(&registries)?;
        if !registries.factories.add(Arc::clone(&factory)) {
            debug!(
                target: LIFECYCLE_TARGET,
                factory = factory.name(),
                "handler factory already registered"
            );
            return Ok(());
        }
        info!(
            target: LIFECYCLE_TARGET,
            factory = factory.name(),
            position = registries.factories.len(),
            "handler factory added"
        );
        if registries.is_active() {
            for uid in registries.devices.matchable() {
                self.shared
                    .submit_matching(uid, Candidates::Only(Arc::clone(&factory)))?;
            }
        }
        Ok(())
    }

    /// Withdraws a factory and releases every handler it created.
    ///
    /// Devices whose last attempt failed in this factory are reset to
    /// unbound as well, so no binding keeps the factory alive. Released
    /// devices stay unbound until another trigger arrives. Removing
    /// an unknown factory is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CallerClosed`] after deactivation.
    pub fn remove_handler_factory(
        &self,
        factory: &Arc<dyn HandlerFactory>,
    ) -> Result<(), LifecycleError> {
        let mut registries = self.shared.lock();
        self.shared.ensure_open(&registries)?;
        if !registries.factories.remove(factory) {
            debug!(
                target: LIFECYCLE_TARGET,
                factory = factory.name(),
                "ignoring unknown handler factory"
            );
            return Ok(());
        }
        info!(target: LIFECYCLE_TARGET, factory = factory.name(), "handler factory removed");
        let mut released = Vec::new();
        for entry in registries.devices.entries_mut() {
            if entry.state.failed_in(factory) {
                entry.state = BindingState::Unbound;
                continue;
            }
            if !entry.state.is_bound_to(factory) {
                continue;
            }
            if let Some((owner, handler)) = entry.state.take_bound() {
                released.push((entry.device.uid().clone(), owner, handler));
            }
        }
        for (uid, owner, handler) in released {
            self.shared.submit_release(uid, &owner, handler)?;
        }
        Ok(())
    }

    /// Moves the manager from `Created` to `Activated` and schedules a
    /// matching pass for every registered device. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::CallerClosed`] after deactivation.
    pub fn activate(&self) -> Result<(), LifecycleError> {
        let mut registries = self.shared.lock();
        match registries.state {
            LifecycleState::Activated => return Ok(()),
            LifecycleState::Deactivated => return Err(self.shared.closed()),
            LifecycleState::Created => registries.state = LifecycleState::Activated,
        }
        info!(
            target: LIFECYCLE_TARGET,
            devices = registries.devices.len(),
            factories = registries.factories.len(),
            "lifecycle manager activated"
        );
        for uid in registries.devices.matchable() {
            self.shared.submit_matching(uid, Candidates::All)?;
        }
        Ok(())
    }

    /// Releases every handler, drains outstanding work and closes the
    /// caller. Subsequent mutations fail with the closed error.
    pub fn deactivate(&self) {
        {
            let mut registries = self.shared.lock();
            if registries.state == LifecycleState::Deactivated {
                return;
            }
            registries.state = LifecycleState::Deactivated;
            let mut released = Vec::new();
            for entry in registries.devices.entries_mut() {
                if let Some((owner, handler)) = entry.state.take_bound() {
                    released.push((entry.device.uid().clone(), owner, handler));
                }
            }
            for (uid, owner, handler) in released {
                if let Err(error) = self.shared.submit_release(uid, &owner, handler) {
                    warn!(
                        target: LIFECYCLE_TARGET,
                        error = %error,
                        "handler release could not be scheduled during shutdown"
                    );
                }
            }
        }
        self.shared.caller.close();
        info!(target: LIFECYCLE_TARGET, "lifecycle manager deactivated");
    }

    /// Persists the enabled flag and adjusts the binding.
    ///
    /// Disabling releases a bound handler and cancels an in-flight pass;
    /// enabling schedules matching for an unbound or failed device. Unknown
    /// UIDs only touch the store, as does any call outside the activated
    /// phase, so the flag can still be written after deactivation.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] when the flag cannot be written.
    pub fn set_enabled(&self, uid: &DeviceUid, enabled: bool) -> Result<(), LifecycleError> {
        // The store write and the binding adjustment form one step, so
        // concurrent toggles settle on whatever the store holds last.
        let mut registries = self.shared.lock();
        self.shared
            .enablement
            .set(uid, enabled)
            .map_err(|source| LifecycleError::store(uid.clone(), source))?;
        info!(target: LIFECYCLE_TARGET, uid = %uid, enabled, "device enablement changed");
        let kind = if enabled {
            EventKind::Enabled
        } else {
            EventKind::Disabled
        };
        self.shared
            .events
            .publish(&LifecycleEvent::now(kind, uid.clone()));

        if !registries.is_active() {
            return Ok(());
        }
        let Some(entry) = registries.devices.get_mut(uid) else {
            return Ok(());
        };
        if enabled {
            if entry.state.accepts_matching() {
                self.shared.submit_matching(uid.clone(), Candidates::All)?;
            }
            return Ok(());
        }
        if matches!(entry.state, BindingState::Binding { .. }) {
            entry.state = BindingState::Unbound;
            return Ok(());
        }
        if let Some((owner, handler)) = entry.state.take_bound() {
            self.shared.submit_release(uid.clone(), &owner, handler)?;
        }
        Ok(())
    }

    /// Returns `false` only when a disabled record exists for the device.
    ///
    /// Store read failures are logged and reported as enabled.
    #[must_use]
    pub fn is_enabled(&self, uid: &DeviceUid) -> bool {
        self.shared.enablement.is_enabled(uid)
    }

    /// Returns the manager's phase.
    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.shared.lock().state
    }

    /// Returns the binding status of a registered device.
    #[must_use]
    pub fn binding_status(&self, uid: &DeviceUid) -> Option<BindingStatus> {
        self.shared
            .lock()
            .devices
            .get(uid)
            .map(|entry| entry.state.status())
    }

    /// Returns the registered definition for `uid`.
    #[must_use]
    pub fn device(&self, uid: &DeviceUid) -> Option<Device> {
        self.shared
            .lock()
            .devices
            .get(uid)
            .map(|entry| entry.device.clone())
    }

    /// Lists registered device UIDs in sorted order.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceUid> {
        self.shared.lock().devices.uids()
    }

    /// Lists devices that name `bridge` as their parent.
    #[must_use]
    pub fn bridged_devices(&self, bridge: &DeviceUid) -> Vec<DeviceUid> {
        self.shared.lock().devices.bridged_by(bridge)
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn factory_count(&self) -> usize {
        self.shared.lock().factories.len()
    }

    /// Subscribes to lifecycle events that pass `filter`.
    ///
    /// Events queue without bound until read; see [`EventBus::subscribe`].
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.shared.events.subscribe(filter)
    }

    /// Blocks until every job queued so far (and any follow-ups they
    /// schedule) has finished.
    pub fn wait_idle(&self) {
        self.shared.caller.wait_idle();
    }
}

impl Drop for DeviceLifecycleManager {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Registries> {
        self.registries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn closed(&self) -> LifecycleError {
        LifecycleError::from(CallerError::Closed {
            name: self.caller.name().to_owned(),
        })
    }

    fn ensure_open(&self, registries: &Registries) -> Result<(), LifecycleError> {
        if registries.state == LifecycleState::Deactivated {
            return Err(self.closed());
        }
        Ok(())
    }

    fn module_of(&self, device_type: &DeviceTypeUid) -> ModuleIdentity {
        let Some(resolver) = self.resolver.as_ref() else {
            return ModuleIdentity::unknown();
        };
        resolver.resolve(device_type).unwrap_or_else(|error| {
            debug!(target: LIFECYCLE_TARGET, error = %error, "module lookup failed");
            ModuleIdentity::unknown()
        })
    }

    /// Must be called with the registry lock held.
    fn submit_matching(
        self: &Arc<Self>,
        uid: DeviceUid,
        candidates: Candidates,
    ) -> Result<(), CallerError> {
        let shared = Arc::clone(self);
        self.caller
            .submit(move || shared.run_matching(&uid, &candidates))
    }

    /// Must be called with the registry lock held.
    fn submit_release(
        self: &Arc<Self>,
        uid: DeviceUid,
        factory: &Arc<dyn HandlerFactory>,
        handler: Box<dyn DeviceHandler>,
    ) -> Result<(), CallerError> {
        let shared = Arc::clone(self);
        let factory_name = factory.name().to_owned();
        self.caller
            .submit(move || shared.release(&uid, &factory_name, handler))
    }

    fn run_matching(self: &Arc<Self>, uid: &DeviceUid, candidates: &Candidates) {
        let Some(pass) = self.begin_pass(uid, candidates) else {
            return;
        };
        if !self.enablement.is_enabled(uid) {
            debug!(target: LIFECYCLE_TARGET, uid = %uid, "skipping disabled device");
            self.abandon(uid, pass.attempt);
            return;
        }
        let device_type = pass.device.device_type();
        let module = self.module_of(device_type);
        let Some(factory) = pass
            .factories
            .iter()
            .find(|factory| supports(factory, device_type))
        else {
            info!(
                target: LIFECYCLE_TARGET,
                uid = %uid,
                device_type = %device_type,
                module = %module,
                "no handler factory supports device type"
            );
            self.settle_unmatched(uid, &pass);
            return;
        };
        match create(factory, &pass.device) {
            Ok(handler) => self.commit(uid, &pass, factory, handler, &module),
            Err(failure) => self.record_failure(uid, &pass, factory, &failure, &module),
        }
    }

    /// Marks the device as binding and snapshots the candidate factories.
    fn begin_pass(&self, uid: &DeviceUid, candidates: &Candidates) -> Option<Pass> {
        let mut registries = self.lock();
        if !registries.is_active() {
            return None;
        }
        let factories = registries.candidates(candidates);
        let epoch = registries.factories.epoch();
        registries.next_attempt += 1;
        let attempt = registries.next_attempt;
        let entry = registries.devices.get_mut(uid)?;
        if !entry.state.accepts_matching() {
            debug!(target: LIFECYCLE_TARGET, uid = %uid, "matching already settled");
            return None;
        }
        entry.state = BindingState::Binding { attempt };
        Some(Pass {
            device: entry.device.clone(),
            factories,
            epoch,
            attempt,
        })
    }

    fn abandon(&self, uid: &DeviceUid, attempt: u64) {
        let mut registries = self.lock();
        if let Some(entry) = registries.devices.get_mut(uid) {
            if entry.state.is_attempt(attempt) {
                entry.state = BindingState::Unbound;
            }
        }
    }

    /// Factories added while the pass ran were not in its snapshot; give
    /// them a turn before the device settles.
    fn settle_unmatched(self: &Arc<Self>, uid: &DeviceUid, pass: &Pass) {
        let mut registries = self.lock();
        let late_factories = registries.factories.epoch() != pass.epoch;
        let active = registries.is_active();
        let Some(entry) = registries.devices.get_mut(uid) else {
            return;
        };
        if !entry.state.is_attempt(pass.attempt) {
            return;
        }
        entry.state = BindingState::Unbound;
        if active && late_factories {
            self.retry_late_factories(uid, pass.epoch);
        }
    }

    fn retry_late_factories(self: &Arc<Self>, uid: &DeviceUid, epoch: u64) {
        if let Err(error) = self.submit_matching(uid.clone(), Candidates::AddedAfter(epoch)) {
            warn!(
                target: LIFECYCLE_TARGET,
                uid = %uid,
                error = %error,
                "could not offer device to late factories"
            );
        }
    }

    fn commit(
        &self,
        uid: &DeviceUid,
        pass: &Pass,
        factory: &Arc<dyn HandlerFactory>,
        handler: Box<dyn DeviceHandler>,
        module: &ModuleIdentity,
    ) {
        let stale = {
            let mut registries = self.lock();
            let keep = registries.is_active() && registries.factories.contains(factory);
            match registries.devices.get_mut(uid) {
                Some(entry) if entry.state.is_attempt(pass.attempt) => {
                    if keep {
                        entry.state = BindingState::Bound {
                            factory: Arc::clone(factory),
                            handler,
                        };
                        info!(
                            target: LIFECYCLE_TARGET,
                            uid = %uid,
                            factory = factory.name(),
                            module = %module,
                            "handler bound"
                        );
                        self.events.publish(
                            &LifecycleEvent::now(EventKind::Bound, uid.clone())
                                .with_detail(factory.name()),
                        );
                        None
                    } else {
                        entry.state = BindingState::Unbound;
                        Some(handler)
                    }
                }
                _ => Some(handler),
            }
        };
        if let Some(handler) = stale {
            debug!(
                target: LIFECYCLE_TARGET,
                uid = %uid,
                factory = factory.name(),
                "discarding handler from superseded attempt"
            );
            dispose(uid, factory.name(), handler);
        }
    }

    fn record_failure(
        self: &Arc<Self>,
        uid: &DeviceUid,
        pass: &Pass,
        factory: &Arc<dyn HandlerFactory>,
        failure: &HandlerError,
        module: &ModuleIdentity,
    ) {
        let mut registries = self.lock();
        let late_factories = registries.factories.epoch() != pass.epoch;
        let active = registries.is_active();
        let Some(entry) = registries.devices.get_mut(uid) else {
            return;
        };
        if !entry.state.is_attempt(pass.attempt) {
            return;
        }
        entry.state = BindingState::Failed {
            factory: Arc::clone(factory),
            reason: failure.to_string(),
        };
        warn!(
            target: LIFECYCLE_TARGET,
            uid = %uid,
            factory = factory.name(),
            module = %module,
            error = %failure,
            "handler initialisation failed"
        );
        self.events.publish(
            &LifecycleEvent::now(EventKind::BindingFailed, uid.clone())
                .with_detail(failure.to_string()),
        );
        if active && late_factories {
            self.retry_late_factories(uid, pass.epoch);
        }
    }

    fn release(&self, uid: &DeviceUid, factory_name: &str, handler: Box<dyn DeviceHandler>) {
        dispose(uid, factory_name, handler);
        info!(
            target: LIFECYCLE_TARGET,
            uid = %uid,
            factory = factory_name,
            "handler released"
        );
        self.events.publish(
            &LifecycleEvent::now(EventKind::Unbound, uid.clone()).with_detail(factory_name),
        );
    }
}

/// Snapshot taken when a matching pass starts.
struct Pass {
    device: Device,
    factories: Vec<Arc<dyn HandlerFactory>>,
    epoch: u64,
    attempt: u64,
}

fn supports(factory: &Arc<dyn HandlerFactory>, device_type: &DeviceTypeUid) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| factory.supports(device_type))).unwrap_or_else(
        |payload| {
            let failure = HandlerError::from_panic(payload.as_ref());
            error!(
                target: LIFECYCLE_TARGET,
                factory = factory.name(),
                device_type = %device_type,
                error = %failure,
                "capability check panicked; treating as unsupported"
            );
            false
        },
    )
}

fn create(
    factory: &Arc<dyn HandlerFactory>,
    device: &Device,
) -> Result<Box<dyn DeviceHandler>, HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(|| factory.create(device)))
        .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload.as_ref())))
}

fn dispose(uid: &DeviceUid, factory_name: &str, mut handler: Box<dyn DeviceHandler>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.dispose())) {
        let failure = HandlerError::from_panic(payload.as_ref());
        error!(
            target: LIFECYCLE_TARGET,
            uid = %uid,
            factory = factory_name,
            error = %failure,
            "handler disposal panicked"
        );
    }
}
