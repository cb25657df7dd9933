//! Recording factories and handlers shared by the unit and behaviour tests.

use std::sync::{Arc, Mutex};

use crate::device::Device;
use crate::handler::{DeviceHandler, HandlerError, HandlerFactory};
use crate::uid::{DeviceTypeUid, DeviceUid};

/// Ordered log of every call made into extension code.
#[derive(Clone, Debug, Default)]
pub(crate) struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub(crate) fn record(&self, entry: String) {
        self.entries
            .lock()
            .expect("journal mutex poisoned")
            .push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("journal mutex poisoned").clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Creation {
    Succeed,
    Fail,
    Panic,
}

/// Factory that supports a fixed set of device types and logs each call as
/// `supports:{name}:{type}`, `create:{name}:{uid}` or `dispose:{name}:{uid}`.
pub(crate) struct RecordingFactory {
    name: String,
    supported: Vec<DeviceTypeUid>,
    creation: Creation,
    journal: Journal,
}

impl RecordingFactory {
    pub(crate) fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_owned(),
            supported: Vec::new(),
            creation: Creation::Succeed,
            journal: journal.clone(),
        }
    }

    pub(crate) fn supporting(mut self, device_type: &str) -> Self {
        self.supported
            .push(device_type.parse().expect("valid device type"));
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.creation = Creation::Fail;
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.creation = Creation::Panic;
        self
    }

    pub(crate) fn shared(self) -> Arc<dyn HandlerFactory> {
        Arc::new(self)
    }
}

impl HandlerFactory for RecordingFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, device_type: &DeviceTypeUid) -> bool {
        self.journal
            .record(format!("supports:{}:{device_type}", self.name));
        self.supported.contains(device_type)
    }

    fn create(&self, device: &Device) -> Result<Box<dyn DeviceHandler>, HandlerError> {
        self.journal
            .record(format!("create:{}:{}", self.name, device.uid()));
        match self.creation {
            Creation::Succeed => Ok(Box::new(RecordingHandler {
                uid: device.uid().clone(),
                factory: self.name.clone(),
                journal: self.journal.clone(),
            })),
            Creation::Fail => Err(HandlerError::new("device did not answer")),
            Creation::Panic => panic!("handler construction exploded"),
        }
    }
}

struct RecordingHandler {
    uid: DeviceUid,
    factory: String,
    journal: Journal,
}

impl DeviceHandler for RecordingHandler {
    fn device_uid(&self) -> &DeviceUid {
        &self.uid
    }

    fn dispose(&mut self) {
        self.journal
            .record(format!("dispose:{}:{}", self.factory, self.uid));
    }
}

pub(crate) fn uid(raw: &str) -> DeviceUid {
    raw.parse().expect("valid device uid")
}

pub(crate) fn device(raw: &str) -> Device {
    Device::from_uid(uid(raw))
}
