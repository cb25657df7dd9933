//! Minimal module contributing a lamp handler factory.

use std::sync::{Arc, Mutex};

use hearth_lifecycle::{Device, DeviceHandler, DeviceTypeUid, DeviceUid, HandlerError, HandlerFactory};

/// Shared record of disposed handlers.
#[derive(Clone, Debug, Default)]
pub struct Disposals {
    uids: Arc<Mutex<Vec<String>>>,
}

impl Disposals {
    pub fn uids(&self) -> Vec<String> {
        self.uids.lock().expect("disposal mutex poisoned").clone()
    }

    fn push(&self, uid: &DeviceUid) {
        self.uids
            .lock()
            .expect("disposal mutex poisoned")
            .push(uid.to_string());
    }
}

/// Supports `demo:lamp` devices.
pub struct LampFactory {
    disposals: Disposals,
}

impl LampFactory {
    pub fn shared(disposals: &Disposals) -> Arc<dyn HandlerFactory> {
        Arc::new(Self {
            disposals: disposals.clone(),
        })
    }
}

impl HandlerFactory for LampFactory {
    fn name(&self) -> &str {
        "demo-lamps"
    }

    fn supports(&self, device_type: &DeviceTypeUid) -> bool {
        device_type.as_str() == "demo:lamp"
    }

    fn create(&self, device: &Device) -> Result<Box<dyn DeviceHandler>, HandlerError> {
        Ok(Box::new(LampHandler {
            uid: device.uid().clone(),
            disposals: self.disposals.clone(),
        }))
    }
}

struct LampHandler {
    uid: DeviceUid,
    disposals: Disposals,
}

impl DeviceHandler for LampHandler {
    fn device_uid(&self) -> &DeviceUid {
        &self.uid
    }

    fn dispose(&mut self) {
        self.disposals.push(&self.uid);
    }
}
