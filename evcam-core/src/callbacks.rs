//! Thread-safe registry of user callbacks.
//!
//! All callback kinds draw their identifiers from one counter owned by the
//! registry. Invocation always works on a snapshot taken under the lock, so
//! a callback may add or remove callbacks without deadlocking.

use crate::error::CameraError;
use crate::facility::EventSink;
use crate::types::{CallbackId, CameraStatus, CdEvent, TriggerEvent};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type RuntimeErrorCallback = Arc<dyn Fn(&CameraError) + Send + Sync>;
pub type StatusChangeCallback = Arc<dyn Fn(CameraStatus) + Send + Sync>;
pub type CdCallback = Arc<dyn Fn(&[CdEvent]) + Send + Sync>;
pub type TriggerCallback = Arc<dyn Fn(&[TriggerEvent]) + Send + Sync>;
pub type RawDataCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[derive(Default)]
struct Maps {
    runtime_error: BTreeMap<CallbackId, RuntimeErrorCallback>,
    status_change: BTreeMap<CallbackId, StatusChangeCallback>,
    cd: BTreeMap<CallbackId, CdCallback>,
    trigger: BTreeMap<CallbackId, TriggerCallback>,
    raw_data: BTreeMap<CallbackId, RawDataCallback>,
}

#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    maps: Mutex<Maps>,
}

fn snapshot<T: Clone>(map: &BTreeMap<CallbackId, T>) -> Vec<T> {
    map.values().cloned().collect()
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> CallbackId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn insert<T>(
        &self,
        select: impl FnOnce(&mut Maps) -> &mut BTreeMap<CallbackId, T>,
        cb: T,
    ) -> CallbackId {
        let mut maps = self.maps.lock();
        let id = self.next_id();
        select(&mut *maps).insert(id, cb);
        id
    }

    fn remove<T>(
        &self,
        select: impl FnOnce(&mut Maps) -> &mut BTreeMap<CallbackId, T>,
        id: CallbackId,
    ) -> bool {
        select(&mut *self.maps.lock()).remove(&id).is_some()
    }

    pub fn add_runtime_error<F>(&self, cb: F) -> CallbackId
    where
        F: Fn(&CameraError) + Send + Sync + 'static,
    {
        let cb: RuntimeErrorCallback = Arc::new(cb);
        self.insert(|m| &mut m.runtime_error, cb)
    }

    pub fn remove_runtime_error(&self, id: CallbackId) -> bool {
        self.remove(|m| &mut m.runtime_error, id)
    }

    pub fn add_status_change<F>(&self, cb: F) -> CallbackId
    where
        F: Fn(CameraStatus) + Send + Sync + 'static,
    {
        let cb: StatusChangeCallback = Arc::new(cb);
        self.insert(|m| &mut m.status_change, cb)
    }

    pub fn remove_status_change(&self, id: CallbackId) -> bool {
        self.remove(|m| &mut m.status_change, id)
    }

    pub fn add_cd<F>(&self, cb: F) -> CallbackId
    where
        F: Fn(&[CdEvent]) + Send + Sync + 'static,
    {
        let cb: CdCallback = Arc::new(cb);
        self.insert(|m| &mut m.cd, cb)
    }

    pub fn remove_cd(&self, id: CallbackId) -> bool {
        self.remove(|m| &mut m.cd, id)
    }

    pub fn add_trigger<F>(&self, cb: F) -> CallbackId
    where
        F: Fn(&[TriggerEvent]) + Send + Sync + 'static,
    {
        let cb: TriggerCallback = Arc::new(cb);
        self.insert(|m| &mut m.trigger, cb)
    }

    pub fn remove_trigger(&self, id: CallbackId) -> bool {
        self.remove(|m| &mut m.trigger, id)
    }

    pub fn add_raw_data<F>(&self, cb: F) -> CallbackId
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let cb: RawDataCallback = Arc::new(cb);
        self.insert(|m| &mut m.raw_data, cb)
    }

    pub fn remove_raw_data(&self, id: CallbackId) -> bool {
        self.remove(|m| &mut m.raw_data, id)
    }

    /// True when at least one callback needs the decoder to run.
    pub fn has_decode_callbacks(&self) -> bool {
        let maps = self.maps.lock();
        !maps.cd.is_empty() || !maps.trigger.is_empty()
    }

    pub fn notify_runtime_error(&self, error: &CameraError) {
        let callbacks = snapshot(&self.maps.lock().runtime_error);
        for cb in callbacks {
            cb(error);
        }
    }

    pub fn notify_status(&self, status: CameraStatus) {
        let callbacks = snapshot(&self.maps.lock().status_change);
        for cb in callbacks {
            cb(status);
        }
    }

    pub fn dispatch_raw_data(&self, data: &[u8]) {
        let callbacks = snapshot(&self.maps.lock().raw_data);
        for cb in callbacks {
            cb(data);
        }
    }
}

/// Forwards decoder output to the registered CD and trigger callbacks.
impl EventSink for &CallbackRegistry {
    fn on_cd_events(&mut self, events: &[CdEvent]) {
        let callbacks = snapshot(&self.maps.lock().cd);
        for cb in callbacks {
            cb(events);
        }
    }

    fn on_trigger_events(&mut self, events: &[TriggerEvent]) {
        let callbacks = snapshot(&self.maps.lock().trigger);
        for cb in callbacks {
            cb(events);
        }
    }
}
