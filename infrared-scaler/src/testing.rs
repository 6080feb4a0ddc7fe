//! In-memory stand-ins for the proxy config API and the cluster scale API.

use async_trait::async_trait;
use infrared_scaler_common::ConfigDocument;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{PublishError, ScaleError};
use crate::kubernetes::models::WorkloadRef;
use crate::kubernetes::scaler::ReplicaScaler;
use crate::proxy::publisher::{ConfigStore, Removal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Exists(String),
    Upsert(String),
    Delete(String),
}

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, ConfigDocument>>,
    calls: Mutex<Vec<StoreCall>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn document(&self, config_id: &str) -> Option<ConfigDocument> {
        self.documents.lock().unwrap().get(config_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn check(&self) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PublishError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn exists(&self, config_id: &str) -> Result<bool, PublishError> {
        self.calls.lock().unwrap().push(StoreCall::Exists(config_id.to_string()));
        self.check()?;
        Ok(self.documents.lock().unwrap().contains_key(config_id))
    }

    async fn upsert(&self, config_id: &str, document: &ConfigDocument) -> Result<(), PublishError> {
        self.calls.lock().unwrap().push(StoreCall::Upsert(config_id.to_string()));
        self.check()?;
        self.documents
            .lock()
            .unwrap()
            .insert(config_id.to_string(), document.clone());
        Ok(())
    }

    async fn delete(&self, config_id: &str) -> Result<Removal, PublishError> {
        self.calls.lock().unwrap().push(StoreCall::Delete(config_id.to_string()));
        self.check()?;
        match self.documents.lock().unwrap().remove(config_id) {
            Some(_) => Ok(Removal::Deleted),
            None => Ok(Removal::AlreadyAbsent),
        }
    }
}

#[derive(Default)]
pub struct RecordingScaler {
    calls: Mutex<Vec<(String, i32)>>,
    fail_all: bool,
    fail_for: Option<String>,
}

impl RecordingScaler {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Rejects patches for one StatefulSet only.
    pub fn failing_for(name: &str) -> Self {
        Self {
            fail_for: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// `(statefulset name, replicas)` for every patch attempted.
    pub fn calls(&self) -> Vec<(String, i32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplicaScaler for RecordingScaler {
    async fn set_replicas(&self, workload: &WorkloadRef, replicas: i32) -> Result<(), ScaleError> {
        self.calls
            .lock()
            .unwrap()
            .push((workload.name.clone(), replicas));
        if self.fail_all || self.fail_for.as_deref() == Some(workload.name.as_str()) {
            return Err(ScaleError::Rejected {
                workload: workload.to_string(),
                code: 403,
                reason: "Forbidden".to_string(),
                message: "statefulsets.apps/scale is forbidden".to_string(),
            });
        }
        Ok(())
    }
}
