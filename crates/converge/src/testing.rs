//! Recording provider for engine tests

use crate::error::ProviderError;
use crate::node::ResourceKey;
use crate::property::PropertyMap;
use crate::provider::Provider;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    End(String),
    Delete(String),
}

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct FakeProvider {
    timeline: Mutex<Vec<Event>>,
    creates: Mutex<Vec<(String, PropertyMap)>>,
    failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    permanent: Mutex<HashMap<String, ProviderError>>,
    delete_failures: Mutex<HashMap<String, ProviderError>>,
    hooks: Mutex<HashMap<String, Hook>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    latency: Duration,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fail every call for `name` with `error`
    pub fn fail_always(&self, name: &str, error: ProviderError) {
        self.permanent.lock().unwrap().insert(name.to_string(), error);
    }

    /// Fail the next `times` calls for `name`
    pub fn fail_times(&self, name: &str, error: ProviderError, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(name.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    pub fn fail_delete(&self, name: &str, error: ProviderError) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(name.to_string(), error);
    }

    /// Run `hook` right after `name` is created
    pub fn after_create(&self, name: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap()
            .insert(name.to_string(), Box::new(hook));
    }

    pub fn timeline(&self) -> Vec<Event> {
        self.timeline.lock().unwrap().clone()
    }

    /// Names passed to create_or_update, in call order (retries included)
    pub fn created(&self) -> Vec<String> {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn last_desired(&self, name: &str) -> Option<PropertyMap> {
        self.creates
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.clone())
    }

    pub fn deleted(&self) -> Vec<String> {
        self.timeline()
            .into_iter()
            .filter_map(|e| match e {
                Event::Delete(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn injected_failure(&self, name: &str) -> Option<ProviderError> {
        if let Some(error) = self.permanent.lock().unwrap().get(name) {
            return Some(error.clone());
        }
        self.failures
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(VecDeque::pop_front)
    }
}

impl Provider for FakeProvider {
    fn create_or_update(
        &self,
        key: &ResourceKey,
        desired: &PropertyMap,
        _timeout: Duration,
    ) -> Result<PropertyMap, ProviderError> {
        let name = key.name.clone();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.timeline.lock().unwrap().push(Event::Start(name.clone()));
        self.creates
            .lock()
            .unwrap()
            .push((name.clone(), desired.clone()));

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let result = match self.injected_failure(&name) {
            Some(error) => Err(error),
            None => {
                let mut realized = desired.clone();
                realized.insert("id".into(), json!(format!("/fake/{}", name)));
                realized.insert("name".into(), json!(name));
                Ok(realized)
            }
        };

        self.timeline.lock().unwrap().push(Event::End(name.clone()));
        self.active.fetch_sub(1, Ordering::SeqCst);

        if result.is_ok()
            && let Some(hook) = self.hooks.lock().unwrap().get(&name)
        {
            hook();
        }
        result
    }

    fn delete(&self, _kind: &str, remote_id: &str, _timeout: Duration) -> Result<(), ProviderError> {
        let name = remote_id.rsplit('/').next().unwrap_or(remote_id).to_string();
        if let Some(error) = self.delete_failures.lock().unwrap().get(&name) {
            return Err(error.clone());
        }
        self.timeline.lock().unwrap().push(Event::Delete(name));
        Ok(())
    }
}
