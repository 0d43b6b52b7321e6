//! Scripted provider and in-memory log sink for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use crate::models::{AppTask, AutomationLogEntry};
use crate::orchestrator::LogSink;
use crate::provider::{ElementHandle, RegionFilter, ScreenInteractionProvider, ScreenSize};

pub const SCREEN: ScreenSize = ScreenSize {
    width: 1080,
    height: 2400,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Launch(String),
    Back,
    Home,
    Tap(f32, f32),
    Swipe(f32, f32, f32, f32, u64),
}

#[derive(Default)]
struct MockState {
    foreground: Option<String>,
    stuck: HashSet<String>,
    elements: Vec<ElementHandle>,
    calls: Vec<(Instant, ProviderCall)>,
}

/// Device double: a launched package comes to the foreground unless it was
/// marked as stuck.
pub struct MockProvider {
    state: Mutex<MockState>,
    capability: AtomicBool,
    available: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            capability: AtomicBool::new(true),
            available: AtomicBool::new(true),
        }
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn without_capability(self) -> Self {
        self.capability.store(false, Ordering::SeqCst);
        self
    }

    pub fn stuck(self, package: &str) -> Self {
        self.state.lock().unwrap().stuck.insert(package.to_string());
        self
    }

    pub fn with_elements(self, elements: Vec<ElementHandle>) -> Self {
        self.state.lock().unwrap().elements = elements;
        self
    }

    pub fn set_foreground(&self, package: Option<&str>) {
        self.state.lock().unwrap().foreground = package.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, ProviderCall)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn launches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Launch(package) => Some(package),
                _ => None,
            })
            .collect()
    }

    pub fn back_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ProviderCall::Back))
            .count()
    }

    pub fn gesture_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ProviderCall::Tap(..) | ProviderCall::Swipe(..)))
            .count()
    }

    fn record(&self, call: ProviderCall) {
        self.state.lock().unwrap().calls.push((Instant::now(), call));
    }
}

#[async_trait]
impl ScreenInteractionProvider for MockProvider {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn has_foreground_query_capability(&self) -> bool {
        self.capability.load(Ordering::SeqCst)
    }

    async fn query_foreground_package(&self) -> Option<String> {
        self.state.lock().unwrap().foreground.clone()
    }

    async fn screen_size(&self) -> ScreenSize {
        SCREEN
    }

    async fn list_interactable_elements(&self, filter: &RegionFilter) -> Vec<ElementHandle> {
        self.state
            .lock()
            .unwrap()
            .elements
            .iter()
            .filter(|element| filter.matches(element, SCREEN))
            .take(filter.max_results)
            .cloned()
            .collect()
    }

    async fn tap(&self, x: f32, y: f32) -> bool {
        self.record(ProviderCall::Tap(x, y));
        true
    }

    async fn swipe(&self, x1: f32, y1: f32, x2: f32, y2: f32, duration_ms: u64) -> bool {
        self.record(ProviderCall::Swipe(x1, y1, x2, y2, duration_ms));
        true
    }

    async fn dispatch_back(&self) -> bool {
        self.record(ProviderCall::Back);
        true
    }

    async fn dispatch_home(&self) -> bool {
        self.record(ProviderCall::Home);
        true
    }

    async fn launch(&self, package_id: &str) -> bool {
        self.record(ProviderCall::Launch(package_id.to_string()));
        let mut state = self.state.lock().unwrap();
        if !state.stuck.contains(package_id) {
            state.foreground = Some(package_id.to_string());
        }
        true
    }
}

#[derive(Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<AutomationLogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AutomationLogEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn record(&self, entry: AutomationLogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

pub fn task(package: &str, duration_ms: u64) -> AppTask {
    AppTask::new(package, package.rsplit('.').next().unwrap_or(package), duration_ms).unwrap()
}
