//! In-crate fakes for the external ports, shared by unit tests.

use crate::notify::{Notifier, NotifyEvent, NotifySeverity};
use crate::rollback::DeploymentHealth;
use crate::rollback::database::{BackupStore, StoreError};
use crate::sli::{SliBackend, SliError};
use crate::traffic::{RouterError, TrafficRouter};
use dvr_common::types::{Indicator, TrafficSplit};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Metrics backend fake. Error-rate reads can follow a sequence (the
/// last value repeats); p95 and conversion are fixed.
#[derive(Clone)]
pub struct FakeSliBackend {
    error_rate: Arc<Mutex<VecDeque<f64>>>,
    p95: f64,
    conversion: f64,
    fail: bool,
}

impl FakeSliBackend {
    pub fn new(error_rate: f64, p95: f64, conversion: f64) -> Self {
        Self::with_error_rate_sequence(vec![error_rate], p95, conversion)
    }

    pub fn with_error_rate_sequence(sequence: Vec<f64>, p95: f64, conversion: f64) -> Self {
        Self {
            error_rate: Arc::new(Mutex::new(sequence.into())),
            p95,
            conversion,
            fail: false,
        }
    }

    /// A backend whose every query fails.
    pub fn failing() -> Self {
        Self {
            error_rate: Arc::new(Mutex::new(VecDeque::new())),
            p95: 0.0,
            conversion: 0.0,
            fail: true,
        }
    }

    fn next_error_rate(&self) -> f64 {
        let mut queue = self.error_rate.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(0.0)
        } else {
            queue.front().copied().unwrap_or(0.0)
        }
    }
}

impl SliBackend for FakeSliBackend {
    async fn fetch(&self, indicator: Indicator, _window: Duration) -> Result<f64, SliError> {
        if self.fail {
            return Err(SliError {
                indicator,
                reason: "fake backend down".to_string(),
            });
        }
        Ok(match indicator {
            Indicator::ErrorRate => self.next_error_rate(),
            Indicator::P95Latency => self.p95,
            Indicator::ConversionRate => self.conversion,
        })
    }
}

/// Traffic router fake recording every applied split.
#[derive(Clone)]
pub struct FakeTrafficRouter {
    applied: Arc<Mutex<Vec<(TrafficSplit, Instant)>>>,
    fail_at: Arc<Mutex<Option<u8>>>,
}

impl FakeTrafficRouter {
    pub fn new() -> Self {
        Self {
            applied: Arc::new(Mutex::new(Vec::new())),
            fail_at: Arc::new(Mutex::new(None)),
        }
    }

    /// Make the router fail when asked for this percentage.
    pub fn fail_at(&self, percentage: u8) {
        *self.fail_at.lock().unwrap() = Some(percentage);
    }

    pub fn applied_percentages(&self) -> Vec<u8> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.percentage)
            .collect()
    }

    /// Whether the first routing call happened after `instant`.
    pub fn routed_after(&self, instant: Instant) -> bool {
        self.applied
            .lock()
            .unwrap()
            .first()
            .is_some_and(|(_, at)| *at >= instant)
    }
}

impl TrafficRouter for FakeTrafficRouter {
    async fn route(&self, split: &TrafficSplit) -> Result<(), RouterError> {
        if *self.fail_at.lock().unwrap() == Some(split.percentage) {
            return Err(RouterError {
                target: split.target.to_string(),
                percentage: split.percentage,
                reason: "fake router failure".to_string(),
            });
        }
        self.applied
            .lock()
            .unwrap()
            .push((split.clone(), Instant::now()));
        Ok(())
    }
}

/// Notifier fake recording every event.
#[derive(Clone)]
pub struct FakeNotifier {
    events: Arc<Mutex<Vec<NotifyEvent>>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.title.clone())
            .collect()
    }

    pub fn count(&self, severity: NotifySeverity) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}

impl Notifier for FakeNotifier {
    async fn notify(&self, event: &NotifyEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Backup store fake recording call order, with switchable failures.
#[derive(Clone)]
pub struct FakeBackupStore {
    calls: Arc<Mutex<Vec<&'static str>>>,
    last_call: Arc<Mutex<Instant>>,
    fail_backup: bool,
    fail_restore: bool,
    fail_integrity: bool,
}

impl FakeBackupStore {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            last_call: Arc::new(Mutex::new(Instant::now())),
            fail_backup: false,
            fail_restore: false,
            fail_integrity: false,
        }
    }

    pub fn fail_backup(mut self) -> Self {
        self.fail_backup = true;
        self
    }

    pub fn fail_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn fail_integrity(mut self) -> Self {
        self.fail_integrity = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        self.calls.clone()
    }

    pub fn last_call_at(&self) -> Instant {
        *self.last_call.lock().unwrap()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
        *self.last_call.lock().unwrap() = Instant::now();
    }
}

impl BackupStore for FakeBackupStore {
    async fn create_backup(&self, _tag: &str) -> Result<(), StoreError> {
        self.record("backup");
        if self.fail_backup {
            return Err(StoreError("fake backup failure".to_string()));
        }
        Ok(())
    }

    async fn restore(&self, _snapshot: &str) -> Result<(), StoreError> {
        self.record("restore");
        if self.fail_restore {
            return Err(StoreError("fake restore failure".to_string()));
        }
        Ok(())
    }

    async fn verify_integrity(&self) -> Result<(), StoreError> {
        self.record("integrity");
        if self.fail_integrity {
            return Err(StoreError("fake integrity failure".to_string()));
        }
        Ok(())
    }
}

/// Health verifier fake returning a scripted sequence (last repeats).
#[derive(Clone)]
pub struct FakeHealth {
    results: Arc<Mutex<VecDeque<bool>>>,
}

impl FakeHealth {
    pub fn always(healthy: bool) -> Self {
        Self::sequence(vec![healthy])
    }

    pub fn sequence(results: Vec<bool>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
        }
    }
}

impl DeploymentHealth for FakeHealth {
    async fn healthy(&self) -> bool {
        let mut queue = self.results.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(false)
        } else {
            queue.front().copied().unwrap_or(false)
        }
    }
}
