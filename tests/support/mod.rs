//! Shared fakes for engine-level tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketrush::config::RushConfig;
use ticketrush::device::{Device, DeviceInfo, DeviceTransport, Platform};
use ticketrush::driver::{AttemptOutcome, PurchaseDriver};
use ticketrush::task::{Task, TaskSpec};
use ticketrush::{RushEngine, RushError};

/// Phones that are "plugged in" answer every probe.
#[derive(Default)]
pub struct PluggedTransport {
    attached: Mutex<HashSet<(String, Platform)>>,
}

impl PluggedTransport {
    pub fn plug(&self, id: &str, platform: Platform) {
        self.attached
            .lock()
            .unwrap()
            .insert((id.to_owned(), platform));
    }

    pub fn unplug(&self, id: &str) {
        self.attached.lock().unwrap().retain(|(d, _)| d != id);
    }

    fn has(&self, id: &str, platform: Platform) -> bool {
        self.attached
            .lock()
            .unwrap()
            .contains(&(id.to_owned(), platform))
    }
}

#[async_trait]
impl DeviceTransport for PluggedTransport {
    async fn scan(&self, platform: Platform) -> ticketrush::Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .attached
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| *p == platform)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn connect(&self, device_id: &str, platform: Platform) -> ticketrush::Result<DeviceInfo> {
        if self.has(device_id, platform) {
            Ok(DeviceInfo {
                brand: "Xiaomi".to_owned(),
                model: "Mi 11".to_owned(),
                os_version: "13".to_owned(),
            })
        } else {
            Err(RushError::Connection(format!("{device_id} not attached")))
        }
    }

    async fn is_alive(&self, device_id: &str, platform: Platform) -> bool {
        self.has(device_id, platform)
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Step {
    Succeed,
    Fail,
    /// Fail after holding the device for this many milliseconds.
    SlowFail(u64),
}

/// Replays a per-device script; devices without one always fail.
#[derive(Default)]
pub struct ScriptedDriver {
    plan: Mutex<HashMap<String, Vec<Step>>>,
    calls: Mutex<Vec<String>>,
    pub diagnoses: AtomicUsize,
    /// How long `diagnose` holds the device, in milliseconds.
    pub diagnose_delay_ms: AtomicU64,
}

impl ScriptedDriver {
    pub fn script(&self, device_id: &str, steps: &[Step]) {
        self.plan
            .lock()
            .unwrap()
            .insert(device_id.to_owned(), steps.to_vec());
    }

    pub fn calls_for(&self, device_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|d| *d == device_id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PurchaseDriver for ScriptedDriver {
    async fn attempt_purchase(&self, device: &Device, _task: &Task) -> AttemptOutcome {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.iter().filter(|d| **d == device.device_id).count();
            calls.push(device.device_id.clone());
            index
        };
        let step = self
            .plan
            .lock()
            .unwrap()
            .get(&device.device_id)
            .and_then(|steps| steps.get(index).or(steps.last()).copied())
            .unwrap_or(Step::Fail);
        match step {
            Step::Succeed => AttemptOutcome::succeeded(),
            Step::Fail => AttemptOutcome::failed("sold out"),
            Step::SlowFail(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                AttemptOutcome::failed("app not responding")
            }
        }
    }

    async fn diagnose(&self, _device: &Device) -> ticketrush::Result<()> {
        self.diagnoses.fetch_add(1, Ordering::SeqCst);
        let delay = self.diagnose_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }
}

pub struct Rig {
    pub engine: Arc<RushEngine>,
    pub transport: Arc<PluggedTransport>,
    pub driver: Arc<ScriptedDriver>,
}

/// Engine with the given Android phones plugged in and connected.
pub async fn rig(config: RushConfig, phones: &[&str]) -> Rig {
    let transport = Arc::new(PluggedTransport::default());
    let driver = Arc::new(ScriptedDriver::default());
    let engine = Arc::new(
        RushEngine::new(
            config,
            Arc::clone(&transport) as Arc<dyn DeviceTransport>,
            Arc::clone(&driver) as Arc<dyn PurchaseDriver>,
        )
        .unwrap(),
    );
    for id in phones {
        transport.plug(id, Platform::Android);
        engine.connect_device(id, Platform::Android).await.unwrap();
    }
    Rig {
        engine,
        transport,
        driver,
    }
}

pub fn spec(task_id: &str, start_time: &str, devices: &[&str]) -> TaskSpec {
    TaskSpec {
        task_id: Some(task_id.to_owned()),
        event_name: "Mayday Fly to 2026".to_owned(),
        event_url: "https://m.damai.cn/shows/item.html?itemId=720001".to_owned(),
        start_time: start_time.to_owned(),
        target_price: Some(855),
        quantity: 2,
        device_ids: devices.iter().map(|d| (*d).to_owned()).collect(),
    }
}

/// Poll until the task leaves `pending`/`running` or the timeout passes.
pub async fn wait_terminal(engine: &RushEngine, task_id: &str) -> Task {
    for _ in 0..600 {
        let task = engine.get_task(task_id).unwrap();
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("task {task_id} never settled");
}
