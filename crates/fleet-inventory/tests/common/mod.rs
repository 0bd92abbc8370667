//! Scripted hosts for integration tests; no network involved

#![allow(dead_code)]

use async_trait::async_trait;
use fleet_inventory::{
    CommandOutput, Connector, EventLevel, ProgressEvent, RemoteShell, SessionError, Target,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// How a scripted host fails to open a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Auth,
    Connection,
    Protocol,
}

impl Failure {
    fn error(self, host: &str) -> SessionError {
        let host = host.to_string();
        match self {
            Self::Auth => SessionError::Auth {
                host,
                user: "root".to_string(),
                reason: "password rejected".to_string(),
            },
            Self::Connection => SessionError::Connection {
                host,
                reason: "connection timed out".to_string(),
            },
            Self::Protocol => SessionError::Protocol {
                host,
                reason: "kex failed".to_string(),
            },
        }
    }
}

/// Behaviour of one scripted host
#[derive(Debug, Clone)]
pub struct HostScript {
    /// Session failures returned before the host answers
    failures: Vec<Failure>,
    /// Fail forever with the last failure
    always_fail: bool,
    /// Panic inside `connect`
    panics: bool,
    answers: HashMap<String, String>,
}

impl HostScript {
    pub fn answers(answers: &[(&str, &str)]) -> Self {
        Self {
            failures: Vec::new(),
            always_fail: false,
            panics: false,
            answers: answers
                .iter()
                .map(|(c, o)| ((*c).to_string(), (*o).to_string()))
                .collect(),
        }
    }

    /// Host answering only the inxi fast path
    pub fn inxi(report: &str) -> Self {
        Self::answers(&[("inxi -FzJc0", report)])
    }

    pub fn failing(failure: Failure) -> Self {
        Self {
            failures: vec![failure],
            always_fail: true,
            panics: false,
            answers: HashMap::new(),
        }
    }

    /// Host whose collection task panics
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::answers(&[])
        }
    }

    /// Fail `count` times with `failure`, then behave as `self`
    pub fn after_failures(mut self, failure: Failure, count: usize) -> Self {
        self.failures = vec![failure; count];
        self
    }
}

/// Connector serving [`HostScript`]s keyed by IP
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    scripts: HashMap<String, HostScript>,
    attempts: Mutex<HashMap<String, usize>>,
    pub connects: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, ip: &str, script: HostScript) -> Self {
        self.scripts.insert(ip.to_string(), script);
        self
    }

    pub fn attempts(&self, ip: &str) -> usize {
        self.attempts.lock().unwrap().get(ip).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Shell = ScriptedShell;

    async fn connect(&self, target: &Target) -> Result<ScriptedShell, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(target.ip.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let Some(script) = self.scripts.get(&target.ip) else {
            return Err(Failure::Connection.error(&target.ip));
        };

        if script.panics {
            panic!("scripted panic for {}", target.ip);
        }
        if script.always_fail {
            return Err(script.failures[0].error(&target.ip));
        }
        if let Some(failure) = script.failures.get(attempt - 1) {
            return Err(failure.error(&target.ip));
        }

        Ok(ScriptedShell {
            host: target.ip.clone(),
            answers: script.answers.clone(),
            closed: Arc::clone(&self.closed),
        })
    }
}

/// Shell answering plain commands from a table; sudo is always refused
#[derive(Debug)]
pub struct ScriptedShell {
    host: String,
    answers: HashMap<String, String>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str, escalate: bool) -> Option<CommandOutput> {
        if escalate {
            return None;
        }
        self.answers.get(command).map(|stdout| CommandOutput {
            stdout: stdout.clone(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// inxi JSON report for a host with the given processor and memory
pub fn inxi_report(cpu: &str, cores: u32, ram_gb: f64, disk_gb: f64) -> String {
    format!(
        r#"{{
            "system": {{"kernel": "5.15.0-91-generic x86_64", "distro": "Ubuntu 22.04.3 LTS"}},
            "machine": {{"mobo": "ASUSTeK", "mobo-model": "H110M-K"}},
            "cpu": [{{"model": "{cpu}", "cores": {cores}, "threads": {cores}}}],
            "memory": {{"total-gb": {ram_gb}, "arrays": [{{"devices": [{{"type": "DDR4"}}]}}]}},
            "drives": [{{"name": "sda", "size-gb": {disk_gb}, "is-ssd": true}}]
        }}"#
    )
}

/// Drain every event already queued on `rx`
pub fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn count_level(events: &[ProgressEvent], level: EventLevel) -> usize {
    events.iter().filter(|e| e.level == level).count()
}
