//! In-memory collaborators for replaying passes in tests

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vc_core::config::ForwardConfig;
use vc_core::error::{CommandError, InventoryError, TransportError};
use vc_core::traits::{
    LocalProbe, PortScan, PortScanner, ProcessEntry, ProcessTable, RemoteExec, SessionManager,
};
use vc_core::ModelIdentity;

use crate::Backends;

/// Remote hosts: per-port services, remote sessions, unreachable hosts
#[derive(Default)]
pub struct FakeRemote {
    services: Mutex<HashMap<(String, u16), String>>,
    sessions: Mutex<HashMap<String, BTreeSet<String>>>,
    unreachable: Mutex<HashMap<String, TransportError>>,
    commands: Mutex<Vec<(String, String)>>,
}

impl FakeRemote {
    /// Serve `model` on `host:port`
    pub fn serve(&self, host: &str, port: u16, model: &str) {
        let body = format!(r#"{{"object":"list","data":[{{"id":"{}"}}]}}"#, model);
        self.serve_raw(host, port, &body);
    }

    /// Answer probes of `host:port` with `body`
    pub fn serve_raw(&self, host: &str, port: u16, body: &str) {
        self.services
            .lock()
            .unwrap()
            .insert((host.to_string(), port), body.to_string());
    }

    pub fn add_session(&self, host: &str, name: &str) {
        self.sessions
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string());
    }

    pub fn has_session(&self, host: &str, name: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(host)
            .is_some_and(|s| s.contains(name))
    }

    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.lock().unwrap().insert(
            host.to_string(),
            TransportError::Unreachable {
                host: host.to_string(),
                stderr: "ssh: connect to host port 22: Connection refused".to_string(),
            },
        );
    }

    /// Commands run on `host`, in order
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

/// Word following `flag` in a whitespace-split command
fn word_after<'a>(command: &'a str, flag: &str) -> Option<&'a str> {
    let mut words = command.split_whitespace();
    words.find(|w| *w == flag)?;
    words.next()
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn run(
        &self,
        host: &str,
        command: &str,
        _timeout: Duration,
    ) -> Result<String, TransportError> {
        self.commands
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));

        if let Some(err) = self.unreachable.lock().unwrap().get(host) {
            return Err(err.clone());
        }

        if command.starts_with("curl ") {
            let port = command
                .rsplit_once("127.0.0.1:")
                .and_then(|(_, rest)| rest.split('/').next())
                .and_then(|p| p.parse::<u16>().ok());
            let body = port.and_then(|port| {
                self.services
                    .lock()
                    .unwrap()
                    .get(&(host.to_string(), port))
                    .cloned()
            });
            return Ok(body.unwrap_or_default());
        }

        if command.starts_with("tmux has-session") {
            let name = word_after(command, "-t")
                .map(|t| t.trim_matches('\'').trim_start_matches('='))
                .unwrap_or_default();
            let found = self.has_session(host, name);
            return Ok(if found { "1\n" } else { "0\n" }.to_string());
        }

        if command.starts_with("tmux new-session") {
            if let Some(name) = word_after(command, "-s") {
                self.add_session(host, name.trim_matches('\''));
            }
        }

        Ok(String::new())
    }
}

/// A process table that can be edited while a test runs
#[derive(Default)]
pub struct FakeProcesses {
    entries: Mutex<BTreeMap<u32, ProcessEntry>>,
    next_pid: AtomicU32,
    terminated: Mutex<Vec<u32>>,
    fail: Mutex<bool>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Default::default()
        }
    }

    /// Add a process with the given argv; returns its pid
    pub fn spawn(&self, parent: Option<u32>, argv: &[&str]) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.insert(pid, parent, argv);
        pid
    }

    pub fn insert(&self, pid: u32, parent: Option<u32>, argv: &[&str]) {
        let name = argv
            .first()
            .map(|a| a.rsplit('/').next().unwrap_or(a).to_string())
            .unwrap_or_default();
        self.entries.lock().unwrap().insert(
            pid,
            ProcessEntry {
                pid,
                parent,
                name,
                argv: argv.iter().map(|a| a.to_string()).collect(),
            },
        );
    }

    /// Remove `pid` and its descendants
    pub fn remove_tree(&self, pid: u32) {
        let mut entries = self.entries.lock().unwrap();
        let mut doomed = vec![pid];
        while let Some(p) = doomed.pop() {
            entries.remove(&p);
            doomed.extend(
                entries
                    .values()
                    .filter(|e| e.parent == Some(p))
                    .map(|e| e.pid),
            );
        }
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl ProcessTable for FakeProcesses {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, InventoryError> {
        if *self.fail.lock().unwrap() {
            return Err(InventoryError::Processes("permission denied".to_string()));
        }
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }

    fn terminate(&self, pid: u32) -> bool {
        let present = self.entries.lock().unwrap().contains_key(&pid);
        if present {
            self.terminated.lock().unwrap().push(pid);
            self.remove_tree(pid);
        }
        present
    }
}

/// Local sessions. Creating one spawns its command as a shell pane with
/// the command as a child process, the way `tmux new-session` does.
pub struct FakeSessions {
    processes: Arc<FakeProcesses>,
    sessions: Mutex<BTreeMap<String, Vec<u32>>>,
    created: Mutex<Vec<(String, String)>>,
    killed: Mutex<Vec<String>>,
    fail_create: Mutex<Option<String>>,
    fail_kill: Mutex<Option<String>>,
}

impl FakeSessions {
    pub fn new(processes: Arc<FakeProcesses>) -> Self {
        Self {
            processes,
            sessions: Mutex::new(BTreeMap::new()),
            created: Mutex::new(Vec::new()),
            killed: Mutex::new(Vec::new()),
            fail_create: Mutex::new(None),
            fail_kill: Mutex::new(None),
        }
    }

    /// Register an existing session whose panes are `pane_pids`
    pub fn insert(&self, name: &str, pane_pids: Vec<u32>) {
        self.sessions
            .lock()
            .unwrap()
            .insert(name.to_string(), pane_pids);
    }

    pub fn names(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    pub fn fail_create(&self, stderr: &str) {
        *self.fail_create.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn fail_kill(&self, stderr: &str) {
        *self.fail_kill.lock().unwrap() = Some(stderr.to_string());
    }
}

fn tmux_failure(stderr: &str) -> CommandError {
    CommandError::Failed {
        program: "tmux".to_string(),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl SessionManager for FakeSessions {
    async fn list(&self) -> Result<Vec<String>, CommandError> {
        Ok(self.names())
    }

    async fn create(&self, name: &str, command: &str) -> Result<(), CommandError> {
        if let Some(stderr) = self.fail_create.lock().unwrap().as_deref() {
            return Err(tmux_failure(stderr));
        }
        if self.sessions.lock().unwrap().contains_key(name) {
            return Err(tmux_failure(&format!("duplicate session: {}", name)));
        }
        let shell = self.processes.spawn(Some(1), &["sh", "-c", command]);
        let argv: Vec<&str> = command.split_whitespace().collect();
        self.processes.spawn(Some(shell), &argv);
        self.insert(name, vec![shell]);
        self.created
            .lock()
            .unwrap()
            .push((name.to_string(), command.to_string()));
        Ok(())
    }

    async fn pane_pids(&self, name: &str) -> Result<Vec<u32>, CommandError> {
        self.sessions
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| tmux_failure(&format!("can't find session: {}", name)))
    }

    async fn kill(&self, name: &str) -> Result<(), CommandError> {
        if let Some(stderr) = self.fail_kill.lock().unwrap().as_deref() {
            return Err(tmux_failure(stderr));
        }
        let panes = self
            .sessions
            .lock()
            .unwrap()
            .remove(name)
            .ok_or_else(|| tmux_failure(&format!("can't find session: {}", name)))?;
        for pid in panes {
            self.processes.remove_tree(pid);
        }
        self.killed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// A fixed socket table
pub struct FakePorts {
    scan: Mutex<PortScan>,
}

impl Default for FakePorts {
    fn default() -> Self {
        Self {
            scan: Mutex::new(PortScan::complete([])),
        }
    }
}

impl FakePorts {
    pub fn bind(&self, ports: &[u16]) {
        self.scan.lock().unwrap().ports.extend(ports.iter().copied());
    }

    pub fn set(&self, scan: PortScan) {
        *self.scan.lock().unwrap() = scan;
    }
}

#[async_trait]
impl PortScanner for FakePorts {
    async fn listening_ports(&self) -> PortScan {
        self.scan.lock().unwrap().clone()
    }
}

/// Local ports that answer the self-description request
#[derive(Default)]
pub struct FakeProbe {
    models: Mutex<HashMap<u16, ModelIdentity>>,
    probes: Mutex<Vec<u16>>,
}

impl FakeProbe {
    pub fn answer(&self, port: u16, model: &str) {
        self.models
            .lock()
            .unwrap()
            .insert(port, ModelIdentity::new(model));
    }

    pub fn probes(&self) -> Vec<u16> {
        self.probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalProbe for FakeProbe {
    async fn probe(&self, port: u16, _timeout: Duration) -> Option<ModelIdentity> {
        self.probes.lock().unwrap().push(port);
        self.models.lock().unwrap().get(&port).cloned()
    }
}

/// All fakes wired together
pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub sessions: Arc<FakeSessions>,
    pub processes: Arc<FakeProcesses>,
    pub ports: Arc<FakePorts>,
    pub probe: Arc<FakeProbe>,
}

impl Harness {
    pub fn new() -> Self {
        let processes = Arc::new(FakeProcesses::new());
        Self {
            remote: Arc::new(FakeRemote::default()),
            sessions: Arc::new(FakeSessions::new(processes.clone())),
            processes,
            ports: Arc::new(FakePorts::default()),
            probe: Arc::new(FakeProbe::default()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            remote: self.remote.clone(),
            sessions: self.sessions.clone(),
            processes: self.processes.clone(),
            ports: self.ports.clone(),
            probe: self.probe.clone(),
        }
    }

    /// Default config without the post-create pause
    pub fn config() -> ForwardConfig {
        ForwardConfig {
            tunnel_settle: Duration::ZERO,
            ..ForwardConfig::default()
        }
    }

    /// A running tunnel session for `host:remote_port` on `local_port`.
    /// Returns the pid of the tunnel process.
    pub fn existing_tunnel(&self, host: &str, remote_port: u16, local_port: u16) -> u32 {
        let name = vc_core::types::session_name(
            vc_core::types::DEFAULT_SESSION_PREFIX,
            host,
            remote_port,
        );
        let spec = format!("{}:localhost:{}", local_port, remote_port);
        let shell = self.processes.spawn(Some(1), &["sh", "-c", "ssh"]);
        let pid = self.processes.spawn(
            Some(shell),
            &["ssh", "-N", "-L", &spec, host, "-o", "ServerAliveInterval=30"],
        );
        self.sessions.insert(&name, vec![shell]);
        pid
    }
}
