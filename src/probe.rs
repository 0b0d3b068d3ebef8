//! Connectivity probe
//!
//! Runs an authentication-only ssh handshake against the remote host and
//! classifies what comes back. The result is advisory and never changes
//! the outcome of an activation.

use std::{
    fmt,
    io::Read,
    path::Path,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Poll interval while waiting for the ssh child
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Remote greeted us by name
    Reachable { username: Option<String> },
    /// Remote rejected the key
    AuthFailed { detail: String },
    /// No handshake happened (DNS, refused, timeout, ssh missing)
    NetworkError { detail: String },
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Reachable {
                username: Some(user),
            } => write!(f, "reachable, authenticated as {user}"),
            ProbeResult::Reachable { username: None } => write!(f, "reachable"),
            ProbeResult::AuthFailed { detail } => write!(f, "authentication failed: {detail}"),
            ProbeResult::NetworkError { detail } => write!(f, "network error: {detail}"),
        }
    }
}

/// Raw output of a handshake attempt
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Performs a single handshake against a host
pub trait ProbeTransport {
    /// Attempts one handshake, or explains why none took place
    ///
    /// # Arguments
    /// * `host_alias` - Host to connect to
    /// * `identity_file` - Key to offer; `None` uses the ssh config
    /// * `timeout` - Upper bound for the whole attempt
    fn handshake(
        &self,
        host_alias: &str,
        identity_file: Option<&Path>,
        timeout: Duration,
    ) -> Result<Handshake, String>;
}

/// Runs the system `ssh` client in batch mode
#[derive(Debug, Default)]
pub struct SshTransport;

impl ProbeTransport for SshTransport {
    fn handshake(
        &self,
        host_alias: &str,
        identity_file: Option<&Path>,
        timeout: Duration,
    ) -> Result<Handshake, String> {
        let mut command = Command::new("ssh");
        command
            .arg("-T")
            .args(["-o", "BatchMode=yes"])
            .args(["-o", &format!("ConnectTimeout={}", timeout.as_secs().max(1))])
            .args(["-o", "StrictHostKeyChecking=accept-new"]);
        if let Some(key) = identity_file {
            command.arg("-i").arg(key).args(["-o", "IdentitiesOnly=yes"]);
        }
        command
            .arg(format!("git@{host_alias}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| format!("cannot run ssh: {e}"))?;
        wait_with_stderr(child, timeout)
    }
}

/// Waits for `child` up to `timeout` while draining its stderr
///
/// Stderr is read on its own thread so a chatty child never blocks on a
/// full pipe. On timeout the child is killed.
fn wait_with_stderr(mut child: Child, timeout: Duration) -> Result<Handshake, String> {
    let pipe = child.stderr.take();
    let reader = thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {}s", timeout.as_secs()));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(format!("waiting for ssh failed: {e}")),
        }
    };

    let stderr = reader.join().unwrap_or_default();
    Ok(Handshake {
        exit_code: status.code(),
        stderr,
    })
}

/// Probes a host and classifies the handshake
pub struct Prober {
    transport: Box<dyn ProbeTransport>,
    timeout: Duration,
}

impl Prober {
    pub fn new(transport: Box<dyn ProbeTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Probes `host_alias`, optionally forcing a specific key
    pub fn probe(&self, host_alias: &str, identity_file: Option<&Path>) -> ProbeResult {
        let result = match self.transport.handshake(host_alias, identity_file, self.timeout) {
            Ok(handshake) => classify(&handshake),
            Err(detail) => ProbeResult::NetworkError { detail },
        };
        tracing::info!("probe of {} -> {}", host_alias, result);
        result
    }
}

/// Maps handshake output onto a probe result
pub fn classify(handshake: &Handshake) -> ProbeResult {
    let stderr = handshake.stderr.trim();

    if let Some(line) = stderr
        .lines()
        .find(|line| line.contains("successfully authenticated"))
    {
        return ProbeResult::Reachable {
            username: greeted_user(line),
        };
    }

    if stderr.contains("Permission denied") {
        return ProbeResult::AuthFailed {
            detail: last_line(stderr),
        };
    }

    ProbeResult::NetworkError {
        detail: if stderr.is_empty() {
            format!("ssh exited with {:?}", handshake.exit_code)
        } else {
            last_line(stderr)
        },
    }
}

/// Extracts `user` from "Hi user! You've successfully authenticated..."
fn greeted_user(line: &str) -> Option<String> {
    let (greeting, _) = line.split_once('!')?;
    greeting
        .split_whitespace()
        .last()
        .filter(|user| *user != "Hi")
        .map(str::to_string)
}

fn last_line(text: &str) -> String {
    text.lines().last().unwrap_or_default().trim().to_string()
}
