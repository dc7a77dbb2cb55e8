//! Shell-side supervision of the preview worker process: namespace
//! mirroring, request sequencing, stale-reply discard, and the restart
//! tier of the timeout policy.

use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::protocol::{self, WorkerRequest, WorkerReply};
use super::CancelTimer;
use crate::config::{PreviewConfig, RewriteConfig};
use crate::lang::eval::pushable;
use crate::lang::Value;

pub const WORKER_FLAG: &str = "--preview-worker";

struct State {
    program: PathBuf,
    child: Child,
    stdin: ChildStdin,
    /// bumped on every respawn so reader threads of dead children
    /// cannot deliver into the new one
    generation: u64,
    rewrite: RewriteConfig,
    preview: PreviewConfig,
    /// ordered replay log of pushes, newest binding per name
    mirror: Vec<(String, Value)>,
    next_seq: u64,
    latest_seq: u64,
    latest_text: String,
    /// whether the newest request has already been re-sent once after a
    /// restart; a second hang gives up instead of looping
    reissued: bool,
    latest_reply: Option<Option<String>>,
    restart_timer: Option<CancelTimer>,
    restarts: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

/// Owns the worker child process. Requests are fire-and-forget; replies
/// arrive on a listener thread and are matched by sequence number, so a
/// reply to anything but the newest request is discarded.
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Spawn the worker by re-invoking the current executable with the
    /// worker flag.
    pub fn spawn(rewrite: RewriteConfig, preview: PreviewConfig) -> io::Result<Self> {
        Self::spawn_program(std::env::current_exe()?, rewrite, preview)
    }

    /// Spawn a specific binary as the worker (tests run under a different
    /// executable than the shell).
    pub fn spawn_program(
        program: PathBuf,
        rewrite: RewriteConfig,
        preview: PreviewConfig,
    ) -> io::Result<Self> {
        let (child, stdin) = spawn_worker(&program, &preview)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                program,
                child,
                stdin,
                generation: 0,
                rewrite,
                preview,
                mirror: Vec::new(),
                next_seq: 0,
                latest_seq: 0,
                latest_text: String::new(),
                reissued: false,
                latest_reply: None,
                restart_timer: None,
                restarts: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        {
            let mut state = lock(&shared);
            start_listener(&shared, &mut state);
            let msg = WorkerRequest::Configure {
                rewrite: state.rewrite.clone(),
                preview: state.preview.clone(),
            };
            send(&mut state, &msg);
        }
        Ok(Self { shared })
    }

    /// Mirror one binding into the worker. Block-listed names and values
    /// that cannot cross the process boundary are skipped.
    pub fn push(&self, name: &str, value: &Value) {
        if !pushable(name, value) {
            debug!("not mirroring '{}' into the preview worker", name);
            return;
        }
        let mut state = lock(&self.shared);
        match state.mirror.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.clone(),
            None => state.mirror.push((name.to_string(), value.clone())),
        }
        let msg = WorkerRequest::NsPush {
            name: name.to_string(),
            value: value.clone(),
        };
        send(&mut state, &msg);
    }

    pub fn delete(&self, name: &str) {
        let mut state = lock(&self.shared);
        state.mirror.retain(|(n, _)| n != name);
        let msg = WorkerRequest::NsDelete {
            name: name.to_string(),
        };
        send(&mut state, &msg);
    }

    /// Ask for a preview of the candidate input. Non-blocking: the reply
    /// is collected by the listener thread. Arms the restart timer.
    pub fn request_preview(&self, text: &str) {
        let mut state = lock(&self.shared);
        state.next_seq += 1;
        let seq = state.next_seq;
        state.latest_seq = seq;
        state.latest_text = text.to_string();
        state.reissued = false;
        state.latest_reply = None;
        let msg = WorkerRequest::Eval {
            seq,
            text: text.to_string(),
            allow_assignment: false,
            wants_reply: true,
        };
        send(&mut state, &msg);
        arm_restart_timer(&self.shared, &mut state, seq);
    }

    /// Replay a committed statement into the mirror, bindings included.
    /// Fire-and-forget: no reply and no timer.
    pub fn replay_assignment(&self, text: &str) {
        let mut state = lock(&self.shared);
        let msg = WorkerRequest::Eval {
            seq: 0,
            text: text.to_string(),
            allow_assignment: true,
            wants_reply: false,
        };
        send(&mut state, &msg);
    }

    /// Block until the newest request has a reply, or the timeout passes.
    /// Outer `None` is a timeout; inner `None` is "no preview".
    pub fn wait_for_preview(&self, timeout: Duration) -> Option<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.shared);
        loop {
            if let Some(reply) = &state.latest_reply {
                return Some(reply.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self
                .shared
                .cond
                .wait_timeout(state, deadline - now)
                .expect("supervisor state");
            state = next;
        }
    }

    pub fn restart_count(&self) -> u64 {
        lock(&self.shared).restarts
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let mut state = lock(&self.shared);
        state.shutdown = true;
        state.restart_timer = None;
        let _ = state.child.kill();
        let _ = state.child.wait();
    }
}

fn lock(shared: &Arc<Shared>) -> MutexGuard<'_, State> {
    shared.state.lock().expect("supervisor state")
}

fn spawn_worker(program: &Path, preview: &PreviewConfig) -> io::Result<(Child, ChildStdin)> {
    let mut child = Command::new(program)
        .arg(WORKER_FLAG)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(if preview.debug {
            Stdio::inherit()
        } else {
            Stdio::null()
        })
        .spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "worker has no stdin"))?;
    Ok((child, stdin))
}

/// Start the reply listener for the current child. Replies carrying a
/// stale sequence number, or arriving from a previous generation of the
/// worker, are dropped.
fn start_listener(shared: &Arc<Shared>, state: &mut State) {
    let stdout = match state.child.stdout.take() {
        Some(s) => s,
        None => {
            warn!("worker has no stdout; previews disabled until restart");
            return;
        }
    };
    let generation = state.generation;
    let shared = Arc::clone(shared);
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            let reply = match protocol::read_frame::<_, WorkerReply>(&mut reader) {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(e) => {
                    debug!("worker stdout closed: {}", e);
                    break;
                }
            };
            let WorkerReply::Preview { seq, rendered } = reply;
            let mut state = lock(&shared);
            if state.generation != generation {
                break;
            }
            if seq != state.latest_seq {
                debug!("discarding stale preview reply seq={}", seq);
                continue;
            }
            state.latest_reply = Some(rendered);
            state.restart_timer = None;
            shared.cond.notify_all();
        }
    });
}

fn send(state: &mut State, msg: &WorkerRequest) {
    if let Err(e) = protocol::write_frame(&mut state.stdin, msg) {
        // a dead worker is recovered by the restart timer
        debug!("worker write failed: {}", e);
    }
    let _ = state.stdin.flush();
}

fn arm_restart_timer(shared: &Arc<Shared>, state: &mut State, seq: u64) {
    let timeout = state.preview.restart_timeout();
    let shared = Arc::clone(shared);
    state.restart_timer = Some(CancelTimer::arm(timeout, move || {
        restart(&shared, seq);
    }));
}

/// The restart tier: the worker blew past the hard deadline (or died), so
/// it is killed, respawned, reconfigured, and its namespace mirror is
/// replayed. The current request is then re-issued once under a fresh
/// sequence number; if it hangs the recovered worker too, it settles as
/// "no preview" so waiters are not left hanging.
fn restart(shared: &Arc<Shared>, fired_seq: u64) {
    let mut state = lock(shared);
    if state.shutdown || state.latest_seq != fired_seq || state.latest_reply.is_some() {
        return;
    }
    warn!("preview worker unresponsive; restarting");

    let _ = state.child.kill();
    let _ = state.child.wait();
    state.generation += 1;
    state.restarts += 1;

    let (child, stdin) = match spawn_worker(&state.program, &state.preview) {
        Ok(pair) => pair,
        Err(e) => {
            warn!("failed to respawn preview worker: {}", e);
            return;
        }
    };
    state.child = child;
    state.stdin = stdin;
    start_listener(shared, &mut state);

    let configure = WorkerRequest::Configure {
        rewrite: state.rewrite.clone(),
        preview: state.preview.clone(),
    };
    send(&mut state, &configure);
    let replay: Vec<WorkerRequest> = state
        .mirror
        .iter()
        .map(|(name, value)| WorkerRequest::NsPush {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    for msg in replay {
        send(&mut state, &msg);
    }

    if state.reissued {
        state.latest_reply = Some(None);
        shared.cond.notify_all();
        return;
    }
    state.next_seq += 1;
    let seq = state.next_seq;
    state.latest_seq = seq;
    state.reissued = true;
    let reissue = WorkerRequest::Eval {
        seq,
        text: state.latest_text.clone(),
        allow_assignment: false,
        wants_reply: true,
    };
    send(&mut state, &reissue);
    arm_restart_timer(shared, &mut state, seq);
}
