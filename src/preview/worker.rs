//! The preview worker process. Reads framed requests from stdin, keeps a
//! mirrored namespace, and evaluates candidate input with assignments
//! suppressed. Burst coalescing: when requests queue up, pushes are all
//! applied in order but only the newest evaluation request runs.

use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;

use log::{debug, warn};

use super::protocol::{self, WorkerRequest, WorkerReply};
use super::CancelTimer;
use crate::config::PreviewConfig;
use crate::lang::{Interpreter, Value};
use crate::namespace::{Capabilities, NS_BLOCK_LIST};

pub fn run_worker() -> io::Result<()> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut reader = stdin.lock();
        loop {
            match protocol::read_frame::<_, WorkerRequest>(&mut reader) {
                Ok(Some(msg)) => {
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("worker stdin closed: {}", e);
                    break;
                }
            }
        }
    });

    // Restricted capabilities: the dangerous builtins are never injected,
    // so no pushed or previewed code can reach them.
    let mut interp = Interpreter::new(Capabilities::Restricted);
    interp.strip_blocked_names();
    let mut preview_cfg = PreviewConfig::default();

    let stdout = io::stdout();
    loop {
        let first = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let mut pending: Option<(u64, String)> = None;
        for msg in batch {
            match msg {
                WorkerRequest::Configure { rewrite, preview } => {
                    interp.config = rewrite;
                    preview_cfg = preview;
                }
                WorkerRequest::NsPush { name, value } => apply_push(&mut interp, &name, value),
                WorkerRequest::NsDelete { name } => {
                    interp.ns.delete(&name);
                }
                // commit-replay: applied in order like a push, no reply
                WorkerRequest::Eval {
                    text,
                    allow_assignment: true,
                    wants_reply: false,
                    ..
                } => {
                    evaluate(&mut interp, &preview_cfg, &text, true);
                }
                // a newer preview request supersedes an unevaluated older one
                WorkerRequest::Eval { seq, text, .. } => pending = Some((seq, text)),
            }
        }

        if let Some((seq, text)) = pending {
            let rendered = evaluate(&mut interp, &preview_cfg, &text, false);
            let mut out = stdout.lock();
            protocol::write_frame(&mut out, &WorkerReply::Preview { seq, rendered })?;
            out.flush()?;
        }
    }
    Ok(())
}

fn apply_push(interp: &mut Interpreter, name: &str, value: Value) {
    if NS_BLOCK_LIST.contains(&name) {
        warn!("refusing push of block-listed name '{}'", name);
        return;
    }
    interp.ns.set(name, value);
}

/// Evaluate one candidate line under the interrupt timer. A successful
/// `None` value renders as an empty preview; any failure renders as no
/// preview at all.
fn evaluate(
    interp: &mut Interpreter,
    cfg: &PreviewConfig,
    text: &str,
    allow_assignment: bool,
) -> Option<String> {
    let flag = interp.interrupt_flag();
    let timer = CancelTimer::arm(cfg.interrupt_timeout(), move || {
        flag.store(true, Ordering::SeqCst);
    });

    let result = interp.eval_with_options(text, allow_assignment);
    timer.cancel();

    match result {
        Ok(Value::None) => Some(String::new()),
        Ok(v) => Some(v.to_string()),
        Err(e) => {
            debug!("preview evaluation of {:?} failed: {}", text, e);
            None
        }
    }
}
