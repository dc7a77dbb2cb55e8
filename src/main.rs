use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use calc_shell::lang::Value;
use calc_shell::namespace::Capabilities;
use calc_shell::preview::{supervisor::WORKER_FLAG, worker, Supervisor};
use calc_shell::{Interpreter, PreviewConfig, RewriteConfig};

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let debug = args.iter().any(|arg| arg == "--debug");
    init_logger(debug);

    if args.iter().any(|arg| arg == WORKER_FLAG) {
        return worker::run_worker();
    }

    run_interactive(debug)
}

fn run_interactive(debug: bool) -> io::Result<()> {
    let rewrite_cfg = RewriteConfig::default();
    let preview_cfg = PreviewConfig {
        debug,
        ..PreviewConfig::default()
    };

    let mut interp = Interpreter::with_config(Capabilities::Full, rewrite_cfg.clone());
    let supervisor = Supervisor::spawn(rewrite_cfg, preview_cfg.clone())?;
    let mut mirrored: HashSet<String> = HashSet::new();
    sync_namespace(&supervisor, &interp, &mut mirrored);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!(">>> ");
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" {
            break;
        }
        if let Some(candidate) = line.strip_prefix(":preview ") {
            supervisor.request_preview(candidate);
            let wait = preview_cfg.restart_timeout() + Duration::from_secs(2);
            match supervisor.wait_for_preview(wait) {
                Some(Some(rendered)) if !rendered.is_empty() => {
                    println!("(preview) {}", rendered)
                }
                Some(_) => println!("(no preview)"),
                None => println!("(preview timed out)"),
            }
            continue;
        }

        // keep the mirror aligned with the statement about to commit
        supervisor.replay_assignment(line);

        // committed evaluation: errors are reported, never swallowed
        match interp.eval_source(line) {
            Ok(Value::None) => {}
            Ok(v) => println!("{}", v),
            Err(e) => eprintln!("error: {}", e),
        }
        sync_namespace(&supervisor, &interp, &mut mirrored);
    }
    Ok(())
}

/// Mirror the committed namespace into the preview worker: push every
/// sendable binding, delete what disappeared.
fn sync_namespace(supervisor: &Supervisor, interp: &Interpreter, mirrored: &mut HashSet<String>) {
    let mut seen = HashSet::new();
    for (name, value) in interp.ns.iter() {
        supervisor.push(name, value);
        seen.insert(name.to_string());
    }
    for gone in mirrored.difference(&seen) {
        supervisor.delete(gone);
    }
    *mirrored = seen;
}

/// Minimal stderr backend for the `log` facade; only wired up because
/// this binary has no embedding application to install one.
struct StderrLogger {
    verbose: bool,
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        if self.verbose {
            metadata.level() <= log::Level::Debug
        } else {
            metadata.level() <= log::Level::Warn
        }
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger(verbose: bool) {
    let max = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    if log::set_boxed_logger(Box::new(StderrLogger { verbose })).is_ok() {
        log::set_max_level(max);
    }
}
