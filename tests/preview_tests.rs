//! End-to-end tests of the preview executor: a real worker process is
//! spawned from the shell binary and driven through the supervisor.

use std::path::PathBuf;
use std::time::Duration;

use calc_shell::preview::Supervisor;
use calc_shell::{PreviewConfig, RewriteConfig, Value};

fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_calc-shell"))
}

fn spawn(interrupt_ms: u64, restart_ms: u64) -> Supervisor {
    let preview = PreviewConfig {
        interrupt_timeout_ms: interrupt_ms,
        restart_timeout_ms: restart_ms,
        debug: false,
    };
    Supervisor::spawn_program(worker_binary(), RewriteConfig::default(), preview)
        .expect("spawn preview worker")
}

#[cfg(test)]
mod preview_tests {
    use super::*;

    #[test]
    fn previews_use_the_mirrored_namespace() {
        let sup = spawn(2_000, 30_000);
        sup.push("x", &Value::Int(5));
        sup.request_preview("x + 1");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a preview reply within the window");
        assert_eq!(reply.as_deref(), Some("6"));
        assert_eq!(sup.restart_count(), 0);
    }

    #[test]
    fn shorthand_is_rewritten_in_previews() {
        let sup = spawn(2_000, 30_000);
        sup.request_preview("5!+1");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a preview reply within the window");
        assert_eq!(reply.as_deref(), Some("121"));
    }

    #[test]
    fn newer_requests_supersede_older_ones() {
        let sup = spawn(5_000, 30_000);
        sup.request_preview("sleep(0.3)");
        sup.request_preview("1+1");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a preview reply for the newest request");
        assert_eq!(
            reply.as_deref(),
            Some("2"),
            "only the newest request's preview may surface"
        );
        assert_eq!(sup.restart_count(), 0, "no restart for a fast worker");
    }

    #[test]
    fn failed_previews_render_nothing() {
        let sup = spawn(2_000, 30_000);
        sup.request_preview("nosuchname + 1");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a reply even for a failing preview");
        assert_eq!(reply, None, "errors must swallow the preview, not crash");
    }

    #[test]
    fn assignments_are_not_committed_by_previews() {
        let sup = spawn(2_000, 30_000);
        sup.push("x", &Value::Int(1));
        sup.request_preview("x = 99");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a preview reply");
        assert_eq!(
            reply.as_deref(),
            Some("99"),
            "the preview shows the right-hand side"
        );

        sup.request_preview("x + 0");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a preview reply");
        assert_eq!(reply.as_deref(), Some("1"), "the binding must not stick");
    }

    #[test]
    fn committed_replays_do_bind() {
        let sup = spawn(2_000, 30_000);
        sup.replay_assignment("n = 5!");
        sup.request_preview("n + 1");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a preview reply");
        assert_eq!(
            reply.as_deref(),
            Some("121"),
            "a commit-replay must mutate the mirrored namespace"
        );
    }
}

#[cfg(test)]
mod timeout_tier_tests {
    use super::*;

    #[test]
    fn interrupt_tier_recovers_without_a_restart() {
        // interrupt well before the restart deadline
        let sup = spawn(200, 30_000);
        sup.request_preview("sleep(30)");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("the interrupted preview still replies");
        assert_eq!(reply, None, "an interrupted preview renders nothing");
        assert_eq!(
            sup.restart_count(),
            0,
            "the interrupt tier must not respawn the worker"
        );

        // the same worker keeps serving afterwards
        sup.request_preview("2+2");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a reply after the interrupt");
        assert_eq!(reply.as_deref(), Some("4"));
    }

    #[test]
    fn restart_tier_respawns_and_replays_the_namespace() {
        // interrupts effectively disabled, so only the restart tier fires
        let sup = spawn(600_000, 500);
        sup.push("marker", &Value::Int(7));

        sup.request_preview("sleep(600)");
        std::thread::sleep(Duration::from_millis(900));
        assert_eq!(
            sup.restart_count(),
            1,
            "the first hard deadline respawns the worker once"
        );

        // the respawned worker must know the mirrored namespace
        sup.request_preview("marker");
        let reply = sup
            .wait_for_preview(Duration::from_secs(15))
            .expect("a reply from the respawned worker");
        assert_eq!(
            reply.as_deref(),
            Some("7"),
            "pushed bindings must survive a worker restart"
        );
    }

    #[test]
    fn hung_requests_are_reissued_after_a_restart() {
        let sup = spawn(600_000, 400);
        sup.request_preview("sleep(600)");

        // first deadline: respawn + re-issue; second deadline: respawn and
        // settle as "no preview" instead of hanging the waiter
        let reply = sup
            .wait_for_preview(Duration::from_secs(8))
            .expect("the hung request must still resolve to a reply");
        assert_eq!(reply, None, "a twice-hung request renders nothing");
        assert_eq!(
            sup.restart_count(),
            2,
            "the re-issued request gets exactly one more deadline"
        );

        // the recovered worker keeps serving
        sup.request_preview("2+2");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a reply after recovery");
        assert_eq!(reply.as_deref(), Some("4"));
    }
}

#[cfg(test)]
mod sandbox_tests {
    use super::*;

    #[test]
    fn dangerous_builtins_do_not_exist_in_the_worker() {
        let sup = spawn(2_000, 30_000);
        for call in ["open_file(\"/etc/hostname\")", "run_command(\"id\")", "exit()"] {
            sup.request_preview(call);
            let reply = sup
                .wait_for_preview(Duration::from_secs(10))
                .expect("a reply for the blocked call");
            assert_eq!(reply, None, "{} must not render a preview", call);
        }
    }

    #[test]
    fn block_listed_pushes_are_refused() {
        let sup = spawn(2_000, 30_000);
        sup.push("open_file", &Value::Int(1));
        sup.request_preview("open_file");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a reply");
        assert_eq!(
            reply, None,
            "a block-listed name must stay undefined in the worker"
        );
    }

    #[test]
    fn unsendable_values_are_skipped() {
        let sup = spawn(2_000, 30_000);
        // builtins make no sense in the mirror; the push is dropped
        sup.push("weird", &Value::FactorialPow);
        sup.request_preview("1+1");
        let reply = sup
            .wait_for_preview(Duration::from_secs(10))
            .expect("a reply");
        assert_eq!(reply.as_deref(), Some("2"));
    }
}
