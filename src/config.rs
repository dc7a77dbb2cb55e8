use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-stage toggles for the rewrite pipeline. Read at the start of each
/// transpile pass; storage/persistence belongs to the embedding shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    pub caret_power: bool,
    pub auto_factorial: bool,
    pub auto_permutation: bool,
    pub implicit_multiply: bool,
    pub auto_lambda: bool,
    pub auto_date: bool,
    pub auto_latex: bool,
    /// Substitute free symbols of a parsed math fragment with bound names
    /// of the same spelling.
    pub latex_symbol_binding: bool,
    pub auto_rational: bool,
    pub auto_matrix: bool,
    pub auto_symbols: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            caret_power: false,
            auto_factorial: true,
            auto_permutation: true,
            implicit_multiply: true,
            auto_lambda: true,
            auto_date: false,
            auto_latex: true,
            latex_symbol_binding: true,
            auto_rational: true,
            auto_matrix: true,
            auto_symbols: true,
        }
    }
}

/// Preview timing knobs. These are configuration, not contract: tests and
/// deployments pick their own magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// After this long, the worker interrupts its own evaluation.
    pub interrupt_timeout_ms: u64,
    /// After this long without a reply, the supervisor kills and respawns
    /// the worker.
    pub restart_timeout_ms: u64,
    pub debug: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            interrupt_timeout_ms: 2_000,
            restart_timeout_ms: 10_000,
            debug: false,
        }
    }
}

impl PreviewConfig {
    pub fn interrupt_timeout(&self) -> Duration {
        Duration::from_millis(self.interrupt_timeout_ms)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }
}
