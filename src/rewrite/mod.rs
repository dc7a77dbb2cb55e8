//! The shorthand-notation rewrite pipeline: literal masking, ordered text
//! rewrites, literal restoration, and (in [`tree`]) syntax-tree passes.

pub mod mask;
pub mod restore;
pub mod text;
pub mod tree;

use crate::config::RewriteConfig;
use crate::error::RewriteError;
use crate::namespace::NameEnv;

/// Bound on template-literal pipeline recursion.
pub const MAX_TEMPLATE_DEPTH: usize = 32;

/// Rewrite calculator shorthand into parseable host-language code.
///
/// The stage order is load-bearing: masking shields literals from every
/// text rewrite, the caret rewrite must run after math fragments are
/// masked, and the permutation rewrite relies on the later `)`-product
/// rule to compose adjacent cycles.
pub fn transpile(
    source: &str,
    env: &NameEnv,
    cfg: &RewriteConfig,
) -> Result<String, RewriteError> {
    transpile_with_depth(source, env, cfg, 0)
}

pub(crate) fn transpile_with_depth(
    source: &str,
    env: &NameEnv,
    cfg: &RewriteConfig,
    depth: usize,
) -> Result<String, RewriteError> {
    // Names assigned earlier in this unit count as bound for implicit
    // products on later lines.
    let mut env = env.clone();
    for name in text::scan_assigned_names(source) {
        env.add_pending(&name);
    }

    let (masked, map) = mask::mask(source, cfg)?;

    let mut code = text::normalize_unicode(&masked);
    if cfg.caret_power {
        code = text::rewrite_caret(&code);
    }
    if cfg.auto_factorial {
        code = text::rewrite_factorial(&code);
    }
    if cfg.auto_permutation {
        code = text::rewrite_permutations(&code);
    }
    if cfg.implicit_multiply {
        code = text::rewrite_implicit_product(&code, &env);
    }
    if cfg.auto_lambda {
        code = text::rewrite_lambda_shorthand(&code);
    }

    restore::restore(code, &map, &env, cfg, depth)
}
