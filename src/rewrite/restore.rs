use super::mask::{placeholder, MaskKind, MaskMap};
use super::{transpile_with_depth, MAX_TEMPLATE_DEPTH};
use crate::config::RewriteConfig;
use crate::error::RewriteError;
use crate::namespace::NameEnv;

/// Reinsert masked spans. String literals come back verbatim; date and
/// math literals come back as collaborator calls; template literals have
/// each interpolation re-run through the whole pipeline.
pub fn restore(
    text: String,
    map: &MaskMap,
    env: &NameEnv,
    cfg: &RewriteConfig,
    depth: usize,
) -> Result<String, RewriteError> {
    let mut out = text;

    // Math fragments first, then strings: the same order the masker used,
    // reversed at the boundary where a fragment may sit inside a template.
    for (key, entry) in map.iter() {
        if entry.kind != MaskKind::MathLiteral {
            continue;
        }
        let inner = &entry.text[1..entry.text.len() - 1];
        out = out.replace(
            &placeholder(key),
            &format!("parse_latex({})", quote(inner)),
        );
    }

    for (key, entry) in map.iter() {
        let ph = placeholder(key);
        let replacement = match entry.kind {
            MaskKind::MathLiteral => continue,
            MaskKind::StringLiteral => entry.text.clone(),
            MaskKind::DateLiteral => {
                // strip the modifier letter, keep the quoted body
                format!("parse_date({})", &entry.text[1..])
            }
            MaskKind::TemplateLiteral => restore_template(&entry.text, env, cfg, depth)?,
        };
        out = out.replace(&ph, &replacement);
    }

    Ok(out)
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Re-run the entire pipeline over each `{...}` interpolation of a
/// template literal. Depth is bounded: pathological nesting is an error,
/// not a stack overflow.
fn restore_template(
    original: &str,
    env: &NameEnv,
    cfg: &RewriteConfig,
    depth: usize,
) -> Result<String, RewriteError> {
    if depth >= MAX_TEMPLATE_DEPTH {
        return Err(RewriteError::TemplateDepth {
            max: MAX_TEMPLATE_DEPTH,
        });
    }

    // original is f"..." or f'...'
    let chars: Vec<char> = original.chars().collect();
    let quote_ch = chars[1];
    let body: String = chars[2..chars.len() - 1].iter().collect();

    let mut out = String::with_capacity(original.len());
    out.push('f');
    out.push(quote_ch);

    let bytes: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            '{' if bytes.get(i + 1) == Some(&'{') => {
                out.push_str("{{");
                i += 2;
            }
            '}' if bytes.get(i + 1) == Some(&'}') => {
                out.push_str("}}");
                i += 2;
            }
            '{' => {
                let mut d = 1usize;
                let mut code = String::new();
                i += 1;
                while i < bytes.len() && d > 0 {
                    match bytes[i] {
                        '{' => d += 1,
                        '}' => {
                            d -= 1;
                            if d == 0 {
                                break;
                            }
                        }
                        // a brace inside a nested string literal is not a
                        // delimiter; consume the string wholesale
                        q @ ('"' | '\'') => {
                            code.push(q);
                            i += 1;
                            while i < bytes.len() && bytes[i] != q {
                                code.push(bytes[i]);
                                if bytes[i] == '\\' {
                                    i += 1;
                                    if i < bytes.len() {
                                        code.push(bytes[i]);
                                        i += 1;
                                    }
                                    continue;
                                }
                                i += 1;
                            }
                            if i >= bytes.len() {
                                break;
                            }
                        }
                        _ => {}
                    }
                    code.push(bytes[i]);
                    i += 1;
                }
                i += 1; // past '}'
                out.push('{');
                out.push_str(&transpile_with_depth(&code, env, cfg, depth + 1)?);
                out.push('}');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out.push(quote_ch);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_recursion_is_bounded() {
        let env = NameEnv::default();
        let cfg = RewriteConfig::default();
        let err = transpile_with_depth("f\"{1}\"", &env, &cfg, MAX_TEMPLATE_DEPTH)
            .expect_err("a template at the depth bound must be rejected");
        assert!(
            matches!(err, RewriteError::TemplateDepth { .. }),
            "expected the depth error, got {:?}",
            err
        );
    }

    #[test]
    fn nesting_below_the_bound_still_transpiles() {
        let env = NameEnv::default();
        let cfg = RewriteConfig::default();
        let out = transpile_with_depth("f\"{f'{1}'}\"", &env, &cfg, MAX_TEMPLATE_DEPTH - 2)
            .expect("two remaining levels suffice");
        assert!(out.starts_with("f\""));
    }
}
