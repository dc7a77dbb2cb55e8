use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::RewriteConfig;
use crate::error::RewriteError;

/// Quoted literal with an optional modifier letter: raw, date, or format.
static STRING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([dfr]?)("(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*')"#).expect("string pattern")
});

/// Inline math fragment. Runs on string-masked text, so a `$` inside a
/// string literal can never open a fragment.
static MATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[^$]*\$").expect("math pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    StringLiteral,
    DateLiteral,
    MathLiteral,
    TemplateLiteral,
}

#[derive(Debug, Clone)]
pub struct MaskEntry {
    pub kind: MaskKind,
    pub text: String,
}

/// Placeholder key -> original span. Keys are unique within one pass;
/// a collision between distinct spans is fatal.
#[derive(Debug, Default)]
pub struct MaskMap {
    entries: Vec<(u64, MaskEntry)>,
}

impl MaskMap {
    fn insert(&mut self, key: u64, kind: MaskKind, text: &str) -> Result<(), RewriteError> {
        if let Some((_, existing)) = self.entries.iter().find(|(k, _)| *k == key) {
            if existing.text == text {
                // the same literal occurring twice masks to the same key
                return Ok(());
            }
            return Err(RewriteError::MaskCollision {
                key,
                first: existing.text.clone(),
                second: text.to_string(),
            });
        }
        self.entries.push((
            key,
            MaskEntry {
                kind,
                text: text.to_string(),
            },
        ));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &MaskEntry)> {
        self.entries.iter().map(|(k, e)| (*k, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn placeholder(key: u64) -> String {
    format!("({})", key)
}

fn span_key(text: &str) -> u64 {
    let mut h = DefaultHasher::new();
    text.hash(&mut h);
    h.finish()
}

/// Extract literal spans into placeholders. Pure: the input is never
/// mutated, and masking an input with no literal spans is the identity.
pub fn mask(text: &str, cfg: &RewriteConfig) -> Result<(String, MaskMap), RewriteError> {
    let mut map = MaskMap::default();

    // Strings first, math fragments second; the overlap rule.
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in STRING_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let kind = match prefix {
            "d" if cfg.auto_date => MaskKind::DateLiteral,
            "f" => MaskKind::TemplateLiteral,
            _ => MaskKind::StringLiteral,
        };
        let key = span_key(whole.as_str());
        map.insert(key, kind, whole.as_str())?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(&placeholder(key));
        last = whole.end();
    }
    out.push_str(&text[last..]);

    if cfg.auto_latex {
        let masked = out;
        let mut out2 = String::with_capacity(masked.len());
        let mut last = 0;
        for m in MATH_RE.find_iter(&masked) {
            let key = span_key(m.as_str());
            map.insert(key, MaskKind::MathLiteral, m.as_str())?;
            out2.push_str(&masked[last..m.start()]);
            out2.push_str(&placeholder(key));
            last = m.end();
        }
        out2.push_str(&masked[last..]);
        return Ok((out2, map));
    }

    Ok((out, map))
}
