use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::namespace::{NameEnv, NameKind};

/// Greek-letter names recognized as auto-symbols (the `lamda` spelling is
/// the symbolic library's, kept for compatibility).
pub const GREEK_NAMES: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lamda", "lambda", "mu", "nu", "xi", "omicron", "pi", "rho", "sigma", "tau", "upsilon",
    "phi", "chi", "psi", "omega",
];

/// Names the shorthand-lambda rewrite must not shadow.
pub const RESERVED_NAMES: &[&str] = &[
    "_factorial_pow",
    "Rational",
    "Matrix",
    "symbols",
    "Permutation",
    "parse_date",
    "parse_latex",
    "factorial",
    "lambda",
    "del",
    "None",
];

static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_?\d+$").expect("suffix"));
static SINGLE_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\d\W]$").expect("letter"));

/// A name that is implicitly declared as a symbolic variable on first
/// unbound reference: a single letter with optional numeric suffix, or a
/// Greek-letter name.
pub fn is_auto_symbol(name: &str) -> bool {
    let base = SUFFIX_RE.replace(name, "");
    SINGLE_LETTER_RE.is_match(&base) || GREEK_NAMES.contains(&base.as_ref())
}

static ASSIGN_SCAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([^\d\W]\w*)\s*=[^=]").expect("assign scan"));

/// Names introduced by assignments inside the current input unit, so that
/// later lines of the same unit treat them as bound.
pub fn scan_assigned_names(text: &str) -> Vec<String> {
    ASSIGN_SCAN_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Canonicalize operator glyphs: multiplication dot, imaginary unit, and
/// superscript digit runs (optionally signed) into ASCII operators.
pub fn normalize_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '⋅' => {
                out.push('*');
                i += 1;
            }
            'ⅈ' => {
                out.push('i');
                i += 1;
            }
            c if c == '⁻' || superscript_digit(c).is_some() => {
                let negative = c == '⁻';
                let mut j = if negative { i + 1 } else { i };
                let mut digits = String::new();
                while j < chars.len() {
                    match superscript_digit(chars[j]) {
                        Some(d) => {
                            digits.push(d);
                            j += 1;
                        }
                        None => break,
                    }
                }
                if digits.is_empty() {
                    // a lone superscript minus is left as-is for the parser
                    out.push(chars[i]);
                    i += 1;
                } else {
                    if negative {
                        out.push_str(&format!("**(-{})", digits));
                    } else {
                        out.push_str(&format!("**{}", digits));
                    }
                    i = j;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn superscript_digit(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴' => Some('4'),
        '⁵' => Some('5'),
        '⁶' => Some('6'),
        '⁷' => Some('7'),
        '⁸' => Some('8'),
        '⁹' => Some('9'),
        _ => None,
    }
}

static CARET_RE: LazyLock<fancy_regex::Regex> =
    LazyLock::new(|| fancy_regex::Regex::new(r"(?<!\^)\^(?!\^)").expect("caret"));

/// A single `^` becomes the power operator; `^^` degrades to one literal
/// caret.
pub fn rewrite_caret(text: &str) -> String {
    let stepped = CARET_RE.replace_all(text, "**");
    stepped.replace("^^", "^")
}

static FACTORIAL_RE: LazyLock<fancy_regex::Regex> =
    LazyLock::new(|| fancy_regex::Regex::new(r"!(?!=)").expect("factorial"));

/// A trailing `!` (not part of `!=`) becomes a power of the factorial
/// marker, so it binds tighter than surrounding arithmetic.
pub fn rewrite_factorial(text: &str) -> String {
    FACTORIAL_RE.replace_all(text, "**_factorial_pow").into_owned()
}

static CYCLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+ )+\d+\)").expect("cycle"));

/// `(0 1)` becomes `Permutation(0,1)`. Adjacent cycles are composed by the
/// implicit-product `)`-rule inserting a `*` between them afterwards.
pub fn rewrite_permutations(text: &str) -> String {
    CYCLE_RE
        .replace_all(text, |caps: &Captures| {
            let inner = caps[0].trim_matches(['(', ')']).replace(' ', ",");
            format!("Permutation({})", inner)
        })
        .into_owned()
}

// (format specifier | mid-identifier)? (hex | engineering | decimal) (name)?
static IMPLICIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(% *|[^\d\W])?(0x[0-9a-f]+|0X[0-9A-F]+|\d*\.?\d+e-?\d+|\d*\.?\d+)([^\d\W]\w*)?")
        .expect("implicit product")
});

// (close paren)(hex | engineering | decimal | name)
static PAREN_PRODUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\)(0x[0-9a-f]+|0X[0-9A-F]+|\d*\.?\d+e-?\d+|\d*\.?\d+|[^\d\W]\w*)")
        .expect("paren product")
});

/// Asterisk-free multiplication: `4k`, `2x`, `0x10var`. The guards are
/// heuristic by design: a missing identifier, a lone `e` (ambiguous with
/// exponent notation), or a mid-identifier/format-specifier context leaves
/// the match untouched.
pub fn rewrite_implicit_product(text: &str, env: &NameEnv) -> String {
    let stepped = IMPLICIT_RE.replace_all(text, |caps: &Captures| {
        let whole = caps[0].to_string();
        let ident = match caps.get(3) {
            Some(m) => m.as_str(),
            None => return whole,
        };
        if ident.eq_ignore_ascii_case("e") {
            return whole;
        }
        if caps.get(1).is_some() {
            return whole;
        }
        let num = &caps[2];
        match env.kind(ident) {
            // parenthesized so a unit prefix holds together against an
            // adjacent power: 4k**2 means (4k)**2 worth of precedence
            NameKind::UnitPrefix => format!("({}*{})", num, ident),
            NameKind::Unbound => {
                if is_auto_symbol(ident) {
                    format!("{}*{}", num, ident)
                } else {
                    whole
                }
            }
            _ => format!("{}*{}", num, ident),
        }
    });

    PAREN_PRODUCT_RE
        .replace_all(&stepped, ")*$1")
        .into_owned()
}

static LAMBDA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([^\d\W]\w*)\(((?:[^\d\W]\w*\s*,?\s*)*)\)\s*:=([^=].*)")
        .expect("lambda shorthand")
});

/// `f(x,y) := x+y` becomes `f = lambda x,y: x+y`. Shadowing a reserved
/// name is rewritten into an `error(...)` call instead of applied, so the
/// user sees the failure at evaluation time.
pub fn rewrite_lambda_shorthand(text: &str) -> String {
    LAMBDA_RE
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            if RESERVED_NAMES.contains(&name) {
                return format!(
                    "error(\"cannot redefine reserved name '{}'\")",
                    name
                );
            }
            format!("{} = lambda {}: {}", name, &caps[2], &caps[3])
        })
        .into_owned()
}
