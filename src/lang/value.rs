use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ast::Expr;
use crate::error::LangError;

/// A symbolic expression over auto-declared variables. Canonical form:
/// `Add`/`Mul` argument lists are flattened, numeric parts folded, and
/// symbolic arguments sorted, so structural equality is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymExpr {
    Sym(String),
    Int(i64),
    Rational { num: i64, den: i64 },
    Float(f64),
    Add(Vec<SymExpr>),
    Mul(Vec<SymExpr>),
    Pow(Box<SymExpr>, Box<SymExpr>),
}

impl SymExpr {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SymExpr::Int(_) | SymExpr::Rational { .. } | SymExpr::Float(_)
        )
    }

    fn sort_key(&self) -> String {
        self.to_string()
    }

    pub fn add(a: SymExpr, b: SymExpr) -> SymExpr {
        let mut args = Vec::new();
        for e in [a, b] {
            match e {
                SymExpr::Add(inner) => args.extend(inner),
                other => args.push(other),
            }
        }
        Self::make_add(args)
    }

    fn make_add(args: Vec<SymExpr>) -> SymExpr {
        let mut numeric = SymExpr::Int(0);
        let mut rest: Vec<SymExpr> = Vec::new();
        for e in args {
            if e.is_numeric() {
                numeric = num_add(&numeric, &e);
            } else {
                rest.push(e);
            }
        }
        if rest.is_empty() {
            return numeric;
        }
        if numeric != SymExpr::Int(0) {
            rest.push(numeric);
        }
        rest.sort_by_key(|e| e.sort_key());
        if rest.len() == 1 {
            rest.pop().unwrap()
        } else {
            SymExpr::Add(rest)
        }
    }

    pub fn mul(a: SymExpr, b: SymExpr) -> SymExpr {
        let mut args = Vec::new();
        for e in [a, b] {
            match e {
                SymExpr::Mul(inner) => args.extend(inner),
                other => args.push(other),
            }
        }
        let mut numeric = SymExpr::Int(1);
        let mut rest: Vec<SymExpr> = Vec::new();
        for e in args {
            if e.is_numeric() {
                numeric = num_mul(&numeric, &e);
            } else {
                rest.push(e);
            }
        }
        if numeric == SymExpr::Int(0) {
            return SymExpr::Int(0);
        }
        if rest.is_empty() {
            return numeric;
        }
        rest.sort_by_key(|e| e.sort_key());
        let mut out = Vec::new();
        if numeric != SymExpr::Int(1) {
            out.push(numeric);
        }
        out.extend(rest);
        if out.len() == 1 {
            out.pop().unwrap()
        } else {
            SymExpr::Mul(out)
        }
    }

    pub fn pow(a: SymExpr, b: SymExpr) -> SymExpr {
        if b == SymExpr::Int(1) {
            return a;
        }
        if a.is_numeric() && b.is_numeric() {
            // fold exact powers; anything that errors stays symbolic
            if !matches!(b, SymExpr::Rational { .. }) {
                if let Ok(v) = numeric_pow(&a.to_value(), &b.to_value()) {
                    if let Some(s) = value_to_sym(&v) {
                        return s;
                    }
                }
            }
        }
        SymExpr::Pow(Box::new(a), Box::new(b))
    }

    pub fn neg(e: SymExpr) -> SymExpr {
        SymExpr::mul(SymExpr::Int(-1), e)
    }

    pub fn free_symbols(&self, out: &mut Vec<String>) {
        match self {
            SymExpr::Sym(s) => {
                if !out.contains(s) {
                    out.push(s.clone());
                }
            }
            SymExpr::Add(args) | SymExpr::Mul(args) => {
                for a in args {
                    a.free_symbols(out);
                }
            }
            SymExpr::Pow(a, b) => {
                a.free_symbols(out);
                b.free_symbols(out);
            }
            _ => {}
        }
    }

    /// Substitute a symbol by a numeric/symbolic expression, re-normalizing.
    pub fn substitute(&self, name: &str, with: &SymExpr) -> SymExpr {
        match self {
            SymExpr::Sym(s) if s == name => with.clone(),
            SymExpr::Add(args) => {
                let mut acc = SymExpr::Int(0);
                for a in args {
                    acc = SymExpr::add(acc, a.substitute(name, with));
                }
                acc
            }
            SymExpr::Mul(args) => {
                let mut acc = SymExpr::Int(1);
                for a in args {
                    acc = SymExpr::mul(acc, a.substitute(name, with));
                }
                acc
            }
            SymExpr::Pow(a, b) => {
                SymExpr::pow(a.substitute(name, with), b.substitute(name, with))
            }
            other => other.clone(),
        }
    }

    /// Floating-point approximation; `None` while free symbols remain.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SymExpr::Sym(_) => None,
            SymExpr::Int(v) => Some(*v as f64),
            SymExpr::Rational { num, den } => Some(*num as f64 / *den as f64),
            SymExpr::Float(v) => Some(*v),
            SymExpr::Add(args) => {
                args.iter().try_fold(0.0, |acc, a| a.as_f64().map(|v| acc + v))
            }
            SymExpr::Mul(args) => {
                args.iter().try_fold(1.0, |acc, a| a.as_f64().map(|v| acc * v))
            }
            SymExpr::Pow(a, b) => Some(a.as_f64()?.powf(b.as_f64()?)),
        }
    }

    /// Fold a purely numeric expression into a plain value.
    pub fn to_value(&self) -> Value {
        match self {
            SymExpr::Int(v) => Value::Int(*v),
            SymExpr::Rational { num, den } => Value::Rational {
                num: *num,
                den: *den,
            },
            SymExpr::Float(v) => Value::Float(*v),
            other => Value::Sym(other.clone()),
        }
    }
}

fn num_add(a: &SymExpr, b: &SymExpr) -> SymExpr {
    let (va, vb) = (a.to_value(), b.to_value());
    match numeric_add(&va, &vb) {
        Ok(v) => value_to_sym(&v).unwrap_or(SymExpr::Int(0)),
        Err(_) => SymExpr::Float(va.as_f64().unwrap_or(0.0) + vb.as_f64().unwrap_or(0.0)),
    }
}

fn num_mul(a: &SymExpr, b: &SymExpr) -> SymExpr {
    let (va, vb) = (a.to_value(), b.to_value());
    match numeric_mul(&va, &vb) {
        Ok(v) => value_to_sym(&v).unwrap_or(SymExpr::Int(1)),
        Err(_) => SymExpr::Float(va.as_f64().unwrap_or(1.0) * vb.as_f64().unwrap_or(1.0)),
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymExpr::Sym(s) => write!(f, "{}", s),
            SymExpr::Int(v) => write!(f, "{}", v),
            SymExpr::Rational { num, den } => write!(f, "{}/{}", num, den),
            SymExpr::Float(v) => write!(f, "{}", v),
            SymExpr::Add(args) => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", parts.join(" + "))
            }
            SymExpr::Mul(args) => {
                let parts: Vec<String> = args
                    .iter()
                    .map(|a| match a {
                        SymExpr::Add(_) => format!("({})", a),
                        _ => a.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join("*"))
            }
            SymExpr::Pow(a, b) => {
                let base = match **a {
                    SymExpr::Add(_) | SymExpr::Mul(_) | SymExpr::Pow(..) => format!("({})", a),
                    _ => a.to_string(),
                };
                let exp = match **b {
                    SymExpr::Add(_) | SymExpr::Mul(_) | SymExpr::Pow(..) => format!("({})", b),
                    _ => b.to_string(),
                };
                write!(f, "{}**{}", base, exp)
            }
        }
    }
}

/// Built-in functions, injected into a namespace by capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Rational,
    Matrix,
    Symbols,
    Permutation,
    ParseDate,
    ParseLatex,
    Factorial,
    Abs,
    Sleep,
    Error,
    OpenFile,
    RunCommand,
    Exit,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Rational => "Rational",
            Builtin::Matrix => "Matrix",
            Builtin::Symbols => "symbols",
            Builtin::Permutation => "Permutation",
            Builtin::ParseDate => "parse_date",
            Builtin::ParseLatex => "parse_latex",
            Builtin::Factorial => "factorial",
            Builtin::Abs => "abs",
            Builtin::Sleep => "sleep",
            Builtin::Error => "error",
            Builtin::OpenFile => "open_file",
            Builtin::RunCommand => "run_command",
            Builtin::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Rational { num: i64, den: i64 },
    Float(f64),
    Str(String),
    Date(NaiveDateTime),
    /// Difference of two dates, in whole seconds.
    Duration(i64),
    Tuple(Vec<Value>),
    Matrix { rows: usize, cols: usize, data: Vec<Value> },
    Sym(SymExpr),
    /// Image map: element `i` maps to `image[i]`.
    Permutation(Vec<usize>),
    Lambda { params: Vec<String>, body: Box<Expr> },
    Builtin(Builtin),
    /// A numeric value tagged as an engineering unit prefix; implicit
    /// products against it are parenthesized by the text rewriter.
    UnitPrefix(Box<Value>),
    /// Right-hand operand marker making `x ** _factorial_pow` compute x!.
    FactorialPow,
}

impl Value {
    pub fn rational(num: i64, den: i64) -> Result<Value, LangError> {
        if den == 0 {
            return Err(LangError::ZeroDivision);
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i64;
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = -num;
            den = -den;
        }
        if den == 1 {
            Ok(Value::Int(num))
        } else {
            Ok(Value::Rational { num, den })
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Rational { .. } | Value::Float(_) | Value::Bool(_)
        )
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Rational { num, den } => Some(*num as f64 / *den as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// True when a value survives the wire format and makes sense in the
    /// mirrored namespace of the preview worker.
    pub fn is_sendable(&self) -> bool {
        match self {
            Value::Builtin(_) | Value::FactorialPow => false,
            Value::Tuple(elts) => elts.iter().all(Value::is_sendable),
            Value::Matrix { data, .. } => data.iter().all(Value::is_sendable),
            _ => true,
        }
    }
}

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

pub fn value_to_sym(v: &Value) -> Option<SymExpr> {
    match v {
        Value::Int(i) => Some(SymExpr::Int(*i)),
        Value::Rational { num, den } => Some(SymExpr::Rational {
            num: *num,
            den: *den,
        }),
        Value::Float(f) => Some(SymExpr::Float(*f)),
        Value::Sym(e) => Some(e.clone()),
        Value::Bool(b) => Some(SymExpr::Int(if *b { 1 } else { 0 })),
        _ => None,
    }
}

fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(if *b { 1 } else { 0 }),
        _ => None,
    }
}

fn rat_of(v: &Value) -> Option<(i64, i64)> {
    match v {
        Value::Int(i) => Some((*i, 1)),
        Value::Bool(b) => Some((if *b { 1 } else { 0 }, 1)),
        Value::Rational { num, den } => Some((*num, *den)),
        _ => None,
    }
}

fn checked_rational(num: i128, den: i128) -> Result<Value, LangError> {
    if den == 0 {
        return Err(LangError::ZeroDivision);
    }
    let g = gcd128(num.unsigned_abs(), den.unsigned_abs()) as i128;
    let (mut num, mut den) = (num / g, den / g);
    if den < 0 {
        num = -num;
        den = -den;
    }
    let num = i64::try_from(num).map_err(|_| LangError::Overflow)?;
    let den = i64::try_from(den).map_err(|_| LangError::Overflow)?;
    if den == 1 {
        Ok(Value::Int(num))
    } else {
        Ok(Value::Rational { num, den })
    }
}

fn gcd128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

pub fn numeric_add(a: &Value, b: &Value) -> Result<Value, LangError> {
    if let (Some((an, ad)), Some((bn, bd))) = (rat_of(a), rat_of(b)) {
        return checked_rational(
            an as i128 * bd as i128 + bn as i128 * ad as i128,
            ad as i128 * bd as i128,
        );
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(x + y)),
        _ => Err(LangError::Type(format!("cannot add {} and {}", a, b))),
    }
}

pub fn numeric_sub(a: &Value, b: &Value) -> Result<Value, LangError> {
    if let (Some((an, ad)), Some((bn, bd))) = (rat_of(a), rat_of(b)) {
        return checked_rational(
            an as i128 * bd as i128 - bn as i128 * ad as i128,
            ad as i128 * bd as i128,
        );
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(x - y)),
        _ => Err(LangError::Type(format!("cannot subtract {} from {}", b, a))),
    }
}

pub fn numeric_mul(a: &Value, b: &Value) -> Result<Value, LangError> {
    if let (Some((an, ad)), Some((bn, bd))) = (rat_of(a), rat_of(b)) {
        return checked_rational(an as i128 * bn as i128, ad as i128 * bd as i128);
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(x * y)),
        _ => Err(LangError::Type(format!("cannot multiply {} and {}", a, b))),
    }
}

pub fn numeric_div(a: &Value, b: &Value) -> Result<Value, LangError> {
    // Int/Int stays float here: exactness is the tree pass's decision,
    // not the evaluator's.
    match (a.as_f64(), b.as_f64()) {
        (Some(_), Some(y)) if y == 0.0 => Err(LangError::ZeroDivision),
        (Some(x), Some(y)) => Ok(Value::Float(x / y)),
        _ => Err(LangError::Type(format!("cannot divide {} by {}", a, b))),
    }
}

pub fn exact_div(a: &Value, b: &Value) -> Result<Value, LangError> {
    if let (Some((an, ad)), Some((bn, bd))) = (rat_of(a), rat_of(b)) {
        return checked_rational(an as i128 * bd as i128, ad as i128 * bn as i128);
    }
    numeric_div(a, b)
}

pub fn numeric_mod(a: &Value, b: &Value) -> Result<Value, LangError> {
    match (int_of(a), int_of(b)) {
        (Some(_), Some(0)) => Err(LangError::ZeroDivision),
        (Some(x), Some(y)) => Ok(Value::Int(x.rem_euclid(y))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) if y != 0.0 => Ok(Value::Float(x.rem_euclid(y))),
            (Some(_), Some(_)) => Err(LangError::ZeroDivision),
            _ => Err(LangError::Type(format!("cannot take {} mod {}", a, b))),
        },
    }
}

pub fn factorial(v: &Value) -> Result<Value, LangError> {
    let n = int_of(v).ok_or_else(|| {
        LangError::Type(format!("factorial expects a non-negative integer, got {}", v))
    })?;
    if n < 0 {
        return Err(LangError::Domain("factorial of a negative number".into()));
    }
    let mut acc: i64 = 1;
    for k in 2..=n {
        acc = acc.checked_mul(k).ok_or(LangError::Overflow)?;
    }
    Ok(Value::Int(acc))
}

pub fn numeric_pow(a: &Value, b: &Value) -> Result<Value, LangError> {
    if let Value::FactorialPow = b {
        return factorial(a);
    }
    if let (Some((an, ad)), Some(e)) = (rat_of(a), int_of(b)) {
        let (num, den) = if e >= 0 { (an, ad) } else { (ad, an) };
        let e = e.unsigned_abs().min(u32::MAX as u64) as u32;
        let pn = (num as i128).checked_pow(e).ok_or(LangError::Overflow)?;
        let pd = (den as i128).checked_pow(e).ok_or(LangError::Overflow)?;
        return checked_rational(pn, pd);
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
        _ => Err(LangError::Type(format!("cannot raise {} to {}", a, b))),
    }
}

/// Exact ordering comparison; rationals compare cross-multiplied, floats
/// compare as floats.
pub fn numeric_cmp(a: &Value, b: &Value) -> Result<std::cmp::Ordering, LangError> {
    if let (Some((an, ad)), Some((bn, bd))) = (rat_of(a), rat_of(b)) {
        let lhs = an as i128 * bd as i128;
        let rhs = bn as i128 * ad as i128;
        return Ok(lhs.cmp(&rhs));
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .ok_or_else(|| LangError::Type("unordered float comparison".into())),
        _ => Err(LangError::Type(format!("cannot order {} and {}", a, b))),
    }
}

/// Compose two permutations: `(a*b)(i) = a(b(i))`.
pub fn permutation_compose(a: &[usize], b: &[usize]) -> Vec<usize> {
    let n = a.len().max(b.len());
    let idx = |p: &[usize], i: usize| if i < p.len() { p[i] } else { i };
    (0..n).map(|i| idx(a, idx(b, i))).collect()
}

/// Largest element allowed in a permutation cycle; the image vector is
/// dense, so the bound caps the allocation.
pub const MAX_PERMUTATION_ELEMENT: i64 = 1 << 20;

/// Build an image map from one cycle, e.g. `(0 3 1)`.
pub fn permutation_from_cycle(cycle: &[i64]) -> Result<Vec<usize>, LangError> {
    let mut elems = Vec::with_capacity(cycle.len());
    for &c in cycle {
        if c < 0 {
            return Err(LangError::Domain("permutation elements must be >= 0".into()));
        }
        if c > MAX_PERMUTATION_ELEMENT {
            return Err(LangError::Domain(format!(
                "permutation element {} exceeds the maximum {}",
                c, MAX_PERMUTATION_ELEMENT
            )));
        }
        let c = c as usize;
        if elems.contains(&c) {
            return Err(LangError::Domain("repeated element in permutation cycle".into()));
        }
        elems.push(c);
    }
    let n = elems.iter().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut image: Vec<usize> = (0..n).collect();
    for w in 0..elems.len() {
        let from = elems[w];
        let to = elems[(w + 1) % elems.len()];
        image[from] = to;
    }
    Ok(image)
}

fn permutation_cycles(image: &[usize]) -> Vec<Vec<usize>> {
    let mut seen = vec![false; image.len()];
    let mut cycles = Vec::new();
    for start in 0..image.len() {
        if seen[start] {
            continue;
        }
        let mut cyc = vec![start];
        seen[start] = true;
        let mut next = image[start];
        while next != start {
            seen[next] = true;
            cyc.push(next);
            next = image[next];
        }
        if cyc.len() > 1 {
            cycles.push(cyc);
        }
    }
    cycles
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(v) => write!(f, "{}", v),
            Value::Rational { num, den } => write!(f, "{}/{}", num, den),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Duration(secs) => {
                let days = secs / 86_400;
                let rem = secs.rem_euclid(86_400);
                let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
                if days != 0 {
                    write!(f, "{}d {:02}:{:02}:{:02}", days, h, m, s)
                } else {
                    write!(f, "{:02}:{:02}:{:02}", h, m, s)
                }
            }
            Value::Tuple(elts) => {
                let parts: Vec<String> = elts.iter().map(|e| e.to_string()).collect();
                if parts.len() == 1 {
                    write!(f, "({},)", parts[0])
                } else {
                    write!(f, "({})", parts.join(", "))
                }
            }
            Value::Matrix { rows, cols, data } => {
                let mut out = String::from("[");
                for r in 0..*rows {
                    if r > 0 {
                        out.push_str(", ");
                    }
                    out.push('[');
                    for c in 0..*cols {
                        if c > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(&data[r * cols + c].to_string());
                    }
                    out.push(']');
                }
                out.push(']');
                write!(f, "{}", out)
            }
            Value::Sym(e) => write!(f, "{}", e),
            Value::Permutation(image) => {
                let cycles = permutation_cycles(image);
                if cycles.is_empty() {
                    return write!(f, "()");
                }
                for cyc in cycles {
                    let parts: Vec<String> = cyc.iter().map(|e| e.to_string()).collect();
                    write!(f, "({})", parts.join(" "))?;
                }
                Ok(())
            }
            Value::Lambda { params, .. } => write!(f, "<lambda({})>", params.join(", ")),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::UnitPrefix(inner) => write!(f, "{}", inner),
            Value::FactorialPow => write!(f, "<factorial operator>"),
        }
    }
}
