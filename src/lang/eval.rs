use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::ast::{BinOp, CmpOp, Expr, Stmt, TemplatePart, UnaryOp};
use super::value::{
    exact_div, factorial, numeric_add, numeric_cmp, numeric_div, numeric_mod, numeric_mul,
    numeric_pow, numeric_sub, permutation_compose, permutation_from_cycle, value_to_sym, Builtin,
    SymExpr, Value,
};
use super::{date, latex, parser};
use crate::config::RewriteConfig;
use crate::error::{LangError, ShellError};
use crate::namespace::{Capabilities, Namespace, NS_BLOCK_LIST};
use crate::rewrite;

/// Scope chain for lambda invocations; globals live in the namespace.
pub struct Locals<'a> {
    vars: HashMap<String, Value>,
    parent: Option<&'a Locals<'a>>,
}

impl<'a> Locals<'a> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        match self.vars.get(name) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.lookup(name)),
        }
    }
}

/// A complete host-language session: namespace, configuration, and an
/// interruptible evaluator, fed by the rewrite pipeline.
pub struct Interpreter {
    pub ns: Namespace,
    pub config: RewriteConfig,
    caps: Capabilities,
    interrupt: Arc<AtomicBool>,
}

impl Interpreter {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            ns: Namespace::with_capabilities(caps),
            config: RewriteConfig::default(),
            caps,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(caps: Capabilities, config: RewriteConfig) -> Self {
        let mut interp = Self::new(caps);
        interp.config = config;
        interp
    }

    /// Shared flag another thread can set to abort the current evaluation.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Strip block-listed names from the namespace (used by the preview
    /// worker after initialization, in addition to never constructing the
    /// dangerous builtins at all).
    pub fn strip_blocked_names(&mut self) {
        for name in NS_BLOCK_LIST {
            self.ns.delete(name);
        }
    }

    /// Transpile, parse, tree-rewrite, and evaluate one input unit.
    /// Returns the value of the last statement.
    pub fn eval_source(&mut self, source: &str) -> Result<Value, ShellError> {
        self.eval_with_options(source, true)
    }

    /// `allow_assignment=false` suppresses binding side effects: the
    /// speculative preview path evaluates right-hand sides only.
    pub fn eval_with_options(
        &mut self,
        source: &str,
        allow_assignment: bool,
    ) -> Result<Value, ShellError> {
        let env = self.ns.snapshot_env();
        let code = rewrite::transpile(source, &env, &self.config)?;
        debug!("transpiled: {:?} -> {:?}", source, code);

        let mut stmts = parser::parse(&code).map_err(ShellError::Lang)?;
        rewrite::tree::apply_passes(&mut stmts, self, allow_assignment);

        self.interrupt.store(false, Ordering::SeqCst);
        let result = self.exec_unit(&stmts);
        self.interrupt.store(false, Ordering::SeqCst);
        result.map_err(ShellError::Lang)
    }

    fn exec_unit(&mut self, stmts: &[Stmt]) -> Result<Value, LangError> {
        let mut last = Value::None;
        for stmt in stmts {
            last = self.exec_stmt(stmt)?;
        }
        Ok(last)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Value, LangError> {
        match stmt {
            Stmt::Assign { name, value } => {
                let v = self.eval_expr(value, None)?;
                self.ns.set(name, v);
                Ok(Value::None)
            }
            Stmt::AugAssign { name, op, value } => {
                let current = self
                    .ns
                    .get(name)
                    .cloned()
                    .ok_or_else(|| LangError::Name(name.clone()))?;
                let rhs = self.eval_expr(value, None)?;
                let v = self.binop(*op, current, rhs)?;
                self.ns.set(name, v);
                Ok(Value::None)
            }
            Stmt::Delete { name } => {
                if !self.ns.delete(name) {
                    return Err(LangError::Name(name.clone()));
                }
                Ok(Value::None)
            }
            Stmt::Expr(e) => self.eval_expr(e, None),
        }
    }

    fn check_interrupt(&self) -> Result<(), LangError> {
        if self.interrupt.load(Ordering::Relaxed) {
            Err(LangError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Evaluate an expression. Read-only with respect to the namespace, so
    /// the tree rewriter can use it for speculative construction.
    pub fn eval_expr(&self, e: &Expr, locals: Option<&Locals>) -> Result<Value, LangError> {
        self.check_interrupt()?;
        match e {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::NoneLit => Ok(Value::None),
            Expr::Name(name) => {
                if let Some(l) = locals {
                    if let Some(v) = l.lookup(name) {
                        return Ok(v.clone());
                    }
                }
                self.ns
                    .get(name)
                    .cloned()
                    .ok_or_else(|| LangError::Name(name.clone()))
            }
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Lit(s) => out.push_str(s),
                        TemplatePart::Expr(e) => {
                            let v = self.eval_expr(e, locals)?;
                            out.push_str(&v.to_string());
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval_expr(operand, locals)?;
                self.unaryop(*op, v)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval_expr(left, locals)?;
                let r = self.eval_expr(right, locals)?;
                self.binop(*op, l, r)
            }
            Expr::Compare { op, left, right } => {
                let l = self.eval_expr(left, locals)?;
                let r = self.eval_expr(right, locals)?;
                self.compare(*op, l, r)
            }
            Expr::Call { callee, args } => {
                let f = self.eval_expr(callee, locals)?;
                let mut argv = Vec::with_capacity(args.len());
                for a in args {
                    argv.push(self.eval_expr(a, locals)?);
                }
                self.call(f, argv, locals)
            }
            Expr::Method { recv, name, args } => {
                let v = self.eval_expr(recv, locals)?;
                let mut argv = Vec::with_capacity(args.len());
                for a in args {
                    argv.push(self.eval_expr(a, locals)?);
                }
                self.method(v, name, argv)
            }
            Expr::Tuple(elts) => {
                let mut out = Vec::with_capacity(elts.len());
                for e in elts {
                    out.push(self.eval_expr(e, locals)?);
                }
                Ok(Value::Tuple(out))
            }
            Expr::Lambda { params, body } => Ok(Value::Lambda {
                params: params.clone(),
                body: body.clone(),
            }),
        }
    }

    fn unaryop(&self, op: UnaryOp, v: Value) -> Result<Value, LangError> {
        let v = unwrap_unit(v);
        match op {
            UnaryOp::Pos => Ok(v),
            UnaryOp::Neg => {
                if let Value::Sym(e) = v {
                    return Ok(SymExpr::neg(e).to_value());
                }
                numeric_sub(&Value::Int(0), &v)
            }
        }
    }

    fn binop(&self, op: BinOp, l: Value, r: Value) -> Result<Value, LangError> {
        let l = unwrap_unit(l);
        let r = unwrap_unit(r);

        // factorial marker: `x ** _factorial_pow`
        if op == BinOp::Pow && r == Value::FactorialPow {
            return factorial(&l);
        }

        // date/duration arithmetic
        match (&l, &r, op) {
            (Value::Date(a), Value::Date(b), BinOp::Sub) => {
                return Ok(Value::Duration((*a - *b).num_seconds()));
            }
            (Value::Date(a), Value::Duration(s), BinOp::Add) => {
                return Ok(Value::Date(*a + chrono::Duration::seconds(*s)));
            }
            (Value::Date(a), Value::Duration(s), BinOp::Sub) => {
                return Ok(Value::Date(*a - chrono::Duration::seconds(*s)));
            }
            (Value::Duration(a), Value::Duration(b), BinOp::Add) => {
                return Ok(Value::Duration(a + b));
            }
            (Value::Duration(a), Value::Duration(b), BinOp::Sub) => {
                return Ok(Value::Duration(a - b));
            }
            _ => {}
        }

        // permutation composition
        if let (Value::Permutation(a), Value::Permutation(b), BinOp::Mul) = (&l, &r, op) {
            return Ok(Value::Permutation(permutation_compose(a, b)));
        }

        // string concatenation
        if let (Value::Str(a), Value::Str(b), BinOp::Add) = (&l, &r, op) {
            return Ok(Value::Str(format!("{}{}", a, b)));
        }

        // matrix scaling and addition
        if matches!(l, Value::Matrix { .. }) || matches!(r, Value::Matrix { .. }) {
            return self.matrix_binop(op, l, r);
        }

        // symbolic lifting
        if matches!(l, Value::Sym(_)) || matches!(r, Value::Sym(_)) {
            let (a, b) = match (value_to_sym(&l), value_to_sym(&r)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(LangError::Type(format!(
                        "unsupported operands: {} and {}",
                        l, r
                    )))
                }
            };
            return Ok(match op {
                BinOp::Add => SymExpr::add(a, b),
                BinOp::Sub => SymExpr::add(a, SymExpr::neg(b)),
                BinOp::Mul => SymExpr::mul(a, b),
                BinOp::Div => SymExpr::mul(a, SymExpr::pow(b, SymExpr::Int(-1))),
                BinOp::Pow => SymExpr::pow(a, b),
                BinOp::Mod => {
                    return Err(LangError::Type(
                        "modulo of a symbolic expression".into(),
                    ))
                }
            }
            .to_value());
        }

        match op {
            BinOp::Add => numeric_add(&l, &r),
            BinOp::Sub => numeric_sub(&l, &r),
            BinOp::Mul => numeric_mul(&l, &r),
            BinOp::Div => {
                // plain int/int stays a float (the exactness decision
                // belongs to the tree pass), but rationals stay exact
                if matches!(l, Value::Rational { .. }) || matches!(r, Value::Rational { .. }) {
                    exact_div(&l, &r)
                } else {
                    numeric_div(&l, &r)
                }
            }
            BinOp::Mod => numeric_mod(&l, &r),
            BinOp::Pow => numeric_pow(&l, &r),
        }
    }

    fn matrix_binop(&self, op: BinOp, l: Value, r: Value) -> Result<Value, LangError> {
        match (l, r, op) {
            (
                Value::Matrix { rows, cols, data },
                Value::Matrix {
                    rows: r2,
                    cols: c2,
                    data: d2,
                },
                BinOp::Add | BinOp::Sub,
            ) => {
                if rows != r2 || cols != c2 {
                    return Err(LangError::Type("matrix shape mismatch".into()));
                }
                let mut out = Vec::with_capacity(data.len());
                for (a, b) in data.iter().zip(d2.iter()) {
                    out.push(self.binop(op, a.clone(), b.clone())?);
                }
                Ok(Value::Matrix {
                    rows,
                    cols,
                    data: out,
                })
            }
            (Value::Matrix { rows, cols, data }, scalar, BinOp::Mul)
            | (scalar, Value::Matrix { rows, cols, data }, BinOp::Mul) => {
                let mut out = Vec::with_capacity(data.len());
                for a in data {
                    out.push(self.binop(BinOp::Mul, a, scalar.clone())?);
                }
                Ok(Value::Matrix {
                    rows,
                    cols,
                    data: out,
                })
            }
            (l, r, op) => Err(LangError::Type(format!(
                "unsupported matrix operation {:?} on {} and {}",
                op, l, r
            ))),
        }
    }

    fn compare(&self, op: CmpOp, l: Value, r: Value) -> Result<Value, LangError> {
        let l = unwrap_unit(l);
        let r = unwrap_unit(r);
        let b = match op {
            CmpOp::Eq | CmpOp::Ne => {
                let eq = if l.is_numeric() && r.is_numeric() {
                    numeric_cmp(&l, &r)? == std::cmp::Ordering::Equal
                } else {
                    l == r
                };
                if op == CmpOp::Eq {
                    eq
                } else {
                    !eq
                }
            }
            ordered => {
                let ord = match (&l, &r) {
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    (Value::Date(a), Value::Date(b)) => a.cmp(b),
                    _ => numeric_cmp(&l, &r)?,
                };
                match ordered {
                    CmpOp::Lt => ord == std::cmp::Ordering::Less,
                    CmpOp::Le => ord != std::cmp::Ordering::Greater,
                    CmpOp::Gt => ord == std::cmp::Ordering::Greater,
                    CmpOp::Ge => ord != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                }
            }
        };
        Ok(Value::Bool(b))
    }

    fn call(&self, f: Value, args: Vec<Value>, locals: Option<&Locals>) -> Result<Value, LangError> {
        match f {
            Value::Lambda { params, body } => {
                if params.len() != args.len() {
                    return Err(LangError::Type(format!(
                        "lambda expects {} arguments, got {}",
                        params.len(),
                        args.len()
                    )));
                }
                let vars: HashMap<String, Value> =
                    params.into_iter().zip(args.into_iter()).collect();
                let frame = Locals {
                    vars,
                    parent: locals,
                };
                self.eval_expr(&body, Some(&frame))
            }
            Value::Builtin(b) => self.call_builtin(b, args),
            Value::Sym(_) => Err(LangError::Type(
                "implicit multiply of a symbolic expression expects a single argument".into(),
            )),
            other => Err(LangError::Type(format!("{} is not callable", other))),
        }
    }

    fn call_builtin(&self, b: Builtin, args: Vec<Value>) -> Result<Value, LangError> {
        match b {
            Builtin::Rational => match args.as_slice() {
                [Value::Int(n)] => Ok(Value::Int(*n)),
                [Value::Int(n), Value::Int(d)] => Value::rational(*n, *d),
                [Value::Str(s)] => rational_from_decimal_str(s),
                [Value::Float(f)] => rational_from_decimal_str(&f.to_string()),
                _ => Err(LangError::Type(
                    "Rational expects (int, int) or a decimal string".into(),
                )),
            },
            Builtin::Matrix => match args.as_slice() {
                [Value::Tuple(rows)] => matrix_from_rows(rows),
                _ => Err(LangError::Type("Matrix expects a tuple of row tuples".into())),
            },
            Builtin::Symbols => match args.as_slice() {
                [Value::Str(name)] => Ok(Value::Sym(SymExpr::Sym(name.clone()))),
                _ => Err(LangError::Type("symbols expects a name string".into())),
            },
            Builtin::Permutation => {
                let mut cycle = Vec::with_capacity(args.len());
                for a in &args {
                    match a {
                        Value::Int(v) => cycle.push(*v),
                        _ => {
                            return Err(LangError::Type(
                                "Permutation expects integer elements".into(),
                            ))
                        }
                    }
                }
                Ok(Value::Permutation(permutation_from_cycle(&cycle)?))
            }
            Builtin::ParseDate => match args.as_slice() {
                [Value::Str(s)] => Ok(Value::Date(date::parse_date(s)?)),
                _ => Err(LangError::Type("parse_date expects a string".into())),
            },
            Builtin::ParseLatex => match args.as_slice() {
                [Value::Str(s)] => {
                    let mut expr = latex::parse_fragment(s)?;
                    if self.config.latex_symbol_binding {
                        let mut free = Vec::new();
                        expr.free_symbols(&mut free);
                        for name in free {
                            if let Some(bound) = self.ns.get(&name).and_then(value_to_sym) {
                                if bound != SymExpr::Sym(name.clone()) {
                                    expr = expr.substitute(&name, &bound);
                                }
                            }
                        }
                    }
                    Ok(expr.to_value())
                }
                _ => Err(LangError::Type("parse_latex expects a string".into())),
            },
            Builtin::Factorial => match args.as_slice() {
                [v] => factorial(v),
                _ => Err(LangError::Type("factorial expects one argument".into())),
            },
            Builtin::Abs => match args.as_slice() {
                [Value::Int(v)] => Ok(Value::Int(v.checked_abs().ok_or(LangError::Overflow)?)),
                [Value::Rational { num, den }] => Ok(Value::Rational {
                    num: num.checked_abs().ok_or(LangError::Overflow)?,
                    den: *den,
                }),
                [Value::Float(v)] => Ok(Value::Float(v.abs())),
                _ => Err(LangError::Type("abs expects a number".into())),
            },
            Builtin::Sleep => match args.as_slice() {
                [v] => {
                    let secs = v
                        .as_f64()
                        .ok_or_else(|| LangError::Type("sleep expects seconds".into()))?;
                    self.interruptible_sleep(secs)?;
                    Ok(Value::None)
                }
                _ => Err(LangError::Type("sleep expects one argument".into())),
            },
            Builtin::Error => match args.as_slice() {
                [Value::Str(msg)] => Err(LangError::Domain(msg.clone())),
                _ => Err(LangError::Domain("error".into())),
            },
            Builtin::OpenFile => {
                self.require_full("open_file")?;
                match args.as_slice() {
                    [Value::Str(path)] => std::fs::read_to_string(path)
                        .map(Value::Str)
                        .map_err(|e| LangError::Domain(e.to_string())),
                    _ => Err(LangError::Type("open_file expects a path string".into())),
                }
            }
            Builtin::RunCommand => {
                self.require_full("run_command")?;
                match args.as_slice() {
                    [Value::Str(cmd)] => {
                        let out = std::process::Command::new("sh")
                            .arg("-c")
                            .arg(cmd)
                            .output()
                            .map_err(|e| LangError::Domain(e.to_string()))?;
                        Ok(Value::Str(String::from_utf8_lossy(&out.stdout).into_owned()))
                    }
                    _ => Err(LangError::Type("run_command expects a command string".into())),
                }
            }
            Builtin::Exit => {
                self.require_full("exit")?;
                std::process::exit(0);
            }
        }
    }

    fn require_full(&self, what: &str) -> Result<(), LangError> {
        if self.caps == Capabilities::Full {
            Ok(())
        } else {
            Err(LangError::Capability(what.to_string()))
        }
    }

    fn interruptible_sleep(&self, secs: f64) -> Result<(), LangError> {
        let deadline = std::time::Instant::now() + Duration::from_secs_f64(secs.max(0.0));
        while std::time::Instant::now() < deadline {
            self.check_interrupt()?;
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn method(&self, recv: Value, name: &str, args: Vec<Value>) -> Result<Value, LangError> {
        match (recv, name) {
            (Value::Matrix { rows, cols, data }, "det") => {
                if !args.is_empty() {
                    return Err(LangError::Type("det takes no arguments".into()));
                }
                if rows != cols {
                    return Err(LangError::Type("determinant of a non-square matrix".into()));
                }
                self.determinant(rows, &data)
            }
            (v, "evalf") => {
                if !args.is_empty() {
                    return Err(LangError::Type("evalf takes no arguments".into()));
                }
                self.evalf(v)
            }
            (Value::Duration(secs), "days") => Ok(Value::Int(secs / 86_400)),
            (v, other) => Err(LangError::Type(format!(
                "{} has no method '{}'",
                v, other
            ))),
        }
    }

    fn evalf(&self, v: Value) -> Result<Value, LangError> {
        match v {
            Value::Matrix { rows, cols, data } => {
                let mut out = Vec::with_capacity(data.len());
                for cell in data {
                    out.push(self.evalf(cell)?);
                }
                Ok(Value::Matrix {
                    rows,
                    cols,
                    data: out,
                })
            }
            Value::Sym(e) => e
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| LangError::Type(format!("cannot evaluate {} numerically", e))),
            other => other
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| LangError::Type(format!("cannot evaluate {} numerically", other))),
        }
    }

    /// Laplace expansion; fine for the small matrices this shell handles.
    fn determinant(&self, n: usize, data: &[Value]) -> Result<Value, LangError> {
        self.check_interrupt()?;
        if n == 0 {
            return Ok(Value::Int(1));
        }
        if n == 1 {
            return Ok(data[0].clone());
        }
        let mut acc = Value::Int(0);
        for col in 0..n {
            let mut minor = Vec::with_capacity((n - 1) * (n - 1));
            for r in 1..n {
                for c in 0..n {
                    if c != col {
                        minor.push(data[r * n + c].clone());
                    }
                }
            }
            let cofactor = self.binop(
                BinOp::Mul,
                data[col].clone(),
                self.determinant(n - 1, &minor)?,
            )?;
            acc = if col % 2 == 0 {
                self.binop(BinOp::Add, acc, cofactor)?
            } else {
                self.binop(BinOp::Sub, acc, cofactor)?
            };
        }
        Ok(acc)
    }
}

fn unwrap_unit(v: Value) -> Value {
    match v {
        Value::UnitPrefix(inner) => *inner,
        other => other,
    }
}

fn rational_from_decimal_str(s: &str) -> Result<Value, LangError> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(r) => (-1i64, r),
        None => (1i64, s.strip_prefix('+').unwrap_or(s)),
    };

    let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
        Some((m, e)) => {
            let exp: i32 = e
                .parse()
                .map_err(|_| LangError::Type(format!("bad decimal string '{}'", s)))?;
            (m, exp)
        }
        None => (rest, 0),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(LangError::Type(format!("bad decimal string '{}'", s)));
    }
    let digits = format!("{}{}", int_part, frac_part);
    let num: i64 = if digits.is_empty() {
        0
    } else {
        digits
            .parse()
            .map_err(|_| LangError::Type(format!("bad decimal string '{}'", s)))?
    };

    let scale = frac_part.len() as i32 - exponent;
    let (mut num128, mut den128) = (sign as i128 * num as i128, 1i128);
    if scale > 0 {
        den128 = 10i128
            .checked_pow(scale as u32)
            .ok_or(LangError::Overflow)?;
    } else if scale < 0 {
        num128 = num128
            .checked_mul(10i128.checked_pow((-scale) as u32).ok_or(LangError::Overflow)?)
            .ok_or(LangError::Overflow)?;
    }

    let num = i64::try_from(num128).map_err(|_| LangError::Overflow)?;
    let den = i64::try_from(den128).map_err(|_| LangError::Overflow)?;
    Value::rational(num, den)
}

fn matrix_from_rows(rows: &[Value]) -> Result<Value, LangError> {
    if rows.is_empty() {
        return Err(LangError::Type("empty matrix".into()));
    }
    let mut cols = None;
    let mut data = Vec::new();
    for row in rows {
        let elts = match row {
            Value::Tuple(elts) => elts,
            _ => return Err(LangError::Type("matrix rows must be tuples".into())),
        };
        match cols {
            None => cols = Some(elts.len()),
            Some(c) if c != elts.len() => {
                return Err(LangError::Type("ragged matrix rows".into()));
            }
            _ => {}
        }
        for cell in elts {
            if !cell.is_numeric() && !matches!(cell, Value::Sym(_)) {
                return Err(LangError::Type(format!(
                    "matrix cell {} is not numeric",
                    cell
                )));
            }
            data.push(cell.clone());
        }
    }
    let cols = cols.unwrap_or(0);
    if cols == 0 {
        return Err(LangError::Type("empty matrix row".into()));
    }
    Ok(Value::Matrix {
        rows: rows.len(),
        cols,
        data,
    })
}

/// Convenience used by the worker and tests: a sendability check for
/// namespace pushes.
pub fn pushable(name: &str, value: &Value) -> bool {
    !NS_BLOCK_LIST.contains(&name) && value.is_sendable()
}
