//! Syntax-tree passes that run between parsing and evaluation: exact
//! rationals, matrix construction, auto-symbol declaration, and
//! call-as-product repair. These need name-kind and shape information the
//! text rewrites cannot see.

use crate::lang::ast::{BinOp, Expr, Stmt, TemplatePart};
use crate::lang::eval::Interpreter;
use crate::lang::value::{SymExpr, Value};
use crate::namespace::NameKind;
use crate::rewrite::text::is_auto_symbol;

pub fn apply_passes(stmts: &mut [Stmt], interp: &mut Interpreter, allow_assignment: bool) {
    if !allow_assignment {
        suppress_assignments(stmts);
    }
    let mut shadowed: Vec<String> = Vec::new();
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::Assign { value, .. }
            | Stmt::AugAssign { value, .. }
            | Stmt::Expr(value) => transform(value, interp, &mut shadowed),
            Stmt::Delete { .. } => {}
        }
    }
}

/// Rewrite binding statements into their pure right-hand sides, so the
/// speculative path can show a value without committing it.
fn suppress_assignments(stmts: &mut [Stmt]) {
    for stmt in stmts.iter_mut() {
        let replacement = match stmt {
            Stmt::Assign { value, .. } => Stmt::Expr(value.clone()),
            Stmt::AugAssign { name, op, value } => Stmt::Expr(Expr::Binary {
                op: *op,
                left: Box::new(Expr::Name(name.clone())),
                right: Box::new(value.clone()),
            }),
            Stmt::Delete { .. } => Stmt::Expr(Expr::NoneLit),
            Stmt::Expr(_) => continue,
        };
        *stmt = replacement;
    }
}

/// Children-first walk applying every tree pass to one expression.
fn transform(e: &mut Expr, interp: &mut Interpreter, shadowed: &mut Vec<String>) {
    match e {
        Expr::Unary { operand, .. } => transform(operand, interp, shadowed),
        Expr::Binary { left, right, .. } | Expr::Compare { left, right, .. } => {
            transform(left, interp, shadowed);
            transform(right, interp, shadowed);
        }
        Expr::Call { callee, args } => {
            transform(callee, interp, shadowed);
            for a in args.iter_mut() {
                transform(a, interp, shadowed);
            }
        }
        Expr::Method { recv, args, .. } => {
            transform(recv, interp, shadowed);
            for a in args.iter_mut() {
                transform(a, interp, shadowed);
            }
        }
        Expr::Tuple(elts) => {
            for elt in elts.iter_mut() {
                transform(elt, interp, shadowed);
            }
        }
        Expr::Template(parts) => {
            for part in parts.iter_mut() {
                if let TemplatePart::Expr(inner) = part {
                    transform(inner, interp, shadowed);
                }
            }
        }
        Expr::Lambda { params, body } => {
            let added = params.len();
            shadowed.extend(params.iter().cloned());
            transform(body, interp, shadowed);
            shadowed.truncate(shadowed.len() - added);
        }
        Expr::Int(_)
        | Expr::Float { .. }
        | Expr::Str(_)
        | Expr::NoneLit
        | Expr::Name(_) => {}
    }

    if interp.config.auto_rational {
        rational_pass(e, interp);
    }
    if interp.config.auto_symbols {
        auto_symbol_pass(e, interp, shadowed);
    }
    if interp.config.auto_matrix {
        matrix_pass(e, interp);
    }
    if interp.config.implicit_multiply {
        call_product_pass(e, interp);
    }
}

fn rational_call(num: Expr, den: Expr) -> Expr {
    Expr::Call {
        callee: Box::new(Expr::Name("Rational".into())),
        args: vec![num, den],
    }
}

/// Integer division becomes an exact rational, and float literals become
/// rationals built from their source text so `0.1` is exactly 1/10.
fn rational_pass(e: &mut Expr, interp: &Interpreter) {
    match e {
        Expr::Binary {
            op: BinOp::Div,
            left,
            right,
        } if is_integer(left, interp) && is_integer(right, interp) => {
            let num = std::mem::replace(left.as_mut(), Expr::NoneLit);
            let den = std::mem::replace(right.as_mut(), Expr::NoneLit);
            *e = rational_call(num, den);
        }
        Expr::Float { raw, .. } => {
            *e = Expr::Call {
                callee: Box::new(Expr::Name("Rational".into())),
                args: vec![Expr::Str(raw.clone())],
            };
        }
        _ => {}
    }
}

/// Conservative provable-integer check: literals, names bound to ints, and
/// closed arithmetic over them.
fn is_integer(e: &Expr, interp: &Interpreter) -> bool {
    match e {
        Expr::Int(_) => true,
        Expr::Name(n) => matches!(interp.ns.get(n), Some(Value::Int(_))),
        Expr::Unary { operand, .. } => is_integer(operand, interp),
        Expr::Binary {
            op: BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Pow,
            left,
            right,
        } => is_integer(left, interp) && is_integer(right, interp),
        _ => false,
    }
}

/// First unbound reference to an auto-symbol name binds it as a symbolic
/// variable. The binding is committed immediately so later expressions in
/// the same unit see it.
fn auto_symbol_pass(e: &Expr, interp: &mut Interpreter, shadowed: &[String]) {
    if let Expr::Name(name) = e {
        if shadowed.iter().any(|s| s == name) {
            return;
        }
        if interp.ns.kind_of(name) == NameKind::Unbound && is_auto_symbol(name) {
            interp
                .ns
                .set(name, Value::Sym(SymExpr::Sym(name.clone())));
        }
    }
}

/// A tuple whose elements are all tuples is speculatively built as a
/// matrix; if construction fails (ragged rows, non-numeric cells) the
/// expression stays a plain tuple.
fn matrix_pass(e: &mut Expr, interp: &Interpreter) {
    let is_candidate = match e {
        Expr::Tuple(elts) => {
            !elts.is_empty() && elts.iter().all(|elt| matches!(elt, Expr::Tuple(_)))
        }
        _ => false,
    };
    if !is_candidate {
        return;
    }
    let candidate = Expr::Call {
        callee: Box::new(Expr::Name("Matrix".into())),
        args: vec![e.clone()],
    };
    if interp.eval_expr(&candidate, None).is_ok() {
        *e = candidate;
    }
}

/// `2(3)`, `x(x+1)`, `(x+1)(x-1)`: a single-argument call whose callee
/// cannot be callable is an adjacency product.
fn call_product_pass(e: &mut Expr, interp: &Interpreter) {
    let Expr::Call { callee, args } = e else {
        return;
    };
    if args.len() != 1 {
        return;
    }
    let product = match callee.as_ref() {
        Expr::Int(_) | Expr::Float { .. } => true,
        Expr::Unary { .. } | Expr::Binary { .. } => true,
        Expr::Call {
            callee: inner_callee,
            ..
        } => matches!(inner_callee.as_ref(), Expr::Name(n) if n == "Rational"),
        Expr::Name(n) => matches!(
            interp.ns.kind_of(n),
            NameKind::SymbolicExpr | NameKind::Numeric | NameKind::UnitPrefix
        ),
        _ => false,
    };
    if !product {
        return;
    }
    let left = std::mem::replace(callee.as_mut(), Expr::NoneLit);
    let right = args.pop().expect("single argument");
    *e = Expr::Binary {
        op: BinOp::Mul,
        left: Box::new(left),
        right: Box::new(right),
    };
}
