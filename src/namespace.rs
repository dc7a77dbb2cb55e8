use std::collections::HashMap;

use crate::lang::value::{Builtin, Value};

/// Names that must never reach the preview worker's mirrored namespace and
/// are stripped from it after initialization.
pub const NS_BLOCK_LIST: &[&str] = &["open_file", "run_command", "exit"];

/// Which primitive capabilities a namespace is constructed with. The
/// preview worker is `Restricted` from the start: file, process, and exit
/// builtins never exist there, rather than being deleted after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capabilities {
    Full,
    Restricted,
}

/// Runtime category of a bound name, computed once per transpile pass so
/// text rewrites stay pure functions over a closed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    SymbolicExpr,
    Numeric,
    UnitPrefix,
    Other,
    Unbound,
}

/// The live mapping of bound names to values.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    map: HashMap<String, Value>,
}

impl Namespace {
    pub fn with_capabilities(caps: Capabilities) -> Self {
        let mut ns = Namespace::default();

        let always = [
            Builtin::Rational,
            Builtin::Matrix,
            Builtin::Symbols,
            Builtin::Permutation,
            Builtin::ParseDate,
            Builtin::ParseLatex,
            Builtin::Factorial,
            Builtin::Abs,
            Builtin::Sleep,
            Builtin::Error,
        ];
        for b in always {
            ns.set(b.name(), Value::Builtin(b));
        }
        if caps == Capabilities::Full {
            for b in [Builtin::OpenFile, Builtin::RunCommand, Builtin::Exit] {
                ns.set(b.name(), Value::Builtin(b));
            }
        }

        ns.set("_factorial_pow", Value::FactorialPow);

        // engineering unit prefixes; `m` (milli) and `M` (mega) coexist
        ns.set("k", Value::UnitPrefix(Box::new(Value::Int(1_000))));
        ns.set("M", Value::UnitPrefix(Box::new(Value::Int(1_000_000))));
        ns.set("G", Value::UnitPrefix(Box::new(Value::Int(1_000_000_000))));
        ns.set("T", Value::UnitPrefix(Box::new(Value::Int(1_000_000_000_000))));
        for (name, den) in [
            ("m", 1_000),
            ("u", 1_000_000),
            ("n", 1_000_000_000),
            ("p", 1_000_000_000_000),
        ] {
            ns.set(name, Value::UnitPrefix(Box::new(Value::Rational { num: 1, den })));
        }

        ns
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.map.insert(name.to_string(), value);
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.map.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn kind_of(&self, name: &str) -> NameKind {
        match self.map.get(name) {
            None => NameKind::Unbound,
            Some(Value::UnitPrefix(_)) => NameKind::UnitPrefix,
            Some(Value::Sym(_)) => NameKind::SymbolicExpr,
            Some(v) if v.is_numeric() => NameKind::Numeric,
            Some(_) => NameKind::Other,
        }
    }

    /// Snapshot the categories of every bound name for one transpile pass.
    pub fn snapshot_env(&self) -> NameEnv {
        let kinds = self
            .map
            .keys()
            .map(|k| (k.clone(), self.kind_of(k)))
            .collect();
        NameEnv { kinds }
    }
}

/// Read-only per-pass snapshot of name categories.
#[derive(Debug, Clone, Default)]
pub struct NameEnv {
    kinds: HashMap<String, NameKind>,
}

impl NameEnv {
    pub fn kind(&self, name: &str) -> NameKind {
        self.kinds.get(name).copied().unwrap_or(NameKind::Unbound)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.kind(name) != NameKind::Unbound
    }

    /// Record a name introduced by an assignment earlier in the same input
    /// unit, so implicit products after `x = ...` see `x` as bound.
    pub fn add_pending(&mut self, name: &str) {
        self.kinds
            .entry(name.to_string())
            .or_insert(NameKind::Other);
    }
}
