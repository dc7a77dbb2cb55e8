//! The host mini-language: lexer, parser, values, and the interruptible
//! tree-walking evaluator the shell and the preview worker share.

pub mod ast;
pub mod date;
pub mod eval;
pub mod latex;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::Interpreter;
pub use value::Value;
