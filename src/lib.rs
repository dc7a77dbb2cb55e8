//! calc-shell: a calculator shell that rewrites everyday math shorthand
//! (implicit multiplication, caret powers, factorials, date and LaTeX
//! literals) into an exact-arithmetic host language, with a sandboxed
//! worker process that previews results speculatively as input is typed.

pub mod config;
pub mod error;
pub mod lang;
pub mod namespace;
pub mod preview;
pub mod rewrite;

pub use config::{PreviewConfig, RewriteConfig};
pub use error::{LangError, RewriteError, ShellError};
pub use lang::{Interpreter, Value};
pub use namespace::{Capabilities, Namespace};
