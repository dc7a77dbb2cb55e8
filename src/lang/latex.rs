use super::value::SymExpr;
use crate::error::LangError;

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "omicron", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi",
    "psi", "omega",
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(String),
    Letter(char),
    Command(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Underscore,
    LBrace,
    RBrace,
    LParen,
    RParen,
}

/// Parse a `$...$` fragment body into a symbolic expression.
pub fn parse_fragment(text: &str) -> Result<SymExpr, LangError> {
    let toks = tokenize(text)?;
    let mut p = Parser { toks, pos: 0 };
    let e = p.expr()?;
    if p.pos < p.toks.len() {
        return Err(LangError::Domain(format!(
            "trailing input in math fragment \"{}\"",
            text
        )));
    }
    Ok(e)
}

fn tokenize(text: &str) -> Result<Vec<Tok>, LangError> {
    let chars: Vec<char> = text.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '\\' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j].is_ascii_alphabetic() {
                    j += 1;
                }
                if j == start {
                    return Err(LangError::Domain("dangling backslash in math fragment".into()));
                }
                let cmd: String = chars[start..j].iter().collect();
                match cmd.as_str() {
                    "cdot" | "times" => toks.push(Tok::Star),
                    "left" | "right" => {}
                    _ => toks.push(Tok::Command(cmd)),
                }
                i = j;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                toks.push(Tok::Num(chars[start..i].iter().collect()));
            }
            'a'..='z' | 'A'..='Z' => {
                toks.push(Tok::Letter(c));
                i += 1;
            }
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '^' => {
                toks.push(Tok::Caret);
                i += 1;
            }
            '_' => {
                toks.push(Tok::Underscore);
                i += 1;
            }
            '{' => {
                toks.push(Tok::LBrace);
                i += 1;
            }
            '}' => {
                toks.push(Tok::RBrace);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            other => {
                return Err(LangError::Domain(format!(
                    "unexpected '{}' in math fragment",
                    other
                )))
            }
        }
    }
    Ok(toks)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn eat(&mut self, t: &Tok) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Tok, what: &str) -> Result<(), LangError> {
        if self.eat(t) {
            Ok(())
        } else {
            Err(LangError::Domain(format!("expected {} in math fragment", what)))
        }
    }

    fn expr(&mut self) -> Result<SymExpr, LangError> {
        let mut acc = self.term()?;
        loop {
            if self.eat(&Tok::Plus) {
                acc = SymExpr::add(acc, self.term()?);
            } else if self.eat(&Tok::Minus) {
                acc = SymExpr::add(acc, SymExpr::neg(self.term()?));
            } else {
                break;
            }
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<SymExpr, LangError> {
        let mut acc = self.factor()?;
        loop {
            if self.eat(&Tok::Star) {
                acc = SymExpr::mul(acc, self.factor()?);
            } else if self.eat(&Tok::Slash) {
                let rhs = self.factor()?;
                acc = SymExpr::mul(acc, SymExpr::pow(rhs, SymExpr::Int(-1)));
            } else if self.starts_atom() {
                // juxtaposition: `2x`, `x y`, `3\alpha`
                acc = SymExpr::mul(acc, self.factor()?);
            } else {
                break;
            }
        }
        Ok(acc)
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::Num(_))
                | Some(Tok::Letter(_))
                | Some(Tok::Command(_))
                | Some(Tok::LParen)
                | Some(Tok::LBrace)
        )
    }

    fn factor(&mut self) -> Result<SymExpr, LangError> {
        if self.eat(&Tok::Minus) {
            return Ok(SymExpr::neg(self.factor()?));
        }
        let base = self.atom()?;
        if self.eat(&Tok::Caret) {
            let exp = self.atom()?;
            return Ok(SymExpr::pow(base, exp));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<SymExpr, LangError> {
        let tok = self
            .peek()
            .cloned()
            .ok_or_else(|| LangError::Domain("unexpected end of math fragment".into()))?;
        match tok {
            Tok::Num(raw) => {
                self.pos += 1;
                if raw.contains('.') {
                    let v: f64 = raw
                        .parse()
                        .map_err(|_| LangError::Domain(format!("bad number '{}'", raw)))?;
                    Ok(SymExpr::Float(v))
                } else {
                    let v: i64 = raw.parse().map_err(|_| LangError::Overflow)?;
                    Ok(SymExpr::Int(v))
                }
            }
            Tok::Letter(c) => {
                self.pos += 1;
                let name = self.with_subscript(c.to_string())?;
                Ok(SymExpr::Sym(name))
            }
            Tok::Command(cmd) => {
                self.pos += 1;
                match cmd.as_str() {
                    "frac" => {
                        let num = self.brace_group()?;
                        let den = self.brace_group()?;
                        Ok(SymExpr::mul(num, SymExpr::pow(den, SymExpr::Int(-1))))
                    }
                    "sqrt" => {
                        let inner = self.brace_group()?;
                        Ok(SymExpr::pow(
                            inner,
                            SymExpr::Rational { num: 1, den: 2 },
                        ))
                    }
                    name if GREEK.contains(&name) => {
                        let name = self.with_subscript(name.to_string())?;
                        Ok(SymExpr::Sym(name))
                    }
                    other => Err(LangError::Domain(format!(
                        "unsupported command \\{} in math fragment",
                        other
                    ))),
                }
            }
            Tok::LParen => {
                self.pos += 1;
                let e = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::LBrace => self.brace_group(),
            other => Err(LangError::Domain(format!(
                "unexpected {:?} in math fragment",
                other
            ))),
        }
    }

    fn brace_group(&mut self) -> Result<SymExpr, LangError> {
        self.expect(&Tok::LBrace, "'{'")?;
        let e = self.expr()?;
        self.expect(&Tok::RBrace, "'}'")?;
        Ok(e)
    }

    fn with_subscript(&mut self, mut name: String) -> Result<String, LangError> {
        if self.eat(&Tok::Underscore) {
            name.push('_');
            match self.peek().cloned() {
                Some(Tok::Num(d)) => {
                    self.pos += 1;
                    name.push_str(&d);
                }
                Some(Tok::Letter(c)) => {
                    self.pos += 1;
                    name.push(c);
                }
                Some(Tok::LBrace) => {
                    self.pos += 1;
                    loop {
                        match self.peek().cloned() {
                            Some(Tok::RBrace) => {
                                self.pos += 1;
                                break;
                            }
                            Some(Tok::Num(d)) => {
                                self.pos += 1;
                                name.push_str(&d);
                            }
                            Some(Tok::Letter(c)) => {
                                self.pos += 1;
                                name.push(c);
                            }
                            _ => {
                                return Err(LangError::Domain(
                                    "bad subscript in math fragment".into(),
                                ))
                            }
                        }
                    }
                }
                _ => return Err(LangError::Domain("bad subscript in math fragment".into())),
            }
        }
        Ok(name)
    }
}
