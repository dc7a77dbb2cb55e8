use super::ast::{BinOp, CmpOp, Expr, Stmt, TemplatePart, UnaryOp};
use super::lexer::{tokenize, RawSeg, Tok};
use crate::error::LangError;

/// Parse a full input unit (one or more statements separated by newlines
/// or semicolons).
pub fn parse(src: &str) -> Result<Vec<Stmt>, LangError> {
    let toks = tokenize(src)?;
    let mut p = Parser { toks, pos: 0 };
    let mut stmts = Vec::new();

    loop {
        while p.eat(&Tok::Newline) {}
        if p.at_end() {
            break;
        }
        stmts.push(p.statement()?);
        if !p.at_end() && !p.eat(&Tok::Newline) {
            return Err(p.unexpected("end of statement"));
        }
    }
    Ok(stmts)
}

/// Parse a single expression (used for template interpolations).
pub fn parse_expr(src: &str) -> Result<Expr, LangError> {
    let toks = tokenize(src)?;
    let mut p = Parser { toks, pos: 0 };
    let e = p.expression()?;
    if !p.at_end() {
        return Err(p.unexpected("end of expression"));
    }
    Ok(e)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.toks.get(self.pos + 1)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
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
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> LangError {
        match self.peek() {
            Some(t) => LangError::Parse(format!("expected {}, found {:?}", what, t)),
            None => LangError::Parse(format!("expected {}, found end of input", what)),
        }
    }

    fn statement(&mut self) -> Result<Stmt, LangError> {
        // `del name`
        if let Some(Tok::Name(n)) = self.peek() {
            if n == "del" {
                if let Some(Tok::Name(_)) = self.peek2() {
                    self.next();
                    if let Some(Tok::Name(name)) = self.next() {
                        return Ok(Stmt::Delete { name });
                    }
                }
            }
        }

        // Assignment forms need two tokens of lookahead: `name =`, `name +=` ...
        if let Some(Tok::Name(name)) = self.peek().cloned() {
            if name != "lambda" {
                let op = match self.peek2() {
                    Some(Tok::Assign) => Some(None),
                    Some(Tok::PlusAssign) => Some(Some(BinOp::Add)),
                    Some(Tok::MinusAssign) => Some(Some(BinOp::Sub)),
                    Some(Tok::StarAssign) => Some(Some(BinOp::Mul)),
                    Some(Tok::SlashAssign) => Some(Some(BinOp::Div)),
                    _ => None,
                };
                if let Some(op) = op {
                    self.next();
                    self.next();
                    let value = self.expression()?;
                    return Ok(match op {
                        None => Stmt::Assign { name, value },
                        Some(op) => Stmt::AugAssign { name, op, value },
                    });
                }
            }
        }

        Ok(Stmt::Expr(self.expression()?))
    }

    fn expression(&mut self) -> Result<Expr, LangError> {
        if let Some(Tok::Name(n)) = self.peek() {
            if n == "lambda" {
                return self.lambda();
            }
        }
        self.comparison()
    }

    fn lambda(&mut self) -> Result<Expr, LangError> {
        self.next(); // `lambda`
        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Colon) => break,
                Some(Tok::Name(_)) => {
                    if let Some(Tok::Name(p)) = self.next() {
                        params.push(p);
                    }
                    if !self.eat(&Tok::Comma) && self.peek() != Some(&Tok::Colon) {
                        return Err(self.unexpected("',' or ':' in lambda parameters"));
                    }
                }
                _ => return Err(self.unexpected("lambda parameter")),
            }
        }
        self.expect(&Tok::Colon, "':'")?;
        let body = self.expression()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn comparison(&mut self) -> Result<Expr, LangError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => Some(CmpOp::Eq),
            Some(Tok::NotEq) => Some(CmpOp::Ne),
            Some(Tok::Lt) => Some(CmpOp::Lt),
            Some(Tok::Le) => Some(CmpOp::Le),
            Some(Tok::Gt) => Some(CmpOp::Gt),
            Some(Tok::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let right = self.additive()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, LangError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, LangError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.next();
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, LangError> {
        let op = match self.peek() {
            Some(Tok::Minus) => Some(UnaryOp::Neg),
            Some(Tok::Plus) => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, LangError> {
        let base = self.postfix()?;
        if self.eat(&Tok::DoubleStar) {
            // right-associative; `-` binds looser on the left, tighter on
            // the right (`2**-1` is legal)
            let exp = self.unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, LangError> {
        let mut e = self.atom()?;
        loop {
            match self.peek() {
                Some(Tok::LParen) => {
                    self.next();
                    let args = self.call_args()?;
                    e = Expr::Call {
                        callee: Box::new(e),
                        args,
                    };
                }
                Some(Tok::Dot) => {
                    self.next();
                    let name = match self.next() {
                        Some(Tok::Name(n)) => n,
                        _ => return Err(self.unexpected("method name after '.'")),
                    };
                    self.expect(&Tok::LParen, "'(' after method name")?;
                    let args = self.call_args()?;
                    e = Expr::Method {
                        recv: Box::new(e),
                        name,
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, LangError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&Tok::Comma) {
                if self.eat(&Tok::RParen) {
                    return Ok(args);
                }
                continue;
            }
            self.expect(&Tok::RParen, "')' after call arguments")?;
            return Ok(args);
        }
    }

    fn atom(&mut self) -> Result<Expr, LangError> {
        match self.next() {
            Some(Tok::Int(v)) => Ok(Expr::Int(v)),
            Some(Tok::Float { value, raw }) => Ok(Expr::Float { value, raw }),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Template(segs)) => {
                let mut parts = Vec::new();
                for seg in segs {
                    match seg {
                        RawSeg::Lit(s) => parts.push(TemplatePart::Lit(s)),
                        RawSeg::Code(code) => parts.push(TemplatePart::Expr(parse_expr(&code)?)),
                    }
                }
                Ok(Expr::Template(parts))
            }
            Some(Tok::Name(n)) => {
                if n == "None" {
                    Ok(Expr::NoneLit)
                } else {
                    Ok(Expr::Name(n))
                }
            }
            Some(Tok::LParen) => {
                if self.eat(&Tok::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat(&Tok::RParen) {
                    return Ok(first);
                }
                let mut elts = vec![first];
                while self.eat(&Tok::Comma) {
                    if self.peek() == Some(&Tok::RParen) {
                        break;
                    }
                    elts.push(self.expression()?);
                }
                self.expect(&Tok::RParen, "')' to close tuple")?;
                Ok(Expr::Tuple(elts))
            }
            Some(t) => Err(LangError::Parse(format!("unexpected token {:?}", t))),
            None => Err(LangError::Parse("unexpected end of input".into())),
        }
    }
}
