use crate::error::LangError;

/// Raw template segment as scanned by the lexer; the parser sub-parses
/// `Code` segments into expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSeg {
    Lit(String),
    Code(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float { value: f64, raw: String },
    Str(String),
    Template(Vec<RawSeg>),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
    Comma,
    Dot,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Newline,
}

pub fn tokenize(src: &str) -> Result<Vec<Tok>, LangError> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '\n' | ';' => {
                toks.push(Tok::Newline);
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '0'..='9' => {
                let (tok, next) = lex_number(&chars, i)?;
                toks.push(tok);
                i = next;
            }
            '.' => {
                // A dot starting a number (`.5`) vs a method-call dot.
                if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
                    let (tok, next) = lex_number(&chars, i)?;
                    toks.push(tok);
                    i = next;
                } else {
                    toks.push(Tok::Dot);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let (tok, next) = lex_string(&chars, i, StrKind::Plain)?;
                toks.push(tok);
                i = next;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_continue(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                // Modifier letter directly attached to a quote.
                if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') && name.len() == 1 {
                    let kind = match name.as_str() {
                        "r" => Some(StrKind::Raw),
                        "f" => Some(StrKind::Template),
                        "d" => {
                            return Err(LangError::Parse(
                                "date literals require the auto_date rewrite".into(),
                            ))
                        }
                        _ => None,
                    };
                    if let Some(kind) = kind {
                        let (tok, next) = lex_string(&chars, i, kind)?;
                        toks.push(tok);
                        i = next;
                        continue;
                    }
                }
                toks.push(Tok::Name(name));
            }
            '+' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::PlusAssign);
                    i += 1;
                } else {
                    toks.push(Tok::Plus);
                }
            }
            '-' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::MinusAssign);
                    i += 1;
                } else {
                    toks.push(Tok::Minus);
                }
            }
            '*' => {
                i += 1;
                if chars.get(i) == Some(&'*') {
                    toks.push(Tok::DoubleStar);
                    i += 1;
                } else if chars.get(i) == Some(&'=') {
                    toks.push(Tok::StarAssign);
                    i += 1;
                } else {
                    toks.push(Tok::Star);
                }
            }
            '/' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::SlashAssign);
                    i += 1;
                } else {
                    toks.push(Tok::Slash);
                }
            }
            '%' => {
                toks.push(Tok::Percent);
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
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            ':' => {
                toks.push(Tok::Colon);
                i += 1;
            }
            '=' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::EqEq);
                    i += 1;
                } else {
                    toks.push(Tok::Assign);
                }
            }
            '!' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::NotEq);
                    i += 1;
                } else {
                    return Err(LangError::Parse("unexpected '!'".into()));
                }
            }
            '<' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::Le);
                    i += 1;
                } else {
                    toks.push(Tok::Lt);
                }
            }
            '>' => {
                i += 1;
                if chars.get(i) == Some(&'=') {
                    toks.push(Tok::Ge);
                    i += 1;
                } else {
                    toks.push(Tok::Gt);
                }
            }
            other => {
                return Err(LangError::Parse(format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(toks)
}

pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex_number(chars: &[char], start: usize) -> Result<(Tok, usize), LangError> {
    let mut i = start;

    // Hex / octal / binary.
    if chars[i] == '0' && i + 1 < chars.len() {
        let radix = match chars[i + 1] {
            'x' | 'X' => Some(16),
            'o' | 'O' => Some(8),
            'b' | 'B' => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            i += 2;
            let digits_start = i;
            while i < chars.len() && chars[i].is_digit(radix) {
                i += 1;
            }
            if i == digits_start {
                return Err(LangError::Parse("invalid numeric literal".into()));
            }
            let digits: String = chars[digits_start..i].iter().collect();
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| LangError::Overflow)?;
            return Ok((Tok::Int(value), i));
        }
    }

    let mut is_float = false;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        // `5.det()` is a method call on an int, not a float.
        let after = chars.get(i + 1);
        if after.map(|c| c.is_ascii_digit()).unwrap_or(false) || after.is_none() {
            is_float = true;
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        } else if after.map(|c| is_ident_start(*c)).unwrap_or(false) {
            // leave the dot for the parser
        } else {
            is_float = true;
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let raw: String = chars[start..i].iter().collect();
    if is_float {
        let value: f64 = raw
            .parse()
            .map_err(|_| LangError::Parse(format!("bad float literal '{}'", raw)))?;
        Ok((Tok::Float { value, raw }, i))
    } else {
        let value: i64 = raw.parse().map_err(|_| LangError::Overflow)?;
        Ok((Tok::Int(value), i))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum StrKind {
    Plain,
    Raw,
    Template,
}

fn lex_string(chars: &[char], start: usize, kind: StrKind) -> Result<(Tok, usize), LangError> {
    let quote = chars[start];
    let mut i = start + 1;

    if kind == StrKind::Template {
        let (segs, next) = lex_template_body(chars, i, quote)?;
        return Ok((Tok::Template(segs), next));
    }

    let mut out = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((Tok::Str(out), i + 1));
        }
        if c == '\\' && kind == StrKind::Plain {
            i += 1;
            let esc = chars
                .get(i)
                .ok_or_else(|| LangError::Parse("unterminated string".into()))?;
            out.push(match esc {
                'n' => '\n',
                't' => '\t',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                other => *other,
            });
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(LangError::Parse("unterminated string".into()))
}

/// Scan the body of an f-string. Interpolation braces may contain nested
/// braces and quoted strings (which may themselves contain the outer quote
/// character), so the scanner tracks both.
fn lex_template_body(
    chars: &[char],
    mut i: usize,
    quote: char,
) -> Result<(Vec<RawSeg>, usize), LangError> {
    let mut segs = Vec::new();
    let mut lit = String::new();

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            if !lit.is_empty() {
                segs.push(RawSeg::Lit(lit));
            }
            return Ok((segs, i + 1));
        }
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                lit.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                lit.push('}');
                i += 2;
            }
            '{' => {
                if !lit.is_empty() {
                    segs.push(RawSeg::Lit(std::mem::take(&mut lit)));
                }
                let mut depth = 1usize;
                let mut code = String::new();
                i += 1;
                while i < chars.len() && depth > 0 {
                    let cc = chars[i];
                    match cc {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        '"' | '\'' => {
                            // skip a nested string literal wholesale
                            let inner_quote = cc;
                            code.push(cc);
                            i += 1;
                            while i < chars.len() && chars[i] != inner_quote {
                                code.push(chars[i]);
                                if chars[i] == '\\' {
                                    i += 1;
                                    if i < chars.len() {
                                        code.push(chars[i]);
                                        i += 1;
                                    }
                                    continue;
                                }
                                i += 1;
                            }
                            if i >= chars.len() {
                                return Err(LangError::Parse(
                                    "unterminated string in template".into(),
                                ));
                            }
                        }
                        _ => {}
                    }
                    code.push(chars[i]);
                    i += 1;
                }
                if depth != 0 {
                    return Err(LangError::Parse("unterminated '{' in template".into()));
                }
                segs.push(RawSeg::Code(code));
                i += 1; // past closing '}'
            }
            '}' => {
                return Err(LangError::Parse("single '}' in template".into()));
            }
            '\\' => {
                i += 1;
                let esc = chars
                    .get(i)
                    .ok_or_else(|| LangError::Parse("unterminated template".into()))?;
                lit.push(match esc {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 1;
            }
            _ => {
                lit.push(c);
                i += 1;
            }
        }
    }
    Err(LangError::Parse("unterminated template string".into()))
}
