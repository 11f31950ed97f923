//! PEP 508 environment markers (`python_version >= "3.8" and extra == "dev"`).
//!
//! Fromager only evaluates markers against the *current* target
//! environment (see `spec.md` Non-goals: no cross-environment SAT solving),
//! so a marker is reduced straight to a boolean rather than kept symbolic.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::version::Version;

/// The resolved values of every marker variable for the machine Fromager
/// is building for. Constructed once per run and passed down through
/// `WorkContext`.
#[derive(Debug, Clone)]
pub struct MarkerEnvironment {
    values: HashMap<String, String>,
}

impl MarkerEnvironment {
    #[must_use]
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// A reasonable default for the host Fromager itself is running on,
    /// used by tests and as a CLI fallback before real interpreter
    /// introspection plugs in real values.
    #[must_use]
    pub fn current_platform_default() -> Self {
        let mut values = HashMap::new();
        values.insert("python_version".into(), "3.11".into());
        values.insert("python_full_version".into(), "3.11.6".into());
        values.insert("os_name".into(), "posix".into());
        values.insert("sys_platform".into(), "linux".into());
        values.insert("platform_machine".into(), "x86_64".into());
        values.insert("platform_python_implementation".into(), "CPython".into());
        values.insert("implementation_name".into(), "cpython".into());
        values.insert("implementation_version".into(), "3.11.6".into());
        values.insert("platform_system".into(), "Linux".into());
        values.insert("platform_release".into(), "".into());
        values.insert("platform_version".into(), "".into());
        Self::new(values)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set_extra(&mut self, extra: Option<&str>) {
        match extra {
            Some(e) => {
                self.values.insert("extra".into(), e.to_string());
            }
            None => {
                self.values.remove("extra");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    TildeEq,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
enum Side {
    Var(String),
    Literal(String),
}

#[derive(Debug, Clone)]
enum Marker {
    Expr { lhs: Side, op: MarkerOp, rhs: Side },
    And(Vec<Marker>),
    Or(Vec<Marker>),
}

/// A parsed, evaluable PEP 508 marker.
#[derive(Debug, Clone)]
pub struct MarkerTree {
    root: Marker,
    raw: String,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid marker expression: `{0}`")]
pub struct MarkerParseError(pub String);

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek_word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let (start, _) = *self.chars.peek()?;
        let mut end = start;
        for (i, c) in self.remaining_from(start) {
            if c.is_alphanumeric() || c == '_' {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        if end > start {
            Some(&self.source[start..end])
        } else {
            None
        }
    }

    fn remaining_from(&self, start: usize) -> impl Iterator<Item = (usize, char)> + 'a {
        self.source[start..]
            .char_indices()
            .map(move |(i, c)| (i + start, c))
    }

    fn consume_word(&mut self) -> Option<String> {
        let word = self.peek_word()?.to_string();
        for _ in 0..word.chars().count() {
            self.chars.next();
        }
        Some(word)
    }

    fn try_consume_keyword(&mut self, kw: &str) -> bool {
        self.skip_ws();
        let save = self.chars.clone();
        if let Some(word) = self.peek_word() {
            if word.eq_ignore_ascii_case(kw) {
                self.consume_word();
                return true;
            }
        }
        self.chars = save;
        false
    }

    fn peek_char(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().map(|(_, c)| *c)
    }

    fn consume_char(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.next().map(|(_, c)| c)
    }

    fn parse_markers(&mut self) -> Result<Marker, MarkerParseError> {
        let mut terms = vec![self.parse_and()?];
        while self.try_consume_keyword("or") {
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Marker::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Marker, MarkerParseError> {
        let mut terms = vec![self.parse_atom()?];
        while self.try_consume_keyword("and") {
            terms.push(self.parse_atom()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Marker::And(terms)
        })
    }

    fn parse_atom(&mut self) -> Result<Marker, MarkerParseError> {
        if self.peek_char() == Some('(') {
            self.consume_char();
            let inner = self.parse_markers()?;
            self.skip_ws();
            if self.consume_char() != Some(')') {
                return Err(MarkerParseError(self.source.to_string()));
            }
            return Ok(inner);
        }
        let lhs = self.parse_side()?;
        let op = self.parse_op()?;
        let rhs = self.parse_side()?;
        Ok(Marker::Expr { lhs, op, rhs })
    }

    fn parse_side(&mut self) -> Result<Side, MarkerParseError> {
        self.skip_ws();
        match self.peek_char() {
            Some('\'') | Some('"') => {
                let quote = self.consume_char().unwrap();
                let mut s = String::new();
                loop {
                    match self.chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => s.push(c),
                        None => return Err(MarkerParseError(self.source.to_string())),
                    }
                }
                Ok(Side::Literal(s))
            }
            Some(_) => {
                let word = self
                    .consume_word()
                    .ok_or_else(|| MarkerParseError(self.source.to_string()))?;
                Ok(Side::Var(word))
            }
            None => Err(MarkerParseError(self.source.to_string())),
        }
    }

    fn parse_op(&mut self) -> Result<MarkerOp, MarkerParseError> {
        self.skip_ws();
        if self.try_consume_keyword("not") {
            if !self.try_consume_keyword("in") {
                return Err(MarkerParseError(self.source.to_string()));
            }
            return Ok(MarkerOp::NotIn);
        }
        if self.try_consume_keyword("in") {
            return Ok(MarkerOp::In);
        }
        let mut op = String::new();
        while matches!(self.peek_char(), Some(c) if "=!<>~".contains(c)) {
            op.push(self.consume_char().unwrap());
        }
        match op.as_str() {
            "==" => Ok(MarkerOp::Eq),
            "!=" => Ok(MarkerOp::NotEq),
            "<" => Ok(MarkerOp::Lt),
            "<=" => Ok(MarkerOp::LtEq),
            ">" => Ok(MarkerOp::Gt),
            ">=" => Ok(MarkerOp::GtEq),
            "~=" => Ok(MarkerOp::TildeEq),
            _ => Err(MarkerParseError(self.source.to_string())),
        }
    }
}

impl FromStr for MarkerTree {
    type Err = MarkerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(s);
        let root = parser.parse_markers()?;
        parser.skip_ws();
        if parser.chars.peek().is_some() {
            return Err(MarkerParseError(s.to_string()));
        }
        Ok(Self {
            root,
            raw: s.trim().to_string(),
        })
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn resolve<'a>(side: &'a Side, env: &'a MarkerEnvironment) -> String {
    match side {
        Side::Literal(s) => s.clone(),
        Side::Var(name) => env.get(name).unwrap_or_default().to_string(),
    }
}

fn eval_marker(marker: &Marker, env: &MarkerEnvironment) -> bool {
    match marker {
        Marker::And(terms) => terms.iter().all(|t| eval_marker(t, env)),
        Marker::Or(terms) => terms.iter().any(|t| eval_marker(t, env)),
        Marker::Expr { lhs, op, rhs } => {
            let lhs_val = resolve(lhs, env);
            let rhs_val = resolve(rhs, env);
            match op {
                MarkerOp::In => rhs_val.contains(&lhs_val),
                MarkerOp::NotIn => !rhs_val.contains(&lhs_val),
                _ => eval_comparison(&lhs_val, *op, &rhs_val),
            }
        }
    }
}

fn eval_comparison(lhs: &str, op: MarkerOp, rhs: &str) -> bool {
    if let (Ok(lv), Ok(rv)) = (Version::from_str(lhs), Version::from_str(rhs)) {
        return match op {
            MarkerOp::Eq => lv == rv,
            MarkerOp::NotEq => lv != rv,
            MarkerOp::Lt => lv < rv,
            MarkerOp::LtEq => lv <= rv,
            MarkerOp::Gt => lv > rv,
            MarkerOp::GtEq => lv >= rv,
            MarkerOp::TildeEq => lv >= rv,
            MarkerOp::In | MarkerOp::NotIn => unreachable!("handled by caller"),
        };
    }
    match op {
        MarkerOp::Eq => lhs == rhs,
        MarkerOp::NotEq => lhs != rhs,
        MarkerOp::Lt => lhs < rhs,
        MarkerOp::LtEq => lhs <= rhs,
        MarkerOp::Gt => lhs > rhs,
        MarkerOp::GtEq => lhs >= rhs,
        MarkerOp::TildeEq => lhs == rhs,
        MarkerOp::In | MarkerOp::NotIn => unreachable!("handled by caller"),
    }
}

impl MarkerTree {
    /// Evaluate this marker against a concrete environment.
    #[must_use]
    pub fn evaluate(&self, env: &MarkerEnvironment) -> bool {
        eval_marker(&self.root, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> MarkerEnvironment {
        MarkerEnvironment::current_platform_default()
    }

    #[test]
    fn test_simple_version_compare() {
        let m: MarkerTree = "python_version >= \"3.8\"".parse().unwrap();
        assert!(m.evaluate(&env()));
        let m: MarkerTree = "python_version < \"3.0\"".parse().unwrap();
        assert!(!m.evaluate(&env()));
    }

    #[test]
    fn test_and_or() {
        let m: MarkerTree =
            "os_name == \"posix\" and (sys_platform == \"darwin\" or sys_platform == \"linux\")"
                .parse()
                .unwrap();
        assert!(m.evaluate(&env()));
    }

    #[test]
    fn test_extra() {
        let m: MarkerTree = "extra == \"test\"".parse().unwrap();
        let mut e = env();
        assert!(!m.evaluate(&e));
        e.set_extra(Some("test"));
        assert!(m.evaluate(&e));
    }

    #[test]
    fn test_in_operator() {
        let m: MarkerTree = "platform_machine in \"x86_64 aarch64\"".parse().unwrap();
        assert!(m.evaluate(&env()));
    }
}
