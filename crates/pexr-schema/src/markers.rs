//! Environment markers (`python_version >= "3.8" and sys_platform == "linux"`).
//!
//! Markers gate dependency declarations on properties of the target. They are
//! parsed into a small expression tree and evaluated against a
//! [`MarkerEnvironment`] plus the set of extras requested for the package that
//! declared them.

use crate::types::PackageName;
use crate::version::{Operator, Version, VersionSpecifier};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a marker expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    /// A name that is neither a known variable nor a quoted string.
    #[error("Unknown marker variable '{0}'")]
    UnknownVariable(String),

    /// The expression ended early or contained an unexpected token.
    #[error("Invalid marker at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the marker text.
        offset: usize,
        /// What was expected.
        message: String,
    },
}

/// Values a marker may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    /// `3.9`
    pub python_version: String,
    /// `3.9.1`
    pub python_full_version: String,
    /// `linux`, `darwin`, `win32`
    pub sys_platform: String,
    /// `Linux`, `Darwin`, `Windows`
    pub platform_system: String,
    /// `x86_64`, `arm64`
    pub platform_machine: String,
    /// `posix` or `nt`
    pub os_name: String,
    /// `cpython`, `pypy`
    pub implementation_name: String,
    /// `CPython`, `PyPy`
    pub platform_python_implementation: String,
}

/// A variable that can appear in a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerVariable {
    /// `python_version`
    PythonVersion,
    /// `python_full_version`
    PythonFullVersion,
    /// `sys_platform`
    SysPlatform,
    /// `platform_system`
    PlatformSystem,
    /// `platform_machine`
    PlatformMachine,
    /// `os_name`
    OsName,
    /// `implementation_name`
    ImplementationName,
    /// `platform_python_implementation`
    PlatformPythonImplementation,
    /// `extra`
    Extra,
}

impl MarkerVariable {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "python_version" => Self::PythonVersion,
            "python_full_version" => Self::PythonFullVersion,
            "sys_platform" | "sys.platform" => Self::SysPlatform,
            "platform_system" => Self::PlatformSystem,
            "platform_machine" | "platform.machine" => Self::PlatformMachine,
            "os_name" | "os.name" => Self::OsName,
            "implementation_name" => Self::ImplementationName,
            "platform_python_implementation" | "python_implementation" => {
                Self::PlatformPythonImplementation
            }
            "extra" => Self::Extra,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::PythonVersion => "python_version",
            Self::PythonFullVersion => "python_full_version",
            Self::SysPlatform => "sys_platform",
            Self::PlatformSystem => "platform_system",
            Self::PlatformMachine => "platform_machine",
            Self::OsName => "os_name",
            Self::ImplementationName => "implementation_name",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::Extra => "extra",
        }
    }

    fn lookup(self, env: &MarkerEnvironment) -> &str {
        match self {
            Self::PythonVersion => &env.python_version,
            Self::PythonFullVersion => &env.python_full_version,
            Self::SysPlatform => &env.sys_platform,
            Self::PlatformSystem => &env.platform_system,
            Self::PlatformMachine => &env.platform_machine,
            Self::OsName => &env.os_name,
            Self::ImplementationName => &env.implementation_name,
            Self::PlatformPythonImplementation => &env.platform_python_implementation,
            Self::Extra => "",
        }
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    /// An environment variable.
    Variable(MarkerVariable),
    /// A quoted string literal.
    Literal(String),
}

impl std::fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(var) => f.write_str(var.as_str()),
            Self::Literal(s) if s.contains('"') => write!(f, "'{s}'"),
            Self::Literal(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Comparison operator inside a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    /// A version comparison operator (falls back to string equality).
    Version(Operator),
    /// Substring containment.
    In,
    /// Negated substring containment.
    NotIn,
}

impl std::fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Version(op) => write!(f, "{op}"),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
        }
    }
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerExpr {
    /// `lhs op rhs`
    Compare {
        /// Left operand.
        lhs: MarkerValue,
        /// Operator.
        op: MarkerOp,
        /// Right operand.
        rhs: MarkerValue,
    },
    /// Both sides must hold.
    And(Box<MarkerExpr>, Box<MarkerExpr>),
    /// Either side must hold.
    Or(Box<MarkerExpr>, Box<MarkerExpr>),
}

impl MarkerExpr {
    /// Evaluate against `env`, with `extras` as the extras requested for the
    /// declaring package. `extra == "x"` holds iff `x` was requested.
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[String]) -> bool {
        match self {
            Self::And(a, b) => a.evaluate(env, extras) && b.evaluate(env, extras),
            Self::Or(a, b) => a.evaluate(env, extras) || b.evaluate(env, extras),
            Self::Compare { lhs, op, rhs } => compare(lhs, *op, rhs, env, extras),
        }
    }

    /// Whether the expression references the `extra` variable anywhere.
    pub fn references_extra(&self) -> bool {
        match self {
            Self::And(a, b) | Self::Or(a, b) => a.references_extra() || b.references_extra(),
            Self::Compare { lhs, rhs, .. } => [lhs, rhs]
                .iter()
                .any(|v| matches!(v, MarkerValue::Variable(MarkerVariable::Extra))),
        }
    }
}

fn compare(
    lhs: &MarkerValue,
    op: MarkerOp,
    rhs: &MarkerValue,
    env: &MarkerEnvironment,
    extras: &[String],
) -> bool {
    let extra_literal = match (lhs, rhs) {
        (MarkerValue::Variable(MarkerVariable::Extra), MarkerValue::Literal(s))
        | (MarkerValue::Literal(s), MarkerValue::Variable(MarkerVariable::Extra)) => Some(s),
        _ => None,
    };
    if let Some(wanted) = extra_literal {
        let wanted = PackageName::new(wanted);
        let requested = extras.iter().any(|e| PackageName::new(e) == wanted);
        return match op {
            MarkerOp::Version(Operator::Equal | Operator::ArbitraryEqual) => requested,
            MarkerOp::Version(Operator::NotEqual) => !requested,
            _ => false,
        };
    }

    let resolve = |value: &MarkerValue| -> String {
        match value {
            MarkerValue::Variable(var) => var.lookup(env).to_string(),
            MarkerValue::Literal(s) => s.clone(),
        }
    };
    let left = resolve(lhs);
    let right = resolve(rhs);

    match op {
        MarkerOp::In => right.contains(&left),
        MarkerOp::NotIn => !right.contains(&left),
        MarkerOp::Version(operator) => {
            let as_version = left.parse::<Version>().ok().zip(
                format!("{operator}{right}")
                    .parse::<VersionSpecifier>()
                    .ok(),
            );
            match (as_version, operator) {
                (Some((version, spec)), _) => spec.contains(&version),
                (None, Operator::Equal | Operator::ArbitraryEqual) => left == right,
                (None, Operator::NotEqual) => left != right,
                (None, _) => false,
            }
        }
    }
}

impl FromStr for MarkerExpr {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { input: s, pos: 0 };
        let expr = parser.parse_or()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("end of marker"));
        }
        Ok(expr)
    }
}

impl std::fmt::Display for MarkerExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compare { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::Or(a, b) => write!(f, "{a} or {b}"),
            Self::And(a, b) => {
                for (i, side) in [a, b].into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(side.as_ref(), Self::Or(..)) {
                        write!(f, "({side})")?;
                    } else {
                        write!(f, "{side}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn error(&self, expected: &str) -> MarkerError {
        MarkerError::Syntax {
            offset: self.pos,
            message: format!("expected {expected}"),
        }
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let Some(after) = self.rest().strip_prefix(keyword) else {
            return false;
        };
        let boundary = after
            .chars()
            .next()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'));
        if boundary {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<MarkerExpr, MarkerError> {
        let mut expr = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            expr = MarkerExpr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<MarkerExpr, MarkerError> {
        let mut expr = self.parse_atom()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_atom()?;
            expr = MarkerExpr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<MarkerExpr, MarkerError> {
        if self.eat("(") {
            let expr = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error("')'"));
            }
            return Ok(expr);
        }
        let lhs = self.parse_value()?;
        let op = self.parse_op()?;
        let rhs = self.parse_value()?;
        Ok(MarkerExpr::Compare { lhs, op, rhs })
    }

    fn parse_op(&mut self) -> Result<MarkerOp, MarkerError> {
        const OPS: [(&str, Operator); 8] = [
            ("===", Operator::ArbitraryEqual),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("~=", Operator::Compatible),
            ("<", Operator::Less),
            (">", Operator::Greater),
        ];
        for (token, op) in OPS {
            if self.eat(token) {
                return Ok(MarkerOp::Version(op));
            }
        }
        if self.eat_keyword("in") {
            return Ok(MarkerOp::In);
        }
        if self.eat_keyword("not") {
            if self.eat_keyword("in") {
                return Ok(MarkerOp::NotIn);
            }
            return Err(self.error("'in' after 'not'"));
        }
        Err(self.error("comparison operator"))
    }

    fn parse_value(&mut self) -> Result<MarkerValue, MarkerError> {
        self.skip_ws();
        let rest = self.rest();
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body.find(quote).ok_or_else(|| self.error("closing quote"))?;
                let literal = body[..end].to_string();
                self.pos += end + 2;
                Ok(MarkerValue::Literal(literal))
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(rest.len());
                let name = &rest[..len];
                let var = MarkerVariable::from_name(name)
                    .ok_or_else(|| MarkerError::UnknownVariable(name.to_string()))?;
                self.pos += len;
                Ok(MarkerValue::Variable(var))
            }
            _ => Err(self.error("marker variable or quoted string")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_39() -> MarkerEnvironment {
        MarkerEnvironment {
            python_version: "3.9".into(),
            python_full_version: "3.9.1".into(),
            sys_platform: "linux".into(),
            platform_system: "Linux".into(),
            platform_machine: "x86_64".into(),
            os_name: "posix".into(),
            implementation_name: "cpython".into(),
            platform_python_implementation: "CPython".into(),
        }
    }

    fn eval(marker: &str) -> bool {
        marker
            .parse::<MarkerExpr>()
            .unwrap()
            .evaluate(&linux_39(), &[])
    }

    #[test]
    fn version_comparisons_use_version_order() {
        assert!(eval("python_version >= '3.8'"));
        assert!(eval("python_version < \"3.10\""));
        assert!(!eval("python_version < '3'"));
        assert!(eval("python_full_version == '3.9.*'"));
    }

    #[test]
    fn string_comparisons_and_containment() {
        assert!(eval("sys_platform == 'linux'"));
        assert!(eval("sys_platform != 'win32'"));
        assert!(eval("'lin' in sys_platform"));
        assert!(eval("'win' not in sys_platform"));
    }

    #[test]
    fn boolean_structure_and_precedence() {
        assert!(eval("sys_platform == 'win32' or python_version >= '3' and os_name == 'posix'"));
        assert!(!eval("(sys_platform == 'win32' or python_version >= '3') and os_name == 'nt'"));
    }

    #[test]
    fn extra_matches_requested_extras_only() {
        let marker: MarkerExpr = "extra == 'Socks'".parse().unwrap();
        assert!(marker.references_extra());
        assert!(!marker.evaluate(&linux_39(), &[]));
        assert!(marker.evaluate(&linux_39(), &["socks".to_string()]));
    }

    #[test]
    fn rejects_unknown_variables_and_bad_syntax() {
        assert!(matches!(
            "python_flavor == '3'".parse::<MarkerExpr>(),
            Err(MarkerError::UnknownVariable(_))
        ));
        assert!("python_version >= ".parse::<MarkerExpr>().is_err());
        assert!("(os_name == 'nt'".parse::<MarkerExpr>().is_err());
        assert!("os_name == 'nt' xor".parse::<MarkerExpr>().is_err());
    }

    #[test]
    fn display_is_reparseable() {
        let marker: MarkerExpr = "(os_name=='nt' or extra=='a') and python_version>'3'"
            .parse()
            .unwrap();
        let rendered = marker.to_string();
        assert_eq!(
            rendered,
            "(os_name == \"nt\" or extra == \"a\") and python_version > \"3\""
        );
        assert_eq!(rendered.parse::<MarkerExpr>().unwrap(), marker);
    }
}
