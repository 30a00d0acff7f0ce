//! Semantic types for MinLang
//!
//! The surface language has four value types plus `void` for function
//! returns. Two internal types exist only inside the analyzer: `Str` for
//! string literals (printable, nothing else) and `Error`, the sentinel that
//! suppresses cascading diagnostics after a failure.

use crate::ast::TypeName;
use std::fmt;

/// A resolved type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Int,
    Float,
    Bool,
    Char,
    /// Function-return type only
    Void,
    /// String literal type; admitted by `print` and nothing else
    Str,
    /// Sentinel for an expression that already produced a diagnostic
    Error,
}

impl Ty {
    /// Int or float
    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Float)
    }

    /// A type a variable can be declared with
    pub fn is_value_type(&self) -> bool {
        matches!(self, Ty::Int | Ty::Float | Ty::Bool | Ty::Char)
    }

    /// The error sentinel poisons whatever contains it
    pub fn is_error(&self) -> bool {
        matches!(self, Ty::Error)
    }
}

impl From<TypeName> for Ty {
    fn from(name: TypeName) -> Self {
        match name {
            TypeName::Int => Ty::Int,
            TypeName::Float => Ty::Float,
            TypeName::Bool => Ty::Bool,
            TypeName::Char => Ty::Char,
            TypeName::Void => Ty::Void,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ty::Int => "int",
            Ty::Float => "float",
            Ty::Bool => "bool",
            Ty::Char => "char",
            Ty::Void => "void",
            Ty::Str => "string",
            Ty::Error => "{error}",
        };
        write!(f, "{}", s)
    }
}
