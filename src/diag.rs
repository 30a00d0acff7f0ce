//! Stage-tagged diagnostics
//!
//! Parse and semantic errors carry byte spans internally; this module
//! resolves them against the source into the line/column form the driver
//! reports. The pipeline surfaces the full list for a failed stage, not
//! just the first error.

use crate::parser::ParseError;
use crate::sema::SemanticError;
use crate::span::Position;
use std::fmt;

/// The pipeline stage a diagnostic came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Syntax,
    Semantic,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Syntax => write!(f, "syntax"),
            Stage::Semantic => write!(f, "semantic"),
        }
    }
}

/// A single reportable problem with its source position
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    pub fn syntax(source: &str, error: &ParseError) -> Self {
        let pos = Position::locate(source, error.span().start);
        Self {
            stage: Stage::Syntax,
            message: error.to_string(),
            line: pos.line,
            column: pos.column,
        }
    }

    pub fn semantic(source: &str, error: &SemanticError) -> Self {
        let pos = Position::locate(source, error.span.start);
        Self {
            stage: Stage::Semantic,
            message: error.to_string(),
            line: pos.line,
            column: pos.column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error at {}:{}: {}",
            self.stage, self.line, self.column, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_diagnostic_position() {
        let source = "int f() {\n  int x = ;\n}";
        let (_, errors) = crate::parser::parse(source);
        assert!(!errors.is_empty());
        let diag = Diagnostic::syntax(source, &errors[0]);
        assert_eq!(diag.stage, Stage::Syntax);
        assert_eq!(diag.line, 2);
    }

    #[test]
    fn test_semantic_diagnostic_position() {
        let source = "int main() {\n  x = 1;\n  return 0;\n}";
        let (program, _) = crate::parser::parse(source);
        let errors = crate::sema::analyze(&program).unwrap_err();
        let diag = Diagnostic::semantic(source, &errors[0]);
        assert_eq!(diag.stage, Stage::Semantic);
        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 3);
    }
}
