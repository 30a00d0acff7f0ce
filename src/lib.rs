//! MinLang Compiler
//!
//! A compiler for the MinLang teaching language, targeting a small stack
//! virtual machine.
//!
//! # Architecture
//!
//! ```text
//! Source Code (.min)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → AST
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Analyzer   │  → Annotated AST (types + symbols)
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  IR Lowering│  → Three-address code
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Optimizer  │  → Three-address code (fixed point)
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Code Gen   │  → Stack VM instructions
//! └─────────────┘
//! ```
//!
//! Each stage fully consumes its input before the next begins; a stage
//! that records diagnostics stops the pipeline, and the full list is
//! surfaced rather than only the first problem.

pub mod ast;
pub mod codegen;
pub mod diag;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod span;
pub mod token;
pub mod vm;

// Re-exports for convenience
pub use codegen::CodeImage;
pub use diag::{Diagnostic, Stage};
pub use lexer::Lexer;
pub use span::Span;
pub use token::{Token, TokenKind};
pub use vm::{Vm, VmError};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for MinLang source files
pub const FILE_EXTENSION: &str = "min";

/// Compile source text to VM code with optimization on
pub fn compile(source: &str) -> Result<CodeImage, Vec<Diagnostic>> {
    compile_with(source, true)
}

/// Compile source text to VM code. Produces either the generated image or
/// every diagnostic of the first stage that failed; no code is generated
/// unless all stages succeed.
pub fn compile_with(source: &str, optimize: bool) -> Result<CodeImage, Vec<Diagnostic>> {
    let (program, parse_errors) = parser::parse(source);
    if !parse_errors.is_empty() {
        return Err(parse_errors
            .iter()
            .map(|e| Diagnostic::syntax(source, e))
            .collect());
    }

    let analysis = match sema::analyze(&program) {
        Ok(analysis) => analysis,
        Err(errors) => {
            return Err(errors
                .iter()
                .map(|e| Diagnostic::semantic(source, e))
                .collect())
        }
    };

    let mut tac = ir::lower(&program, &analysis);
    if optimize {
        tac = ir::optimize(&tac);
    }

    Ok(codegen::generate(&tac))
}
