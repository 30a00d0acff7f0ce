//! Semantic analysis for MinLang
//!
//! The analyzer resolves every identifier against the scope chain, checks
//! types against the operator signature table, and annotates the AST (via
//! side tables keyed by node id) with resolved types and symbols.
//!
//! # Architecture
//!
//! Analysis runs in two phases:
//! 1. **Collection**: register every top-level function signature, so
//!    forward and mutually recursive calls resolve.
//! 2. **Checking**: check global declarations in order, then each function
//!    body against its own scope stack.
//!
//! Analysis fails closed: errors accumulate so independent problems are all
//! reported, but any recorded error prevents IR generation.

mod check;
mod context;
mod error;
mod ty;

pub use check::Analyzer;
pub use context::{FnSig, ScopeId, Symbol, SymbolId, SymbolKind, SymbolTable};
pub use error::{SemanticError, SemanticErrorKind};
pub use ty::Ty;

use crate::ast::{NodeId, Program};
use std::collections::HashMap;

/// The result of a successful analysis: the annotations later stages read
#[derive(Debug)]
pub struct Analysis {
    /// Resolved type of every expression node
    pub expr_types: HashMap<NodeId, Ty>,
    /// Resolved symbol of every identifier, call, and declaration node
    pub resolutions: HashMap<NodeId, SymbolId>,
    /// Symbol arena the resolutions point into
    pub symbols: Vec<Symbol>,
    /// Registered function signatures
    pub functions: HashMap<String, FnSig>,
}

impl Analysis {
    /// Resolved type of an expression node
    pub fn ty(&self, id: NodeId) -> Ty {
        self.expr_types.get(&id).copied().unwrap_or(Ty::Error)
    }

    /// Resolved symbol of an identifier/call/declaration node
    pub fn symbol(&self, id: NodeId) -> Option<&Symbol> {
        self.resolutions.get(&id).map(|&sym| &self.symbols[sym])
    }
}

/// Main entry point for analyzing a program
pub fn analyze(program: &Program) -> Result<Analysis, Vec<SemanticError>> {
    let mut analyzer = Analyzer::new();

    // Phase 1: collect function signatures
    analyzer.register_functions(program);

    // Phase 2: check globals in order, then every function body
    for global in &program.globals {
        analyzer.check_var_decl(global);
    }
    for function in &program.functions {
        analyzer.check_function(function);
    }

    let (errors, expr_types, resolutions, table) = analyzer.into_results();
    if errors.is_empty() {
        let (symbols, functions) = table.into_parts();
        Ok(Analysis {
            expr_types,
            resolutions,
            symbols,
            functions,
        })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn check_ok(source: &str) -> Analysis {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "Parse errors: {:?}", errors);
        analyze(&program).expect("analysis failed")
    }

    fn check_err(source: &str) -> Vec<SemanticError> {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "Parse errors: {:?}", errors);
        analyze(&program).expect_err("expected semantic errors")
    }

    #[test]
    fn test_simple_function() {
        check_ok("int main() { int x = 5; print(x); return 0; }");
    }

    #[test]
    fn test_undeclared_identifier() {
        let errors = check_err("int main() { x = 1; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::UndeclaredIdentifier { .. }
        ));
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let errors = check_err("int main() { int x; float x; return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::Redeclaration { .. }
        ));
    }

    #[test]
    fn test_shadowing_is_allowed() {
        check_ok("int main() { int x = 1; { float x = 2.0; print(x); } print(x); return 0; }");
    }

    #[test]
    fn test_type_mismatch_on_assignment() {
        let errors = check_err("int main() { int x; x = 1.5; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_string_assigned_to_int() {
        // Exactly one diagnostic, no cascade
        let errors = check_err("int main() { int x; x = \"hello\"; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_char_assigned_to_int() {
        let errors = check_err("int main() { int x; x = 'a'; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_arithmetic_requires_matching_types() {
        let errors = check_err("int main() { int x = 1 + 1.5; return 0; }");
        // The bad addition reports once; the declaration init is suppressed
        // by the error sentinel.
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_relational_yields_bool() {
        check_ok("int main() { bool b = 1 < 2; return 0; }");
        let errors = check_err("int main() { int b = 1 < 2; return 0; }");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_logical_requires_bool() {
        let errors = check_err("int main() { bool b = 1 && true; return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_unary_not_requires_bool() {
        let errors = check_err("int main() { bool b = !1; return 0; }");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_const_requires_initializer() {
        let errors = check_err("int main() { const int MAX; return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::MissingInitializer { .. }
        ));
    }

    #[test]
    fn test_assignment_to_const() {
        let errors = check_err("int main() { const int MAX = 100; MAX = 5; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::InvalidAssignment { .. }
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let errors = check_err("int foo(int a) { return a; } int main() { foo(1, 2); return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::ArityMismatch { .. }
        ));
    }

    #[test]
    fn test_argument_type_mismatch() {
        let errors =
            check_err("int foo(int a) { return a; } int main() { foo(true); return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::ArgumentTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_forward_call() {
        check_ok("int main() { return helper(); } int helper() { return 7; }");
    }

    #[test]
    fn test_mutual_recursion() {
        check_ok(
            "bool is_even(int n) { if (n == 0) return true; return is_odd(n - 1); } \
             bool is_odd(int n) { if (n == 0) return false; return is_even(n - 1); } \
             int main() { return 0; }",
        );
    }

    #[test]
    fn test_non_boolean_condition() {
        let errors = check_err("int main() { if (1) return 0; return 1; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::NonBooleanCondition { .. }
        ));
    }

    #[test]
    fn test_missing_return() {
        let errors = check_err("int f(int n) { if (n > 0) return 1; } int main() { return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::MissingReturn { .. }
        ));
    }

    #[test]
    fn test_both_branches_return() {
        check_ok("int sign(int n) { if (n < 0) return -1; else return 1; } int main() { return 0; }");
    }

    #[test]
    fn test_loop_does_not_satisfy_return() {
        let errors =
            check_err("int f() { while (true) return 1; } int main() { return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::MissingReturn { .. }
        ));
    }

    #[test]
    fn test_early_return_makes_rest_unreachable() {
        check_ok("int f(int n) { if (n <= 1) return 1; return n * f(n - 1); } int main() { return 0; }");
    }

    #[test]
    fn test_void_function_needs_no_return() {
        check_ok("void f() { print(1); } int main() { f(); return 0; }");
    }

    #[test]
    fn test_return_value_from_void() {
        let errors = check_err("void f() { return 1; } int main() { return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_multiple_independent_errors() {
        let errors = check_err(
            "int main() { x = 1; y = 2; return 0; }",
        );
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_error_sentinel_suppresses_cascade() {
        // `x` is undeclared; the uses of the poisoned value stay quiet
        let errors = check_err("int main() { int y = x + 1 * 2; return 0; }");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_annotations_recorded() {
        let (program, _) = crate::parser::parse("int main() { int a = 1; a = a + 2; return a; }");
        let analysis = analyze(&program).unwrap();
        // Every expression of an accepted program has a non-error type
        for (_, ty) in &analysis.expr_types {
            assert!(!ty.is_error());
        }
        // Local `a` got the first non-parameter slot
        let decl = match &program.functions[0].body.stmts[0].kind {
            crate::ast::StmtKind::VarDecl(d) => d,
            _ => panic!("expected declaration"),
        };
        let symbol = analysis.symbol(decl.id).expect("declaration resolved");
        assert_eq!(symbol.slot, 0);
        assert_eq!(symbol.kind, SymbolKind::Var);
    }

    #[test]
    fn test_globals_visible_in_functions() {
        check_ok("int counter = 0; void tick() { counter = counter + 1; } int main() { tick(); return counter; }");
    }

    #[test]
    fn test_read_requires_mutable_target() {
        let errors = check_err("int main() { const int MAX = 1; read(MAX); return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::InvalidAssignment { .. }
        ));
    }

    #[test]
    fn test_print_accepts_string_literal() {
        check_ok("int main() { print(\"hello\"); return 0; }");
    }

    #[test]
    fn test_calling_a_variable() {
        let errors = check_err("int main() { int f = 1; f(); return 0; }");
        assert!(matches!(
            errors[0].kind,
            SemanticErrorKind::NotCallable { .. }
        ));
    }
}
