//! The semantic analyzer walk
//!
//! Resolves identifiers against the scope chain, checks types against the
//! operator signature table, and records each expression's resolved type and
//! symbol in side tables. Errors accumulate; a failed subexpression gets the
//! `Error` sentinel so one root cause does not fan out into noise.

use crate::ast::*;
use crate::sema::context::{FnSig, SymbolId, SymbolKind, SymbolTable};
use crate::sema::error::SemanticError;
use crate::sema::Ty;
use std::collections::HashMap;

/// The analyzer state for one program
pub struct Analyzer {
    table: SymbolTable,
    errors: Vec<SemanticError>,
    expr_types: HashMap<NodeId, Ty>,
    resolutions: HashMap<NodeId, SymbolId>,
    /// Return type of the function currently being checked
    current_ret: Ty,
    /// Next local slot in the current function (parameters first)
    next_slot: u32,
    /// Next global slot
    next_global: u32,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            table: SymbolTable::new(),
            errors: Vec::new(),
            expr_types: HashMap::new(),
            resolutions: HashMap::new(),
            current_ret: Ty::Void,
            next_slot: 0,
            next_global: 0,
        }
    }

    pub fn into_results(
        self,
    ) -> (
        Vec<SemanticError>,
        HashMap<NodeId, Ty>,
        HashMap<NodeId, SymbolId>,
        SymbolTable,
    ) {
        (self.errors, self.expr_types, self.resolutions, self.table)
    }

    // ============ Registration ============

    /// Pre-register every function signature so bodies can call forward
    /// and mutually recursive functions.
    pub fn register_functions(&mut self, program: &Program) {
        for f in &program.functions {
            let sig = FnSig {
                name: f.name.name.clone(),
                params: f.params.iter().map(|p| Ty::from(p.ty)).collect(),
                ret: Ty::from(f.return_type),
                span: f.name.span,
            };
            if !self.table.register_function(sig) {
                self.errors
                    .push(SemanticError::redeclaration(&f.name.name, f.name.span));
                continue;
            }
            // Functions share the global namespace with variables
            self.table.define(
                &f.name.name,
                Ty::from(f.return_type),
                SymbolKind::Function,
                0,
            );
        }
    }

    // ============ Declarations ============

    pub fn check_var_decl(&mut self, decl: &VarDecl) {
        let decl_ty = Ty::from(decl.ty);

        let init_ty = decl.init.as_ref().map(|e| self.check_expr(e));

        if decl.is_const && decl.init.is_none() {
            self.errors.push(SemanticError::missing_initializer(
                &decl.name.name,
                decl.name.span,
            ));
        }

        if let (Some(ty), Some(init)) = (init_ty, decl.init.as_ref()) {
            if ty != decl_ty && !ty.is_error() {
                self.errors
                    .push(SemanticError::type_mismatch("=", decl_ty, ty, init.span));
            }
        }

        let slot = if self.table.depth() == 0 {
            let slot = self.next_global;
            self.next_global += 1;
            slot
        } else {
            let slot = self.next_slot;
            self.next_slot += 1;
            slot
        };

        let kind = if decl.is_const {
            SymbolKind::Const
        } else {
            SymbolKind::Var
        };

        match self.table.define(&decl.name.name, decl_ty, kind, slot) {
            Some(id) => {
                self.resolutions.insert(decl.id, id);
            }
            None => {
                self.errors
                    .push(SemanticError::redeclaration(&decl.name.name, decl.name.span));
            }
        }
    }

    pub fn check_function(&mut self, f: &FnDecl) {
        self.current_ret = Ty::from(f.return_type);
        self.next_slot = 0;

        self.table.enter_scope();

        for param in &f.params {
            let slot = self.next_slot;
            self.next_slot += 1;
            if self
                .table
                .define(&param.name.name, Ty::from(param.ty), SymbolKind::Param, slot)
                .is_none()
            {
                self.errors.push(SemanticError::redeclaration(
                    &param.name.name,
                    param.name.span,
                ));
            }
        }

        // The body block shares the parameter scope, so a top-level local
        // that collides with a parameter is a redeclaration.
        for stmt in &f.body.stmts {
            self.check_stmt(stmt);
        }

        self.table.leave_scope();

        if self.current_ret != Ty::Void && !block_always_returns(&f.body.stmts) {
            self.errors
                .push(SemanticError::missing_return(&f.name.name, f.name.span));
        }
    }

    // ============ Statements ============

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl(decl) => self.check_var_decl(decl),

            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond);
                self.check_scoped_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_scoped_stmt(else_branch);
                }
            }

            StmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_scoped_stmt(body);
            }

            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                // The init clause scopes over condition, update, and body
                self.table.enter_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                self.check_condition(cond);
                if let Some(update) = update {
                    self.check_stmt(update);
                }
                self.check_scoped_stmt(body);
                self.table.leave_scope();
            }

            StmtKind::Assign { target, value } => {
                let value_ty = self.check_expr(value);
                if let Some(target_ty) = self.check_lvalue(target) {
                    if value_ty != target_ty && !value_ty.is_error() && !target_ty.is_error() {
                        self.errors.push(SemanticError::type_mismatch(
                            "=", target_ty, value_ty, value.span,
                        ));
                    }
                }
            }

            StmtKind::Return { value } => {
                let value_ty = value.as_ref().map(|e| self.check_expr(e));
                match (self.current_ret, value_ty) {
                    (Ty::Void, Some(ty)) if !ty.is_error() => {
                        self.errors.push(SemanticError::type_mismatch(
                            "return",
                            Ty::Void,
                            ty,
                            stmt.span,
                        ));
                    }
                    (ret, None) if ret != Ty::Void => {
                        self.errors.push(SemanticError::type_mismatch(
                            "return",
                            ret,
                            Ty::Void,
                            stmt.span,
                        ));
                    }
                    (ret, Some(ty)) if ret != Ty::Void && ty != ret && !ty.is_error() => {
                        self.errors.push(SemanticError::type_mismatch(
                            "return", ret, ty, stmt.span,
                        ));
                    }
                    _ => {}
                }
            }

            StmtKind::Read { target } => {
                self.check_lvalue(target);
            }

            StmtKind::Print { value } => {
                let ty = self.check_expr(value);
                if ty == Ty::Void {
                    self.errors
                        .push(SemanticError::unary_type_mismatch("print", ty, value.span));
                }
            }

            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }

            StmtKind::Block(block) => {
                self.table.enter_scope();
                for stmt in &block.stmts {
                    self.check_stmt(stmt);
                }
                self.table.leave_scope();
            }
        }
    }

    /// Check a branch/loop body in its own scope
    fn check_scoped_stmt(&mut self, stmt: &Stmt) {
        self.table.enter_scope();
        self.check_stmt(stmt);
        self.table.leave_scope();
    }

    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.check_expr(cond);
        if ty != Ty::Bool && !ty.is_error() {
            self.errors
                .push(SemanticError::non_boolean_condition(ty, cond.span));
        }
    }

    /// Resolve an assignment/read target. Returns the target's type when it
    /// names an assignable variable, `None` after reporting otherwise.
    fn check_lvalue(&mut self, target: &Expr) -> Option<Ty> {
        let ExprKind::Ident(name) = &target.kind else {
            self.errors
                .push(SemanticError::invalid_assignment("expression", target.span));
            self.expr_types.insert(target.id, Ty::Error);
            return None;
        };

        let Some(id) = self.table.lookup(&name.name) else {
            self.errors
                .push(SemanticError::undeclared_identifier(&name.name, target.span));
            self.expr_types.insert(target.id, Ty::Error);
            return None;
        };

        self.resolutions.insert(target.id, id);
        let symbol = self.table.symbol(id);
        self.expr_types.insert(target.id, symbol.ty);

        if !symbol.is_assignable() {
            self.errors
                .push(SemanticError::invalid_assignment(&name.name, target.span));
            return None;
        }

        Some(symbol.ty)
    }

    // ============ Expressions ============

    fn check_expr(&mut self, expr: &Expr) -> Ty {
        let ty = match &expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Int(_) => Ty::Int,
                Literal::Float(_) => Ty::Float,
                Literal::Bool(_) => Ty::Bool,
                Literal::Char(_) => Ty::Char,
                Literal::Str(_) => Ty::Str,
            },

            ExprKind::Ident(name) => match self.table.lookup(&name.name) {
                Some(id) => {
                    self.resolutions.insert(expr.id, id);
                    let symbol = self.table.symbol(id);
                    if symbol.kind == SymbolKind::Function {
                        self.errors
                            .push(SemanticError::function_as_value(&name.name, expr.span));
                        Ty::Error
                    } else {
                        symbol.ty
                    }
                }
                None => {
                    self.errors
                        .push(SemanticError::undeclared_identifier(&name.name, expr.span));
                    Ty::Error
                }
            },

            ExprKind::Unary { op, operand } => {
                let operand_ty = self.check_expr(operand);
                self.check_unary(*op, operand_ty, expr)
            }

            ExprKind::Binary { op, left, right } => {
                let left_ty = self.check_expr(left);
                let right_ty = self.check_expr(right);
                self.check_binary(*op, left_ty, right_ty, expr)
            }

            ExprKind::Call { callee, args } => self.check_call(callee, args, expr),
        };

        self.expr_types.insert(expr.id, ty);
        ty
    }

    /// The unary operator signature table
    fn check_unary(&mut self, op: UnOp, operand: Ty, expr: &Expr) -> Ty {
        if operand.is_error() {
            return Ty::Error;
        }
        match op {
            UnOp::Neg if operand.is_numeric() => operand,
            UnOp::Not if operand == Ty::Bool => Ty::Bool,
            _ => {
                self.errors.push(SemanticError::unary_type_mismatch(
                    op.to_string(),
                    operand,
                    expr.span,
                ));
                Ty::Error
            }
        }
    }

    /// The binary operator signature table: arithmetic requires matching
    /// numeric operands, relational requires matching numeric operands and
    /// yields bool, equality requires matching value types and yields bool,
    /// logical requires bool operands and yields bool.
    fn check_binary(&mut self, op: BinOp, left: Ty, right: Ty, expr: &Expr) -> Ty {
        if left.is_error() || right.is_error() {
            return Ty::Error;
        }

        let result = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                (left == right && left.is_numeric()).then_some(left)
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                (left == right && left.is_numeric()).then_some(Ty::Bool)
            }
            BinOp::Eq | BinOp::Ne => {
                (left == right && left.is_value_type()).then_some(Ty::Bool)
            }
            BinOp::And | BinOp::Or => {
                (left == Ty::Bool && right == Ty::Bool).then_some(Ty::Bool)
            }
        };

        result.unwrap_or_else(|| {
            self.errors.push(SemanticError::type_mismatch(
                op.to_string(),
                left,
                right,
                expr.span,
            ));
            Ty::Error
        })
    }

    fn check_call(&mut self, callee: &Ident, args: &[Expr], expr: &Expr) -> Ty {
        // Evaluate arguments left to right regardless of resolution outcome
        let arg_tys: Vec<Ty> = args.iter().map(|a| self.check_expr(a)).collect();

        let Some(sig) = self.table.lookup_function(&callee.name).cloned() else {
            if self.table.lookup(&callee.name).is_some() {
                self.errors
                    .push(SemanticError::not_callable(&callee.name, callee.span));
            } else {
                self.errors.push(SemanticError::undeclared_identifier(
                    &callee.name,
                    callee.span,
                ));
            }
            return Ty::Error;
        };

        if let Some(id) = self.table.lookup(&callee.name) {
            self.resolutions.insert(expr.id, id);
        }

        if arg_tys.len() != sig.params.len() {
            self.errors.push(SemanticError::arity_mismatch(
                &callee.name,
                sig.params.len(),
                arg_tys.len(),
                expr.span,
            ));
            return sig.ret;
        }

        for (i, (&found, &expected)) in arg_tys.iter().zip(&sig.params).enumerate() {
            if found != expected && !found.is_error() {
                self.errors.push(SemanticError::argument_type_mismatch(
                    &callee.name,
                    i,
                    expected,
                    found,
                    args[i].span,
                ));
            }
        }

        sig.ret
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Strict structural return check: does every syntactic path through this
/// statement sequence end in a `return`? Loops never count (their bodies may
/// not run); an `if` counts only when both branches return.
pub fn block_always_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return { .. } => true,
        StmtKind::Block(block) => block_always_returns(&block.stmts),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => stmt_always_returns(then_branch) && stmt_always_returns(else_branch),
        _ => false,
    }
}
