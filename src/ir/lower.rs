//! AST to TAC lowering
//!
//! Walks the annotated AST and emits three-address code, one function at a
//! time. Expressions lower left to right into fresh temporaries; logical
//! operators lower into explicit conditional jumps so the right operand is
//! only evaluated when needed; `for` desugars to `while`.
//!
//! Precondition: semantic analysis succeeded. An unresolved identifier here
//! is a pipeline defect, reported as an internal error, not a user error.

use crate::ast::{self, Expr, ExprKind, FnDecl, Literal, Program, Stmt, StmtKind, VarDecl};
use crate::sema::{Analysis, Symbol, Ty};

use super::builder::FuncBuilder;
use super::instr::{BinOp, Const, Instr, Operand, Place, UnOp, VarRef};
use std::fmt;

/// One lowered function
#[derive(Debug, Clone)]
pub struct TacFunction {
    pub name: String,
    /// Parameters in declaration order (slots `0..params.len()`)
    pub params: Vec<VarRef>,
    pub body: Vec<Instr>,
}

impl fmt::Display for TacFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        writeln!(f, "):")?;
        for instr in &self.body {
            if matches!(instr, Instr::Label(_)) {
                writeln!(f, "{}", instr)?;
            } else {
                writeln!(f, "  {}", instr)?;
            }
        }
        Ok(())
    }
}

/// The lowered program: named functions in source order
#[derive(Debug, Clone)]
pub struct TacProgram {
    pub functions: Vec<TacFunction>,
}

impl TacProgram {
    pub fn function(&self, name: &str) -> Option<&TacFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for TacProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            writeln!(f, "{}", func)?;
        }
        Ok(())
    }
}

/// Lower an analyzed program to TAC
pub fn lower(program: &Program, analysis: &Analysis) -> TacProgram {
    let functions = program
        .functions
        .iter()
        .map(|f| Lowerer::new(analysis).lower_function(f, program))
        .collect();
    TacProgram { functions }
}

/// Lowers one function body
struct Lowerer<'a> {
    analysis: &'a Analysis,
    builder: FuncBuilder,
}

impl<'a> Lowerer<'a> {
    fn new(analysis: &'a Analysis) -> Self {
        Self {
            analysis,
            builder: FuncBuilder::new(),
        }
    }

    fn lower_function(mut self, f: &FnDecl, program: &Program) -> TacFunction {
        // Global initializers run once, ahead of main's own body
        if f.name.name == "main" {
            for global in &program.globals {
                self.lower_global_init(global);
            }
        }

        for stmt in &f.body.stmts {
            self.lower_stmt(stmt);
        }

        let mut body = self.builder.finish();

        // A void function may fall off its lexical end
        if Ty::from(f.return_type) == Ty::Void && !matches!(body.last(), Some(Instr::Return(_)))
        {
            body.push(Instr::Return(None));
        }

        let params = f
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| VarRef {
                name: p.name.name.clone(),
                slot: i as u32,
                global: false,
            })
            .collect();

        TacFunction {
            name: f.name.name.clone(),
            params,
            body,
        }
    }

    fn lower_global_init(&mut self, decl: &VarDecl) {
        if let Some(init) = &decl.init {
            let value = self.lower_expr(init);
            let dst = Place::Var(self.decl_var(decl));
            self.builder.emit(Instr::Assign { dst, src: value });
        }
    }

    // ============ Statements ============

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl(decl) => {
                if let Some(init) = &decl.init {
                    let value = self.lower_expr(init);
                    let dst = Place::Var(self.decl_var(decl));
                    self.builder.emit(Instr::Assign { dst, src: value });
                }
            }

            StmtKind::Assign { target, value } => {
                let value = self.lower_expr(value);
                let dst = Place::Var(self.expr_var(target));
                self.builder.emit(Instr::Assign { dst, src: value });
            }

            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let end = self.builder.fresh_label();
                match else_branch {
                    Some(else_branch) => {
                        let else_label = self.builder.fresh_label();
                        let cond = self.lower_expr(cond);
                        self.builder.emit(Instr::JumpIfFalse {
                            cond,
                            target: else_label,
                        });
                        self.lower_stmt(then_branch);
                        self.builder.emit(Instr::Jump(end));
                        self.builder.mark(else_label);
                        self.lower_stmt(else_branch);
                        self.builder.mark(end);
                    }
                    None => {
                        let cond = self.lower_expr(cond);
                        self.builder.emit(Instr::JumpIfFalse { cond, target: end });
                        self.lower_stmt(then_branch);
                        self.builder.mark(end);
                    }
                }
            }

            StmtKind::While { cond, body } => {
                let head = self.builder.fresh_label();
                let end = self.builder.fresh_label();
                self.builder.mark(head);
                let cond = self.lower_expr(cond);
                self.builder.emit(Instr::JumpIfFalse { cond, target: end });
                self.lower_stmt(body);
                self.builder.emit(Instr::Jump(head));
                self.builder.mark(end);
            }

            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                // for (init; cond; update) body  ==  init; while (cond) { body; update }
                if let Some(init) = init {
                    self.lower_stmt(init);
                }
                let head = self.builder.fresh_label();
                let end = self.builder.fresh_label();
                self.builder.mark(head);
                let cond = self.lower_expr(cond);
                self.builder.emit(Instr::JumpIfFalse { cond, target: end });
                self.lower_stmt(body);
                if let Some(update) = update {
                    self.lower_stmt(update);
                }
                self.builder.emit(Instr::Jump(head));
                self.builder.mark(end);
            }

            StmtKind::Return { value } => {
                let value = value.as_ref().map(|e| self.lower_expr(e));
                self.builder.emit(Instr::Return(value));
            }

            StmtKind::Read { target } => {
                let var = self.expr_var(target);
                self.builder.emit(Instr::Read(var));
            }

            StmtKind::Print { value } => {
                let value = self.lower_expr(value);
                self.builder.emit(Instr::Print(value));
            }

            StmtKind::Expr(expr) => {
                // A void call has no result; anything else lowers normally
                // and an unused temporary is the optimizer's problem.
                if let ExprKind::Call { .. } = &expr.kind {
                    self.lower_call(expr);
                } else {
                    self.lower_expr(expr);
                }
            }

            StmtKind::Block(block) => {
                for stmt in &block.stmts {
                    self.lower_stmt(stmt);
                }
            }
        }
    }

    // ============ Expressions ============

    /// Lower an expression, returning the operand that holds its value
    fn lower_expr(&mut self, expr: &Expr) -> Operand {
        match &expr.kind {
            ExprKind::Literal(lit) => Operand::Const(lower_literal(lit)),

            ExprKind::Ident(_) => Operand::Var(self.expr_var(expr)),

            ExprKind::Unary { op, operand } => {
                let src = self.lower_expr(operand);
                let dst = self.builder.fresh_temp();
                self.builder.emit(Instr::Unary {
                    dst: Place::Temp(dst),
                    op: lower_unop(*op),
                    src,
                });
                Operand::Temp(dst)
            }

            ExprKind::Binary { op, left, right } if op.is_logical() => {
                self.lower_logical(*op, left, right)
            }

            ExprKind::Binary { op, left, right } => {
                let lhs = self.lower_expr(left);
                let rhs = self.lower_expr(right);
                let dst = self.builder.fresh_temp();
                self.builder.emit(Instr::Binary {
                    dst: Place::Temp(dst),
                    op: lower_binop(*op),
                    lhs,
                    rhs,
                });
                Operand::Temp(dst)
            }

            ExprKind::Call { .. } => self
                .lower_call(expr)
                .unwrap_or(Operand::Const(Const::Int(0))),
        }
    }

    /// Short-circuit lowering: the right operand is evaluated only when the
    /// left one does not already decide the result.
    fn lower_logical(&mut self, op: ast::BinOp, left: &Expr, right: &Expr) -> Operand {
        let result = self.builder.fresh_temp();
        let decided = self.builder.fresh_label();
        let end = self.builder.fresh_label();

        // For `&&` the short value is false, for `||` it is true
        let short_value = op == ast::BinOp::Or;

        let lhs = self.lower_expr(left);
        self.emit_short_jump(op, lhs, decided);
        let rhs = self.lower_expr(right);
        self.emit_short_jump(op, rhs, decided);

        self.builder.emit(Instr::Assign {
            dst: Place::Temp(result),
            src: Operand::Const(Const::Bool(!short_value)),
        });
        self.builder.emit(Instr::Jump(end));
        self.builder.mark(decided);
        self.builder.emit(Instr::Assign {
            dst: Place::Temp(result),
            src: Operand::Const(Const::Bool(short_value)),
        });
        self.builder.mark(end);

        Operand::Temp(result)
    }

    fn emit_short_jump(&mut self, op: ast::BinOp, cond: Operand, target: super::instr::Label) {
        let instr = match op {
            ast::BinOp::And => Instr::JumpIfFalse { cond, target },
            ast::BinOp::Or => Instr::JumpIfTrue { cond, target },
            _ => unreachable!("emit_short_jump on non-logical operator"),
        };
        self.builder.emit(instr);
    }

    /// Lower a call; returns the result operand unless the callee is void
    fn lower_call(&mut self, expr: &Expr) -> Option<Operand> {
        let ExprKind::Call { callee, args } = &expr.kind else {
            unreachable!("lower_call on non-call expression");
        };

        // Arguments evaluate left to right, then push in the same order
        let lowered: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();
        for arg in lowered {
            self.builder.emit(Instr::Param(arg));
        }

        let dst = if self.analysis.ty(expr.id) == Ty::Void {
            None
        } else {
            Some(Place::Temp(self.builder.fresh_temp()))
        };

        self.builder.emit(Instr::Call {
            dst: dst.clone(),
            func: callee.name.clone(),
            argc: args.len(),
        });

        dst.map(Operand::from)
    }

    // ============ Symbol access ============

    /// The variable a declaration introduced
    fn decl_var(&self, decl: &VarDecl) -> VarRef {
        let symbol = self
            .analysis
            .symbol(decl.id)
            .expect("internal error: unresolved declaration reached IR generation");
        var_ref(symbol)
    }

    /// The variable an identifier expression resolved to
    fn expr_var(&self, expr: &Expr) -> VarRef {
        let symbol = self
            .analysis
            .symbol(expr.id)
            .expect("internal error: unresolved identifier reached IR generation");
        var_ref(symbol)
    }
}

fn var_ref(symbol: &Symbol) -> VarRef {
    VarRef {
        name: symbol.name.clone(),
        slot: symbol.slot,
        global: symbol.depth == 0,
    }
}

fn lower_literal(lit: &Literal) -> Const {
    match lit {
        Literal::Int(v) => Const::Int(*v),
        Literal::Float(v) => Const::Float(*v),
        Literal::Bool(v) => Const::Bool(*v),
        Literal::Char(c) => Const::Char(*c),
        Literal::Str(s) => Const::Str(s.clone()),
    }
}

fn lower_binop(op: ast::BinOp) -> BinOp {
    match op {
        ast::BinOp::Add => BinOp::Add,
        ast::BinOp::Sub => BinOp::Sub,
        ast::BinOp::Mul => BinOp::Mul,
        ast::BinOp::Div => BinOp::Div,
        ast::BinOp::Rem => BinOp::Rem,
        ast::BinOp::Eq => BinOp::Eq,
        ast::BinOp::Ne => BinOp::Ne,
        ast::BinOp::Lt => BinOp::Lt,
        ast::BinOp::Le => BinOp::Le,
        ast::BinOp::Gt => BinOp::Gt,
        ast::BinOp::Ge => BinOp::Ge,
        ast::BinOp::And | ast::BinOp::Or => {
            unreachable!("logical operators lower to conditional jumps")
        }
    }
}

fn lower_unop(op: ast::UnOp) -> UnOp {
    match op {
        ast::UnOp::Neg => UnOp::Neg,
        ast::UnOp::Not => UnOp::Not,
    }
}
