//! TAC optimization passes
//!
//! Four classical local passes, iterated together to a fixed point:
//! constant folding, block-local constant propagation, dead-temporary
//! elimination, and block-local common subexpression elimination.
//!
//! All passes preserve observable behavior: `print`, `read`, `call`, and
//! `return` instructions are never removed or reordered, stores to
//! source-level variables are never deleted, and division or modulus by a
//! constant zero is left for the runtime to trap on.

use super::cfg::basic_blocks;
use super::instr::{BinOp, Const, Instr, Operand, Place, UnOp};
use super::lower::{TacFunction, TacProgram};
use std::collections::HashMap;

/// Optimize a whole program; each function is rewritten independently
pub fn optimize(program: &TacProgram) -> TacProgram {
    let functions = program
        .functions
        .iter()
        .map(|f| TacFunction {
            name: f.name.clone(),
            params: f.params.clone(),
            body: optimize_body(f.body.clone()),
        })
        .collect();
    TacProgram { functions }
}

fn optimize_body(mut body: Vec<Instr>) -> Vec<Instr> {
    loop {
        let mut changed = false;
        changed |= fold_constants(&mut body);
        changed |= propagate_constants(&mut body);
        changed |= eliminate_common_subexpressions(&mut body);
        changed |= eliminate_dead_temps(&mut body);
        if !changed {
            return body;
        }
    }
}

/// Identity of a storage location, for tracking writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Loc {
    Temp(u32),
    Var { slot: u32, global: bool },
}

fn place_loc(place: &Place) -> Loc {
    match place {
        Place::Temp(t) => Loc::Temp(t.0),
        Place::Var(v) => Loc::Var {
            slot: v.slot,
            global: v.global,
        },
    }
}

fn operand_loc(op: &Operand) -> Option<Loc> {
    match op {
        Operand::Temp(t) => Some(Loc::Temp(t.0)),
        Operand::Var(v) => Some(Loc::Var {
            slot: v.slot,
            global: v.global,
        }),
        Operand::Const(_) => None,
    }
}

// ============ Constant folding ============

/// Replace operations on constant operands with an assignment of the
/// computed constant.
fn fold_constants(body: &mut [Instr]) -> bool {
    let mut changed = false;
    for instr in body.iter_mut() {
        let folded = match instr {
            Instr::Binary { dst, op, lhs, rhs } => {
                match (lhs.as_const(), rhs.as_const()) {
                    (Some(a), Some(b)) => {
                        eval_binary(*op, a, b).map(|c| (dst.clone(), c))
                    }
                    _ => None,
                }
            }
            Instr::Unary { dst, op, src } => src
                .as_const()
                .and_then(|c| eval_unary(*op, c))
                .map(|c| (dst.clone(), c)),
            _ => None,
        };

        if let Some((dst, value)) = folded {
            *instr = Instr::Assign {
                dst,
                src: Operand::Const(value),
            };
            changed = true;
        }
    }
    changed
}

/// Evaluate a binary operation on constants. Division and modulus by zero
/// return `None`: that is a runtime error, not a compile-time one. Integer
/// arithmetic wraps, matching the VM.
fn eval_binary(op: BinOp, a: &Const, b: &Const) -> Option<Const> {
    use Const::*;
    let c = match (op, a, b) {
        (BinOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(*b)),
        (BinOp::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(*b)),
        (BinOp::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(*b)),
        (BinOp::Div, Int(_), Int(0)) | (BinOp::Rem, Int(_), Int(0)) => return None,
        (BinOp::Div, Int(a), Int(b)) => Int(a.wrapping_div(*b)),
        (BinOp::Rem, Int(a), Int(b)) => Int(a.wrapping_rem(*b)),

        (BinOp::Add, Float(a), Float(b)) => Float(a + b),
        (BinOp::Sub, Float(a), Float(b)) => Float(a - b),
        (BinOp::Mul, Float(a), Float(b)) => Float(a * b),
        (BinOp::Div | BinOp::Rem, Float(_), Float(b)) if *b == 0.0 => return None,
        (BinOp::Div, Float(a), Float(b)) => Float(a / b),
        (BinOp::Rem, Float(a), Float(b)) => Float(a % b),

        (BinOp::Lt, Int(a), Int(b)) => Bool(a < b),
        (BinOp::Le, Int(a), Int(b)) => Bool(a <= b),
        (BinOp::Gt, Int(a), Int(b)) => Bool(a > b),
        (BinOp::Ge, Int(a), Int(b)) => Bool(a >= b),
        (BinOp::Lt, Float(a), Float(b)) => Bool(a < b),
        (BinOp::Le, Float(a), Float(b)) => Bool(a <= b),
        (BinOp::Gt, Float(a), Float(b)) => Bool(a > b),
        (BinOp::Ge, Float(a), Float(b)) => Bool(a >= b),

        (BinOp::Eq, a, b) => Bool(a == b),
        (BinOp::Ne, a, b) => Bool(a != b),

        _ => return None,
    };
    Some(c)
}

fn eval_unary(op: UnOp, c: &Const) -> Option<Const> {
    match (op, c) {
        (UnOp::Neg, Const::Int(v)) => Some(Const::Int(v.wrapping_neg())),
        (UnOp::Neg, Const::Float(v)) => Some(Const::Float(-v)),
        (UnOp::Not, Const::Bool(v)) => Some(Const::Bool(!v)),
        _ => None,
    }
}

// ============ Constant propagation ============

/// Within each basic block, substitute a known-constant location at its
/// uses until the location is reassigned.
fn propagate_constants(body: &mut [Instr]) -> bool {
    let mut changed = false;
    let blocks = basic_blocks(body);

    for block in blocks {
        let mut known: HashMap<Loc, Const> = HashMap::new();

        for instr in &mut body[block.start..block.end] {
            // Substitute uses first: the incoming operand values predate
            // whatever this instruction writes.
            for op in instr.operands_mut() {
                if let Some(loc) = operand_loc(op) {
                    if let Some(c) = known.get(&loc) {
                        *op = Operand::Const(c.clone());
                        changed = true;
                    }
                }
            }

            // Then account for the write
            match instr {
                Instr::Assign { dst, src } => {
                    let loc = place_loc(dst);
                    match src.as_const() {
                        Some(c) => {
                            known.insert(loc, c.clone());
                        }
                        None => {
                            known.remove(&loc);
                        }
                    }
                }
                Instr::Read(var) => {
                    known.remove(&Loc::Var {
                        slot: var.slot,
                        global: var.global,
                    });
                }
                Instr::Call { dst, .. } => {
                    if let Some(dst) = dst {
                        known.remove(&place_loc(dst));
                    }
                    // The callee may write any global
                    known.retain(|loc, _| !matches!(loc, Loc::Var { global: true, .. }));
                }
                other => {
                    if let Some(dst) = other.dst() {
                        known.remove(&place_loc(dst));
                    }
                }
            }
        }
    }

    changed
}

// ============ Common subexpression elimination ============

/// Within each basic block, reuse the result of an identical earlier
/// computation whose operands have not been written since.
fn eliminate_common_subexpressions(body: &mut [Instr]) -> bool {
    #[derive(Clone, PartialEq)]
    enum ExprKey {
        Binary(BinOp, Operand, Operand),
        Unary(UnOp, Operand),
    }

    struct Available {
        key: ExprKey,
        result: Place,
    }

    fn uses_loc(key: &ExprKey, loc: Loc) -> bool {
        let ops: [&Operand; 2] = match key {
            ExprKey::Binary(_, a, b) => [a, b],
            ExprKey::Unary(_, a) => [a, a],
        };
        ops.iter().any(|op| operand_loc(op) == Some(loc))
    }

    let mut changed = false;
    let blocks = basic_blocks(body);

    for block in blocks {
        let mut available: Vec<Available> = Vec::new();

        for instr in &mut body[block.start..block.end] {
            let key = match instr {
                Instr::Binary { op, lhs, rhs, .. } => {
                    Some(ExprKey::Binary(*op, lhs.clone(), rhs.clone()))
                }
                Instr::Unary { op, src, .. } => Some(ExprKey::Unary(*op, src.clone())),
                _ => None,
            };

            if let Some(key) = key {
                if let Some(prev) = available.iter().find(|a| a.key == key) {
                    let dst = instr.dst().cloned().expect("operation has a destination");
                    *instr = Instr::Assign {
                        dst,
                        src: prev.result.clone().into(),
                    };
                    changed = true;
                } else if let Some(dst) = instr.dst() {
                    available.push(Available {
                        key,
                        result: dst.clone(),
                    });
                }
            }

            // Any write invalidates computations that read or produced
            // the written location.
            let written: Option<Loc> = match instr {
                Instr::Read(var) => Some(Loc::Var {
                    slot: var.slot,
                    global: var.global,
                }),
                ref other => other.dst().map(place_loc),
            };
            if let Some(loc) = written {
                available.retain(|a| place_loc(&a.result) != loc && !uses_loc(&a.key, loc));
            }
            if matches!(instr, Instr::Call { .. }) {
                // The callee may write any global
                available.retain(|a| {
                    let global = Loc::is_global;
                    !global(&place_loc(&a.result))
                        && match &a.key {
                            ExprKey::Binary(_, x, y) => {
                                !operand_loc(x).is_some_and(|l| global(&l))
                                    && !operand_loc(y).is_some_and(|l| global(&l))
                            }
                            ExprKey::Unary(_, x) => !operand_loc(x).is_some_and(|l| global(&l)),
                        }
                });
            }
        }
    }

    changed
}

impl Loc {
    fn is_global(&self) -> bool {
        matches!(self, Loc::Var { global: true, .. })
    }
}

// ============ Dead code elimination ============

/// Remove assignments to temporaries that are never read anywhere in the
/// function. Stores to source-level variables are kept: a variable may be
/// observed after the function returns. Instructions with external effects
/// are never candidates.
fn eliminate_dead_temps(body: &mut Vec<Instr>) -> bool {
    let mut used: HashMap<u32, usize> = HashMap::new();
    for instr in body.iter() {
        for op in instr.operands() {
            if let Operand::Temp(t) = op {
                *used.entry(t.0).or_insert(0) += 1;
            }
        }
    }

    let before = body.len();
    body.retain(|instr| {
        if instr.has_side_effect() {
            return true;
        }
        match instr.dst() {
            Some(Place::Temp(t)) => used.get(&t.0).copied().unwrap_or(0) > 0,
            _ => true,
        }
    });
    body.len() != before
}

#[cfg(test)]
mod tests {
    use super::super::instr::*;
    use super::*;
    use crate::{ir, parser, sema};

    fn lower_source(source: &str) -> TacProgram {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "Parse errors: {:?}", errors);
        let analysis = sema::analyze(&program).expect("analysis failed");
        ir::lower(&program, &analysis)
    }

    fn optimized_main(source: &str) -> Vec<Instr> {
        let tac = optimize(&lower_source(source));
        tac.function("main").expect("no main").body.clone()
    }

    #[test]
    fn test_literal_folding() {
        let body = optimized_main("int main() { int x; x = 2 + 3 * 4; print(x); return 0; }");
        // Everything collapses to constant stores
        assert!(!body.iter().any(|i| matches!(i, Instr::Binary { .. })));
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Assign {
                src: Operand::Const(Const::Int(14)),
                ..
            }
        )));
    }

    #[test]
    fn test_division_by_zero_not_folded() {
        let body = optimized_main("int main() { int x; x = 1 / 0; print(x); return 0; }");
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::Binary { op: BinOp::Div, .. })));
    }

    #[test]
    fn test_modulus_by_zero_not_folded() {
        let body = optimized_main("int main() { int x; x = 7 % 0; print(x); return 0; }");
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::Binary { op: BinOp::Rem, .. })));
    }

    #[test]
    fn test_propagation_through_variables() {
        let body =
            optimized_main("int main() { int a; int b; a = 10; b = a + 20; print(b); return 0; }");
        // `a + 20` becomes `30`, and print sees the constant
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Print(Operand::Const(Const::Int(30)))
        )));
        assert!(!body.iter().any(|i| matches!(i, Instr::Binary { .. })));
    }

    #[test]
    fn test_propagation_stops_at_reassignment() {
        let body = optimized_main(
            "int main() { int a; a = 1; read(a); print(a + 1); return 0; }",
        );
        // `read` kills the known constant, so the addition survives
        assert!(body.iter().any(|i| matches!(i, Instr::Binary { op: BinOp::Add, .. })));
    }

    #[test]
    fn test_dce_removes_unused_temp() {
        let body = optimized_main("int main() { int x; x = 1; print(x); return 0; }");
        // No temporary assignments survive in this program
        assert!(!body
            .iter()
            .any(|i| matches!(i.dst(), Some(Place::Temp(_)))));
    }

    #[test]
    fn test_dce_keeps_variable_stores() {
        let body = optimized_main("int main() { int x; x = 42; return 0; }");
        // `x` is never read again, but stores to source variables stay
        assert!(body.iter().any(|i| matches!(
            i,
            Instr::Assign {
                dst: Place::Var(_),
                ..
            }
        )));
    }

    #[test]
    fn test_dce_never_removes_effects() {
        let source =
            "int f() { return 1; } int main() { int x; read(x); print(x); f(); return 0; }";
        let body = optimized_main(source);
        assert!(body.iter().any(|i| matches!(i, Instr::Read(_))));
        assert!(body.iter().any(|i| matches!(i, Instr::Print(_))));
        assert!(body.iter().any(|i| matches!(i, Instr::Call { .. })));
        assert!(body.iter().any(|i| matches!(i, Instr::Return(_))));
    }

    #[test]
    fn test_cse_reuses_earlier_computation() {
        let source = "int main() { int a; int b; int c; read(a); read(b); \
                      c = a * b + a * b; print(c); return 0; }";
        let body = optimized_main(source);
        let muls = body
            .iter()
            .filter(|i| matches!(i, Instr::Binary { op: BinOp::Mul, .. }))
            .count();
        assert_eq!(muls, 1, "duplicate multiply should be eliminated");
    }

    #[test]
    fn test_cse_invalidated_by_reassignment() {
        let source = "int main() { int a; int x; int y; read(a); \
                      x = a + 1; read(a); y = a + 1; print(x); print(y); return 0; }";
        let body = optimized_main(source);
        let adds = body
            .iter()
            .filter(|i| matches!(i, Instr::Binary { op: BinOp::Add, .. }))
            .count();
        assert_eq!(adds, 2, "reassigned operand must not be reused");
    }

    #[test]
    fn test_non_constant_condition_not_folded() {
        // The factorial guard: n is a parameter, so `n <= 1` survives
        let source = "int factorial(int n) { if (n <= 1) return 1; return n * factorial(n - 1); } \
                      int main() { print(factorial(5)); return 0; }";
        let tac = optimize(&lower_source(source));
        let fact = &tac.function("factorial").unwrap().body;
        assert!(fact
            .iter()
            .any(|i| matches!(i, Instr::Binary { op: BinOp::Le, .. })));
    }

    #[test]
    fn test_idempotence() {
        let source = "int main() { int a; int b; int sum; a = 10; b = 20; \
                      sum = a + b; print(sum); return 0; }";
        let once = optimize(&lower_source(source));
        let twice = optimize(&once);
        assert_eq!(
            format!("{}", once),
            format!("{}", twice),
            "optimizer must reach a fixed point"
        );
    }

    #[test]
    fn test_globals_invalidate_across_calls() {
        // `bump()` writes the global, so `g` must be reloaded after the call
        let source = "int g = 1; void bump() { g = g + 1; } \
                      int main() { int a; a = g; bump(); print(g); return 0; }";
        let body = optimized_main(source);
        // print must not see a propagated constant 1
        assert!(body
            .iter()
            .any(|i| matches!(i, Instr::Print(Operand::Var(v)) if v.global)));
    }

    #[test]
    fn test_short_circuit_temps_survive() {
        // The result temp of `&&` is assigned on two paths; it must not be
        // treated as dead on either.
        let source = "int main() { bool a; bool b; read(a); read(b); \
                      if (a && b) print(1); return 0; }";
        let body = optimized_main(source);
        let assigns_to_temp = body
            .iter()
            .filter(|i| matches!(i.dst(), Some(Place::Temp(_))))
            .count();
        assert!(assigns_to_temp >= 2);
    }
}
