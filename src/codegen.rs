//! Stack-machine code generation
//!
//! Maps optimized TAC onto the target VM: operands are pushed immediately
//! before the operator that consumes them, in the same left-to-right order
//! lowering used, so every operator finds exactly its arity on the stack.
//! Labels and call targets resolve to addresses in a second pass over the
//! emitted instructions.

use crate::ir::{BinOp, Const, Instr, Label, Operand, Place, TacProgram, UnOp, VarRef};
use std::collections::HashMap;
use std::fmt;

/// One VM instruction: a mnemonic plus its operands
#[derive(Debug, Clone, PartialEq)]
pub enum VmInstr {
    /// Push a literal constant
    PushConst(Const),
    /// Push a local slot
    Load(u32),
    /// Pop into a local slot
    Store(u32),
    /// Push a global slot
    LoadGlobal(u32),
    /// Pop into a global slot
    StoreGlobal(u32),

    // One opcode per operator; each pops its arity and pushes its result
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,

    /// Unconditional jump to an instruction address
    Jmp(usize),
    /// Pop a bool; jump when it is false
    Jmpf(usize),
    /// Pop `argc` arguments into a fresh frame and jump to `addr`
    Call { addr: usize, argc: usize },
    /// Pop the current frame; a return value, if any, stays on the stack
    Ret,
    /// Read one input value into a local slot
    Read(u32),
    /// Read one input value into a global slot
    ReadGlobal(u32),
    /// Pop and print one value
    Print,
}

impl fmt::Display for VmInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmInstr::PushConst(c) => write!(f, "PUSHCONST {}", c),
            VmInstr::Load(slot) => write!(f, "LOAD {}", slot),
            VmInstr::Store(slot) => write!(f, "STORE {}", slot),
            VmInstr::LoadGlobal(slot) => write!(f, "LOADG {}", slot),
            VmInstr::StoreGlobal(slot) => write!(f, "STOREG {}", slot),
            VmInstr::Add => write!(f, "ADD"),
            VmInstr::Sub => write!(f, "SUB"),
            VmInstr::Mul => write!(f, "MUL"),
            VmInstr::Div => write!(f, "DIV"),
            VmInstr::Rem => write!(f, "REM"),
            VmInstr::Neg => write!(f, "NEG"),
            VmInstr::Eq => write!(f, "EQ"),
            VmInstr::Ne => write!(f, "NE"),
            VmInstr::Lt => write!(f, "LT"),
            VmInstr::Le => write!(f, "LE"),
            VmInstr::Gt => write!(f, "GT"),
            VmInstr::Ge => write!(f, "GE"),
            VmInstr::Not => write!(f, "NOT"),
            VmInstr::Jmp(addr) => write!(f, "JMP {}", addr),
            VmInstr::Jmpf(addr) => write!(f, "JMPF {}", addr),
            VmInstr::Call { addr, argc } => write!(f, "CALL {}, {}", addr, argc),
            VmInstr::Ret => write!(f, "RET"),
            VmInstr::Read(slot) => write!(f, "READ {}", slot),
            VmInstr::ReadGlobal(slot) => write!(f, "READG {}", slot),
            VmInstr::Print => write!(f, "PRINT"),
        }
    }
}

/// The generated artifact: instructions plus resolved entry addresses
#[derive(Debug, Clone)]
pub struct CodeImage {
    pub instrs: Vec<VmInstr>,
    /// Entry address of every function, in layout order
    pub functions: Vec<(String, usize)>,
    /// Entry address of `main`, when the program has one
    pub entry: Option<usize>,
    /// Number of global slots the program uses
    pub globals: usize,
}

impl CodeImage {
    pub fn function_addr(&self, name: &str) -> Option<usize> {
        self.functions
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, addr)| addr)
    }
}

impl fmt::Display for CodeImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: HashMap<usize, &str> = HashMap::new();
        for (name, addr) in &self.functions {
            entries.insert(*addr, name);
        }
        for (addr, instr) in self.instrs.iter().enumerate() {
            if let Some(name) = entries.get(&addr) {
                writeln!(f, "{}:", name)?;
            }
            writeln!(f, "{:>4}  {}", addr, instr)?;
        }
        Ok(())
    }
}

/// Identity of a frame-resident value, for slot assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FrameKey {
    Temp(u32),
    Var(u32),
}

/// Generate VM code for a whole program
pub fn generate(program: &TacProgram) -> CodeImage {
    let mut instrs: Vec<VmInstr> = Vec::new();
    let mut functions: Vec<(String, usize)> = Vec::new();
    // Call sites to patch once every function's address is known
    let mut call_patches: Vec<(usize, String)> = Vec::new();
    let mut globals = 0usize;

    for function in &program.functions {
        functions.push((function.name.clone(), instrs.len()));
        let mut gen = FuncGen::new(&mut instrs, &mut call_patches);
        for param in &function.params {
            gen.frame_slot(FrameKey::Var(param.slot));
        }
        for instr in &function.body {
            gen.emit(instr);
        }
        gen.patch_jumps();

        for instr in &function.body {
            globals = globals.max(max_global_slot(instr));
        }
    }

    let addr_of: HashMap<&str, usize> = functions
        .iter()
        .map(|(name, addr)| (name.as_str(), *addr))
        .collect();
    for (site, callee) in call_patches {
        let addr = *addr_of
            .get(callee.as_str())
            .unwrap_or_else(|| panic!("internal error: call to unknown function `{}`", callee));
        if let VmInstr::Call { addr: slot, .. } = &mut instrs[site] {
            *slot = addr;
        }
    }

    let entry = functions
        .iter()
        .find(|(name, _)| name == "main")
        .map(|&(_, addr)| addr);

    CodeImage {
        instrs,
        functions,
        entry,
        globals,
    }
}

fn max_global_slot(instr: &Instr) -> usize {
    let mut max = 0;
    let mut consider = |v: &VarRef| {
        if v.global {
            max = max.max(v.slot as usize + 1);
        }
    };
    if let Some(Place::Var(v)) = instr.dst() {
        consider(v);
    }
    for op in instr.operands() {
        if let Operand::Var(v) = op {
            consider(v);
        }
    }
    if let Instr::Read(v) = instr {
        consider(v);
    }
    max
}

/// Per-function emission state
struct FuncGen<'a> {
    instrs: &'a mut Vec<VmInstr>,
    call_patches: &'a mut Vec<(usize, String)>,
    /// Frame slot of each local value, assigned at first appearance,
    /// parameters first
    slots: HashMap<FrameKey, u32>,
    next_slot: u32,
    label_addrs: HashMap<Label, usize>,
    jump_patches: Vec<(usize, Label)>,
}

impl<'a> FuncGen<'a> {
    fn new(instrs: &'a mut Vec<VmInstr>, call_patches: &'a mut Vec<(usize, String)>) -> Self {
        Self {
            instrs,
            call_patches,
            slots: HashMap::new(),
            next_slot: 0,
            label_addrs: HashMap::new(),
            jump_patches: Vec::new(),
        }
    }

    fn frame_slot(&mut self, key: FrameKey) -> u32 {
        if let Some(&slot) = self.slots.get(&key) {
            return slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(key, slot);
        slot
    }

    fn push_operand(&mut self, op: &Operand) {
        let instr = match op {
            Operand::Const(c) => VmInstr::PushConst(c.clone()),
            Operand::Temp(t) => {
                let slot = self.frame_slot(FrameKey::Temp(t.0));
                VmInstr::Load(slot)
            }
            Operand::Var(v) if v.global => VmInstr::LoadGlobal(v.slot),
            Operand::Var(v) => {
                let slot = self.frame_slot(FrameKey::Var(v.slot));
                VmInstr::Load(slot)
            }
        };
        self.instrs.push(instr);
    }

    fn store_place(&mut self, place: &Place) {
        let instr = match place {
            Place::Temp(t) => {
                let slot = self.frame_slot(FrameKey::Temp(t.0));
                VmInstr::Store(slot)
            }
            Place::Var(v) if v.global => VmInstr::StoreGlobal(v.slot),
            Place::Var(v) => {
                let slot = self.frame_slot(FrameKey::Var(v.slot));
                VmInstr::Store(slot)
            }
        };
        self.instrs.push(instr);
    }

    fn emit_jump(&mut self, target: Label, conditional: bool) {
        self.jump_patches.push((self.instrs.len(), target));
        self.instrs.push(if conditional {
            VmInstr::Jmpf(0)
        } else {
            VmInstr::Jmp(0)
        });
    }

    fn emit(&mut self, instr: &Instr) {
        match instr {
            Instr::Assign { dst, src } => {
                self.push_operand(src);
                self.store_place(dst);
            }

            Instr::Binary { dst, op, lhs, rhs } => {
                self.push_operand(lhs);
                self.push_operand(rhs);
                self.instrs.push(binop_instr(*op));
                self.store_place(dst);
            }

            Instr::Unary { dst, op, src } => {
                self.push_operand(src);
                self.instrs.push(match op {
                    UnOp::Neg => VmInstr::Neg,
                    UnOp::Not => VmInstr::Not,
                });
                self.store_place(dst);
            }

            Instr::Label(label) => {
                self.label_addrs.insert(*label, self.instrs.len());
            }

            Instr::Jump(target) => self.emit_jump(*target, false),

            Instr::JumpIfFalse { cond, target } => {
                self.push_operand(cond);
                self.emit_jump(*target, true);
            }

            Instr::JumpIfTrue { cond, target } => {
                // The target machine only jumps on false
                self.push_operand(cond);
                self.instrs.push(VmInstr::Not);
                self.emit_jump(*target, true);
            }

            Instr::Param(op) => self.push_operand(op),

            Instr::Call { dst, func, argc } => {
                self.call_patches.push((self.instrs.len(), func.clone()));
                self.instrs.push(VmInstr::Call {
                    addr: 0,
                    argc: *argc,
                });
                if let Some(dst) = dst {
                    self.store_place(dst);
                }
            }

            Instr::Return(value) => {
                if let Some(value) = value {
                    self.push_operand(value);
                }
                self.instrs.push(VmInstr::Ret);
            }

            Instr::Read(var) => {
                let instr = if var.global {
                    VmInstr::ReadGlobal(var.slot)
                } else {
                    let slot = self.frame_slot(FrameKey::Var(var.slot));
                    VmInstr::Read(slot)
                };
                self.instrs.push(instr);
            }

            Instr::Print(op) => {
                self.push_operand(op);
                self.instrs.push(VmInstr::Print);
            }
        }
    }

    fn patch_jumps(self) {
        for (site, label) in self.jump_patches {
            let addr = *self
                .label_addrs
                .get(&label)
                .unwrap_or_else(|| panic!("internal error: jump to unplaced label {}", label));
            match &mut self.instrs[site] {
                VmInstr::Jmp(slot) | VmInstr::Jmpf(slot) => *slot = addr,
                other => panic!("internal error: patch site holds {}", other),
            }
        }
    }
}

fn binop_instr(op: BinOp) -> VmInstr {
    match op {
        BinOp::Add => VmInstr::Add,
        BinOp::Sub => VmInstr::Sub,
        BinOp::Mul => VmInstr::Mul,
        BinOp::Div => VmInstr::Div,
        BinOp::Rem => VmInstr::Rem,
        BinOp::Eq => VmInstr::Eq,
        BinOp::Ne => VmInstr::Ne,
        BinOp::Lt => VmInstr::Lt,
        BinOp::Le => VmInstr::Le,
        BinOp::Gt => VmInstr::Gt,
        BinOp::Ge => VmInstr::Ge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir, parser, sema};

    fn image_of(source: &str) -> CodeImage {
        let (program, errors) = parser::parse(source);
        assert!(errors.is_empty(), "Parse errors: {:?}", errors);
        let analysis = sema::analyze(&program).expect("analysis failed");
        generate(&ir::lower(&program, &analysis))
    }

    #[test]
    fn test_entry_points_recorded() {
        let image = image_of("int helper() { return 1; } int main() { return helper(); }");
        assert_eq!(image.functions.len(), 2);
        assert_eq!(image.function_addr("helper"), Some(0));
        assert_eq!(image.entry, image.function_addr("main"));
    }

    #[test]
    fn test_call_resolved_to_callee_entry() {
        let image = image_of("int helper() { return 7; } int main() { return helper(); }");
        let callee = image.function_addr("helper").unwrap();
        assert!(image
            .instrs
            .iter()
            .any(|i| matches!(i, VmInstr::Call { addr, argc: 0 } if *addr == callee)));
    }

    #[test]
    fn test_operands_pushed_before_operator() {
        let image = image_of("int main() { int s; s = 1 + 2; return s; }");
        let add_at = image
            .instrs
            .iter()
            .position(|i| matches!(i, VmInstr::Add))
            .expect("no ADD emitted");
        assert!(matches!(
            image.instrs[add_at - 2],
            VmInstr::PushConst(Const::Int(1))
        ));
        assert!(matches!(
            image.instrs[add_at - 1],
            VmInstr::PushConst(Const::Int(2))
        ));
        // The result goes to a frame slot right after
        assert!(matches!(image.instrs[add_at + 1], VmInstr::Store(_)));
    }

    #[test]
    fn test_parameters_take_first_slots() {
        let image = image_of("int add(int a, int b) { return a + b; } int main() { return add(1, 2); }");
        // Inside `add`, the first loads read slots 0 and 1
        let start = image.function_addr("add").unwrap();
        assert!(matches!(image.instrs[start], VmInstr::Load(0)));
        assert!(matches!(image.instrs[start + 1], VmInstr::Load(1)));
    }

    #[test]
    fn test_jumps_resolve_within_code() {
        let image =
            image_of("int main() { int i = 0; while (i < 5) i = i + 1; return i; }");
        for instr in &image.instrs {
            if let VmInstr::Jmp(addr) | VmInstr::Jmpf(addr) = instr {
                assert!(*addr < image.instrs.len(), "jump out of range: {}", addr);
            }
        }
        // The loop produces at least one backward jump
        assert!(image
            .instrs
            .iter()
            .enumerate()
            .any(|(at, i)| matches!(i, VmInstr::Jmp(addr) if *addr < at)));
    }

    #[test]
    fn test_globals_use_global_opcodes() {
        let image = image_of("int g = 1; int main() { g = g + 1; print(g); return 0; }");
        assert_eq!(image.globals, 1);
        assert!(image
            .instrs
            .iter()
            .any(|i| matches!(i, VmInstr::LoadGlobal(0))));
        assert!(image
            .instrs
            .iter()
            .any(|i| matches!(i, VmInstr::StoreGlobal(0))));
    }

    #[test]
    fn test_no_entry_without_main() {
        let image = image_of("int helper() { return 1; }");
        assert!(image.entry.is_none());
    }

    #[test]
    fn test_return_pushes_value_before_ret() {
        let image = image_of("int main() { return 3; }");
        let ret_at = image
            .instrs
            .iter()
            .position(|i| matches!(i, VmInstr::Ret))
            .unwrap();
        assert!(matches!(
            image.instrs[ret_at - 1],
            VmInstr::PushConst(Const::Int(3))
        ));
    }
}
