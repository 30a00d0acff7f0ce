//! TAC instruction definitions
//!
//! Instructions are printed in conventional three-address text, one per
//! line, which is what `--emit-ir` shows.

use std::fmt;

/// A compiler-generated temporary, unique within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp(pub u32);

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A jump target, unique within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A reference to a source-level variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub name: String,
    /// Frame slot for locals/params, global slot for globals
    pub slot: u32,
    pub global: bool,
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A compile-time constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{}", v),
            Const::Float(v) => write!(f, "{}", v),
            Const::Bool(v) => write!(f, "{}", v),
            Const::Char(c) => write!(f, "{:?}", c),
            Const::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// An instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(Const),
    Temp(Temp),
    Var(VarRef),
}

impl Operand {
    pub fn as_const(&self) -> Option<&Const> {
        match self {
            Operand::Const(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(c) => write!(f, "{}", c),
            Operand::Temp(t) => write!(f, "{}", t),
            Operand::Var(v) => write!(f, "{}", v),
        }
    }
}

impl From<Place> for Operand {
    fn from(place: Place) -> Self {
        match place {
            Place::Temp(t) => Operand::Temp(t),
            Place::Var(v) => Operand::Var(v),
        }
    }
}

/// An instruction destination (a constant can never be one)
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Temp(Temp),
    Var(VarRef),
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Temp(t) => write!(f, "{}", t),
            Place::Var(v) => write!(f, "{}", v),
        }
    }
}

/// Binary operators surviving into TAC. Logical `&&`/`||` do not appear
/// here; lowering turns them into conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators in TAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "!"),
        }
    }
}

/// A three-address instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// `dst = src`
    Assign { dst: Place, src: Operand },

    /// `dst = lhs op rhs`
    Binary {
        dst: Place,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },

    /// `dst = op src`
    Unary { dst: Place, op: UnOp, src: Operand },

    /// Jump target marker
    Label(Label),

    /// Unconditional jump
    Jump(Label),

    /// Jump when the condition is true
    JumpIfTrue { cond: Operand, target: Label },

    /// Jump when the condition is false
    JumpIfFalse { cond: Operand, target: Label },

    /// Push a call argument (arguments precede their `Call` in order)
    Param(Operand),

    /// Call a function; `dst` is absent for void calls
    Call {
        dst: Option<Place>,
        func: String,
        argc: usize,
    },

    /// Return, with or without a value
    Return(Option<Operand>),

    /// Read one input value into a variable
    Read(VarRef),

    /// Print one value
    Print(Operand),
}

impl Instr {
    /// The place this instruction writes, if any
    pub fn dst(&self) -> Option<&Place> {
        match self {
            Instr::Assign { dst, .. }
            | Instr::Binary { dst, .. }
            | Instr::Unary { dst, .. } => Some(dst),
            Instr::Call { dst, .. } => dst.as_ref(),
            _ => None,
        }
    }

    /// The operands this instruction reads
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instr::Assign { src, .. } => vec![src],
            Instr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Unary { src, .. } => vec![src],
            Instr::JumpIfTrue { cond, .. } | Instr::JumpIfFalse { cond, .. } => vec![cond],
            Instr::Param(op) | Instr::Print(op) => vec![op],
            Instr::Return(Some(op)) => vec![op],
            _ => Vec::new(),
        }
    }

    /// Mutable access to the operands this instruction reads
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instr::Assign { src, .. } => vec![src],
            Instr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Unary { src, .. } => vec![src],
            Instr::JumpIfTrue { cond, .. } | Instr::JumpIfFalse { cond, .. } => vec![cond],
            Instr::Param(op) | Instr::Print(op) => vec![op],
            Instr::Return(Some(op)) => vec![op],
            _ => Vec::new(),
        }
    }

    /// Does this instruction have an effect beyond writing its destination?
    /// Such instructions are never removed by dead code elimination.
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Instr::Call { .. }
                | Instr::Return(_)
                | Instr::Read(_)
                | Instr::Print(_)
                | Instr::Param(_)
                | Instr::Label(_)
                | Instr::Jump(_)
                | Instr::JumpIfTrue { .. }
                | Instr::JumpIfFalse { .. }
        )
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Assign { dst, src } => write!(f, "{} = {}", dst, src),
            Instr::Binary { dst, op, lhs, rhs } => {
                write!(f, "{} = {} {} {}", dst, lhs, op, rhs)
            }
            Instr::Unary { dst, op, src } => write!(f, "{} = {}{}", dst, op, src),
            Instr::Label(label) => write!(f, "{}:", label),
            Instr::Jump(label) => write!(f, "goto {}", label),
            Instr::JumpIfTrue { cond, target } => write!(f, "if {} goto {}", cond, target),
            Instr::JumpIfFalse { cond, target } => {
                write!(f, "ifFalse {} goto {}", cond, target)
            }
            Instr::Param(op) => write!(f, "param {}", op),
            Instr::Call {
                dst: Some(dst),
                func,
                argc,
            } => write!(f, "{} = call {}, {}", dst, func, argc),
            Instr::Call {
                dst: None,
                func,
                argc,
            } => write!(f, "call {}, {}", func, argc),
            Instr::Return(Some(op)) => write!(f, "return {}", op),
            Instr::Return(None) => write!(f, "return"),
            Instr::Read(var) => write!(f, "read {}", var),
            Instr::Print(op) => write!(f, "print {}", op),
        }
    }
}
