//! MinLang intermediate representation (three-address code)
//!
//! A flat, linear IR: every instruction has at most one operator and one
//! result. Basic blocks are not materialized as objects; they are index
//! ranges over the instruction array, recovered by the [`cfg`] module when
//! the optimizer needs them.

mod builder;
mod cfg;
mod instr;
mod lower;
mod opt;

pub use builder::FuncBuilder;
pub use cfg::{basic_blocks, BlockRange};
pub use instr::{BinOp, Const, Instr, Label, Operand, Place, Temp, UnOp, VarRef};
pub use lower::{lower, TacFunction, TacProgram};
pub use opt::optimize;
