//! Stack virtual machine
//!
//! Executes a [`CodeImage`]: an explicit operand stack, a frame per call
//! with indexed local slots, and a separate global slot area. Input and
//! output are pluggable streams so tests can drive `READ`/`PRINT`
//! deterministically.

use crate::codegen::{CodeImage, VmInstr};
use crate::ir::Const;
use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};
use thiserror::Error;

/// Runtime errors
#[derive(Error, Debug)]
pub enum VmError {
    #[error("program has no main function")]
    NoEntry,

    #[error("division by zero")]
    DivisionByZero,

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("operand type confusion in `{op}`")]
    TypeConfusion { op: &'static str },

    #[error("use of an uninitialized variable")]
    Uninitialized,

    #[error("input exhausted during read")]
    InputExhausted,

    #[error("step limit exceeded ({0} steps)")]
    StepLimit(u64),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    /// A slot that was never written
    Uninit,
}

impl From<&Const> for Value {
    fn from(c: &Const) -> Self {
        match c {
            Const::Int(v) => Value::Int(*v),
            Const::Float(v) => Value::Float(*v),
            Const::Bool(v) => Value::Bool(*v),
            Const::Char(v) => Value::Char(*v),
            Const::Str(v) => Value::Str(v.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Uninit => write!(f, "<uninit>"),
        }
    }
}

/// One call frame: indexed local slots plus the return address
struct Frame {
    locals: Vec<Value>,
    ret_addr: usize,
}

impl Frame {
    fn new(ret_addr: usize) -> Self {
        Self {
            locals: Vec::new(),
            ret_addr,
        }
    }

    fn load(&self, slot: u32) -> Value {
        self.locals
            .get(slot as usize)
            .cloned()
            .unwrap_or(Value::Uninit)
    }

    fn store(&mut self, slot: u32, value: Value) {
        let slot = slot as usize;
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, Value::Uninit);
        }
        self.locals[slot] = value;
    }
}

/// The virtual machine
pub struct Vm {
    stack: Vec<Value>,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    max_steps: u64,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            globals: Vec::new(),
            frames: Vec::new(),
            max_steps: 1_000_000,
        }
    }

    pub fn with_step_limit(max_steps: u64) -> Self {
        Self {
            max_steps,
            ..Self::new()
        }
    }

    /// Run a program from its `main` entry until it returns
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        image: &CodeImage,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), VmError> {
        let entry = image.entry.ok_or(VmError::NoEntry)?;

        self.stack.clear();
        self.globals = vec![Value::Uninit; image.globals];
        self.frames = vec![Frame::new(usize::MAX)];

        let mut pending_input: VecDeque<String> = VecDeque::new();
        let mut ip = entry;
        let mut steps = 0u64;

        while ip < image.instrs.len() {
            steps += 1;
            if steps > self.max_steps {
                return Err(VmError::StepLimit(self.max_steps));
            }

            match &image.instrs[ip] {
                VmInstr::PushConst(c) => self.stack.push(Value::from(c)),

                VmInstr::Load(slot) => {
                    let value = self.frame()?.load(*slot);
                    self.stack.push(value);
                }
                VmInstr::Store(slot) => {
                    let value = self.pop()?;
                    let slot = *slot;
                    self.frame_mut()?.store(slot, value);
                }
                VmInstr::LoadGlobal(slot) => {
                    let value = self
                        .globals
                        .get(*slot as usize)
                        .cloned()
                        .unwrap_or(Value::Uninit);
                    self.stack.push(value);
                }
                VmInstr::StoreGlobal(slot) => {
                    let value = self.pop()?;
                    let slot = *slot as usize;
                    if slot >= self.globals.len() {
                        self.globals.resize(slot + 1, Value::Uninit);
                    }
                    self.globals[slot] = value;
                }

                VmInstr::Add => self.binary(|a, b| arith(a, b, i64::wrapping_add, |x, y| x + y))?,
                VmInstr::Sub => self.binary(|a, b| arith(a, b, i64::wrapping_sub, |x, y| x - y))?,
                VmInstr::Mul => self.binary(|a, b| arith(a, b, i64::wrapping_mul, |x, y| x * y))?,
                VmInstr::Div => self.binary(divide)?,
                VmInstr::Rem => self.binary(modulo)?,
                VmInstr::Neg => {
                    let v = self.pop()?;
                    let r = match v {
                        Value::Int(v) => Value::Int(v.wrapping_neg()),
                        Value::Float(v) => Value::Float(-v),
                        _ => return Err(type_confusion("-", &v)),
                    };
                    self.stack.push(r);
                }

                VmInstr::Eq => self.binary(|a, b| Ok(Value::Bool(a == b)))?,
                VmInstr::Ne => self.binary(|a, b| Ok(Value::Bool(a != b)))?,
                VmInstr::Lt => self.binary(|a, b| compare(a, b, |o| o.is_lt()))?,
                VmInstr::Le => self.binary(|a, b| compare(a, b, |o| o.is_le()))?,
                VmInstr::Gt => self.binary(|a, b| compare(a, b, |o| o.is_gt()))?,
                VmInstr::Ge => self.binary(|a, b| compare(a, b, |o| o.is_ge()))?,

                VmInstr::Not => {
                    let v = self.pop()?;
                    match v {
                        Value::Bool(b) => self.stack.push(Value::Bool(!b)),
                        _ => return Err(type_confusion("!", &v)),
                    }
                }

                VmInstr::Jmp(target) => {
                    ip = *target;
                    continue;
                }
                VmInstr::Jmpf(target) => {
                    let v = self.pop()?;
                    match v {
                        Value::Bool(false) => {
                            ip = *target;
                            continue;
                        }
                        Value::Bool(true) => {}
                        _ => return Err(type_confusion("jmpf", &v)),
                    }
                }

                VmInstr::Call { addr, argc } => {
                    let mut frame = Frame::new(ip + 1);
                    // Arguments were pushed left to right; pop them into
                    // the first slots of the new frame
                    let base = self
                        .stack
                        .len()
                        .checked_sub(*argc)
                        .ok_or(VmError::StackUnderflow)?;
                    for (i, value) in self.stack.drain(base..).enumerate() {
                        frame.store(i as u32, value);
                    }
                    self.frames.push(frame);
                    ip = *addr;
                    continue;
                }

                VmInstr::Ret => {
                    let frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
                    if frame.ret_addr == usize::MAX {
                        // main returned
                        return Ok(());
                    }
                    ip = frame.ret_addr;
                    continue;
                }

                VmInstr::Read(slot) => {
                    let value = read_value(input, &mut pending_input)?;
                    let slot = *slot;
                    self.frame_mut()?.store(slot, value);
                }
                VmInstr::ReadGlobal(slot) => {
                    let value = read_value(input, &mut pending_input)?;
                    let slot = *slot as usize;
                    if slot >= self.globals.len() {
                        self.globals.resize(slot + 1, Value::Uninit);
                    }
                    self.globals[slot] = value;
                }

                VmInstr::Print => {
                    let value = self.pop()?;
                    if matches!(value, Value::Uninit) {
                        return Err(VmError::Uninitialized);
                    }
                    writeln!(output, "{}", value)?;
                }
            }
            ip += 1;
        }

        Ok(())
    }

    fn frame(&self) -> Result<&Frame, VmError> {
        self.frames.last().ok_or(VmError::StackUnderflow)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames.last_mut().ok_or(VmError::StackUnderflow)
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn binary(
        &mut self,
        f: impl FnOnce(Value, Value) -> Result<Value, VmError>,
    ) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let r = f(a, b)?;
        self.stack.push(r);
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn type_confusion(op: &'static str, value: &Value) -> VmError {
    if matches!(value, Value::Uninit) {
        VmError::Uninitialized
    } else {
        VmError::TypeConfusion { op }
    }
}

fn arith(
    a: Value,
    b: Value,
    iop: impl Fn(i64, i64) -> i64,
    fop: impl Fn(f64, f64) -> f64,
) -> Result<Value, VmError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(iop(a, b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(fop(a, b))),
        (a, b) => Err(arith_confusion(&a, &b)),
    }
}

fn divide(a: Value, b: Value) -> Result<Value, VmError> {
    match (a, b) {
        (_, Value::Int(0)) => Err(VmError::DivisionByZero),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(b))),
        (_, Value::Float(b)) if b == 0.0 => Err(VmError::DivisionByZero),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (a, b) => Err(arith_confusion(&a, &b)),
    }
}

fn modulo(a: Value, b: Value) -> Result<Value, VmError> {
    match (a, b) {
        (_, Value::Int(0)) => Err(VmError::DivisionByZero),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(b))),
        (_, Value::Float(b)) if b == 0.0 => Err(VmError::DivisionByZero),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
        (a, b) => Err(arith_confusion(&a, &b)),
    }
}

fn compare(a: Value, b: Value, f: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, VmError> {
    let ordering = match (&a, &b) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater)
        }
        _ => return Err(arith_confusion(&a, &b)),
    };
    Ok(Value::Bool(f(ordering)))
}

fn arith_confusion(a: &Value, b: &Value) -> VmError {
    if matches!(a, Value::Uninit) || matches!(b, Value::Uninit) {
        VmError::Uninitialized
    } else {
        VmError::TypeConfusion { op: "arith" }
    }
}

/// Pull one whitespace-delimited token from the input and parse it by
/// shape: bool keywords, then integer, then float, then a single char,
/// falling back to a raw string.
fn read_value<R: BufRead>(
    input: &mut R,
    pending: &mut VecDeque<String>,
) -> Result<Value, VmError> {
    while pending.is_empty() {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(VmError::InputExhausted);
        }
        pending.extend(line.split_whitespace().map(str::to_string));
    }
    let token = pending.pop_front().expect("token available");

    let value = if token == "true" {
        Value::Bool(true)
    } else if token == "false" {
        Value::Bool(false)
    } else if let Ok(v) = token.parse::<i64>() {
        Value::Int(v)
    } else if let Ok(v) = token.parse::<f64>() {
        Value::Float(v)
    } else if token.chars().count() == 1 {
        Value::Char(token.chars().next().expect("one char"))
    } else {
        Value::Str(token)
    };
    Ok(value)
}
