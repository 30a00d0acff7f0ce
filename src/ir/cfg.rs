//! Basic blocks over the flat instruction array
//!
//! Blocks are not materialized: a block is an index range whose first
//! instruction is a leader (function entry, a label, or the instruction
//! after a jump or return). Edges are recovered from jump targets in a
//! second pass over the ranges.

use super::instr::{Instr, Label};
use std::collections::HashMap;

/// A basic block as a half-open range `[start, end)` into the body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: usize,
    pub end: usize,
}

impl BlockRange {
    pub fn instrs<'a>(&self, body: &'a [Instr]) -> &'a [Instr] {
        &body[self.start..self.end]
    }
}

/// Split a function body into basic blocks
pub fn basic_blocks(body: &[Instr]) -> Vec<BlockRange> {
    if body.is_empty() {
        return Vec::new();
    }

    let mut leaders = vec![false; body.len()];
    leaders[0] = true;
    for (i, instr) in body.iter().enumerate() {
        match instr {
            Instr::Label(_) => leaders[i] = true,
            Instr::Jump(_)
            | Instr::JumpIfTrue { .. }
            | Instr::JumpIfFalse { .. }
            | Instr::Return(_) => {
                if i + 1 < body.len() {
                    leaders[i + 1] = true;
                }
            }
            _ => {}
        }
    }

    let mut blocks = Vec::new();
    let mut start = 0;
    for i in 1..body.len() {
        if leaders[i] {
            blocks.push(BlockRange { start, end: i });
            start = i;
        }
    }
    blocks.push(BlockRange {
        start,
        end: body.len(),
    });
    blocks
}

/// Indices of the blocks each block can transfer control to
pub fn block_successors(body: &[Instr], blocks: &[BlockRange]) -> Vec<Vec<usize>> {
    // Second pass: resolve each label to the block that starts with it
    let mut label_block: HashMap<Label, usize> = HashMap::new();
    for (bi, block) in blocks.iter().enumerate() {
        if let Some(Instr::Label(label)) = body.get(block.start) {
            label_block.insert(*label, bi);
        }
    }

    blocks
        .iter()
        .enumerate()
        .map(|(bi, block)| {
            let mut succs = Vec::new();
            let last = &body[block.end - 1];
            match last {
                Instr::Jump(target) => {
                    if let Some(&b) = label_block.get(target) {
                        succs.push(b);
                    }
                }
                Instr::JumpIfTrue { target, .. } | Instr::JumpIfFalse { target, .. } => {
                    if let Some(&b) = label_block.get(target) {
                        succs.push(b);
                    }
                    if bi + 1 < blocks.len() {
                        succs.push(bi + 1);
                    }
                }
                Instr::Return(_) => {}
                _ => {
                    if bi + 1 < blocks.len() {
                        succs.push(bi + 1);
                    }
                }
            }
            succs
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::instr::*;
    use super::*;

    fn temp(n: u32) -> Operand {
        Operand::Temp(Temp(n))
    }

    #[test]
    fn test_straight_line_is_one_block() {
        let body = vec![
            Instr::Assign {
                dst: Place::Temp(Temp(0)),
                src: Operand::Const(Const::Int(1)),
            },
            Instr::Print(temp(0)),
            Instr::Return(None),
        ];
        let blocks = basic_blocks(&body);
        assert_eq!(blocks, vec![BlockRange { start: 0, end: 3 }]);
    }

    #[test]
    fn test_loop_shape_blocks_and_edges() {
        // L0: ifFalse t0 goto L1 / print / goto L0 / L1: return
        let body = vec![
            Instr::Label(Label(0)),
            Instr::JumpIfFalse {
                cond: temp(0),
                target: Label(1),
            },
            Instr::Print(temp(0)),
            Instr::Jump(Label(0)),
            Instr::Label(Label(1)),
            Instr::Return(None),
        ];
        let blocks = basic_blocks(&body);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], BlockRange { start: 0, end: 2 });
        assert_eq!(blocks[1], BlockRange { start: 2, end: 4 });
        assert_eq!(blocks[2], BlockRange { start: 4, end: 6 });

        let succs = block_successors(&body, &blocks);
        // Conditional header: exit block and fallthrough body
        assert_eq!(succs[0], vec![2, 1]);
        // Body jumps back to the header
        assert_eq!(succs[1], vec![0]);
        // Return has no successors
        assert!(succs[2].is_empty());
    }

    #[test]
    fn test_label_starts_new_block() {
        let body = vec![
            Instr::Print(temp(0)),
            Instr::Label(Label(0)),
            Instr::Print(temp(1)),
        ];
        let blocks = basic_blocks(&body);
        assert_eq!(blocks.len(), 2);
        // Fallthrough edge into the labeled block
        let succs = block_successors(&body, &blocks);
        assert_eq!(succs[0], vec![1]);
    }

    #[test]
    fn test_empty_body() {
        assert!(basic_blocks(&[]).is_empty());
    }
}
