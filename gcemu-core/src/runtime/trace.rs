//! Instruction-Level Tracing
//!
//! Records the instructions an [`Interpreter`](crate::cpu::Interpreter)
//! executes together with the integer register state seen just before each
//! one. Hook it up through a step observer:
//!
//! ```rust,no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use gcemu_core::cpu::{Instruction, Interpreter, RegisterFile};
//! use gcemu_core::runtime::{Ram, TraceRecorder};
//!
//! let recorder = Rc::new(RefCell::new(TraceRecorder::new(10_000)));
//! let mut interpreter = Interpreter::new(Ram::new(), 0x8000_3100);
//! let sink = Rc::clone(&recorder);
//! interpreter.set_observer(move |pc: u32, instr: &Instruction, regs: &RegisterFile| {
//!     sink.borrow_mut().record(pc, instr, regs)
//! });
//! interpreter.run(Some(1_000));
//! let json = recorder.borrow().export_json()?;
//! # Ok::<(), serde_json::Error>(())
//! ```
//!
//! # Filtering
//! With no ranges or addresses added every instruction is recorded.
//! Exclusions win over inclusions.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::cpu::decoder::Instruction;
use crate::cpu::disasm::disassemble;
use crate::cpu::registers::RegisterFile;

/// One executed instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionTrace {
    /// Position in the recorder's stream (counts filtered-out steps too)
    pub step: u64,
    pub address: u32,
    pub raw: u32,
    pub disassembly: String,
    /// GPR r0-r31 before execution
    pub gpr: [u32; 32],
    pub lr: u32,
    pub ctr: u32,
    pub cr: u32,
    pub xer: u32,
}

impl InstructionTrace {
    pub fn new(step: u64, address: u32, instr: &Instruction, regs: &RegisterFile) -> Self {
        Self {
            step,
            address,
            raw: instr.raw,
            disassembly: disassemble(instr, address).to_string(),
            gpr: regs.gpr,
            lr: regs.lr,
            ctr: regs.ctr,
            cr: regs.cr,
            xer: regs.xer,
        }
    }
}

/// Which addresses get recorded.
#[derive(Debug, Clone, Default)]
pub struct TraceFilter {
    /// Inclusive `(start, end)` ranges
    address_ranges: Vec<(u32, u32)>,
    addresses: HashSet<u32>,
    exclude_addresses: HashSet<u32>,
}

impl TraceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include `start..=end`.
    pub fn add_address_range(&mut self, start: u32, end: u32) {
        self.address_ranges.push((start, end));
    }

    pub fn add_address(&mut self, address: u32) {
        self.addresses.insert(address);
    }

    pub fn exclude_address(&mut self, address: u32) {
        self.exclude_addresses.insert(address);
    }

    pub fn should_trace(&self, address: u32) -> bool {
        if self.exclude_addresses.contains(&address) {
            return false;
        }
        if self.addresses.is_empty() && self.address_ranges.is_empty() {
            return true;
        }
        self.addresses.contains(&address)
            || self
                .address_ranges
                .iter()
                .any(|&(start, end)| (start..=end).contains(&address))
    }
}

/// Bounded ring of the most recent traces.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    traces: VecDeque<InstructionTrace>,
    capacity: usize,
    filter: TraceFilter,
    seen: u64,
}

impl TraceRecorder {
    /// Keep at most `capacity` traces; older ones are dropped first.
    pub fn new(capacity: usize) -> Self {
        Self {
            traces: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            filter: TraceFilter::new(),
            seen: 0,
        }
    }

    pub fn filter_mut(&mut self) -> &mut TraceFilter {
        &mut self.filter
    }

    pub fn record(&mut self, address: u32, instr: &Instruction, regs: &RegisterFile) {
        let step = self.seen;
        self.seen += 1;
        if self.capacity == 0 || !self.filter.should_trace(address) {
            return;
        }
        if self.traces.len() == self.capacity {
            self.traces.pop_front();
        }
        self.traces.push_back(InstructionTrace::new(step, address, instr, regs));
    }

    pub fn traces(&self) -> impl Iterator<Item = &InstructionTrace> {
        self.traces.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn clear(&mut self) {
        self.traces.clear();
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(recorder: &mut TraceRecorder, address: u32) {
        let regs = RegisterFile::new();
        recorder.record(address, &Instruction::decode(0x6000_0000), &regs);
    }

    #[test]
    fn test_ring_keeps_latest() {
        let mut recorder = TraceRecorder::new(2);
        for address in [0x100, 0x104, 0x108] {
            record_at(&mut recorder, address);
        }
        let kept: Vec<_> = recorder.traces().map(|t| (t.step, t.address)).collect();
        assert_eq!(kept, vec![(1, 0x104), (2, 0x108)]);
    }

    #[test]
    fn test_filter() {
        let mut recorder = TraceRecorder::new(16);
        recorder.filter_mut().add_address_range(0x200, 0x20C);
        recorder.filter_mut().exclude_address(0x204);
        for address in (0x1FC..0x214).step_by(4) {
            record_at(&mut recorder, address);
        }
        let kept: Vec<_> = recorder.traces().map(|t| t.address).collect();
        assert_eq!(kept, vec![0x200, 0x208, 0x20C]);
    }

    #[test]
    fn test_export_json() {
        let mut recorder = TraceRecorder::new(4);
        record_at(&mut recorder, 0x8000_0000);
        let json = recorder.export_json().unwrap();
        let back: Vec<InstructionTrace> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].disassembly, "ori       r0, r0, 0x0");
    }
}
