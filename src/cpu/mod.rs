// The SPG200 CPU core: eight general registers (two of which, SR and PC, are
// not plain storage), a segmented 22-bit code/data address space, and two
// interrupt levels (eight OR-reduced IRQ lines plus a single FIQ line).
//
// `step` fetches one instruction, dispatches it, and returns the cycle cost
// so the caller (`Machine::run_frame`) can drive every other peripheral's
// clock off the same count. Interrupt entry is checked once per `step`,
// ahead of the fetch.

pub mod alu;
pub mod decode;

use crate::bus::Bus;
use crate::error::{fatal, CoreResult};
use alu::{alu_op, check_branch, FLAG_C};
use decode::{AluOp, BranchOp, CpuReg, Instruction, BP, PC, SP, SR};

/// Which shift-bits bank is active. The core keeps one `sb` register per
/// execution context so a FIQ or IRQ handler doesn't clobber the shift count
/// the interrupted code was mid-barrel-shift with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShiftBank {
    Normal = 0,
    Irq = 1,
    Fiq = 2,
}

pub struct Cpu {
    /// R0 (SP), R1..R4, R5 (BP), R6 (SR), R7 (PC).
    regs: [u16; 8],
    /// One shift-bits register per execution context (normal/IRQ/FIQ).
    sb: [u8; 3],
    /// Latched level of each of the 8 IRQ lines, OR-reduced by the aggregator
    /// before `set_irq` is ever called, but kept per-line here too so a line
    /// going low again before it is serviced still deasserts correctly.
    irq_signal: u8,
    fiq_signal: bool,
    irq_active: bool,
    fiq_active: bool,
    irq_enable: bool,
    fiq_enable: bool,
    /// Gates FIR MULS's mid-loop memory write-back. Persists across
    /// instructions; toggled only by the control-register opcode.
    fir_mov: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            regs: [0; 8],
            sb: [0; 3],
            irq_signal: 0,
            fiq_signal: false,
            irq_active: false,
            fiq_active: false,
            irq_enable: false,
            fiq_enable: false,
            fir_mov: true,
        }
    }

    /// Load the reset vector and clear every piece of interrupt/shift state.
    pub fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.regs = [0; 8];
        self.sb = [0; 3];
        self.irq_signal = 0;
        self.fiq_signal = false;
        self.irq_active = false;
        self.fiq_active = false;
        self.irq_enable = false;
        self.fiq_enable = false;
        self.fir_mov = true;
        let vector = bus.read_word(0xfff7);
        self.set_cs_pc(vector as u32);
    }

    pub fn reg(&self, r: CpuReg) -> u16 {
        self.regs[r as usize]
    }

    pub fn set_reg(&mut self, r: CpuReg, value: u16) {
        self.regs[r as usize] = value;
    }

    pub fn pc(&self) -> u16 {
        self.regs[PC]
    }

    pub fn sr(&self) -> u16 {
        self.regs[SR]
    }

    /// Current instruction-fetch address: a 6-bit code segment plus the
    /// 16-bit program counter, assembled into one 22-bit value.
    pub fn cs_pc(&self) -> u32 {
        ((self.get_cs() as u32) << 16) | self.regs[PC] as u32
    }

    fn set_cs_pc(&mut self, value: u32) {
        self.regs[PC] = (value & 0xffff) as u16;
        self.set_cs(((value >> 16) & 0x3f) as u16);
    }

    pub fn get_cs(&self) -> u16 {
        self.regs[SR] & 0x3f
    }

    fn set_cs(&mut self, cs: u16) {
        self.regs[SR] = (self.regs[SR] & !0x3f) | (cs & 0x3f);
    }

    /// The data segment, used by every `[Rs]`-indirect addressing mode.
    pub fn get_ds(&self) -> u16 {
        (self.regs[SR] >> 10) & 0x3f
    }

    pub fn set_ds(&mut self, ds: u16) {
        self.regs[SR] = (self.regs[SR] & !0xfc00) | ((ds & 0x3f) << 10);
    }

    /// Effective 22-bit address of `[DS:reg]`.
    fn ds_addr(&self, reg_value: u16) -> u32 {
        ((self.get_ds() as u32) << 16) | reg_value as u32
    }

    /// Raise or lower one of the eight aggregated IRQ lines.
    pub fn set_irq(&mut self, line: u8, value: bool) {
        let bit = 1u8 << line;
        if value {
            self.irq_signal |= bit;
        } else {
            self.irq_signal &= !bit;
        }
    }

    pub fn set_fiq(&mut self, value: bool) {
        self.fiq_signal = value;
    }

    fn shift_bank(&self) -> usize {
        if self.fiq_active {
            ShiftBank::Fiq as usize
        } else if self.irq_active {
            ShiftBank::Irq as usize
        } else {
            ShiftBank::Normal as usize
        }
    }

    fn push_word<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.push_word_via(bus, SP, value);
    }

    fn pop_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        self.pop_word_via(bus, SP)
    }

    fn push_word_via<B: Bus>(&mut self, bus: &mut B, sp_reg: usize, value: u16) {
        let addr = self.ds_addr(self.regs[sp_reg]);
        bus.write_word(addr, value);
        self.regs[sp_reg] = self.regs[sp_reg].wrapping_sub(1);
    }

    fn pop_word_via<B: Bus>(&mut self, bus: &mut B, sp_reg: usize) -> u16 {
        self.regs[sp_reg] = self.regs[sp_reg].wrapping_add(1);
        let addr = self.ds_addr(self.regs[sp_reg]);
        bus.read_word(addr)
    }

    /// FIQ takes priority over IRQ; neither preempts an already-active
    /// handler of its own level (the enable flags are cleared on entry and
    /// restored by the handler's own RETI). Returns whether entry happened
    /// this step, in which case it is the only thing that happened.
    fn check_interrupts<B: Bus>(&mut self, bus: &mut B) -> bool {
        if self.fiq_signal && !self.fiq_active && self.fiq_enable {
            self.fiq_active = true;
            self.fiq_enable = false;
            let pc_word = self.cs_pc() as u16;
            self.push_word(bus, pc_word);
            self.push_word(bus, self.regs[SR]);
            let vector = bus.read_word(0xfff6);
            self.regs[SR] = 0;
            self.set_cs_pc(vector as u32);
            return true;
        }
        if self.irq_signal != 0 && !self.irq_active && self.irq_enable {
            let line = self.irq_signal.trailing_zeros();
            self.irq_active = true;
            self.irq_enable = false;
            let pc_word = self.cs_pc() as u16;
            self.push_word(bus, pc_word);
            self.push_word(bus, self.regs[SR]);
            let vector = bus.read_word(0xfff8 + line as u32);
            self.regs[SR] = 0;
            self.set_cs_pc(vector as u32);
            return true;
        }
        false
    }

    /// `RETI`: pop SR then PC, and drop back to whichever level (FIQ takes
    /// priority) is currently active.
    fn return_from_interrupt<B: Bus>(&mut self, bus: &mut B) {
        let sr = self.pop_word(bus);
        self.regs[SR] = sr;
        let pc = self.pop_word(bus);
        self.set_cs_pc(pc as u32);
        if self.fiq_active {
            self.fiq_active = false;
            self.fiq_enable = true;
        } else {
            self.irq_active = false;
            self.irq_enable = true;
        }
    }

    fn fetch<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let addr = self.cs_pc();
        let word = bus.read_word(addr);
        self.set_cs_pc(addr.wrapping_add(1));
        word
    }

    /// Execute one instruction (after interrupt entry has already been
    /// checked) and return its cycle cost.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> CoreResult<u32> {
        if self.check_interrupts(bus) {
            return Ok(10);
        }
        let word = self.fetch(bus);
        let instr = Instruction(word);
        if instr.op0() == 0xf {
            self.execute_extended(instr, bus)
        } else {
            self.execute_alu_or_branch(instr, bus)
        }
    }

    fn execute_extended<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        match instr.op1() {
            0 => self.exec_mul(instr, false),
            1 => self.exec_call(instr, bus),
            2 if instr.rd() == PC => self.exec_goto(instr, bus),
            2 | 3 => self.exec_muls(instr, bus, false),
            4 => self.exec_mul(instr, true),
            5 => self.exec_control(instr, bus),
            6 | 7 => self.exec_muls(instr, bus, true),
            _ => unreachable!("op1 is 3 bits"),
        }
    }

    /// Single-shot `R4:R3 = rd * rs`, unsigned*signed (`op1==0`) or
    /// signed*signed (`op1==4`). Only legal when `opn==1`.
    fn exec_mul(&mut self, instr: Instruction, both_signed: bool) -> CoreResult<u32> {
        if instr.opn() != 1 {
            return Err(fatal("cpu", "MUL requires opn==1"));
        }
        if instr.rd() == PC || instr.rs() == PC {
            return Err(fatal("cpu", "MUL may not target or read PC"));
        }
        let val1 = self.regs[instr.rd()];
        let val2 = self.regs[instr.rs()];
        let a = if both_signed {
            val1 as i16 as i64
        } else {
            val1 as i64
        };
        let b = val2 as i16 as i64;
        let product = (a * b) as u32;
        self.regs[CpuReg::R3 as usize] = (product & 0xffff) as u16;
        self.regs[CpuReg::R4 as usize] = (product >> 16) as u16;
        Ok(12)
    }

    /// The FIR multiply-accumulate loop: `muls_n` (0 meaning 16) iterations
    /// of `acc += rd[i] * rs[i]`, advancing both pointers through `[DS:Rd]`
    /// and `[DS:Rs]`. When `fir_mov` is set, every iteration past the first
    /// overwrites the word it just read at `[rd]` with the *previous*
    /// iteration's `[rs]` value — a mid-loop memory mutation, not a register
    /// delay.
    fn exec_muls<B: Bus>(
        &mut self,
        instr: Instruction,
        bus: &mut B,
        val1_signed: bool,
    ) -> CoreResult<u32> {
        let n = if instr.muls_n() == 0 { 16 } else { instr.muls_n() };
        let mut rd_ptr = self.regs[instr.rd()];
        let mut rs_ptr = self.regs[instr.rs()];
        let mut acc: i64 = 0;
        let mut prev_val2: u16 = 0;
        for i in 0..n {
            let rd_addr = self.ds_addr(rd_ptr);
            let a_word = bus.read_word(rd_addr);
            let b_word = bus.read_word(self.ds_addr(rs_ptr));
            if self.fir_mov && i > 0 {
                bus.write_word(rd_addr, prev_val2);
            }
            prev_val2 = b_word;
            let a = if val1_signed {
                a_word as i16 as i64
            } else {
                a_word as i64
            };
            let b = b_word as i16 as i64;
            acc += a * b;
            rd_ptr = rd_ptr.wrapping_add(1);
            rs_ptr = rs_ptr.wrapping_add(1);
        }
        self.regs[instr.rd()] = rd_ptr;
        self.regs[instr.rs()] = rs_ptr;
        let product = acc as u64 as u32;
        self.regs[CpuReg::R3 as usize] = (product & 0xffff) as u16;
        self.regs[CpuReg::R4 as usize] = (product >> 16) as u16;
        Ok(10 * n as u32 + 6)
    }

    fn exec_call<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let target = ((instr.imm6() as u32) << 16) | self.fetch(bus) as u32;
        let pc_word = self.cs_pc() as u16;
        self.push_word(bus, pc_word);
        self.push_word(bus, self.regs[SR]);
        self.set_cs_pc(target);
        Ok(9)
    }

    /// Unconditional absolute jump, same 22-bit target shape as CALL but
    /// without the return-address push.
    fn exec_goto<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let target = ((instr.imm6() as u32) << 16) | self.fetch(bus) as u32;
        self.set_cs_pc(target);
        Ok(5)
    }

    /// Control-register opcodes (`op1==5`), keyed on the literal `imm6`
    /// value rather than any sub-field: enable/disable IRQ+FIQ together
    /// (0-3), set/clear `fir_mov` (4-5), IRQ alone (8-9), FIQ alone (12,14),
    /// BREAK (32/40/48/56), NOP (37). Anything else is unknown and fatal.
    fn exec_control<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        match instr.imm6() {
            0 => {
                self.irq_enable = false;
                self.fiq_enable = false;
                Ok(2)
            }
            1 => {
                self.irq_enable = true;
                self.fiq_enable = false;
                Ok(2)
            }
            2 => {
                self.irq_enable = false;
                self.fiq_enable = true;
                Ok(2)
            }
            3 => {
                self.irq_enable = true;
                self.fiq_enable = true;
                Ok(2)
            }
            4 => {
                self.fir_mov = false;
                Ok(2)
            }
            5 => {
                self.fir_mov = true;
                Ok(2)
            }
            8 => {
                self.irq_enable = false;
                Ok(2)
            }
            9 => {
                self.irq_enable = true;
                Ok(2)
            }
            12 => {
                self.fiq_enable = false;
                Ok(2)
            }
            14 => {
                self.fiq_enable = true;
                Ok(2)
            }
            32 | 40 | 48 | 56 => {
                // BREAK: software vector at 0xfff5, same entry shape as IRQ.
                let pc_word = self.cs_pc() as u16;
                self.push_word(bus, pc_word);
                self.push_word(bus, self.regs[SR]);
                let vector = bus.read_word(0xfff5);
                self.regs[SR] = 0;
                self.set_cs_pc(vector as u32);
                Ok(10)
            }
            37 => Ok(2), // NOP
            other => Err(fatal("cpu", format!("unknown control opcode imm6={other}"))),
        }
    }

    fn execute_alu_or_branch<B: Bus>(
        &mut self,
        instr: Instruction,
        bus: &mut B,
    ) -> CoreResult<u32> {
        match instr.op1n() {
            0..=7 if instr.rd() == PC => self.exec_branch(instr, true),
            0..=7 => self.exec_bp_relative(instr, bus),
            8..=15 if instr.rd() == PC => self.exec_branch(instr, false),
            8..=15 => self.exec_immediate(instr),
            16..=23 => self.exec_push_pop(instr, bus),
            24..=31 => self.exec_indirect(instr, bus),
            32 => self.exec_register(instr),
            33 => self.exec_register_imm16(instr, bus),
            34 => self.exec_imm16_read(instr, bus),
            35 => self.exec_imm16_write(instr, bus),
            36..=55 => self.exec_shift(instr),
            56..=63 => self.exec_absolute6(instr, bus),
            _ => unreachable!("op1n is 6 bits"),
        }
    }

    fn alu_op_or_fatal(&self, instr: Instruction) -> CoreResult<AluOp> {
        AluOp::from_op0(instr.op0())
            .ok_or_else(|| fatal("cpu", format!("unknown ALU opcode {:#x}", instr.op0())))
    }

    fn carry_in(&self, op: AluOp) -> bool {
        match op {
            AluOp::Adc | AluOp::Sbc => self.regs[SR] & FLAG_C != 0,
            _ => false,
        }
    }

    /// Apply an ALU result to `dest`, honoring the "no flag update when the
    /// destination is PC" and "CMP/TEST never write back" rules.
    fn commit(&mut self, dest: usize, result: alu::AluResult) {
        if dest != PC {
            self.regs[SR] = (self.regs[SR] & !0x3c0) | result.flags;
        }
        if result.writes_back {
            self.regs[dest] = result.value;
        }
    }

    /// `0..7`/`8..15` with `rd==PC`: conditional branch by `imm6`, forward
    /// in the low half and backward in the high half.
    fn exec_branch(&mut self, instr: Instruction, forward: bool) -> CoreResult<u32> {
        let branchop = BranchOp::from_op0(instr.op0());
        if check_branch(branchop, self.regs[SR]) {
            let imm = instr.imm6() as i32;
            let offset = if forward { imm } else { -imm };
            self.regs[PC] = (self.regs[PC] as i32).wrapping_add(offset) as u16;
            Ok(4)
        } else {
            Ok(2)
        }
    }

    /// `16..23`: push/pop a run of registers through the register named by
    /// `rs` (almost always `SP`, but not required to be). The count comes
    /// from `opn`, not `rs`; push walks `rd` downward to `R0`, pop walks
    /// `rd` upward to `R7`, both clamped at the register file's edge rather
    /// than wrapping.
    fn exec_push_pop<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        if instr.rd() == BP && instr.opn() == 3 && instr.rs() == SP {
            self.return_from_interrupt(bus);
            return Ok(10);
        }
        let op = self.alu_op_or_fatal(instr)?;
        let n = instr.opn();
        let sp_reg = instr.rs();
        match op {
            AluOp::Store => {
                let mut reg = instr.rd() as i32;
                for _ in 0..n {
                    if reg < 0 {
                        break;
                    }
                    let value = self.regs[reg as usize];
                    self.push_word_via(bus, sp_reg, value);
                    reg -= 1;
                }
            }
            AluOp::Load => {
                let mut reg = instr.rd() as i32;
                for _ in 0..n {
                    if reg + 1 > 7 {
                        break;
                    }
                    reg += 1;
                    let value = self.pop_word_via(bus, sp_reg);
                    self.regs[reg as usize] = value;
                }
            }
            _ => return Err(fatal("cpu", "push/pop addressing requires STORE or LOAD")),
        }
        Ok(2 * n as u32 + 4)
    }

    /// `0..7` with `rd!=PC`: `[BP+imm6]`, no DS segmentation.
    fn exec_bp_relative<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        let addr = self.regs[BP].wrapping_add(instr.imm6()) as u32;
        if matches!(op, AluOp::Store) {
            bus.write_word(addr, self.regs[instr.rd()]);
        } else {
            let val1 = self.regs[instr.rd()];
            let val2 = bus.read_word(addr);
            let result = alu_op(op, val1, val2, self.carry_in(op));
            self.commit(instr.rd(), result);
        }
        Ok(6)
    }

    /// `8..15` with `rd!=PC`: `Rd = Rd OP imm6`, immediate operand, no
    /// memory access. STORE has nowhere to write and is illegal here.
    fn exec_immediate(&mut self, instr: Instruction) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        if matches!(op, AluOp::Store) {
            return Err(fatal("cpu", "STORE is not a legal immediate-addressing opcode"));
        }
        let val1 = self.regs[instr.rd()];
        let result = alu_op(op, val1, instr.imm6(), self.carry_in(op));
        let dest = instr.rd();
        self.commit(dest, result);
        Ok(2)
    }

    /// `24..31`: indirect `[Rs]`, pre/post increment/decrement selected by
    /// the low two bits of `opn`. The top bit of `opn` selects whether the
    /// address is DS-segmented at all, and if so whether DS itself is
    /// nudged when `Rs` overflows/underflows 16 bits (the "segmented
    /// post-increment" boundary case).
    fn exec_indirect<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        let opn = instr.opn();
        let ds_prefix = opn & 0x4 != 0;
        let increment = opn & 0x1 == 0;
        let pre = opn & 0x2 != 0;

        let step = |rs: u16| -> (u16, bool) {
            if increment {
                let next = rs.wrapping_add(1);
                (next, rs == 0xffff)
            } else {
                let next = rs.wrapping_sub(1);
                (next, rs == 0x0000)
            }
        };
        let bump_ds = |cpu: &mut Self, wrapped: bool| {
            if ds_prefix && wrapped {
                let ds = cpu.get_ds();
                cpu.set_ds(if increment {
                    ds.wrapping_add(1)
                } else {
                    ds.wrapping_sub(1)
                });
            }
        };

        if pre {
            let (next, wrapped) = step(self.regs[instr.rs()]);
            bump_ds(self, wrapped);
            self.regs[instr.rs()] = next;
        }
        let addr = if ds_prefix {
            self.ds_addr(self.regs[instr.rs()])
        } else {
            self.regs[instr.rs()] as u32
        };
        if matches!(op, AluOp::Store) {
            bus.write_word(addr, self.regs[instr.rd()]);
        } else {
            let val1 = self.regs[instr.rd()];
            let val2 = bus.read_word(addr);
            let result = alu_op(op, val1, val2, self.carry_in(op));
            self.commit(instr.rd(), result);
        }
        if !pre {
            let (next, wrapped) = step(self.regs[instr.rs()]);
            bump_ds(self, wrapped);
            self.regs[instr.rs()] = next;
        }
        Ok(6)
    }

    fn exec_register(&mut self, instr: Instruction) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        if matches!(op, AluOp::Store) {
            return Err(fatal("cpu", "STORE is not a legal register-register opcode"));
        }
        let val1 = self.regs[instr.rd()];
        let val2 = self.regs[instr.rs()];
        let result = alu_op(op, val1, val2, self.carry_in(op));
        let dest = instr.rd();
        self.commit(dest, result);
        Ok(2)
    }

    fn exec_register_imm16<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        if matches!(op, AluOp::Store) {
            return Err(fatal("cpu", "STORE is not a legal immediate opcode"));
        }
        let imm = self.fetch(bus);
        let val1 = self.regs[instr.rd()];
        let result = alu_op(op, val1, imm, self.carry_in(op));
        let dest = instr.rd();
        self.commit(dest, result);
        Ok(4)
    }

    /// `34`: `[imm16]` read, fetched as the word following the opcode. No
    /// DS segmentation.
    fn exec_imm16_read<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        let addr = self.fetch(bus) as u32;
        if matches!(op, AluOp::Store) {
            bus.write_word(addr, self.regs[instr.rd()]);
        } else {
            let val1 = self.regs[instr.rd()];
            let val2 = bus.read_word(addr);
            let result = alu_op(op, val1, val2, self.carry_in(op));
            self.commit(instr.rd(), result);
        }
        Ok(8)
    }

    /// `35`: `[imm16]` write, no DS segmentation. STORE writes `Rs` straight
    /// through; every other op combines `Rs` with `Rd` (never touching the
    /// slot itself as an operand) and writes the result into the slot.
    fn exec_imm16_write<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        let addr = self.fetch(bus) as u32;
        if matches!(op, AluOp::Store) {
            bus.write_word(addr, self.regs[instr.rs()]);
        } else {
            let val1 = self.regs[instr.rs()];
            let val2 = self.regs[instr.rd()];
            let result = alu_op(op, val1, val2, self.carry_in(op));
            self.regs[SR] = (self.regs[SR] & !0x3c0) | result.flags;
            if result.writes_back {
                bus.write_word(addr, result.value);
            }
        }
        Ok(8)
    }

    /// `56..63`: `[imm6]` absolute, zero-extended, no DS segmentation.
    fn exec_absolute6<B: Bus>(&mut self, instr: Instruction, bus: &mut B) -> CoreResult<u32> {
        let op = self.alu_op_or_fatal(instr)?;
        let addr = instr.imm6() as u32;
        if matches!(op, AluOp::Store) {
            bus.write_word(addr, self.regs[instr.rd()]);
        } else {
            let val1 = self.regs[instr.rd()];
            let val2 = bus.read_word(addr);
            let result = alu_op(op, val1, val2, self.carry_in(op));
            self.commit(instr.rd(), result);
        }
        Ok(6)
    }

    /// `36..55`: register-register with a barrel operation on `Rs` of
    /// static width `1..4` (both encoded directly in `op1n`), feeding the
    /// shifted value into the ALU against `Rd`. `Rs` itself is read-only;
    /// the per-mode shift-bits register absorbs the bits that fall off the
    /// low end, carrying them into a following chained shift. STORE has no
    /// value to shift and is illegal.
    fn exec_shift(&mut self, instr: Instruction) -> CoreResult<u32> {
        if instr.op0() == AluOp::Store as u16 {
            return Err(fatal("cpu", "STORE is not a legal shifted-register opcode"));
        }
        let op = self.alu_op_or_fatal(instr)?;
        let idx = instr.op1n() - 36;
        let mode = idx / 4;
        let width = (idx % 4) + 1;
        let bank = self.shift_bank();
        let rs_val = self.regs[instr.rs()] as u32;
        let sb = self.sb[bank] as u32 & 0xf;
        let val20 = (rs_val << 4) | sb;

        let (result20, carry_out) = match mode {
            0 => {
                // Arithmetic shift right, sign-extended through the
                // combined 20-bit {Rs,SB} value.
                let sign = (val20 >> 19) & 1;
                let mut shifted = val20 >> width;
                if sign != 0 {
                    shifted |= (0xfffffu32 << (20 - width)) & 0xfffff;
                }
                let carry = (val20 >> (width - 1)) & 1 != 0;
                (shifted & 0xfffff, carry)
            }
            1 => {
                // Logical shift left.
                let shifted = (val20 << width) & 0xfffff;
                let carry = (val20 >> (20 - width)) & 1 != 0;
                (shifted, carry)
            }
            2 => {
                // Logical shift right.
                let shifted = val20 >> width;
                let carry = (val20 >> (width - 1)) & 1 != 0;
                (shifted, carry)
            }
            3 => {
                // Rotate left within 20 bits.
                let shifted = ((val20 << width) | (val20 >> (20 - width))) & 0xfffff;
                let carry = (val20 >> (20 - width)) & 1 != 0;
                (shifted, carry)
            }
            _ => {
                // Rotate right within 20 bits.
                let shifted = ((val20 >> width) | (val20 << (20 - width))) & 0xfffff;
                let carry = (val20 >> (width - 1)) & 1 != 0;
                (shifted, carry)
            }
        };
        self.sb[bank] = (result20 & 0xf) as u8;
        let shifted16 = (result20 >> 4) as u16;

        let mut flags = if carry_out { FLAG_C } else { 0 };
        if shifted16 & 0x8000 != 0 {
            flags |= alu::FLAG_N;
        }
        if shifted16 == 0 {
            flags |= alu::FLAG_Z;
        }
        let val1 = self.regs[instr.rd()];
        let mut result = alu_op(op, val1, shifted16, carry_out);
        result.flags = flags;
        let dest = instr.rd();
        self.commit(dest, result);
        Ok(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestBus {
        mem: HashMap<u32, u16>,
    }

    impl TestBus {
        fn new() -> Self {
            TestBus { mem: HashMap::new() }
        }
    }

    impl Bus for TestBus {
        fn read_word(&mut self, addr: u32) -> u16 {
            *self.mem.get(&addr).unwrap_or(&0)
        }
        fn write_word(&mut self, addr: u32, value: u16) {
            self.mem.insert(addr, value);
        }
    }

    #[test]
    fn reset_loads_vector_from_fff7() {
        let mut bus = TestBus::new();
        bus.write_word(0xfff7, 0x1234);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        assert_eq!(cpu.pc(), 0x1234);
        assert_eq!(cpu.get_cs(), 0);
        assert!(cpu.fir_mov);
    }

    #[test]
    fn add_immediate_updates_flags_and_register() {
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.set_reg(CpuReg::R1, 0xffff);
        // ADD R1, #1 -> register-immediate form (op1n==8..15, rd!=PC).
        let instr = (0u16 << 12) | (1 << 9) | (8 << 3) | 1;
        bus.write_word(0x1234, instr);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.reg(CpuReg::R1), 0);
        assert!(cpu.sr() & FLAG_C != 0);
        assert_eq!(cycles, 2);
    }

    #[test]
    fn push_pop_round_trip_matches_documented_example() {
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.set_reg(CpuReg::Sp, 0x2000);
        cpu.set_reg(CpuReg::R1, 0xaa);
        cpu.set_reg(CpuReg::R2, 0xbb);
        cpu.set_reg(CpuReg::R3, 0xcc);
        // push n=3 (opn) starting at R3 walking down to R1, through SP (rs):
        // op0=Store(13), rd=R3, op1n=19 (16|opn=3), rs=SP(0).
        let push_instr = (13u16 << 12) | (3 << 9) | (19 << 3) | 0;
        bus.write_word(0x1234, push_instr);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.reg(CpuReg::Sp), 0x1ffd);
        assert_eq!(bus.read_word(0x2000), 0xcc);
        assert_eq!(bus.read_word(0x1fff), 0xbb);
        assert_eq!(bus.read_word(0x1ffe), 0xaa);

        cpu.set_reg(CpuReg::R1, 0);
        cpu.set_reg(CpuReg::R2, 0);
        cpu.set_reg(CpuReg::R3, 0);
        // pop n=3 starting at R0(rd), landing in R1, R2, R3 in that order.
        let pop_instr = (9u16 << 12) | (0 << 9) | (19 << 3) | 0;
        bus.write_word(cpu.cs_pc() as u32, pop_instr);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.reg(CpuReg::Sp), 0x2000);
        assert_eq!(cpu.reg(CpuReg::R1), 0xaa);
        assert_eq!(cpu.reg(CpuReg::R2), 0xbb);
        assert_eq!(cpu.reg(CpuReg::R3), 0xcc);
    }

    #[test]
    fn fiq_preempts_irq_and_enters_its_own_vector() {
        let mut bus = TestBus::new();
        bus.write_word(0xfff6, 0x5000);
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.set_reg(CpuReg::Sp, 0x2000);
        cpu.irq_enable = true;
        cpu.fiq_enable = true;
        cpu.set_irq(0, true);
        cpu.set_fiq(true);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cycles, 10);
        assert_eq!(cpu.pc(), 0x5000);
        assert!(cpu.fiq_active);
        assert!(!cpu.irq_active);
    }

    #[test]
    fn mul_writes_r3_r4_not_r1_r2() {
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.set_reg(CpuReg::R1, 3);
        cpu.set_reg(CpuReg::R2, 4);
        // MUL unsigned*signed: op0=0xf, rd=R1, op1=0, opn=1, rs=R2.
        let instr = (0xfu16 << 12) | (1 << 9) | (0 << 6) | (1 << 3) | 2;
        bus.write_word(0x1234, instr);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cycles, 12);
        assert_eq!(cpu.reg(CpuReg::R3), 12);
        assert_eq!(cpu.reg(CpuReg::R4), 0);
        assert_eq!(cpu.reg(CpuReg::R1), 3);
        assert_eq!(cpu.reg(CpuReg::R2), 4);
    }

    #[test]
    fn fir_muls_write_back_lands_in_the_same_instruction() {
        // Concrete scenario: n=3, [rd]=x1,x2,x3 and [rs]=y1,y2,y3. After the
        // op, [rd+0] is unchanged, [rd+1]=y1, [rd+2]=y2.
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        assert!(cpu.fir_mov);
        cpu.set_reg(CpuReg::R1, 0x10); // rd
        cpu.set_reg(CpuReg::R3, 0x20); // rs
        bus.write_word(0x10, 2); // x1
        bus.write_word(0x11, 5); // x2
        bus.write_word(0x12, 7); // x3
        bus.write_word(0x20, 3); // y1
        bus.write_word(0x21, 11); // y2
        bus.write_word(0x22, 13); // y3
        // MULS signed*signed: op0=0xf, rd=R1, op1=6, muls_n=3, rs=R3.
        let instr = (0xfu16 << 12) | (1 << 9) | (6 << 6) | (3 << 3) | 3;
        bus.write_word(0x1234, instr);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cycles, 10 * 3 + 6);
        let expected: i64 = 2 * 3 + 5 * 11 + 7 * 13;
        let got = (cpu.reg(CpuReg::R4) as u32) << 16 | cpu.reg(CpuReg::R3) as u32;
        assert_eq!(got as i64, expected);
        assert_eq!(bus.read_word(0x10), 2); // [rd+0] unchanged
        assert_eq!(bus.read_word(0x11), 3); // [rd+1] = y1
        assert_eq!(bus.read_word(0x12), 11); // [rd+2] = y2
    }

    #[test]
    fn control_register_literal_values_toggle_enables() {
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        let enable_both = (0xfu16 << 12) | (5 << 6) | 3;
        bus.write_word(0x1234, enable_both);
        cpu.step(&mut bus).unwrap();
        assert!(cpu.irq_enable);
        assert!(cpu.fiq_enable);

        let disable_irq = (0xfu16 << 12) | (5 << 6) | 8;
        bus.write_word(cpu.cs_pc() as u32, disable_irq);
        cpu.step(&mut bus).unwrap();
        assert!(!cpu.irq_enable);
        assert!(cpu.fiq_enable);
    }

    #[test]
    fn segmented_post_increment_bumps_ds_on_overflow() {
        let mut bus = TestBus::new();
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.set_reg(CpuReg::R1, 0xffff); // pointer (Rs)
        cpu.set_ds(2);
        // LOAD R2 <- [R1]++ with DS prefix: op1n = 24 + opn, opn=4 (post-inc, ds_prefix).
        let instr = (9u16 << 12) | (2 << 9) | ((24 + 4) << 3) | 1;
        bus.write_word(cpu.ds_addr(0xffff), 0xaaaa);
        bus.write_word(0x1234, instr);
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.reg(CpuReg::R2), 0xaaaa);
        assert_eq!(cpu.reg(CpuReg::R1), 0x0000);
        assert_eq!(cpu.get_ds(), 3);
    }
}
