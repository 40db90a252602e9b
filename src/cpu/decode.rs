// Instruction word decode.
//
// A fetched word decodes into several overlapping field views depending on
// which top-level form it turns out to be. `Instruction` exposes every field
// as an accessor over the raw word rather than picking a layout up front,
// mirroring the reference core's overlapping bitfield union.

#[derive(Debug, Clone, Copy)]
pub struct Instruction(pub u16);

impl Instruction {
    #[inline]
    pub fn op0(self) -> u16 {
        (self.0 >> 12) & 0xf
    }

    #[inline]
    pub fn rd(self) -> usize {
        ((self.0 >> 9) & 0x7) as usize
    }

    #[inline]
    pub fn op1(self) -> u16 {
        (self.0 >> 6) & 0x7
    }

    /// `op1n` is `op1` combined with the high bit of `opn`; it selects the
    /// addressing mode across the full `0..64` range.
    #[inline]
    pub fn op1n(self) -> u16 {
        (self.0 >> 3) & 0x3f
    }

    #[inline]
    pub fn opn(self) -> u16 {
        (self.0 >> 3) & 0x7
    }

    #[inline]
    pub fn rs(self) -> usize {
        (self.0 & 0x7) as usize
    }

    #[inline]
    pub fn imm6(self) -> u16 {
        self.0 & 0x3f
    }

    /// The 4-bit repeat count for MULS, overlapping `opn` and the low bit
    /// of `op1`.
    #[inline]
    pub fn muls_n(self) -> u16 {
        (self.0 >> 3) & 0xf
    }
}

/// General-register aliases. Index 7 (PC) and index 6 (SR) are never plain
/// storage — writes to them are observed specially by the instruction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuReg {
    Sp = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    Bp = 5,
    Sr = 6,
    Pc = 7,
}

pub const PC: usize = CpuReg::Pc as usize;
pub const SR: usize = CpuReg::Sr as usize;
pub const SP: usize = CpuReg::Sp as usize;
pub const BP: usize = CpuReg::Bp as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add = 0,
    Adc = 1,
    Sub = 2,
    Sbc = 3,
    Cmp = 4,
    Neg = 6,
    Xor = 8,
    Load = 9,
    Or = 10,
    And = 11,
    Test = 12,
    Store = 13,
}

impl AluOp {
    pub fn from_op0(op0: u16) -> Option<Self> {
        Some(match op0 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::Cmp,
            6 => AluOp::Neg,
            8 => AluOp::Xor,
            9 => AluOp::Load,
            10 => AluOp::Or,
            11 => AluOp::And,
            12 => AluOp::Test,
            13 => AluOp::Store,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOp {
    Jb = 0,
    Jae = 1,
    Jge = 2,
    Jl = 3,
    Jne = 4,
    Je = 5,
    Jpl = 6,
    Jmi = 7,
    Jbe = 8,
    Ja = 9,
    Jle = 10,
    Jg = 11,
    Jvc = 12,
    Jvs = 13,
    Jmp = 14,
}

impl BranchOp {
    pub fn from_op0(op0: u16) -> Self {
        match op0 {
            0 => BranchOp::Jb,
            1 => BranchOp::Jae,
            2 => BranchOp::Jge,
            3 => BranchOp::Jl,
            4 => BranchOp::Jne,
            5 => BranchOp::Je,
            6 => BranchOp::Jpl,
            7 => BranchOp::Jmi,
            8 => BranchOp::Jbe,
            9 => BranchOp::Ja,
            10 => BranchOp::Jle,
            11 => BranchOp::Jg,
            12 => BranchOp::Jvc,
            13 => BranchOp::Jvs,
            _ => BranchOp::Jmp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_line_up_with_bit_positions() {
        let word = Instruction(0b1010_110_101_100_011);
        assert_eq!(word.op0(), 0b1010);
        assert_eq!(word.rd(), 0b110);
        assert_eq!(word.op1(), 0b101);
        assert_eq!(word.opn(), 0b100);
        assert_eq!(word.rs(), 0b011);
    }
}
