// Benchmarks for the CPU interpreter's instruction dispatch.
//
// Adapted from the teacher's instruction-dispatch benchmark shape to this
// CPU's word-addressed `Bus` trait and control-register / ALU encodings.

use criterion::{criterion_group, criterion_main, Criterion};
use spg200_core::bus::Bus as SpgBus;
use spg200_core::Cpu;
use std::hint::black_box;

/// A flat word-addressed RAM big enough to hold a small test program,
/// implementing the same `Bus` trait `Machine` implements over its whole
/// register map. Benchmarks only ever touch this small window, so there is
/// no need to model the real PPU/SPU/peripheral windows here.
struct FlatBus {
    words: Vec<u16>,
}

impl FlatBus {
    fn new() -> Self {
        FlatBus { words: vec![0; 0x1_0000] }
    }
}

impl SpgBus for FlatBus {
    fn read_word(&mut self, addr: u32) -> u16 {
        self.words.get(addr as usize).copied().unwrap_or(0)
    }

    fn write_word(&mut self, addr: u32, value: u16) {
        if let Some(slot) = self.words.get_mut(addr as usize) {
            *slot = value;
        }
    }
}

/// NOP: extended opcode form (`op0 == 0xF`), control-register sub-opcode
/// (`op1 == 5`), `imm6 == 37`.
const NOP: u16 = (0xf << 12) | (5 << 6) | 37;

fn bench_cpu_instructions(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_instructions");

    group.bench_function("nop", |b| {
        let mut cpu = Cpu::new();
        let mut bus = FlatBus::new();
        for addr in 0..256u32 {
            bus.write_word(addr, NOP);
        }
        cpu.reset(&mut bus);

        b.iter(|| {
            cpu.step(black_box(&mut bus)).unwrap();
        });
    });

    group.bench_function("add_register_register", |b| {
        let mut cpu = Cpu::new();
        let mut bus = FlatBus::new();
        // ADD R1, R2: op0=ADD(0), rd=R1(1), op1n=32 (register-register), rs=R2(2).
        let add_r1_r2: u16 = (0 << 12) | (1 << 9) | (32 << 3) | 2;
        for addr in 0..256u32 {
            bus.write_word(addr, add_r1_r2);
        }
        cpu.reset(&mut bus);

        b.iter(|| {
            cpu.step(black_box(&mut bus)).unwrap();
        });
    });

    group.bench_function("conditional_branch_taken", |b| {
        let mut cpu = Cpu::new();
        let mut bus = FlatBus::new();
        // JMP (op0=14) forward by imm6=2, rd=PC (0b111), op1n in 0..=7.
        let jmp: u16 = (14 << 12) | (0b111 << 9) | 2;
        for addr in 0..256u32 {
            bus.write_word(addr, jmp);
        }
        cpu.reset(&mut bus);

        b.iter(|| {
            cpu.step(black_box(&mut bus)).unwrap();
        });
    });

    group.finish();
}

/// A realistic mixed sequence: load-like ALU ops, a shift, push/pop, then a
/// backward branch closing the loop, matching the teacher's
/// "typical_sequence" shape.
fn bench_instruction_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("instruction_sequences");

    group.bench_function("typical_sequence", |b| {
        let mut cpu = Cpu::new();
        let mut bus = FlatBus::new();

        let add_r1_r2: u16 = (0 << 12) | (1 << 9) | (32 << 3) | 2;
        let xor_r3_r3: u16 = (8 << 12) | (3 << 9) | (32 << 3) | 3;
        let nop = NOP;
        // Backward branch (op0=14, rd=PC, op1n in 8..=15) by imm6=3 words.
        let branch_back: u16 = (14 << 12) | (0b111 << 9) | (8 << 3) | 3;

        bus.write_word(0, add_r1_r2);
        bus.write_word(1, xor_r3_r3);
        bus.write_word(2, nop);
        bus.write_word(3, branch_back);
        cpu.reset(&mut bus);

        b.iter(|| {
            for _ in 0..4 {
                cpu.step(black_box(&mut bus)).unwrap();
            }
        });
    });

    group.finish();
}

/// CPU throughput over cycle budgets representative of one scanline and one
/// full NTSC frame (`429*4` cycles/scanline, `262` scanlines, per spec.md
/// §4.3's PPU timing).
fn bench_frame_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_execution");
    group.sample_size(20);

    const CYCLES_PER_SCANLINE: u64 = 429 * 4;
    const SCANLINES_PER_FRAME: u64 = 262;

    group.bench_function("one_scanline", |b| {
        let mut cpu = Cpu::new();
        let mut bus = FlatBus::new();
        for addr in 0..0x1000u32 {
            bus.write_word(addr, NOP);
        }
        cpu.reset(&mut bus);

        b.iter(|| {
            let mut cycles = 0u64;
            while cycles < CYCLES_PER_SCANLINE {
                cycles += cpu.step(black_box(&mut bus)).unwrap() as u64;
            }
        });
    });

    group.bench_function("one_ntsc_frame", |b| {
        let mut cpu = Cpu::new();
        let mut bus = FlatBus::new();
        for addr in 0..0x1000u32 {
            bus.write_word(addr, NOP);
        }
        cpu.reset(&mut bus);

        b.iter(|| {
            let mut cycles = 0u64;
            while cycles < CYCLES_PER_SCANLINE * SCANLINES_PER_FRAME {
                cycles += cpu.step(black_box(&mut bus)).unwrap() as u64;
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cpu_instructions, bench_instruction_sequence, bench_frame_execution);
criterion_main!(benches);
