// Benchmarks for the PPU's scanline renderer.
//
// Adapted from the teacher's step-by-step PPU benchmark shape to this PPU's
// cycle-batched `run_cycles` entry point and tile-mode background.

use criterion::{criterion_group, criterion_main, Criterion};
use spg200_core::bus::Bus as SpgBus;
use spg200_core::Ppu;
use std::hint::black_box;

/// Enough flat word-addressed memory to host one tilemap, one attribute map
/// and a handful of tile patterns; `Ppu::run_cycles` reads through this the
/// same way it reads through `Machine`'s bus dispatch.
struct FlatBus {
    words: Vec<u16>,
}

impl FlatBus {
    fn new() -> Self {
        FlatBus { words: vec![0; 0x10_0000] }
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

/// A BG0 set up for 2bpp tile mode with a nonzero tile index everywhere, so
/// the renderer actually walks the tile-fetch path instead of early-exiting
/// on a zero tile index (spec.md §4.3, "Tile mode ... skip if zero").
fn bg_enabled_ppu(ntsc: bool) -> Ppu {
    let mut ppu = Ppu::new(ntsc);
    ppu.set_bg_control(0, 0x0001); // enabled, tile mode, 2bpp
    ppu.set_bg_segment_ptr(0, 0);
    ppu.set_bg_tile_map_ptr(0, 0x1000);
    ppu.set_bg_attribute_map_ptr(0, 0x1800);
    for i in 1..16 {
        ppu.set_palette_color(i as u8, 0x7c00 | i as u16);
    }
    ppu
}

const CYCLES_PER_SCANLINE_NTSC: u64 = 429 * 4;
const SCANLINES_PER_FRAME_NTSC: u64 = 262;

fn bench_ppu_scanline(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppu_scanline");
    group.sample_size(20);

    group.bench_function("single_scanline_bg_tile_mode", |b| {
        let mut ppu = bg_enabled_ppu(true);
        let mut bus = FlatBus::new();
        for word in bus.words[0x1000..0x1100].iter_mut() {
            *word = 1; // nonzero tile index across the visible tilemap row
        }

        b.iter(|| {
            black_box(ppu.run_cycles(black_box(CYCLES_PER_SCANLINE_NTSC as u32), &mut bus));
        });
    });

    group.finish();
}

fn bench_ppu_full_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("ppu_frame");
    group.sample_size(10);

    group.bench_function("full_ntsc_frame", |b| {
        let mut ppu = bg_enabled_ppu(true);
        let mut bus = FlatBus::new();
        for word in bus.words[0x1000..0x1100].iter_mut() {
            *word = 1;
        }

        b.iter(|| {
            let mut cycles = 0u64;
            loop {
                let done = ppu.run_cycles(64, &mut bus);
                cycles += 64;
                if done || cycles > CYCLES_PER_SCANLINE_NTSC * SCANLINES_PER_FRAME_NTSC * 2 {
                    break;
                }
            }
            black_box(ppu.framebuffer());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ppu_scanline, bench_ppu_full_frame);
criterion_main!(benches);
