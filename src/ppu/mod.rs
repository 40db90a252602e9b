// The SPG200 PPU: a scanline-driven 2-background, 256-sprite renderer with
// four depth layers, per-tile blending, and a frame/line/position-level IRQ
// trio. There is no pixel pipeline to clock cycle-by-cycle the way a
// shift-register PPU needs; the whole visible scanline is drawn in one shot
// the moment the scanline clock fires, matching the reference core's
// `DrawLine`.
//
// Framebuffer format: one `u16` per pixel, 5:5:5 RGB packed low-to-high as
// B, G, R with bit 15 used internally as a transparency marker during
// compositing and always zero in the framebuffer handed back to the host.

use crate::bus::Bus;
use crate::common::sext;

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 240;

const TRANSPARENT: u16 = 0x8000;

#[derive(Debug, Clone, Copy, Default)]
struct BgAttribute(u16);

impl BgAttribute {
    fn depth(self) -> u16 {
        (self.0 >> 12) & 0x3
    }
    fn palette(self) -> u16 {
        (self.0 >> 8) & 0xf
    }
    fn vsize(self) -> u16 {
        (self.0 >> 6) & 0x3
    }
    fn hsize(self) -> u16 {
        (self.0 >> 4) & 0x3
    }
    fn vflip(self) -> bool {
        (self.0 >> 3) & 1 != 0
    }
    fn hflip(self) -> bool {
        (self.0 >> 2) & 1 != 0
    }
    fn color_mode(self) -> u16 {
        self.0 & 0x3
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BgControl(u16);

impl BgControl {
    fn blend(self) -> bool {
        (self.0 >> 8) & 1 != 0
    }
    fn hicolor_mode(self) -> bool {
        (self.0 >> 7) & 1 != 0
    }
    fn vcompress(self) -> bool {
        (self.0 >> 6) & 1 != 0
    }
    fn hmovement(self) -> bool {
        (self.0 >> 4) & 1 != 0
    }
    fn enabled(self) -> bool {
        (self.0 >> 3) & 1 != 0
    }
    fn wallpaper_mode(self) -> bool {
        (self.0 >> 2) & 1 != 0
    }
    fn register_mode(self) -> bool {
        (self.0 >> 1) & 1 != 0
    }
    fn bitmap_mode(self) -> bool {
        self.0 & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TileAttribute(u16);

impl TileAttribute {
    fn blend(self) -> bool {
        (self.0 >> 6) & 1 != 0
    }
    fn vflip(self) -> bool {
        (self.0 >> 5) & 1 != 0
    }
    fn hflip(self) -> bool {
        (self.0 >> 4) & 1 != 0
    }
    fn palette(self) -> u16 {
        self.0 & 0xf
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SpriteAttribute(u16);

impl SpriteAttribute {
    fn blend(self) -> bool {
        (self.0 >> 14) & 1 != 0
    }
    fn depth(self) -> u16 {
        (self.0 >> 12) & 0x3
    }
    fn palette(self) -> u16 {
        (self.0 >> 8) & 0xf
    }
    fn vsize(self) -> u16 {
        (self.0 >> 6) & 0x3
    }
    fn hsize(self) -> u16 {
        (self.0 >> 4) & 0x3
    }
    fn vflip(self) -> bool {
        (self.0 >> 3) & 1 != 0
    }
    fn hflip(self) -> bool {
        (self.0 >> 2) & 1 != 0
    }
    fn color_mode(self) -> u16 {
        self.0 & 0x3
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BgData {
    xscroll: u16,
    yscroll: u16,
    attr: BgAttribute,
    ctrl: BgControl,
    tile_map_ptr: u16,
    attribute_map_ptr: u16,
    segment_ptr: u16,
}

#[derive(Debug, Clone, Copy, Default)]
struct SpriteData {
    ch: u16,
    xpos: u16,
    ypos: u16,
    attr: SpriteAttribute,
}

/// Write-1-to-clear interrupt status shared by the frame, line-position, and
/// sprite-DMA-done sources.
#[derive(Debug, Clone, Copy, Default)]
struct Interrupts(u16);

impl Interrupts {
    const WRITE_MASK: u16 = 0x0007;
    fn dma(self) -> bool {
        self.0 & 0x4 != 0
    }
    fn pos(self) -> bool {
        self.0 & 0x2 != 0
    }
    fn vblank(self) -> bool {
        self.0 & 0x1 != 0
    }
}

pub struct Ppu {
    video_timing_ntsc: bool,
    framebuffer: Box<[[u16; SCREEN_WIDTH]; SCREEN_HEIGHT]>,
    scanline_clock: crate::common::SimpleClock,
    cur_scanline: i32,
    frame_count: i64,

    bg_data: [BgData; 2],
    sprite_data: Box<[SpriteData; 256]>,
    sprite_segment_ptr: u16,
    stn_lcd_control: u8,
    blend_level: u16,
    fade_level: u16,
    vertical_compress_amount: u16,
    vertical_compress_offset: u16,
    line_scroll: Box<[u16; 256]>,
    line_compress: Box<[u16; 256]>,
    palette_memory: Box<[u16; 256]>,

    sprite_enable: bool,
    sprite_dma_source: u16,
    sprite_dma_target: u16,
    sprite_dma_length: u16,

    irq_ctrl: Interrupts,
    irq_status: Interrupts,
    irq_vpos: u16,
    irq_hpos: u16,

    /// Latched OR of the three interrupt sources, read by the aggregator.
    irq_line: bool,
}

fn calculate_line_segment_addr(
    segment_ptr: u16,
    ch: u16,
    tile_y: i32,
    tile_width: i32,
    tile_height: i32,
    bits_per_pixel: i32,
) -> u32 {
    ((segment_ptr as u32) << 6)
        + ((ch as i32 * tile_height + tile_y) * tile_width * bits_per_pixel / 16) as u32
}

fn blend_interpolate(old_value: i32, new_value: i32, blend_level: i32) -> i32 {
    (old_value * (4 - (blend_level + 1))) / 4 + (new_value * (blend_level + 1)) / 4
}

fn div_round_up(dividend: i32, divisor: i32) -> i32 {
    dividend / divisor + i32::from(dividend % divisor != 0)
}

impl Ppu {
    pub fn new(ntsc: bool) -> Self {
        let period = if ntsc { 429 * 4 } else { 432 * 4 };
        Ppu {
            video_timing_ntsc: ntsc,
            framebuffer: Box::new([[0; SCREEN_WIDTH]; SCREEN_HEIGHT]),
            scanline_clock: crate::common::SimpleClock::new_simple(period),
            cur_scanline: 0,
            frame_count: 0,
            bg_data: [BgData::default(); 2],
            sprite_data: Box::new([SpriteData::default(); 256]),
            sprite_segment_ptr: 0,
            stn_lcd_control: 0,
            blend_level: 0,
            fade_level: 0,
            vertical_compress_amount: 0x20,
            vertical_compress_offset: 0,
            line_scroll: Box::new([0; 256]),
            line_compress: Box::new([0; 256]),
            palette_memory: Box::new([0; 256]),
            sprite_enable: false,
            sprite_dma_source: 0,
            sprite_dma_target: 0,
            sprite_dma_length: 0,
            irq_ctrl: Interrupts::default(),
            irq_status: Interrupts::default(),
            irq_vpos: 0x1ff,
            irq_hpos: 0x1ff,
            irq_line: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Ppu::new(self.video_timing_ntsc);
    }

    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    pub fn framebuffer(&self) -> &[u16] {
        unsafe {
            std::slice::from_raw_parts(
                self.framebuffer.as_ptr() as *const u16,
                SCREEN_WIDTH * SCREEN_HEIGHT,
            )
        }
    }

    fn update_irq(&mut self) {
        let active = Interrupts(self.irq_ctrl.0 & self.irq_status.0);
        self.irq_line = active.dma() || active.pos() || active.vblank();
    }

    /// Advance the scanline clock by `cycles`; returns true on the cycle a
    /// whole frame finishes (the end of the last visible scanline).
    pub fn run_cycles<B: Bus>(&mut self, cycles: u32, bus: &mut B) -> bool {
        if !self.scanline_clock.tick(cycles) {
            return false;
        }
        let scanlines = if self.video_timing_ntsc { 262 } else { 312 };
        let mut frame_finished = false;

        if self.cur_scanline == self.irq_vpos as i32 && self.irq_ctrl.pos() {
            self.irq_status.0 |= 0x2;
            self.update_irq();
        }

        if self.cur_scanline < 240 {
            self.draw_line(self.cur_scanline, bus);
            if self.cur_scanline == 239 {
                if self.irq_ctrl.vblank() {
                    self.irq_status.0 |= 0x1;
                    self.update_irq();
                }
                self.frame_count += 1;
                frame_finished = true;
            }
            self.cur_scanline += 1;
        } else if self.cur_scanline >= scanlines - 1 {
            self.irq_status.0 &= !0x1;
            self.update_irq();
            self.cur_scanline = 0;
        } else {
            self.cur_scanline += 1;
        }

        frame_finished
    }

    // -- register accessors --------------------------------------------

    pub fn get_bg_xscroll(&self, bg: usize) -> u16 {
        self.bg_data[bg].xscroll
    }
    pub fn set_bg_xscroll(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].xscroll = value & 0x1ff;
    }
    pub fn get_bg_yscroll(&self, bg: usize) -> u16 {
        self.bg_data[bg].yscroll
    }
    pub fn set_bg_yscroll(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].yscroll = value & 0xff;
    }
    pub fn get_bg_attribute(&self, bg: usize) -> u16 {
        self.bg_data[bg].attr.0
    }
    pub fn set_bg_attribute(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].attr = BgAttribute(value & 0x3fff);
    }
    pub fn get_bg_control(&self, bg: usize) -> u16 {
        self.bg_data[bg].ctrl.0
    }
    pub fn set_bg_control(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].ctrl = BgControl(value & 0x01ff);
    }
    pub fn get_bg_tile_map_ptr(&self, bg: usize) -> u16 {
        self.bg_data[bg].tile_map_ptr
    }
    pub fn set_bg_tile_map_ptr(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].tile_map_ptr = value & 0x3fff;
    }
    pub fn get_bg_attribute_map_ptr(&self, bg: usize) -> u16 {
        self.bg_data[bg].attribute_map_ptr
    }
    pub fn set_bg_attribute_map_ptr(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].attribute_map_ptr = value & 0x3fff;
    }
    pub fn get_bg_segment_ptr(&self, bg: usize) -> u16 {
        self.bg_data[bg].segment_ptr
    }
    pub fn set_bg_segment_ptr(&mut self, bg: usize, value: u16) {
        self.bg_data[bg].segment_ptr = value;
    }
    pub fn get_vertical_compress_amount(&self) -> u16 {
        self.vertical_compress_amount
    }
    pub fn set_vertical_compress_amount(&mut self, value: u16) {
        self.vertical_compress_amount = value & 0x1ff;
    }
    pub fn get_vertical_compress_offset(&self) -> u16 {
        self.vertical_compress_offset
    }
    pub fn set_vertical_compress_offset(&mut self, value: u16) {
        self.vertical_compress_offset = value & 0x1fff;
    }
    pub fn get_sprite_segment_ptr(&self) -> u16 {
        self.sprite_segment_ptr
    }
    pub fn set_sprite_segment_ptr(&mut self, value: u16) {
        self.sprite_segment_ptr = value;
    }
    pub fn get_blend_level(&self) -> u16 {
        self.blend_level
    }
    pub fn set_blend_level(&mut self, value: u16) {
        self.blend_level = value & 0x3;
    }
    pub fn get_fade_level(&self) -> u16 {
        self.fade_level
    }
    pub fn set_fade_level(&mut self, value: u16) {
        self.fade_level = value & 0xff;
    }
    pub fn get_line_scroll(&self, offset: u8) -> u16 {
        self.line_scroll[offset as usize]
    }
    pub fn set_line_scroll(&mut self, offset: u8, value: u16) {
        self.line_scroll[offset as usize] = value & 0x1ff;
    }
    pub fn get_line_compress(&self, offset: u8) -> u16 {
        self.line_compress[offset as usize]
    }
    pub fn set_line_compress(&mut self, offset: u8, value: u16) {
        self.line_compress[offset as usize] = value;
    }
    pub fn get_palette_color(&self, offset: u8) -> u16 {
        self.palette_memory[offset as usize]
    }
    pub fn set_palette_color(&mut self, offset: u8, value: u16) {
        self.palette_memory[offset as usize] = value;
    }

    pub fn read_sprite_memory(&self, offset: u16) -> u16 {
        let index = ((offset & 0x3ff) >> 2) as usize;
        match offset & 3 {
            0 => self.sprite_data[index].ch,
            1 => self.sprite_data[index].xpos,
            2 => self.sprite_data[index].ypos,
            _ => self.sprite_data[index].attr.0,
        }
    }

    pub fn write_sprite_memory(&mut self, offset: u16, value: u16) {
        let index = ((offset & 0x3ff) >> 2) as usize;
        match offset & 3 {
            0 => self.sprite_data[index].ch = value,
            1 => self.sprite_data[index].xpos = value & 0x1ff,
            2 => self.sprite_data[index].ypos = value & 0x1ff,
            _ => self.sprite_data[index].attr = SpriteAttribute(value & 0x7fff),
        }
    }

    pub fn get_sprite_control(&self) -> u16 {
        self.sprite_enable as u16
    }
    pub fn set_sprite_control(&mut self, value: u16) {
        self.sprite_enable = value & 1 != 0;
    }
    pub fn get_sprite_dma_source(&self) -> u16 {
        self.sprite_dma_source
    }
    pub fn set_sprite_dma_source(&mut self, value: u16) {
        self.sprite_dma_source = value & 0x3fff;
    }
    pub fn get_sprite_dma_target(&self) -> u16 {
        self.sprite_dma_target
    }
    pub fn set_sprite_dma_target(&mut self, value: u16) {
        self.sprite_dma_target = value & 0x3ff;
    }
    pub fn get_sprite_dma_length(&self) -> u16 {
        self.sprite_dma_length
    }

    /// Copies `length` words from main memory straight into sprite RAM,
    /// wrapping the write side at 0x3ff (the main-address side does not
    /// wrap, unlike the general-purpose DMA block's `0x3fff` mask).
    pub fn start_sprite_dma<B: Bus>(&mut self, length: u16, bus: &mut B) {
        self.sprite_dma_length = length;
        while self.sprite_dma_length != 0 {
            let word = bus.read_word(self.sprite_dma_source as u32);
            self.sprite_dma_source = self.sprite_dma_source.wrapping_add(1);
            self.write_sprite_memory(self.sprite_dma_target, word);
            self.sprite_dma_target = self.sprite_dma_target.wrapping_add(1) & 0x3ff;
            self.sprite_dma_length -= 1;
        }
        if self.irq_ctrl.dma() {
            self.irq_status.0 |= 0x4;
            self.update_irq();
        }
    }

    pub fn get_stn_lcd_control(&self) -> u16 {
        self.stn_lcd_control as u16
    }
    pub fn set_stn_lcd_control(&mut self, value: u16) {
        self.stn_lcd_control = (value & 0x3f) as u8;
    }
    pub fn get_irq_control(&self) -> u16 {
        self.irq_ctrl.0
    }
    pub fn set_irq_control(&mut self, value: u16) {
        self.irq_ctrl = Interrupts(value & Interrupts::WRITE_MASK);
        self.update_irq();
    }
    pub fn get_irq_status(&self) -> u16 {
        self.irq_status.0
    }
    pub fn clear_irq_status(&mut self, value: u16) {
        self.irq_status.0 &= !(value & Interrupts::WRITE_MASK);
        self.update_irq();
    }
    pub fn get_irq_vpos(&self) -> u16 {
        self.irq_vpos
    }
    pub fn set_irq_vpos(&mut self, value: u16) {
        self.irq_vpos = value & 0x1ff;
    }
    pub fn get_irq_hpos(&self) -> u16 {
        self.irq_hpos
    }
    pub fn set_irq_hpos(&mut self, value: u16) {
        self.irq_hpos = value & 0x1ff;
    }
    pub fn get_line_counter(&self) -> u16 {
        self.cur_scanline as u16
    }
    pub fn get_frame_counter(&self) -> i64 {
        self.frame_count
    }

    // -- rendering --------------------------------------------------------

    fn draw_line<B: Bus>(&mut self, y: i32, bus: &mut B) {
        self.framebuffer[y as usize] = [TRANSPARENT; SCREEN_WIDTH];

        for layer in 0..4u16 {
            for bg in 0..2usize {
                if self.bg_data[bg].ctrl.enabled() && self.bg_data[bg].attr.depth() == layer {
                    self.draw_bg_scanline(bg, y, bus);
                }
            }

            if self.sprite_enable {
                for sprite_index in 0..256usize {
                    let s = &self.sprite_data[sprite_index];
                    if s.ch != 0 && !s.attr.blend() && s.attr.depth() == layer {
                        self.draw_sprite_scanline(sprite_index, y, bus);
                    }
                }
                for sprite_index in 0..256usize {
                    let s = &self.sprite_data[sprite_index];
                    if s.ch != 0 && s.attr.blend() && s.attr.depth() == layer {
                        self.draw_sprite_scanline(sprite_index, y, bus);
                    }
                }
            }
        }

        for pixel in self.framebuffer[y as usize].iter_mut() {
            if *pixel & TRANSPARENT != 0 {
                *pixel = 0;
            }
        }
    }

    fn draw_bg_scanline<B: Bus>(&mut self, bg_index: usize, screen_y: i32, bus: &mut B) {
        let bg = self.bg_data[bg_index];

        let mut virtual_y = screen_y;
        if bg.ctrl.vcompress() {
            let offset = sext(self.vertical_compress_offset as u32, 13) + 128
                - 128 * self.vertical_compress_amount as i32 / 0x20;
            virtual_y = screen_y * self.vertical_compress_amount as i32 / 0x20 + offset;
        }
        if !(0..240).contains(&virtual_y) {
            return;
        }

        let tilemap_y = ((virtual_y + bg.yscroll as i32) & 0xff) as u32;
        let scroll_x = ((bg.xscroll as i32
            + if bg.ctrl.hmovement() {
                self.line_scroll[tilemap_y as usize] as i32
            } else {
                0
            })
            & 0x1ff) as i32;

        if bg.ctrl.bitmap_mode() {
            let addr_lo = bus.read_word(bg.tile_map_ptr as u32 + tilemap_y);
            let addr_hi = bus.read_word(bg.attribute_map_ptr as u32 + tilemap_y / 2)
                >> (if tilemap_y & 1 != 0 { 8 } else { 0 });
            let addr = addr_lo as u32 | ((addr_hi as u32) << 16);
            let bits_per_pixel = if bg.ctrl.hicolor_mode() {
                16
            } else {
                (bg.attr.color_mode() as i32 + 1) * 2
            };
            let mut screen_x = -scroll_x;
            while screen_x < 320 {
                self.draw_tile_line(
                    screen_y,
                    screen_x,
                    addr,
                    512,
                    bg.attr.palette(),
                    false,
                    bits_per_pixel,
                    bg.ctrl.blend(),
                    bus,
                );
                screen_x += 512;
            }
            return;
        }

        let tile_width = 8i32 << bg.attr.hsize();
        let tile_height = 8i32 << bg.attr.vsize();
        let tilemap_ytile = tilemap_y as i32 / tile_height;
        let tiles_per_row = 512 >> (bg.attr.hsize() + 3);

        let mut screen_x = -(scroll_x % tile_width);
        while screen_x < 320 {
            let tilemap_x = (screen_x + scroll_x) & 0x1ff;
            let tilemap_xtile = tilemap_x / tile_width;
            let tilemap_tilepos = if bg.ctrl.wallpaper_mode() {
                0
            } else {
                tiles_per_row as i32 * tilemap_ytile + tilemap_xtile
            };

            let num_addr = bg.tile_map_ptr as u32 + tilemap_tilepos as u32;
            let ch = bus.read_word(num_addr);
            if ch == 0 {
                screen_x += tile_width;
                continue;
            }

            let mut palette = bg.attr.palette();
            let mut vflip = bg.attr.vflip();
            let mut hflip = bg.attr.hflip();
            let mut blend = bg.ctrl.blend();

            if !bg.ctrl.register_mode() {
                let attr_addr = bg.attribute_map_ptr as u32 + (tilemap_tilepos >> 1) as u32;
                let attr_word = bus.read_word(attr_addr);
                let attr = TileAttribute(
                    attr_word >> (if tilemap_tilepos & 1 != 0 { 8 } else { 0 }),
                );
                palette = attr.palette();
                vflip = attr.vflip();
                hflip = attr.hflip();
                blend = attr.blend();
            }

            let tile_y = if !vflip {
                tilemap_y as i32 % tile_height
            } else {
                tile_height - (tilemap_y as i32 % tile_height) - 1
            };
            let bits_per_pixel = (bg.attr.color_mode() as i32 + 1) * 2;

            let addr = calculate_line_segment_addr(
                bg.segment_ptr,
                ch,
                tile_y,
                tile_width,
                tile_height,
                bits_per_pixel,
            );
            self.draw_tile_line(
                screen_y,
                screen_x,
                addr,
                tile_width,
                palette,
                hflip,
                bits_per_pixel,
                blend,
                bus,
            );
            screen_x += tile_width;
        }
    }

    fn draw_sprite_scanline<B: Bus>(&mut self, sprite: usize, screen_y: i32, bus: &mut B) {
        let s = self.sprite_data[sprite];
        let tile_width = 8i32 << s.attr.hsize();
        let tile_height = 8i32 << s.attr.vsize();
        let xpos = (160 + sext(s.xpos as u32, 9)) - tile_width / 2;
        let ypos = (128 - sext(s.ypos as u32, 9)) - tile_height / 2;
        let bits_per_pixel = (s.attr.color_mode() as i32 + 1) * 2;

        let tile_y = if !s.attr.vflip() {
            screen_y - ypos
        } else {
            (tile_height - 1) - (screen_y - ypos)
        };
        if !(0..tile_height).contains(&tile_y) {
            return;
        }

        let addr = calculate_line_segment_addr(
            self.sprite_segment_ptr,
            s.ch,
            tile_y,
            tile_width,
            tile_height,
            bits_per_pixel,
        );
        self.draw_tile_line(
            screen_y,
            xpos,
            addr,
            tile_width,
            s.attr.palette(),
            s.attr.hflip(),
            bits_per_pixel,
            s.attr.blend(),
            bus,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_tile_line<B: Bus>(
        &mut self,
        screen_y: i32,
        screen_x_start: i32,
        line_addr: u32,
        tile_width: i32,
        palette: u16,
        hflip: bool,
        bits_per_pixel: i32,
        blend: bool,
        bus: &mut B,
    ) {
        let mut pixbuf_shift = -bits_per_pixel;
        let mut pixbuf: u32 = 0;
        let mut addr = line_addr.wrapping_add(if hflip {
            ((tile_width * bits_per_pixel) / 16 - 1) as u32
        } else {
            0
        });

        let left_offscreen = if screen_x_start < 0 { -screen_x_start } else { 0 };
        let mut skipped_pixels = 0;
        if left_offscreen > 0 {
            let skipped_words = (left_offscreen * bits_per_pixel) / 16;
            if skipped_words != 0 {
                addr = if hflip {
                    addr.wrapping_sub(skipped_words as u32)
                } else {
                    addr.wrapping_add(skipped_words as u32)
                };
                skipped_pixels = div_round_up(skipped_words * 16, bits_per_pixel);
                pixbuf_shift -= (skipped_pixels * bits_per_pixel) % 16;
            }
        }

        let mut screen_x = screen_x_start + skipped_pixels;
        while screen_x < screen_x_start + tile_width && screen_x < 320 {
            if pixbuf_shift < 0 {
                let mut val = bus.read_word(addr);
                addr = if hflip {
                    addr.wrapping_sub(1)
                } else {
                    addr.wrapping_add(1)
                };
                if bits_per_pixel != 16 {
                    val = (val >> 8) | (val << 8);
                }
                pixbuf = if hflip {
                    ((val as u32) << 16) | (pixbuf >> 16)
                } else {
                    (pixbuf << 16) | val as u32
                };
                pixbuf_shift += 16;
            }

            let pixbuf_shift_flip = if hflip {
                ((16 - bits_per_pixel) - pixbuf_shift) + 16
            } else {
                pixbuf_shift
            };
            let pixdata = (pixbuf >> pixbuf_shift_flip) & ((1 << bits_per_pixel) - 1);
            pixbuf_shift -= bits_per_pixel;

            if screen_x < 0 {
                screen_x += 1;
                continue;
            }

            let mut newpixel = match bits_per_pixel {
                2 | 4 => self.palette_memory[(palette as usize) * 16 + pixdata as usize],
                6 => self.palette_memory[((palette >> 2) as usize) * 64 + pixdata as usize],
                8 => self.palette_memory[pixdata as usize],
                16 => pixdata as u16,
                _ => unreachable!("bits_per_pixel is derived from a 2-bit color_mode"),
            };

            if newpixel & TRANSPARENT != 0 {
                screen_x += 1;
                continue;
            }

            if blend {
                let oldpixel = self.framebuffer[screen_y as usize][screen_x as usize];
                if oldpixel & TRANSPARENT == 0 {
                    let level = self.blend_level as i32;
                    let or = ((oldpixel >> 10) & 0x1f) as i32;
                    let og = ((oldpixel >> 5) & 0x1f) as i32;
                    let ob = (oldpixel & 0x1f) as i32;
                    let nr = ((newpixel >> 10) & 0x1f) as i32;
                    let ng = ((newpixel >> 5) & 0x1f) as i32;
                    let nb = (newpixel & 0x1f) as i32;
                    let r = blend_interpolate(or, nr, level) as u16 & 0x1f;
                    let g = blend_interpolate(og, ng, level) as u16 & 0x1f;
                    let b = blend_interpolate(ob, nb, level) as u16 & 0x1f;
                    newpixel = (r << 10) | (g << 5) | b;
                }
            }

            self.framebuffer[screen_y as usize][screen_x as usize] = newpixel;
            screen_x += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestBus(HashMap<u32, u16>);
    impl Bus for TestBus {
        fn read_word(&mut self, addr: u32) -> u16 {
            *self.0.get(&addr).unwrap_or(&0)
        }
        fn write_word(&mut self, addr: u32, value: u16) {
            self.0.insert(addr, value);
        }
    }

    #[test]
    fn ntsc_scanline_period_is_429_times_4() {
        let mut ppu = Ppu::new(true);
        let mut bus = TestBus(HashMap::new());
        for _ in 0..429 * 4 - 1 {
            assert!(!ppu.run_cycles(1, &mut bus));
        }
        assert!(ppu.run_cycles(1, &mut bus));
        assert_eq!(ppu.get_line_counter(), 1);
    }

    #[test]
    fn frame_finishes_after_scanline_239() {
        let mut ppu = Ppu::new(true);
        let mut bus = TestBus(HashMap::new());
        let mut frames = 0;
        for _ in 0..240 {
            if ppu.run_cycles(429 * 4, &mut bus) {
                frames += 1;
            }
        }
        assert_eq!(frames, 1);
        assert_eq!(ppu.get_frame_counter(), 1);
    }

    #[test]
    fn sprite_dma_wraps_target_at_0x3ff() {
        let mut ppu = Ppu::new(true);
        let mut bus = TestBus(HashMap::new());
        bus.0.insert(0, 0xaaaa);
        ppu.set_sprite_dma_target(0x3ff);
        ppu.start_sprite_dma(2, &mut bus);
        assert_eq!(ppu.read_sprite_memory(0x3fc), 0xaaaa);
        assert_eq!(ppu.get_sprite_dma_target(), 1);
    }

    #[test]
    fn opaque_tile_pixel_reaches_framebuffer() {
        let mut ppu = Ppu::new(true);
        ppu.set_palette_color(0, 0x1234);
        let mut bus = TestBus(HashMap::new());
        bus.0.insert(0, 0x0100);
        ppu.draw_tile_line(0, 0, 0, 8, 0, false, 2, false, &mut bus);
        assert_eq!(ppu.framebuffer[0][0] & !TRANSPARENT, 0x1234 & !TRANSPARENT);
    }
}
