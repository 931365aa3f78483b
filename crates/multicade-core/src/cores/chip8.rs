use serde::{Deserialize, Serialize};

use crate::audio_queue::StereoFrame;
use crate::core::{Button, Core, CoreFault, CoreSpec, LoadError, RestoreError};

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;

const DISPLAY_LEN: usize = SCREEN_WIDTH * SCREEN_HEIGHT;
const MEMORY_SIZE: usize = 4096;
const PROGRAM_START: usize = 0x200;
const MAX_ROM_SIZE: usize = MEMORY_SIZE - PROGRAM_START;
const FONT_START: usize = 0x50;
const STACK_DEPTH: usize = 16;
// Roughly the pace of the original COSMAC VIP interpreter.
const INSTRUCTIONS_PER_FRAME: usize = 11;
const FRAMES_PER_SECOND: u32 = 60;

const BEEP_HZ: f32 = 440.0;
const BEEP_VOLUME: f32 = 0.25;

const PIXEL_ON: u32 = 0x00FF_FFFF;
const PIXEL_OFF: u32 = 0x0010_1018;

#[rustfmt::skip]
const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

pub static CHIP8_SPEC: CoreSpec = CoreSpec {
    id: "chip8",
    name: "CHIP-8",
    extensions: &["ch8", "c8"],
    sample_rate: 44100,
    width: SCREEN_WIDTH,
    height: SCREEN_HEIGHT,
};

/// Registers, memory, timers and keypad. Kept as one struct so save
/// states serialize the whole machine in one shot.
#[derive(Clone, Serialize, Deserialize)]
struct Machine {
    memory: Vec<u8>,
    v: [u8; 16],
    i: u16,
    pc: u16,
    stack: Vec<u16>,
    delay_timer: u8,
    sound_timer: u8,
    display: Vec<u8>,
    keys: [bool; 16],
    /// Destination register of a pending FX0A key wait.
    waiting_for_key: Option<u8>,
}

impl Machine {
    fn fresh() -> Self {
        let mut memory = vec![0u8; MEMORY_SIZE];
        memory[FONT_START..FONT_START + FONT.len()].copy_from_slice(&FONT);
        Self {
            memory,
            v: [0; 16],
            i: 0,
            pc: PROGRAM_START as u16,
            stack: Vec::with_capacity(STACK_DEPTH),
            delay_timer: 0,
            sound_timer: 0,
            display: vec![0u8; DISPLAY_LEN],
            keys: [false; 16],
            waiting_for_key: None,
        }
    }
}

/// Interpreter for the classic CHIP-8 machine: 64x32 monochrome display,
/// sixteen-key pad, 60 Hz timers and a square-wave beeper.
pub struct Chip8Core {
    m: Machine,
    rom: Vec<u8>,
    frame: Vec<u32>,
    frame_ready: bool,
    samples: Vec<StereoFrame>,
    beep_phase: f32,
}

impl Chip8Core {
    pub fn new() -> Self {
        Self {
            m: Machine::fresh(),
            rom: Vec::new(),
            frame: vec![PIXEL_OFF; DISPLAY_LEN],
            frame_ready: false,
            samples: Vec::new(),
            beep_phase: 0.0,
        }
    }

    fn boot(&mut self) {
        self.m = Machine::fresh();
        self.m.memory[PROGRAM_START..PROGRAM_START + self.rom.len()].copy_from_slice(&self.rom);
        self.frame.fill(PIXEL_OFF);
        self.frame_ready = false;
        self.samples.clear();
        self.beep_phase = 0.0;
    }

    fn step(&mut self) -> Result<(), CoreFault> {
        let pc = self.m.pc as usize;
        if pc + 1 >= MEMORY_SIZE {
            return Err(CoreFault(format!("program counter out of range: {pc:#05X}")));
        }
        let op = u16::from_be_bytes([self.m.memory[pc], self.m.memory[pc + 1]]);
        self.m.pc = self.m.pc.wrapping_add(2);

        let x = ((op >> 8) & 0xF) as usize;
        let y = ((op >> 4) & 0xF) as usize;
        let n = (op & 0xF) as usize;
        let nn = (op & 0xFF) as u8;
        let nnn = op & 0xFFF;

        match op & 0xF000 {
            0x0000 => match op {
                0x00E0 => self.m.display.fill(0),
                0x00EE => {
                    let Some(addr) = self.m.stack.pop() else {
                        return Err(CoreFault(format!(
                            "return with empty call stack at {pc:#05X}"
                        )));
                    };
                    self.m.pc = addr;
                }
                _ => return Err(bad_opcode(op, pc)),
            },
            0x1000 => self.m.pc = nnn,
            0x2000 => {
                if self.m.stack.len() >= STACK_DEPTH {
                    return Err(CoreFault(format!("call stack overflow at {pc:#05X}")));
                }
                self.m.stack.push(self.m.pc);
                self.m.pc = nnn;
            }
            0x3000 => {
                if self.m.v[x] == nn {
                    self.m.pc = self.m.pc.wrapping_add(2);
                }
            }
            0x4000 => {
                if self.m.v[x] != nn {
                    self.m.pc = self.m.pc.wrapping_add(2);
                }
            }
            0x5000 if n == 0 => {
                if self.m.v[x] == self.m.v[y] {
                    self.m.pc = self.m.pc.wrapping_add(2);
                }
            }
            0x6000 => self.m.v[x] = nn,
            0x7000 => self.m.v[x] = self.m.v[x].wrapping_add(nn),
            0x8000 => self.alu(op, x, y, pc)?,
            0x9000 if n == 0 => {
                if self.m.v[x] != self.m.v[y] {
                    self.m.pc = self.m.pc.wrapping_add(2);
                }
            }
            0xA000 => self.m.i = nnn,
            0xB000 => self.m.pc = nnn.wrapping_add(self.m.v[0] as u16),
            0xC000 => self.m.v[x] = rand::random::<u8>() & nn,
            0xD000 => self.draw(x, y, n)?,
            0xE000 => match nn {
                0x9E => {
                    if self.key_down(x) {
                        self.m.pc = self.m.pc.wrapping_add(2);
                    }
                }
                0xA1 => {
                    if !self.key_down(x) {
                        self.m.pc = self.m.pc.wrapping_add(2);
                    }
                }
                _ => return Err(bad_opcode(op, pc)),
            },
            0xF000 => self.misc(op, x, pc)?,
            _ => return Err(bad_opcode(op, pc)),
        }
        Ok(())
    }

    fn alu(&mut self, op: u16, x: usize, y: usize, pc: usize) -> Result<(), CoreFault> {
        match op & 0xF {
            0x0 => self.m.v[x] = self.m.v[y],
            0x1 => self.m.v[x] |= self.m.v[y],
            0x2 => self.m.v[x] &= self.m.v[y],
            0x3 => self.m.v[x] ^= self.m.v[y],
            // VF is written after the result so it survives X == F.
            0x4 => {
                let (sum, carry) = self.m.v[x].overflowing_add(self.m.v[y]);
                self.m.v[x] = sum;
                self.m.v[0xF] = carry as u8;
            }
            0x5 => {
                let (diff, borrow) = self.m.v[x].overflowing_sub(self.m.v[y]);
                self.m.v[x] = diff;
                self.m.v[0xF] = !borrow as u8;
            }
            // CHIP-48 style shifts: VX in place, VY unused.
            0x6 => {
                let bit = self.m.v[x] & 1;
                self.m.v[x] >>= 1;
                self.m.v[0xF] = bit;
            }
            0x7 => {
                let (diff, borrow) = self.m.v[y].overflowing_sub(self.m.v[x]);
                self.m.v[x] = diff;
                self.m.v[0xF] = !borrow as u8;
            }
            0xE => {
                let bit = self.m.v[x] >> 7;
                self.m.v[x] <<= 1;
                self.m.v[0xF] = bit;
            }
            _ => return Err(bad_opcode(op, pc)),
        }
        Ok(())
    }

    fn draw(&mut self, x: usize, y: usize, rows: usize) -> Result<(), CoreFault> {
        let ox = self.m.v[x] as usize % SCREEN_WIDTH;
        let oy = self.m.v[y] as usize % SCREEN_HEIGHT;
        self.m.v[0xF] = 0;
        for row in 0..rows {
            let addr = self.m.i as usize + row;
            let Some(&bits) = self.m.memory.get(addr) else {
                return Err(CoreFault(format!("sprite read past memory at {addr:#05X}")));
            };
            let py = oy + row;
            // The origin wraps; the sprite body clips at the edges.
            if py >= SCREEN_HEIGHT {
                break;
            }
            for col in 0..8 {
                if bits & (0x80 >> col) == 0 {
                    continue;
                }
                let px = ox + col;
                if px >= SCREEN_WIDTH {
                    break;
                }
                let idx = py * SCREEN_WIDTH + px;
                if self.m.display[idx] != 0 {
                    self.m.v[0xF] = 1;
                }
                self.m.display[idx] ^= 1;
            }
        }
        Ok(())
    }

    fn misc(&mut self, op: u16, x: usize, pc: usize) -> Result<(), CoreFault> {
        match op & 0xFF {
            0x07 => self.m.v[x] = self.m.delay_timer,
            0x0A => self.m.waiting_for_key = Some(x as u8),
            0x15 => self.m.delay_timer = self.m.v[x],
            0x18 => self.m.sound_timer = self.m.v[x],
            0x1E => self.m.i = self.m.i.wrapping_add(self.m.v[x] as u16),
            0x29 => self.m.i = (FONT_START + (self.m.v[x] & 0xF) as usize * 5) as u16,
            0x33 => {
                let value = self.m.v[x];
                let i = self.m.i as usize;
                if i + 2 >= MEMORY_SIZE {
                    return Err(CoreFault(format!("BCD write past memory at {i:#05X}")));
                }
                self.m.memory[i] = value / 100;
                self.m.memory[i + 1] = (value / 10) % 10;
                self.m.memory[i + 2] = value % 10;
            }
            // I stays put on bulk transfers, SCHIP style.
            0x55 => {
                let i = self.m.i as usize;
                if i + x >= MEMORY_SIZE {
                    return Err(CoreFault(format!("register store past memory at {i:#05X}")));
                }
                self.m.memory[i..=i + x].copy_from_slice(&self.m.v[..=x]);
            }
            0x65 => {
                let i = self.m.i as usize;
                if i + x >= MEMORY_SIZE {
                    return Err(CoreFault(format!("register load past memory at {i:#05X}")));
                }
                self.m.v[..=x].copy_from_slice(&self.m.memory[i..=i + x]);
            }
            _ => return Err(bad_opcode(op, pc)),
        }
        Ok(())
    }

    fn key_down(&self, x: usize) -> bool {
        self.m.keys[(self.m.v[x] & 0xF) as usize]
    }

    fn emit_frame_audio(&mut self) {
        let frames = (CHIP8_SPEC.sample_rate / FRAMES_PER_SECOND) as usize;
        if self.m.sound_timer > 0 {
            let step = BEEP_HZ / CHIP8_SPEC.sample_rate as f32;
            for _ in 0..frames {
                let level = if self.beep_phase < 0.5 {
                    BEEP_VOLUME
                } else {
                    -BEEP_VOLUME
                };
                self.samples.push([level, level]);
                self.beep_phase += step;
                if self.beep_phase >= 1.0 {
                    self.beep_phase -= 1.0;
                }
            }
        } else {
            self.beep_phase = 0.0;
            // Silence keeps the sink fed at a steady cadence.
            self.samples.resize(self.samples.len() + frames, [0.0, 0.0]);
        }
    }

    fn render(&mut self) {
        for (dst, &on) in self.frame.iter_mut().zip(self.m.display.iter()) {
            *dst = if on != 0 { PIXEL_ON } else { PIXEL_OFF };
        }
    }
}

impl Default for Chip8Core {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_opcode(op: u16, pc: usize) -> CoreFault {
    CoreFault(format!("invalid opcode {op:04X} at {pc:#05X}"))
}

/// 2/4/6/8 are the de-facto d-pad on the hex keypad, 5 the action key in
/// the middle.
fn keypad_index(button: Button) -> usize {
    match button {
        Button::Up => 0x2,
        Button::Down => 0x8,
        Button::Left => 0x4,
        Button::Right => 0x6,
        Button::A => 0x5,
        Button::B => 0x0,
        Button::Select => 0xB,
        Button::Start => 0xF,
    }
}

impl Core for Chip8Core {
    fn spec(&self) -> &'static CoreSpec {
        &CHIP8_SPEC
    }

    fn load_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::Empty);
        }
        if bytes.len() > MAX_ROM_SIZE {
            return Err(LoadError::TooLarge {
                size: bytes.len(),
                max: MAX_ROM_SIZE,
            });
        }
        self.rom = bytes.to_vec();
        self.boot();
        Ok(())
    }

    fn run_frame(&mut self) -> Result<(), CoreFault> {
        if self.rom.is_empty() {
            return Ok(());
        }
        for _ in 0..INSTRUCTIONS_PER_FRAME {
            // FX0A halts execution until a key arrives; timers keep going.
            if self.m.waiting_for_key.is_some() {
                break;
            }
            self.step()?;
        }
        self.emit_frame_audio();
        if self.m.delay_timer > 0 {
            self.m.delay_timer -= 1;
        }
        if self.m.sound_timer > 0 {
            self.m.sound_timer -= 1;
        }
        self.render();
        self.frame_ready = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.boot();
    }

    // The machine has a single pad; the player index is irrelevant.
    fn button_down(&mut self, _player: usize, button: Button) {
        let key = keypad_index(button);
        if self.m.keys[key] {
            return;
        }
        self.m.keys[key] = true;
        if let Some(reg) = self.m.waiting_for_key.take() {
            self.m.v[reg as usize] = key as u8;
        }
    }

    fn button_up(&mut self, _player: usize, button: Button) {
        self.m.keys[keypad_index(button)] = false;
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(&self.m).ok()
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<(), RestoreError> {
        let m: Machine =
            serde_json::from_slice(bytes).map_err(|e| RestoreError(e.to_string()))?;
        if m.memory.len() != MEMORY_SIZE || m.display.len() != DISPLAY_LEN {
            return Err(RestoreError("wrong machine geometry".into()));
        }
        if let Some(reg) = m.waiting_for_key
            && reg >= 16
        {
            return Err(RestoreError("key wait register out of range".into()));
        }
        self.m = m;
        Ok(())
    }

    fn take_frame(&mut self) -> Option<&[u32]> {
        if self.frame_ready {
            self.frame_ready = false;
            Some(&self.frame)
        } else {
            None
        }
    }

    fn drain_audio(&mut self, out: &mut Vec<StereoFrame>) {
        out.append(&mut self.samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    fn loaded(words: &[u16]) -> Chip8Core {
        let mut core = Chip8Core::new();
        core.load_rom(&program(words)).expect("test program loads");
        core
    }

    #[test]
    fn rejects_empty_and_oversized_roms() {
        let mut core = Chip8Core::new();
        assert!(matches!(core.load_rom(&[]), Err(LoadError::Empty)));
        let huge = vec![0u8; MAX_ROM_SIZE + 1];
        assert!(matches!(
            core.load_rom(&huge),
            Err(LoadError::TooLarge { .. })
        ));
        let exact = vec![0u8; MAX_ROM_SIZE];
        assert!(core.load_rom(&exact).is_ok());
    }

    #[test]
    fn draws_font_sprite_to_the_framebuffer() {
        // V0 = 0; I = glyph "0"; draw 5 rows at (0,0); spin.
        let mut core = loaded(&[0x6000, 0xF029, 0xD005, 0x1206]);
        core.run_frame().expect("program runs");
        let frame = core.take_frame().expect("frame completed");

        // Top row of glyph "0" is 0xF0: four pixels on, four off.
        assert_eq!(frame[0], PIXEL_ON);
        assert_eq!(frame[3], PIXEL_ON);
        assert_eq!(frame[4], PIXEL_OFF);
        // Second row 0x90: edges on, middle off.
        assert_eq!(frame[SCREEN_WIDTH], PIXEL_ON);
        assert_eq!(frame[SCREEN_WIDTH + 1], PIXEL_OFF);
        assert_eq!(frame[SCREEN_WIDTH + 3], PIXEL_ON);

        // No new frame until the next run.
        assert!(core.take_frame().is_none());
        core.run_frame().expect("program runs");
        assert!(core.take_frame().is_some());
    }

    #[test]
    fn overdraw_erases_pixels_and_sets_collision() {
        // Draw the same glyph twice (XOR erases it, VF = 1), then use the
        // collision flag to place a marker pixel at (63,31).
        let mut core = loaded(&[
            0x6000, // V0 = 0
            0xF029, // I = glyph "0"
            0xD005, // draw
            0xD005, // draw again: erased, VF = 1
            0x3F01, // skip next if VF == 1
            0x120A, // (collision missed: spin here forever)
            0x6A3F, // VA = 63
            0x6B1F, // VB = 31
            0xDAB1, // one row at (63,31): only its leftmost pixel fits
            0x1212, // spin
        ]);
        core.run_frame().expect("program runs");
        let frame = core.take_frame().expect("frame completed");

        assert_eq!(frame[0], PIXEL_OFF);
        assert_eq!(frame[31 * SCREEN_WIDTH + 63], PIXEL_ON);
    }

    #[test]
    fn invalid_opcode_faults() {
        let mut core = loaded(&[0xFFFF]);
        let fault = core.run_frame().expect_err("opcode FFFF is not valid");
        assert!(fault.0.contains("invalid opcode"));
    }

    #[test]
    fn key_wait_blocks_until_a_press() {
        // Wait for a key, then draw its glyph at (V0,V0).
        let mut core = loaded(&[0xF00A, 0xF029, 0xD005, 0x1206]);

        core.run_frame().expect("waiting frame runs");
        let frame = core.take_frame().expect("frame completed");
        assert!(frame.iter().all(|&p| p == PIXEL_OFF));

        core.run_frame().expect("still waiting");

        // A maps to keypad 5; a second down for the held button changes
        // nothing.
        core.button_down(0, Button::A);
        core.button_down(0, Button::A);

        core.run_frame().expect("program resumes");
        let frame = core.take_frame().expect("frame completed");
        assert_eq!(frame[5 * SCREEN_WIDTH + 5], PIXEL_ON);
    }

    #[test]
    fn beeper_emits_square_wave_while_sound_timer_runs() {
        // V0 = 3; sound timer = 3; spin.
        let mut core = loaded(&[0x6003, 0xF018, 0x1204]);
        let per_frame = (CHIP8_SPEC.sample_rate / FRAMES_PER_SECOND) as usize;

        let mut first = Vec::new();
        core.run_frame().expect("program runs");
        core.drain_audio(&mut first);
        assert_eq!(first.len(), per_frame);
        assert!(first.iter().any(|&[l, r]| l != 0.0 && r != 0.0));

        // Let the timer run out; output returns to silence.
        for _ in 0..5 {
            core.run_frame().expect("program runs");
        }
        let mut rest = Vec::new();
        core.drain_audio(&mut rest);
        assert_eq!(rest.len(), per_frame * 5);
        let last = &rest[rest.len() - per_frame..];
        assert!(last.iter().all(|&f| f == [0.0, 0.0]));
    }

    #[test]
    fn save_and_load_round_trip() {
        // V0 keeps counting, so every frame has distinct state.
        let mut core = loaded(&[0x7001, 0x1200]);
        for _ in 0..3 {
            core.run_frame().expect("program runs");
        }
        let snap = core.save_state().expect("snapshots supported");

        for _ in 0..4 {
            core.run_frame().expect("program runs");
        }
        assert_ne!(core.save_state().expect("snapshots supported"), snap);

        core.load_state(&snap).expect("own snapshot restores");
        assert_eq!(core.save_state().expect("snapshots supported"), snap);
    }

    #[test]
    fn load_state_rejects_garbage_untouched() {
        let mut core = loaded(&[0x7001, 0x1200]);
        core.run_frame().expect("program runs");
        let before = core.save_state().expect("snapshots supported");

        assert!(core.load_state(b"not a snapshot").is_err());
        assert_eq!(core.save_state().expect("snapshots supported"), before);
    }

    #[test]
    fn reset_returns_to_post_load_state() {
        let mut core = loaded(&[0x7001, 0x1200]);
        let initial = core.save_state().expect("snapshots supported");

        for _ in 0..5 {
            core.run_frame().expect("program runs");
        }
        assert_ne!(core.save_state().expect("snapshots supported"), initial);

        core.reset();
        assert_eq!(core.save_state().expect("snapshots supported"), initial);
    }

    #[test]
    fn frame_without_rom_is_a_noop() {
        let mut core = Chip8Core::new();
        core.run_frame().expect("nothing to execute");
        assert!(core.take_frame().is_none());
        let mut out = Vec::new();
        core.drain_audio(&mut out);
        assert!(out.is_empty());
    }
}
