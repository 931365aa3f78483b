/// CHIP-8 interpreter, the default core.
pub mod chip8;
