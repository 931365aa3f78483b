//! Multi-system emulation host: core abstraction, frame pump and audio
//! bridge.
//!
//! This crate contains the platform-agnostic emulation plumbing. A host
//! shell (desktop UI, headless harness) registers cores, ticks the
//! [`pump::FramePump`] once per display refresh and wires the
//! [`audio_bridge`] consumer into its audio callback. Frontends live in
//! separate crates and drive everything through the [`core::Core`] trait.

/// Producer/consumer bridge between a core and the audio sink.
pub mod audio_bridge;

/// FIFO of stereo sample pairs.
pub mod audio_queue;

/// The core contract, canonical buttons and the error taxonomy.
pub mod core;

/// Built-in core implementations.
pub mod cores;

/// Heterogeneous input sources mapped onto canonical button edges.
pub mod input;

/// Persistent ROM storage contract.
pub mod library;

/// Per-refresh core stepping and session lifecycle.
pub mod pump;

/// Available cores and extension-based selection.
pub mod registry;
