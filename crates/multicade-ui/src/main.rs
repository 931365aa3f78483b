mod app;
mod audio;
mod config;
mod gamepad;
mod keybinds;
mod library;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};

use multicade_core::audio_bridge::{Transport, audio_bridge};
use multicade_core::audio_queue::StereoFrame;
use multicade_core::cores::chip8::{CHIP8_SPEC, Chip8Core};
use multicade_core::pump::FramePump;
use multicade_core::registry::CoreRegistry;

const REFRESH_HZ: f64 = 60.0;

#[derive(Parser)]
struct Args {
    /// Path to ROM file
    rom: Option<PathBuf>,

    /// Force a specific core by id instead of matching the extension
    #[arg(long)]
    core: Option<String>,

    /// Run without opening a window
    #[arg(long)]
    headless: bool,

    /// Number of frames to run in headless mode
    #[arg(long)]
    frames: Option<u64>,

    /// Number of seconds to run in headless mode
    #[arg(long)]
    seconds: Option<u64>,
}

/// Every core this build ships. The first registered entry is the default
/// when an extension matches nothing.
fn build_registry() -> CoreRegistry {
    let mut registry = CoreRegistry::new();
    registry.register(&CHIP8_SPEC, || Box::new(Chip8Core::new()));
    registry
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let registry = build_registry();

    if args.headless {
        if let Err(e) = run_headless(&args, &registry) {
            error!("{e}");
            std::process::exit(1);
        }
        return;
    }

    let ui_config = config::load_from_file(&config::default_ui_config_path());
    let sample_rate = registry
        .default_entry()
        .map(|e| e.spec.sample_rate)
        .unwrap_or(44100);
    let (producer, sink) = audio::setup(sample_rate);
    let pump = FramePump::new(producer);

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Multicade")
            .with_inner_size([880.0, 560.0]),
        ..Default::default()
    };
    let rom = args.rom;
    let core_id = args.core;
    let result = eframe::run_native(
        "multicade",
        native_options,
        Box::new(move |_cc| {
            Ok(Box::new(app::App::new(
                registry, pump, sink, ui_config, rom, core_id,
            )))
        }),
    );
    if let Err(e) = result {
        error!("failed to start UI: {e}");
        std::process::exit(1);
    }
}

/// Soak-test loop: no window, no device stream, wall-clock 60 Hz pacing.
fn run_headless(args: &Args, registry: &CoreRegistry) -> Result<(), String> {
    let rom_path = args
        .rom
        .as_ref()
        .ok_or_else(|| "headless mode needs a ROM".to_string())?;
    let bytes =
        std::fs::read(rom_path).map_err(|e| format!("{}: {e}", rom_path.display()))?;
    let name = rom_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let entry = match &args.core {
        Some(id) => registry
            .get(id)
            .ok_or_else(|| format!("unknown core id '{id}'"))?,
        None => registry
            .entry_for(&name)
            .ok_or_else(|| "no cores registered".to_string())?,
    };
    let mut core = entry.create();
    core.load_rom(&bytes).map_err(|e| e.to_string())?;
    info!("headless: {name} on {}", entry.spec.name);

    let (producer, mut consumer) = audio_bridge(Transport::Direct);
    let mut pump = FramePump::new(producer);
    pump.swap_core(core);
    pump.start();

    let frame_time = Duration::from_nanos((1e9 / REFRESH_HZ) as u64);
    let second_limit = args.seconds.map(Duration::from_secs);
    let start = Instant::now();
    let mut next_tick = Instant::now();
    let mut scratch: Vec<StereoFrame> = Vec::new();

    loop {
        pump.tick().map_err(|e| format!("core fault: {e}"))?;

        // Discard the produced audio; the queue must not grow unbounded.
        let backlog = consumer.queued();
        if backlog > 0 {
            scratch.resize(backlog, [0.0, 0.0]);
            consumer.pull(&mut scratch);
        }

        if pump.frame_counter().is_multiple_of(600) && pump.frame_counter() > 0 {
            info!(
                "headless: {} frames, {:.1} fps",
                pump.frame_counter(),
                pump.fps()
            );
        }

        if let Some(max) = args.frames
            && pump.frame_counter() >= max
        {
            break;
        }
        if let Some(limit) = second_limit
            && start.elapsed() >= limit
        {
            break;
        }

        next_tick += frame_time;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // Behind schedule: resynchronize instead of bursting.
            next_tick = now;
        }
    }

    info!(
        "headless: done after {} frames in {:.2?}",
        pump.frame_counter(),
        start.elapsed()
    );
    Ok(())
}
