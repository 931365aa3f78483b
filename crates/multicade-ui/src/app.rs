use std::collections::HashMap;
use std::path::PathBuf;

use eframe::egui;
use log::warn;

use multicade_core::audio_queue::StereoFrame;
use multicade_core::core::Button;
use multicade_core::input::{InputRouter, SourceId};
use multicade_core::library::{RomRecord, RomStore};
use multicade_core::pump::FramePump;
use multicade_core::registry::CoreRegistry;

use crate::audio::AudioSink;
use crate::config::{self, UiConfig, WindowScale};
use crate::gamepad::GamepadPoller;
use crate::keybinds::{KeyBindings, key_to_string};
use crate::library::FsRomStore;

/// Extra ticks per refresh while fast-forward is held.
const FAST_FORWARD_TICKS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Play,
    Library,
    Settings,
}

pub struct App {
    registry: CoreRegistry,
    pump: FramePump,
    router: InputRouter,
    sink: AudioSink,
    drain_scratch: Vec<StereoFrame>,

    config: UiConfig,
    keybinds: KeyBindings,
    store: Option<FsRomStore>,
    records: Vec<RomRecord>,
    gamepads: GamepadPoller,
    pad_masks: Vec<(usize, u8)>,

    tab: Tab,
    status: String,
    fault: Option<String>,
    rom_name: Option<String>,
    rom_bytes: Option<Vec<u8>>,

    screen: Option<egui::TextureHandle>,
    /// Last presented frame, kept for cover capture.
    last_frame: Vec<u8>,
    last_frame_size: [usize; 2],
    covers: HashMap<u64, Option<egui::TextureHandle>>,
    /// On-screen pad state sampled while drawing, routed next refresh.
    touch_mask: u8,
}

impl App {
    pub fn new(
        registry: CoreRegistry,
        pump: FramePump,
        sink: AudioSink,
        config: UiConfig,
        rom: Option<PathBuf>,
        core_id: Option<String>,
    ) -> Self {
        let keybinds = KeyBindings::load_from_file(&crate::keybinds::default_keybinds_path());
        let library_dir = config
            .library_dir
            .clone()
            .unwrap_or_else(crate::library::default_library_dir);
        let store = match FsRomStore::open(&library_dir) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to open ROM library {}: {e}", library_dir.display());
                None
            }
        };

        let mut app = Self {
            registry,
            pump,
            router: InputRouter::new(),
            sink,
            drain_scratch: Vec::new(),
            config,
            keybinds,
            store,
            records: Vec::new(),
            gamepads: GamepadPoller::new(),
            pad_masks: Vec::new(),
            tab: Tab::Play,
            status: "Drop a ROM anywhere to play".to_string(),
            fault: None,
            rom_name: None,
            rom_bytes: None,
            screen: None,
            last_frame: Vec::new(),
            last_frame_size: [0, 0],
            covers: HashMap::new(),
            touch_mask: 0,
        };
        app.refresh_records();

        if let Some(path) = rom {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "rom".to_string());
                    app.load_rom(&name, bytes, core_id.as_deref());
                }
                Err(e) => app.status = format!("Failed to read {}: {e}", path.display()),
            }
        }
        app
    }

    fn refresh_records(&mut self) {
        if let Some(store) = &self.store {
            match store.list() {
                Ok(records) => self.records = records,
                Err(e) => warn!("Failed to list ROM library: {e}"),
            }
        }
    }

    /// Select a core for `name` (explicit id beats extension matching),
    /// load the bytes into a fresh instance and swap it in.
    fn load_rom(&mut self, name: &str, bytes: Vec<u8>, core_id: Option<&str>) {
        let entry = match core_id {
            Some(id) => self.registry.get(id),
            None => self.registry.entry_for(name),
        };
        let Some(entry) = entry else {
            self.status = "No core available".to_string();
            return;
        };

        let mut core = entry.create();
        match core.load_rom(&bytes) {
            Ok(()) => {
                self.pump.pause();
                self.pump.swap_core(core);
                self.router.reset();
                self.pump.start();
                self.fault = None;
                self.status = format!("Playing {name} on {}", entry.spec.name);
                self.rom_name = Some(name.to_string());
                self.rom_bytes = Some(bytes);
            }
            Err(e) => {
                self.status = format!("{name}: {e}");
            }
        }
    }

    /// Hot-swap to another core, re-loading the current ROM into it.
    fn switch_core(&mut self, core_id: &str) {
        if self.pump.core().is_some_and(|c| c.spec().id == core_id) {
            return;
        }
        match (self.rom_name.clone(), self.rom_bytes.clone()) {
            (Some(name), Some(bytes)) => self.load_rom(&name, bytes, Some(core_id)),
            _ => self.status = "Load a ROM first".to_string(),
        }
    }

    fn state_path(&self) -> Option<PathBuf> {
        let rom = self.rom_name.as_deref()?;
        Some(config::config_dir().join("states").join(format!("{rom}.state")))
    }

    fn save_state(&mut self) {
        let Some(path) = self.state_path() else {
            self.status = "Nothing to save".to_string();
            return;
        };
        let Some(state) = self.pump.core().and_then(|c| c.save_state()) else {
            self.status = "This core does not support save states".to_string();
            return;
        };
        let written = path
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| std::fs::write(&path, state));
        self.status = match written {
            Ok(()) => format!("State saved to {}", path.display()),
            Err(e) => format!("Failed to save state: {e}"),
        };
    }

    fn load_state(&mut self) {
        let Some(path) = self.state_path() else {
            self.status = "Nothing to load".to_string();
            return;
        };
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                self.status = format!("No saved state: {e}");
                return;
            }
        };
        match self.pump.core_mut().map(|c| c.load_state(&bytes)) {
            Some(Ok(())) => self.status = "State restored".to_string(),
            Some(Err(e)) => {
                // The core is untouched on a failed restore.
                warn!("state restore rejected: {e}");
                self.status = format!("State restore rejected: {e}");
            }
            None => self.status = "No core running".to_string(),
        }
    }

    /// Encode the last presented frame as a PNG cover.
    fn capture_cover(&self) -> Option<Vec<u8>> {
        let [w, h] = self.last_frame_size;
        if self.last_frame.is_empty() {
            return None;
        }
        let image = image::RgbaImage::from_raw(w as u32, h as u32, self.last_frame.clone())?;
        let mut png = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut png),
                image::ImageFormat::Png,
            )
            .ok()?;
        Some(png)
    }

    fn add_current_to_library(&mut self) {
        let (Some(name), Some(bytes)) = (self.rom_name.clone(), self.rom_bytes.clone()) else {
            self.status = "Load a ROM first".to_string();
            return;
        };
        let platform = self
            .pump
            .core()
            .map(|c| c.spec().id.to_string())
            .unwrap_or_default();
        let Some(store) = self.store.as_mut() else {
            self.status = "ROM library unavailable".to_string();
            return;
        };
        match store.add(&name, &platform, &bytes) {
            Ok(id) => {
                if let Some(png) = self.capture_cover()
                    && let Some(store) = self.store.as_mut()
                    && let Err(e) = store.set_cover(id, &png)
                {
                    warn!("Failed to store cover for {id}: {e}");
                }
                self.status = format!("Added {name} to library");
                self.covers.remove(&id);
                self.refresh_records();
            }
            Err(e) => self.status = format!("Failed to add ROM: {e}"),
        }
    }

    fn play_record(&mut self, id: u64) {
        let Some(store) = &self.store else {
            return;
        };
        let record = self.records.iter().find(|r| r.id == id).cloned();
        let Some(record) = record else {
            return;
        };
        match store.get(id) {
            Ok(bytes) => {
                self.load_rom(&record.name, bytes, Some(record.platform.as_str()));
                self.tab = Tab::Play;
            }
            Err(e) => self.status = format!("Failed to read {}: {e}", record.name),
        }
    }

    fn pick_rom_dialog(&mut self) {
        let extensions: Vec<&str> = self
            .registry
            .entries()
            .flat_map(|e| e.spec.extensions.iter().copied())
            .collect();
        let picked = rfd::FileDialog::new()
            .add_filter("ROM images", &extensions)
            .pick_file();
        if let Some(path) = picked {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "rom".to_string());
                    self.load_rom(&name, bytes, None);
                }
                Err(e) => self.status = format!("Failed to read {}: {e}", path.display()),
            }
        }
    }

    // ---- per-refresh emulation driving ----

    fn route_input(&mut self, ctx: &egui::Context) {
        let events = ctx.input(|i| i.events.clone());
        let touch_mask = self.touch_mask;
        let gamepad_enabled = self.config.gamepad_enabled;
        if gamepad_enabled {
            self.gamepads.poll(&mut self.pad_masks);
        }

        let Some(core) = self.pump.core_mut() else {
            return;
        };

        for event in &events {
            if let egui::Event::Key { key, pressed, .. } = event
                && let Some(button) = self.keybinds.button_for(*key)
            {
                self.router.key_event(core, SourceId::Keyboard, button, *pressed);
            }
        }

        // The on-screen pad and the controllers are level-sampled; the
        // router turns them into edges.
        self.router.poll(core, SourceId::Touch, touch_mask);
        if gamepad_enabled {
            for &(slot, mask) in &self.pad_masks {
                self.router.poll(core, SourceId::Pad(slot), mask);
            }
        }
    }

    fn drive_emulation(&mut self, ctx: &egui::Context) {
        if ctx.input(|i| i.key_pressed(self.keybinds.pause_key())) {
            if self.pump.is_running() {
                self.pump.pause();
                self.status = "Paused".to_string();
            } else if self.pump.has_core() {
                self.pump.start();
                self.status = "Resumed".to_string();
            }
        }
        if ctx.input(|i| i.key_pressed(self.keybinds.quit_key())) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        let fast = ctx.input(|i| i.key_down(self.keybinds.fast_forward_key()));
        self.pump.set_audio_muted(fast || !self.config.audio_enabled);

        let ticks = if fast { FAST_FORWARD_TICKS } else { 1 };
        for _ in 0..ticks {
            if let Err(fault) = self.pump.tick() {
                self.fault = Some(fault.to_string());
                self.status = format!("Core fault: {fault}");
                break;
            }
        }

        // Without a device stream nothing pulls the queue; discard what
        // accumulated so the fallback path stays bounded.
        if let AudioSink::Drain(consumer) = &mut self.sink {
            let backlog = consumer.queued();
            if backlog > 0 {
                self.drain_scratch.resize(backlog, [0.0, 0.0]);
                consumer.pull(&mut self.drain_scratch);
            }
        }
    }

    fn present_frame(&mut self, ctx: &egui::Context) {
        let Some(core) = self.pump.core_mut() else {
            return;
        };
        let spec = core.spec();
        let Some(frame) = core.take_frame() else {
            return;
        };

        // 0x00RRGGBB to RGBA.
        let mut rgba = Vec::with_capacity(frame.len() * 4);
        for &px in frame {
            rgba.extend_from_slice(&[(px >> 16) as u8, (px >> 8) as u8, px as u8, 0xFF]);
        }
        self.last_frame_size = [spec.width, spec.height];
        self.last_frame = rgba;

        let image = egui::ColorImage::from_rgba_unmultiplied(
            self.last_frame_size,
            &self.last_frame,
        );
        match &mut self.screen {
            Some(tex) => tex.set(image, egui::TextureOptions::NEAREST),
            None => {
                self.screen = Some(ctx.load_texture("screen", image, egui::TextureOptions::NEAREST))
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            if let Some(path) = &file.path {
                match std::fs::read(path) {
                    Ok(bytes) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| file.name.clone());
                        self.load_rom(&name, bytes, None);
                    }
                    Err(e) => self.status = format!("Failed to read {}: {e}", path.display()),
                }
            } else if let Some(bytes) = &file.bytes {
                self.load_rom(&file.name.clone(), bytes.to_vec(), None);
            }
        }
    }

    // ---- tabs ----

    fn play_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Load ROM…").clicked() {
                self.pick_rom_dialog();
            }
            let pause_label = if self.pump.is_running() { "Pause" } else { "Resume" };
            if ui.button(pause_label).clicked() {
                if self.pump.is_running() {
                    self.pump.pause();
                } else if self.pump.has_core() {
                    self.pump.start();
                }
            }
            if ui.button("Reset").clicked() {
                self.pump.reset();
                self.fault = None;
            }
            if ui.button("Save state").clicked() {
                self.save_state();
            }
            if ui.button("Load state").clicked() {
                self.load_state();
            }
            if ui.button("Add to library").clicked() {
                self.add_current_to_library();
            }
        });

        let active_id = self.pump.core().map(|c| c.spec().id);
        let mut switch_to = None;
        egui::ComboBox::from_label("Core")
            .selected_text(
                self.pump
                    .core()
                    .map(|c| c.spec().name)
                    .unwrap_or("(none)"),
            )
            .show_ui(ui, |ui| {
                for entry in self.registry.entries() {
                    let selected = active_id == Some(entry.spec.id);
                    if ui.selectable_label(selected, entry.spec.name).clicked() && !selected {
                        switch_to = Some(entry.spec.id);
                    }
                }
            });
        if let Some(id) = switch_to {
            self.switch_core(id);
        }

        // HUD line: platform, ROM, measured rate.
        let hud = match (self.pump.core(), &self.rom_name) {
            (Some(core), Some(rom)) => {
                format!("{} · {} · {:.1} fps", core.spec().name, rom, self.pump.fps())
            }
            (Some(core), None) => format!("{} · no ROM", core.spec().name),
            _ => "no core".to_string(),
        };
        ui.label(hud);

        if let Some(fault) = &self.fault {
            ui.colored_label(egui::Color32::LIGHT_RED, format!("Core fault: {fault}"));
        }

        if let Some(tex) = &self.screen {
            let [w, h] = self.last_frame_size;
            let scale = self.config.window_scale.factor();
            let size = egui::vec2(w as f32 * scale, h as f32 * scale);
            ui.image((tex.id(), size));
        } else {
            ui.label("No video yet");
        }

        self.touch_mask = on_screen_pad(ui);
    }

    fn library_tab(&mut self, ui: &mut egui::Ui) {
        if ui.button("Add ROMs…").clicked() {
            self.pick_rom_dialog();
        }
        if self.records.is_empty() {
            ui.label("Library is empty");
            return;
        }

        let mut play = None;
        let mut remove = None;
        let records = self.records.clone();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for record in &records {
                ui.horizontal(|ui| {
                    if let Some(Some(tex)) = self.cover_texture(ui.ctx(), record.id) {
                        ui.image((tex.id(), egui::vec2(64.0, 48.0)));
                    }
                    ui.vertical(|ui| {
                        ui.label(&record.name);
                        ui.small(format!(
                            "{} · added {}",
                            record.platform,
                            relative_age(record.created_at)
                        ));
                    });
                    if ui.button("Play").clicked() {
                        play = Some(record.id);
                    }
                    if ui.button("Remove").clicked() {
                        remove = Some(record.id);
                    }
                });
                ui.separator();
            }
        });

        if let Some(id) = play {
            self.play_record(id);
        }
        if let Some(id) = remove
            && let Some(store) = self.store.as_mut()
        {
            if let Err(e) = store.remove(id) {
                self.status = format!("Failed to remove ROM: {e}");
            }
            self.covers.remove(&id);
            self.refresh_records();
        }
    }

    /// Decode a record's cover lazily. `Some(None)` caches "no cover".
    fn cover_texture(
        &mut self,
        ctx: &egui::Context,
        id: u64,
    ) -> Option<&Option<egui::TextureHandle>> {
        if !self.covers.contains_key(&id) {
            let png = self.store.as_ref().and_then(|s| s.cover(id).ok()).flatten();
            let tex = png.and_then(|bytes| {
                let decoded = image::load_from_memory(&bytes).ok()?.to_rgba8();
                let size = [decoded.width() as usize, decoded.height() as usize];
                let image = egui::ColorImage::from_rgba_unmultiplied(size, decoded.as_raw());
                Some(ctx.load_texture(format!("cover-{id}"), image, egui::TextureOptions::NEAREST))
            });
            self.covers.insert(id, tex);
        }
        self.covers.get(&id)
    }

    fn settings_tab(&mut self, ui: &mut egui::Ui) {
        ui.checkbox(&mut self.config.audio_enabled, "Audio");
        ui.checkbox(&mut self.config.gamepad_enabled, "Game controllers");

        egui::ComboBox::from_label("Window scale")
            .selected_text(self.config.window_scale.label())
            .show_ui(ui, |ui| {
                for scale in WindowScale::ALL {
                    ui.selectable_value(&mut self.config.window_scale, scale, scale.label());
                }
            });

        ui.separator();
        ui.label("Key bindings (edit keybinds.toml):");
        for (name, key) in self.keybinds.iter() {
            ui.monospace(format!("{name:>6} = {}", key_to_string(key)));
        }
        ui.monospace(format!(
            " pause = {}",
            key_to_string(self.keybinds.pause_key())
        ));
        ui.monospace(format!(
            "  fast = {}",
            key_to_string(self.keybinds.fast_forward_key())
        ));

        ui.separator();
        if ui.button("Save settings").clicked() {
            let path = config::default_ui_config_path();
            self.status = match config::save_to_file(&path, &self.config) {
                Ok(()) => format!("Settings saved to {}", path.display()),
                Err(e) => format!("Failed to save settings: {e}"),
            };
            if let Err(e) = self
                .keybinds
                .save_to_file(&crate::keybinds::default_keybinds_path())
            {
                warn!("Failed to save keybinds: {e}");
            }
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_dropped_files(ctx);
        // The pad only exists while the Play tab draws; a mask sampled
        // there must not stay held on other tabs.
        self.touch_mask = touch_mask_for_tab(self.tab, self.touch_mask);
        self.route_input(ctx);
        self.drive_emulation(ctx);
        self.present_frame(ctx);

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Play, "Play");
                ui.selectable_value(&mut self.tab, Tab::Library, "Library");
                ui.selectable_value(&mut self.tab, Tab::Settings, "Settings");
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(&self.status);
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Play => self.play_tab(ui),
            Tab::Library => self.library_tab(ui),
            Tab::Settings => self.settings_tab(ui),
        });

        // One repaint per display refresh keeps the pump ticking even
        // when nothing else invalidates the UI.
        ctx.request_repaint();
    }
}

/// D-pad plus A/B/Select/Start as held-down buttons; returns the sampled
/// mask for this refresh.
fn on_screen_pad(ui: &mut egui::Ui) -> u8 {
    let mut mask = 0u8;
    let mut held = |response: egui::Response, button: Button| {
        if response.is_pointer_button_down_on() {
            mask |= button.mask();
        }
    };

    ui.horizontal(|ui| {
        ui.vertical(|ui| {
            ui.horizontal(|ui| {
                ui.add_space(32.0);
                held(ui.button("▲"), Button::Up);
            });
            ui.horizontal(|ui| {
                held(ui.button("◀"), Button::Left);
                ui.add_space(24.0);
                held(ui.button("▶"), Button::Right);
            });
            ui.horizontal(|ui| {
                ui.add_space(32.0);
                held(ui.button("▼"), Button::Down);
            });
        });
        ui.add_space(48.0);
        ui.vertical(|ui| {
            ui.horizontal(|ui| {
                held(ui.button("B"), Button::B);
                held(ui.button("A"), Button::A);
            });
            ui.horizontal(|ui| {
                held(ui.button("Select"), Button::Select);
                held(ui.button("Start"), Button::Start);
            });
        });
    });
    mask
}

/// A sampled on-screen pad mask is only valid while the Play tab is the
/// one being drawn; elsewhere the pad is released.
fn touch_mask_for_tab(tab: Tab, sampled: u8) -> u8 {
    if tab == Tab::Play { sampled } else { 0 }
}

fn relative_age(created_at: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let elapsed = now.saturating_sub(created_at);
    match elapsed {
        0..60 => "just now".to_string(),
        60..3600 => format!("{} min ago", elapsed / 60),
        3600..86400 => format!("{} h ago", elapsed / 3600),
        _ => format!("{} days ago", elapsed / 86400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaving_the_play_tab_releases_the_on_screen_pad() {
        let held = Button::A.mask() | Button::Right.mask();
        assert_eq!(touch_mask_for_tab(Tab::Play, held), held);
        assert_eq!(touch_mask_for_tab(Tab::Library, held), 0);
        assert_eq!(touch_mask_for_tab(Tab::Settings, held), 0);
    }
}
