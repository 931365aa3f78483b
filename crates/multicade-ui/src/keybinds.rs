use eframe::egui::Key;
use log::{info, warn};
use multicade_core::core::Button;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn default_keybinds_path() -> PathBuf {
    crate::config::config_dir().join("keybinds.toml")
}

/// Keyboard mapping: canonical pad buttons plus the shell's own keys.
#[derive(Clone)]
pub struct KeyBindings {
    pad: HashMap<Key, Button>,
    pause: Key,
    fast_forward: Key,
    quit: Key,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::defaults()
    }
}

const PAD_NAMES: [(Button, &str); 8] = [
    (Button::Up, "up"),
    (Button::Down, "down"),
    (Button::Left, "left"),
    (Button::Right, "right"),
    (Button::A, "a"),
    (Button::B, "b"),
    (Button::Select, "select"),
    (Button::Start, "start"),
];

impl KeyBindings {
    pub fn defaults() -> Self {
        let mut pad = HashMap::new();
        pad.insert(Key::ArrowUp, Button::Up);
        pad.insert(Key::ArrowDown, Button::Down);
        pad.insert(Key::ArrowLeft, Button::Left);
        pad.insert(Key::ArrowRight, Button::Right);
        pad.insert(Key::X, Button::A);
        pad.insert(Key::Z, Button::B);
        pad.insert(Key::Tab, Button::Select);
        pad.insert(Key::Enter, Button::Start);

        Self {
            pad,
            pause: Key::P,
            fast_forward: Key::Space,
            quit: Key::Escape,
        }
    }

    pub fn load_from_file(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            info!(
                "No keybinds file at {}; using defaults",
                path.display()
            );
            return Self::defaults();
        };

        let mut bindings = Self::defaults();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, value)) = line.split_once('=') else {
                warn!(
                    "Ignoring invalid keybinds line {}:{} (expected name = value)",
                    path.display(),
                    line_no + 1
                );
                continue;
            };

            let name = name.trim();
            let value = value.trim();
            let Some(key) = parse_key(value) else {
                warn!(
                    "Ignoring keybinds line {}:{} (unknown Key '{value}')",
                    path.display(),
                    line_no + 1
                );
                continue;
            };

            if let Some(&(button, _)) = PAD_NAMES.iter().find(|&&(_, n)| n == name) {
                bindings.rebind_pad(button, key);
                continue;
            }
            match name {
                "pause" => bindings.pause = key,
                "fast_forward" => bindings.fast_forward = key,
                "quit" => bindings.quit = key,
                other => warn!(
                    "Ignoring unknown keybind name '{other}' in {}:{}",
                    path.display(),
                    line_no + 1
                ),
            }
        }

        bindings
    }

    pub fn button_for(&self, key: Key) -> Option<Button> {
        self.pad.get(&key).copied()
    }

    pub fn key_for_button(&self, button: Button) -> Option<Key> {
        self.pad
            .iter()
            .find(|&(_, &b)| b == button)
            .map(|(k, _)| *k)
    }

    /// Bind a pad button to a key, displacing the key's previous binding.
    pub fn rebind_pad(&mut self, button: Button, key: Key) {
        self.pad.retain(|_, &mut b| b != button);
        self.pad.insert(key, button);
    }

    pub fn pause_key(&self) -> Key {
        self.pause
    }

    pub fn fast_forward_key(&self) -> Key {
        self.fast_forward
    }

    pub fn quit_key(&self) -> Key {
        self.quit
    }

    /// Pad bindings in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Key)> {
        PAD_NAMES
            .into_iter()
            .filter_map(|(button, name)| self.key_for_button(button).map(|k| (name, k)))
            .collect::<Vec<_>>()
            .into_iter()
    }

    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut lines = Vec::new();
        lines.push("# Multicade keybinds configuration".to_string());
        lines.push(String::new());

        for (button, name) in PAD_NAMES {
            if let Some(key) = self.key_for_button(button) {
                lines.push(format!("{} = {}", name, key_to_string(key)));
            }
        }

        lines.push(String::new());
        lines.push(format!("pause = {}", key_to_string(self.pause)));
        lines.push(format!(
            "fast_forward = {}",
            key_to_string(self.fast_forward)
        ));
        lines.push(format!("quit = {}", key_to_string(self.quit)));
        lines.push(String::new());

        std::fs::write(path, lines.join("\n"))?;
        info!("Saved keybinds to {}", path.display());
        Ok(())
    }
}

pub fn key_to_string(key: Key) -> String {
    match key {
        Key::ArrowUp => "Up".to_string(),
        Key::ArrowDown => "Down".to_string(),
        Key::ArrowLeft => "Left".to_string(),
        Key::ArrowRight => "Right".to_string(),
        other => other.name().to_string(),
    }
}

fn parse_key(raw: &str) -> Option<Key> {
    match raw.trim() {
        "ArrowUp" | "Up" => Some(Key::ArrowUp),
        "ArrowDown" | "Down" => Some(Key::ArrowDown),
        "ArrowLeft" | "Left" => Some(Key::ArrowLeft),
        "ArrowRight" | "Right" => Some(Key::ArrowRight),
        s => Key::from_name(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_whole_pad() {
        let bindings = KeyBindings::defaults();
        for button in Button::ALL {
            assert!(bindings.key_for_button(button).is_some(), "{button:?}");
        }
        assert_eq!(bindings.button_for(Key::X), Some(Button::A));
        assert_eq!(bindings.button_for(Key::Q), None);
    }

    #[test]
    fn rebind_displaces_the_old_key() {
        let mut bindings = KeyBindings::defaults();
        bindings.rebind_pad(Button::A, Key::K);
        assert_eq!(bindings.button_for(Key::K), Some(Button::A));
        assert_eq!(bindings.button_for(Key::X), None);
    }

    #[test]
    fn file_round_trip_preserves_bindings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keybinds.toml");

        let mut bindings = KeyBindings::defaults();
        bindings.rebind_pad(Button::Start, Key::Backspace);
        bindings.save_to_file(&path).expect("keybinds save");

        let back = KeyBindings::load_from_file(&path);
        assert_eq!(back.key_for_button(Button::Start), Some(Key::Backspace));
        assert_eq!(back.button_for(Key::X), Some(Button::A));
        assert_eq!(back.pause_key(), Key::P);
    }

    #[test]
    fn unknown_names_and_keys_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keybinds.toml");
        std::fs::write(
            &path,
            "a = J\nwarp_drive = Q # not a binding\nb = NotAKey\n",
        )
        .expect("test file writes");

        let bindings = KeyBindings::load_from_file(&path);
        assert_eq!(bindings.button_for(Key::J), Some(Button::A));
        // The bad `b` line leaves the default in place.
        assert_eq!(bindings.button_for(Key::Z), Some(Button::B));
    }
}
