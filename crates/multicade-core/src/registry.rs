use crate::core::{Core, CoreSpec};

/// A registered core: its static description plus a constructor.
pub struct CoreEntry {
    pub spec: &'static CoreSpec,
    factory: Box<dyn Fn() -> Box<dyn Core>>,
}

impl CoreEntry {
    pub fn create(&self) -> Box<dyn Core> {
        (self.factory)()
    }
}

/// Ordered set of the available cores. Registration order matters twice:
/// extension lookups take the first match, and the first entry is the
/// default when nothing matches.
pub struct CoreRegistry {
    entries: Vec<CoreEntry>,
}

impl CoreRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register<F>(&mut self, spec: &'static CoreSpec, factory: F)
    where
        F: Fn() -> Box<dyn Core> + 'static,
    {
        self.entries.push(CoreEntry {
            spec,
            factory: Box::new(factory),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &CoreEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&CoreEntry> {
        self.entries.iter().find(|e| e.spec.id == id)
    }

    /// Pick the core for a file name by its extension, case-insensitive,
    /// first match wins. Unknown or missing extensions fall back to the
    /// default core.
    pub fn entry_for(&self, file_name: &str) -> Option<&CoreEntry> {
        if let Some((_, ext)) = file_name.rsplit_once('.') {
            let ext = ext.to_ascii_lowercase();
            for entry in &self.entries {
                if entry.spec.extensions.contains(&ext.as_str()) {
                    return Some(entry);
                }
            }
        }
        self.default_entry()
    }

    pub fn default_entry(&self) -> Option<&CoreEntry> {
        self.entries.first()
    }
}

impl Default for CoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}
