use std::collections::HashMap;
use std::path::PathBuf;

use uuid::Uuid;

/// Staging backend for archived uploads. Injected through AppState so the
/// disk-backed store can be swapped for the in-memory one in tests; never a
/// process-wide singleton.
pub trait FileStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> anyhow::Result<String>;
    fn get(&self, key: &str) -> anyhow::Result<(String, Vec<u8>)>;
}

/// Writes under `<workspace>/uploads/`, uuid-prefixed so repeated uploads of
/// the same filename never collide.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(workspace: &std::path::Path) -> Self {
        DiskStore {
            root: workspace.join("uploads"),
        }
    }
}

impl FileStore for DiskStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        std::fs::create_dir_all(&self.root)?;
        let safe_name = name.replace(['/', '\\'], "_");
        let key = format!("{}-{}", Uuid::new_v4().simple(), safe_name);
        std::fs::write(self.root.join(&key), bytes)?;
        Ok(key)
    }

    fn get(&self, key: &str) -> anyhow::Result<(String, Vec<u8>)> {
        let path = self.root.join(key);
        let bytes = std::fs::read(&path)?;
        // Key layout is "<uuid>-<original name>".
        let name = key.splitn(2, '-').nth(1).unwrap_or(key).to_string();
        Ok((name, bytes))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, (String, Vec<u8>)>,
}

impl FileStore for MemoryStore {
    fn put(&mut self, name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let key = format!("{}-{}", Uuid::new_v4().simple(), name);
        self.entries.insert(key.clone(), (name.to_string(), bytes.to_vec()));
        Ok(key)
    }

    fn get(&self, key: &str) -> anyhow::Result<(String, Vec<u8>)> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no staged file for key {key}"))
    }
}
