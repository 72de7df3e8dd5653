//! The per-session display name.
//!
//! A session is whatever a [`SessionStorage`] says it is: the process lifetime
//! for [`MemorySessionStorage`], or the life of a file for
//! [`FileSessionStorage`].  The name is generated once per session and never
//! changed afterwards.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rand::seq::SliceRandom;
use serde_json::{from_reader, to_writer_pretty};

use crate::error::{Error, Result};

/// Session key under which the display name is stored.
pub const NAME_KEY: &str = "tutorial_name";

/// String key/value storage scoped to one session.
pub trait SessionStorage: Send + Sync {
    /// Reads `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Writes `key`.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage kept in a JSON object file, so a session can span several runs.
///
/// A missing file is an empty session.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    /// Storage backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(Error::io(
                    format!("failed to open session file {}", self.path.display()),
                    err,
                ));
            }
        };
        let reader = BufReader::new(file);
        Ok(from_reader(reader)?)
    }

    fn store(&self, items: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.path).map_err(|err| {
            Error::io(
                format!("failed to write session file {}", self.path.display()),
                err,
            )
        })?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, items)?;
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut items = self.load()?;
        items.insert(key.to_string(), value.to_string());
        self.store(&items)
    }
}

/// Source of display names.
pub trait NameGenerator {
    /// Produces a new first name.
    fn first_name(&mut self) -> String;
}

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alma", "Amara", "Anders", "Ann", "Arjun", "Beatrix", "Bo", "Camille", "Chen",
    "Dario", "Della", "Eitan", "Elif", "Emeka", "Esme", "Farah", "Felix", "Greta", "Hana",
    "Hugo", "Ines", "Ivan", "Jonas", "Juno", "Kai", "Kenji", "Lena", "Lior", "Luca", "Maeve",
    "Mateo", "Mira", "Nadia", "Nico", "Noor", "Olu", "Oskar", "Paz", "Priya", "Quinn", "Rafa",
    "Rosa", "Sami", "Saoirse", "Tariq", "Thea", "Uma", "Vera", "Wren", "Yara", "Zane",
];

/// Picks uniformly from a built-in list of first names.
#[derive(Debug, Default)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn first_name(&mut self) -> String {
        let mut rng = rand::thread_rng();
        FIRST_NAMES.choose(&mut rng).unwrap_or(&"Guest").to_string()
    }
}

/// Returns the session's display name, generating and storing one on first
/// use.  An empty stored value counts as absent.
pub fn get_or_set_fake_name(
    storage: &dyn SessionStorage,
    names: &mut dyn NameGenerator,
) -> Result<String> {
    if let Some(name) = storage.get_item(NAME_KEY)?
        && !name.is_empty()
    {
        return Ok(name);
    }
    let name = names.first_name();
    storage.set_item(NAME_KEY, &name)?;
    tracing::debug!(%name, "generated session name");
    Ok(name)
}
