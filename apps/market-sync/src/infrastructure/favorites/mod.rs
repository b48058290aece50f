//! Favorites Adapters
//!
//! - `InMemoryFavorites`: process-local list
//! - `JsonFileFavorites`: JSON array of symbols in a file

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::application::ports::{FavoritesError, FavoritesStore, toggle_in};
use crate::domain::market::Symbol;

/// Favorites kept in memory for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryFavorites {
    symbols: Mutex<Vec<Symbol>>,
}

impl InMemoryFavorites {
    /// Create a store seeded with `symbols`.
    #[must_use]
    pub fn with_symbols(symbols: Vec<Symbol>) -> Self {
        Self {
            symbols: Mutex::new(symbols),
        }
    }
}

impl FavoritesStore for InMemoryFavorites {
    fn get(&self) -> Result<Vec<Symbol>, FavoritesError> {
        Ok(self.symbols.lock().clone())
    }

    fn set(&self, favorites: Vec<Symbol>) -> Result<(), FavoritesError> {
        *self.symbols.lock() = favorites;
        Ok(())
    }

    fn toggle(&self, symbol: &Symbol) -> Result<bool, FavoritesError> {
        Ok(toggle_in(&mut self.symbols.lock(), symbol))
    }
}

/// Favorites persisted as a JSON array (`["BTC/USDT", ...]`).
///
/// A missing file reads as an empty list. Writes go to a sibling temporary
/// file that is then renamed over the target.
#[derive(Debug)]
pub struct JsonFileFavorites {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileFavorites {
    /// Create a store backed by `path`; the file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<Symbol>, FavoritesError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, favorites: &[Symbol]) -> Result<(), FavoritesError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(favorites)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl FavoritesStore for JsonFileFavorites {
    fn get(&self) -> Result<Vec<Symbol>, FavoritesError> {
        let _guard = self.lock.lock();
        self.read()
    }

    fn set(&self, favorites: Vec<Symbol>) -> Result<(), FavoritesError> {
        let _guard = self.lock.lock();
        self.write(&favorites)?;
        tracing::debug!(path = %self.path.display(), count = favorites.len(), "Favorites saved");
        Ok(())
    }

    fn toggle(&self, symbol: &Symbol) -> Result<bool, FavoritesError> {
        let _guard = self.lock.lock();
        let mut favorites = self.read()?;
        let now_favorite = toggle_in(&mut favorites, symbol);
        self.write(&favorites)?;
        Ok(now_favorite)
    }
}
