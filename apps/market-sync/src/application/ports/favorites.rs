//! Favorites Store Port (Driven Port)
//!
//! The dashboard's favorite symbols live behind this capability so the core
//! never depends on a specific persistence mechanism.

use crate::domain::market::Symbol;

/// Errors from a favorites storage adapter.
#[derive(Debug, thiserror::Error)]
pub enum FavoritesError {
    /// Underlying storage could not be read or written.
    #[error("favorites storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Stored data could not be decoded.
    #[error("favorites decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Get/set/toggle access to the favorite symbols.
pub trait FavoritesStore: Send + Sync {
    /// Current favorites in insertion order.
    fn get(&self) -> Result<Vec<Symbol>, FavoritesError>;

    /// Replace all favorites.
    fn set(&self, favorites: Vec<Symbol>) -> Result<(), FavoritesError>;

    /// Add `symbol` if absent, remove it if present.
    ///
    /// Returns `true` when the symbol is a favorite afterwards.
    /// The default reads then writes; adapters shared between tasks
    /// override it to do both under one lock.
    fn toggle(&self, symbol: &Symbol) -> Result<bool, FavoritesError> {
        let mut favorites = self.get()?;
        let now_favorite = toggle_in(&mut favorites, symbol);
        self.set(favorites)?;
        Ok(now_favorite)
    }

    /// Whether `symbol` is a favorite.
    fn is_favorite(&self, symbol: &Symbol) -> Result<bool, FavoritesError> {
        Ok(self.get()?.contains(symbol))
    }
}

/// Flip `symbol`'s membership in `favorites`, keeping insertion order.
///
/// Returns `true` when the symbol is a favorite afterwards.
pub fn toggle_in(favorites: &mut Vec<Symbol>, symbol: &Symbol) -> bool {
    if let Some(pos) = favorites.iter().position(|s| s == symbol) {
        favorites.remove(pos);
        false
    } else {
        favorites.push(symbol.clone());
        true
    }
}
