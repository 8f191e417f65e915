//! Per-venue market parameter cache with copy-on-write refresh.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::error::{BotError, MarketError};
use crate::venue::VenueReader;

use super::types::{MarketParams, Venue};

/// Cache key: one entry per (venue, symbol).
pub type MarketKey = (Venue, String);

/// Shape of the durable cache file: `{venue: {symbol: params}}`.
type CacheFile = HashMap<Venue, HashMap<String, MarketParams>>;

/// Caches per-symbol market parameters for every venue.
///
/// Readers clone an `Arc` of the whole table; refresh builds a new table
/// and swaps it in, so a reader never observes a half-updated cache.
#[derive(Debug, Default)]
pub struct MarketDirectory {
    cache: RwLock<Arc<HashMap<MarketKey, MarketParams>>>,
}

impl MarketDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up parameters for a (venue, symbol) pair.
    pub fn get(&self, venue: Venue, symbol: &str) -> Result<MarketParams, MarketError> {
        let cache = self.cache.read().expect("directory lock poisoned").clone();
        cache
            .get(&(venue, symbol.to_string()))
            .cloned()
            .ok_or_else(|| MarketError::NotFound {
                venue,
                symbol: symbol.to_string(),
            })
    }

    /// Immutable snapshot of the full table for one scan pass.
    pub fn snapshot(&self) -> Arc<HashMap<MarketKey, MarketParams>> {
        self.cache.read().expect("directory lock poisoned").clone()
    }

    /// Number of cached (venue, symbol) entries.
    pub fn len(&self) -> usize {
        self.cache.read().expect("directory lock poisoned").len()
    }

    /// True when no parameters are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole cache with the given entries.
    pub fn replace(&self, entries: Vec<MarketParams>) {
        let table: HashMap<MarketKey, MarketParams> = entries
            .into_iter()
            .map(|p| ((p.venue, p.symbol.clone()), p))
            .collect();
        *self.cache.write().expect("directory lock poisoned") = Arc::new(table);
    }

    /// Pull parameters for all tracked symbols from every venue reader and
    /// swap the cache atomically.
    ///
    /// A symbol that fails on one venue is excluded from that venue only.
    /// If every fetch fails the previous cache is kept, so a total outage
    /// does not blind the scanner.
    #[instrument(skip(self, readers, symbols), fields(venues = readers.len()))]
    pub async fn refresh(
        &self,
        readers: &HashMap<Venue, Arc<dyn VenueReader>>,
        symbols: &[String],
    ) -> usize {
        let mut futures = Vec::with_capacity(readers.len() * symbols.len());
        for reader in readers.values() {
            for symbol in symbols {
                let reader = Arc::clone(reader);
                let symbol = symbol.clone();
                futures.push(async move {
                    let venue = reader.venue();
                    (venue, symbol.clone(), reader.get_market_params(&symbol).await)
                });
            }
        }

        let mut entries = Vec::new();
        for (venue, symbol, result) in join_all(futures).await {
            match result {
                Ok(params) => entries.push(params),
                Err(e) => {
                    warn!(%venue, %symbol, error = %e, "excluding symbol from venue this refresh");
                }
            }
        }

        if entries.is_empty() {
            warn!("refresh produced no market params; keeping previous cache");
            return 0;
        }

        let count = entries.len();
        self.replace(entries);
        info!(entries = count, "market directory refreshed");
        count
    }

    /// Write the cache to a durable JSON file keyed `{venue: {symbol: params}}`.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), BotError> {
        let cache = self.snapshot();
        let mut file: CacheFile = HashMap::new();
        for ((venue, symbol), params) in cache.iter() {
            file.entry(*venue)
                .or_default()
                .insert(symbol.clone(), params.clone());
        }
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), entries = cache.len(), "market cache persisted");
        Ok(())
    }

    /// Load the cache from a durable file.
    ///
    /// A missing or corrupt file degrades to an empty cache with a logged
    /// warning rather than failing the start. Returns the entry count.
    pub fn load(&self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "no market cache; degraded start with empty directory");
                return 0;
            }
        };

        let file: CacheFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                let err = MarketError::CorruptCache {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "degraded start with empty directory");
                return 0;
            }
        };

        let entries: Vec<MarketParams> = file
            .into_values()
            .flat_map(|by_symbol| by_symbol.into_values())
            .collect();
        let count = entries.len();
        self.replace(entries);
        info!(path = %path.display(), entries = count, "market cache loaded");
        count
    }
}
