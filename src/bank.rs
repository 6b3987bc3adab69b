//! Static response bank.
//!
//! A read-only mapping from `(intent, slot)` to pre-authored advisory
//! text, loaded once at startup and never mutated at runtime. Slots are
//! the pattern tags produced by the confidence scorer, plus a `default`
//! slot per intent used as the last-resort fallback when the generative
//! path is unavailable.
//!
//! A compiled-in asset ships with the crate; deployments can load a
//! replacement asset from disk instead.

use std::collections::HashMap;
use std::path::Path;

use crate::core::request::Intent;
use crate::error::{Error, Result};

/// Compiled-in response asset.
const BUILTIN_ASSET: &str = include_str!("../assets/static_responses.json");

/// Slot name consulted by the last-resort fallback path.
const DEFAULT_SLOT: &str = "default";

/// Read-only `(intent, slot)` lookup of pre-authored responses.
///
/// # Examples
///
/// ```
/// use mentor_rs::bank::StaticBank;
/// use mentor_rs::core::request::Intent;
///
/// let bank = StaticBank::builtin().unwrap();
/// assert!(bank.lookup(Intent::Debugging, "how_to").is_some());
/// assert!(bank.lookup(Intent::Debugging, "nonexistent_slot").is_none());
/// ```
#[derive(Debug)]
pub struct StaticBank {
    entries: HashMap<(Intent, String), String>,
}

impl StaticBank {
    /// Loads the compiled-in asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the bundled asset is malformed,
    /// which would be a packaging defect.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_ASSET)
    }

    /// Parses a response asset from JSON.
    ///
    /// The shape is `{ intent_tag: { slot: text, ... }, ... }`. Unknown
    /// intent tags fold into [`Intent::General`] rather than erroring, so
    /// older assets keep loading after intent renames.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the JSON does not parse.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(json).map_err(|e| Error::Internal {
                message: format!("static response asset is malformed: {e}"),
            })?;

        let mut entries = HashMap::new();
        for (intent_tag, slots) in raw {
            let intent = Intent::parse(&intent_tag);
            for (slot, text) in slots {
                entries.insert((intent, slot), text);
            }
        }
        Ok(Self { entries })
    }

    /// Loads a response asset from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when the file is unreadable or malformed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::Internal {
            message: format!("static response asset unreadable: {e}"),
        })?;
        Self::from_json(&json)
    }

    /// Constant-time lookup of a candidate for `(intent, slot)`.
    #[must_use]
    pub fn lookup(&self, intent: Intent, slot: &str) -> Option<&str> {
        self.entries
            .get(&(intent, slot.to_string()))
            .map(String::as_str)
    }

    /// Returns the first candidate among the given slots, trying the
    /// intent's slots in order.
    #[must_use]
    pub fn lookup_any<'a, I>(&self, intent: Intent, slots: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        slots.into_iter().find_map(|slot| self.lookup(intent, slot))
    }

    /// Last-resort candidate: the intent's `default` slot, falling back to
    /// the general default.
    #[must_use]
    pub fn last_resort(&self, intent: Intent) -> Option<&str> {
        self.lookup(intent, DEFAULT_SLOT)
            .or_else(|| self.lookup(Intent::General, DEFAULT_SLOT))
    }

    /// Number of loaded responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bank holds no responses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
