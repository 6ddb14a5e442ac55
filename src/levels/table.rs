use indexmap::IndexMap;

use super::{is_sentinel, normalize_level, Priority, Rank, ALL, BUILTIN_LEVELS, NONE};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: Priority,
    rank: Rank,
}

/// Normalized level name -> priority and derived rank.
///
/// Only non-sentinel levels are stored; `NONE` and `ALL` are answered implicitly at
/// [`Rank::FLOOR`] and [`Rank::CEILING`]. Insertion order is kept so equal priorities rank in the
/// order they were first registered.
#[derive(Debug, Clone)]
pub struct LevelTable {
    levels: IndexMap<String, Entry>,
    max_length: usize,
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelTable {
    /// Table holding the built-in `ERROR`, `WARN`, `INFO`, `DEBUG` and `TRACE` levels.
    pub fn new() -> Self {
        let mut table = Self::empty();
        for (name, priority) in BUILTIN_LEVELS {
            table.levels.insert(
                name.to_string(),
                Entry {
                    priority: Priority(priority),
                    rank: Rank::FLOOR,
                },
            );
        }
        table.reindex();
        table
    }

    pub fn empty() -> Self {
        Self {
            levels: IndexMap::new(),
            max_length: NONE.len(),
        }
    }

    pub fn from_priorities<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut table = Self::empty();
        table.register_levels(pairs)?;
        Ok(table)
    }

    /// Ordered list form: the level at position `i` gets priority `i + 1`.
    pub fn from_names<I, K>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut pairs = Vec::new();
        for (index, name) in names.into_iter().enumerate() {
            let name = normalize_level(name.as_ref())?;
            if !pairs.iter().any(|(known, _)| known == &name) {
                pairs.push((name, (index + 1) as f64));
            }
        }
        Self::from_priorities(pairs)
    }

    /// Stores or overwrites the priority of each level, then reindexes the whole table.
    ///
    /// The batch is validated before anything is written, so a rejected call leaves the table
    /// untouched.
    pub fn register_levels<I, K>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut validated = Vec::new();
        for (name, priority) in pairs {
            let raw = name.as_ref();
            let normalized = normalize_level(raw)?;
            if is_sentinel(&normalized) {
                return Err(Error::invalid_level(raw, "reserved sentinel level"));
            }
            let priority = Priority::new(priority)
                .ok_or_else(|| Error::invalid_level(raw, "priority is not a number"))?;
            validated.push((normalized, priority));
        }

        for (name, priority) in validated {
            self.levels.insert(
                name,
                Entry {
                    priority,
                    rank: Rank::FLOOR,
                },
            );
        }
        self.reindex();
        Ok(())
    }

    /// Reassigns dense ranks `1..=N` in ascending priority order. Ties keep registration order.
    pub fn reindex(&mut self) {
        let mut order: Vec<usize> = (0..self.levels.len()).collect();
        order.sort_by_key(|&index| self.levels[index].priority);

        for (position, index) in order.into_iter().enumerate() {
            self.levels[index].rank = Rank::new(position as u64 + 1);
        }

        self.max_length = self
            .levels
            .keys()
            .map(String::len)
            .chain([NONE.len(), ALL.len()])
            .max()
            .unwrap_or(0);
    }

    pub fn has_level(&self, name: &str) -> bool {
        self.rank(name).is_some()
    }

    pub fn rank(&self, name: &str) -> Option<Rank> {
        let name = normalize_level(name).ok()?;
        match name.as_str() {
            NONE => Some(Rank::FLOOR),
            ALL => Some(Rank::CEILING),
            _ => self.levels.get(&name).map(|entry| entry.rank),
        }
    }

    /// Nominal priority a level was registered with.
    pub fn priority(&self, name: &str) -> Option<f64> {
        let name = normalize_level(name).ok()?;
        match name.as_str() {
            NONE => Some(0.0),
            ALL => Some(f64::MAX),
            _ => self.levels.get(&name).map(|entry| entry.priority.value()),
        }
    }

    pub fn name_for_rank(&self, rank: Rank) -> Option<String> {
        if rank == Rank::FLOOR {
            return Some(NONE.to_string());
        }
        if rank == Rank::CEILING {
            return Some(ALL.to_string());
        }

        self.levels
            .iter()
            .find(|(_, entry)| entry.rank == rank)
            .map(|(name, _)| name.clone())
    }

    /// Non-sentinel levels in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Rank)> + '_ {
        let mut levels: Vec<_> = self
            .levels
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.rank))
            .collect();
        levels.sort_by_key(|&(_, rank)| rank);
        levels.into_iter()
    }

    /// Every level name by ascending rank, sentinels included.
    pub fn ordered_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.levels.len() + 2);
        names.push(NONE.to_string());
        names.extend(self.iter().map(|(name, _)| name.to_string()));
        names.push(ALL.to_string());
        names
    }

    /// Length of the longest level name, sentinels included, for column alignment.
    pub fn levels_max_length(&self) -> usize {
        self.max_length
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
