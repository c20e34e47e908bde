//! Raw identifier ↔ dense index translation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::RawId;

/// Bijective mapping between raw ids and zero-based dense indices
///
/// Indices are assigned in order of first appearance. Only the reverse table
/// is serialized; the forward table is rebuilt (and checked for duplicates)
/// on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RawId>", into = "Vec<RawId>")]
pub struct IdMapper {
    forward: HashMap<RawId, usize>,
    reverse: Vec<RawId>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping by scanning ids in order, skipping repeats
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = RawId>,
    {
        let mut mapper = Self::new();
        for id in ids {
            mapper.insert(id);
        }
        mapper
    }

    /// Returns the index of `raw`, assigning the next free one if unseen
    pub fn insert(&mut self, raw: RawId) -> usize {
        if let Some(&index) = self.forward.get(&raw) {
            return index;
        }
        let index = self.reverse.len();
        self.forward.insert(raw, index);
        self.reverse.push(raw);
        index
    }

    pub fn index_of(&self, raw: RawId) -> Option<usize> {
        self.forward.get(&raw).copied()
    }

    pub fn raw_id(&self, index: usize) -> Option<RawId> {
        self.reverse.get(index).copied()
    }

    /// Raw ids in dense-index order
    pub fn raw_ids(&self) -> &[RawId] {
        &self.reverse
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}

impl TryFrom<Vec<RawId>> for IdMapper {
    type Error = String;

    fn try_from(reverse: Vec<RawId>) -> Result<Self, Self::Error> {
        let mut forward = HashMap::with_capacity(reverse.len());
        for (index, &raw) in reverse.iter().enumerate() {
            if forward.insert(raw, index).is_some() {
                return Err(format!("duplicate raw id {} in identifier mapping", raw));
            }
        }
        Ok(Self { forward, reverse })
    }
}

impl From<IdMapper> for Vec<RawId> {
    fn from(mapper: IdMapper) -> Self {
        mapper.reverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_first_appearance() {
        let mapper = IdMapper::from_ids([30, 10, 30, 20, 10]);
        assert_eq!(mapper.len(), 3);
        assert_eq!(mapper.index_of(30), Some(0));
        assert_eq!(mapper.index_of(10), Some(1));
        assert_eq!(mapper.index_of(20), Some(2));
        assert_eq!(mapper.raw_ids(), &[30, 10, 20]);
    }

    #[test]
    fn test_reverse_lookup_inverts_forward() {
        let mapper = IdMapper::from_ids([5, 7, 11, 13]);
        for &raw in mapper.raw_ids() {
            let index = mapper.index_of(raw).unwrap();
            assert_eq!(mapper.raw_id(index), Some(raw));
        }
        assert_eq!(mapper.index_of(99), None);
        assert_eq!(mapper.raw_id(4), None);
    }

    #[test]
    fn test_duplicate_reverse_table_is_rejected() {
        let result = IdMapper::try_from(vec![1, 2, 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_keeps_order() {
        let mapper = IdMapper::from_ids([9, 3, 6]);
        let bytes = bincode::serialize(&mapper).unwrap();
        let restored: IdMapper = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, mapper);
    }
}
