use std::collections::{BTreeMap, HashSet};

use crate::schema::{Category, Entity, ExtractionMetadata, ExtractionResult};

/// Accumulates validated entities across chunks and passes, in encounter
/// order. Deduplication happens once, in [`Aggregator::finish`].
#[derive(Debug, Default)]
pub struct Aggregator {
    entities: BTreeMap<Category, Vec<Entity>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: Category, entity: Entity) {
        self.entities.entry(category).or_default().push(entity);
    }

    pub fn extend(&mut self, entities: impl IntoIterator<Item = (Category, Entity)>) {
        for (category, entity) in entities {
            self.push(category, entity);
        }
    }

    pub fn len(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    /// Deduplicate every category and build the final result.
    pub fn finish(mut self, mut metadata: ExtractionMetadata) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for category in Category::ALL {
            let entities = self.entities.remove(&category).unwrap_or_default();
            let (unique, removed) = dedup(entities);
            metadata.stats.duplicates_removed += removed;
            *result.get_mut(category) = unique;
        }

        result.metadata = metadata;
        result
    }
}

/// Keep the first entity for every case-folded (name, description) key.
pub fn dedup(entities: Vec<Entity>) -> (Vec<Entity>, usize) {
    let before = entities.len();
    let mut seen = HashSet::with_capacity(before);

    let unique: Vec<Entity> = entities
        .into_iter()
        .filter(|entity| seen.insert(entity.dedup_key()))
        .collect();

    let removed = before - unique.len();
    (unique, removed)
}
