use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::schema::Category;

/// One unvalidated item from a model response
pub type RawCandidate = Map<String, Value>;

/// Raw candidates grouped by category, in response order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    by_category: BTreeMap<Category, Vec<RawCandidate>>,
}

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: Category, item: RawCandidate) {
        self.by_category.entry(category).or_default().push(item);
    }

    pub fn get(&self, category: Category) -> &[RawCandidate] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, category: Category) -> usize {
        self.get(category).len()
    }

    pub fn total(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Append `other` after the items already held
    pub fn extend(&mut self, other: Candidates) {
        for (category, items) in other.by_category {
            self.by_category.entry(category).or_default().extend(items);
        }
    }

    /// Items in category order, then response order
    pub fn iter(&self) -> impl Iterator<Item = (Category, &RawCandidate)> {
        self.by_category
            .iter()
            .flat_map(|(category, items)| items.iter().map(move |item| (*category, item)))
    }

    /// Conditions present while equipment and parameters are both empty:
    /// the model dumped everything into one bucket.
    pub fn is_collapsed(&self) -> bool {
        self.count(Category::Conditions) > 0
            && self.count(Category::Equipment) == 0
            && self.count(Category::Parameters) == 0
    }
}

/// Read the lists for `wanted` from the top level of a response.
///
/// Keys are matched leniently (case, singular/plural). When exactly one
/// category is wanted, a bare top-level array is taken as its list.
pub fn read_lists(value: &Value, wanted: &[Category]) -> Candidates {
    let mut candidates = Candidates::new();

    match value {
        Value::Object(object) => {
            for (key, items) in object {
                match Category::from_key(key) {
                    Some(category) if wanted.contains(&category) => {
                        push_items(&mut candidates, category, items);
                    }
                    _ => debug!(key = %key, "Ignoring response key"),
                }
            }
        }
        Value::Array(_) if wanted.len() == 1 => {
            push_items(&mut candidates, wanted[0], value);
        }
        _ => debug!("Response holds no category lists"),
    }

    candidates
}

/// Gather category lists from anywhere in a nested response.
///
/// Some models nest categories inside entities (conditions under a piece of
/// equipment, and so on). Every list or object found under a category key is
/// collected, and those items are searched in turn.
pub fn flatten_nested(value: &Value, wanted: &[Category]) -> Candidates {
    let mut candidates = Candidates::new();
    if let (Value::Array(_), [only]) = (value, wanted) {
        collect_items(&mut candidates, *only, value, wanted);
    } else {
        walk(&mut candidates, value, wanted);
    }
    candidates
}

fn walk(candidates: &mut Candidates, value: &Value, wanted: &[Category]) {
    match value {
        Value::Object(object) => {
            for (key, child) in object {
                match Category::from_key(key) {
                    Some(category) if wanted.contains(&category) => {
                        collect_items(candidates, category, child, wanted);
                    }
                    _ => walk(candidates, child, wanted),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(candidates, item, wanted);
            }
        }
        _ => {}
    }
}

fn collect_items(candidates: &mut Candidates, category: Category, value: &Value, wanted: &[Category]) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Value::Object(object) = item {
                    candidates.push(category, object.clone());
                    walk(candidates, item, wanted);
                }
            }
        }
        Value::Object(object) => {
            candidates.push(category, object.clone());
            walk(candidates, value, wanted);
        }
        _ => {}
    }
}

fn push_items(candidates: &mut Candidates, category: Category, items: &Value) {
    match items {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(object) => candidates.push(category, object.clone()),
                    other => debug!(%category, item = %other, "Skipping non-object item"),
                }
            }
        }
        Value::Object(object) => candidates.push(category, object.clone()),
        _ => {}
    }
}
