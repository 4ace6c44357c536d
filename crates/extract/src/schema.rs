use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::config::PromptStrategy;
use crate::stats::PipelineStats;

/// The fixed set of entity kinds found in a control narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Equipment,
    Parameters,
    Variables,
    Conditions,
    Actions,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Equipment,
        Category::Parameters,
        Category::Variables,
        Category::Conditions,
        Category::Actions,
    ];

    /// Output key, both in model responses and in the final result
    pub fn key(self) -> &'static str {
        match self {
            Category::Equipment => "equipment",
            Category::Parameters => "parameters",
            Category::Variables => "variables",
            Category::Conditions => "conditions",
            Category::Actions => "actions",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Equipment => "Equipment",
            Category::Parameters => "Parameters",
            Category::Variables => "Variables",
            Category::Conditions => "Conditions",
            Category::Actions => "Actions",
        }
    }

    /// One-line definition used in prompts
    pub fn definition(self) -> &'static str {
        match self {
            Category::Equipment => "physical assets explicitly named (tanks, pumps, valves, vessels, instruments)",
            Category::Parameters => "configurable values (setpoints, limits, constants, timers)",
            Category::Variables => "measured or calculated runtime values",
            Category::Conditions => "logical triggers, interlocks and permissives (CAUSE)",
            Category::Actions => "system responses such as opening, closing, starting, stopping, alarming (EFFECT)",
        }
    }

    /// Whether entities of this category carry a document identifier
    pub fn has_id(self) -> bool {
        matches!(
            self,
            Category::Equipment | Category::Parameters | Category::Variables
        )
    }

    /// Resolve a response key, tolerating case and singular/plural drift.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "equipment" | "equipments" => Some(Category::Equipment),
            "parameter" | "parameters" => Some(Category::Parameters),
            "variable" | "variables" => Some(Category::Variables),
            "condition" | "conditions" => Some(Category::Conditions),
            "action" | "actions" => Some(Category::Actions),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A validated entity. `id` is `Some` exactly for identifier-bearing
/// categories and is empty when the text held no genuine identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
}

impl Entity {
    /// Case-folded `name|description`, the identity used for deduplication
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            self.name.to_lowercase(),
            self.description.to_lowercase()
        )
    }

    /// The loosely-typed map form a model response would carry
    pub fn to_raw(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(id) = &self.id {
            map.insert("id".into(), Value::String(id.clone()));
        }
        map.insert("name".into(), Value::String(self.name.clone()));
        map.insert("description".into(), Value::String(self.description.clone()));
        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub strategy: PromptStrategy,
    pub run_id: String,
    pub model: String,
    pub stats: PipelineStats,
}

/// Final per-category entity lists for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub equipment: Vec<Entity>,
    pub parameters: Vec<Entity>,
    pub variables: Vec<Entity>,
    pub conditions: Vec<Entity>,
    pub actions: Vec<Entity>,
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    pub fn get(&self, category: Category) -> &[Entity] {
        match category {
            Category::Equipment => &self.equipment,
            Category::Parameters => &self.parameters,
            Category::Variables => &self.variables,
            Category::Conditions => &self.conditions,
            Category::Actions => &self.actions,
        }
    }

    pub(crate) fn get_mut(&mut self, category: Category) -> &mut Vec<Entity> {
        match category {
            Category::Equipment => &mut self.equipment,
            Category::Parameters => &mut self.parameters,
            Category::Variables => &mut self.variables,
            Category::Conditions => &mut self.conditions,
            Category::Actions => &mut self.actions,
        }
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|c| self.get(*c).len()).sum()
    }
}
