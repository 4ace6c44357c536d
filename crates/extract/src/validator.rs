use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::normalizer::RawCandidate;
use crate::prompt::PLACEHOLDERS;
use crate::schema::{Category, Entity};

pub const MIN_NAME_CHARS: usize = 2;

/// Why a candidate was dropped. Rejection is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{field} contains the template placeholder {token:?}")]
    Placeholder {
        field: &'static str,
        token: &'static str,
    },

    #[error("name {0:?} is shorter than {MIN_NAME_CHARS} characters")]
    NameTooShort(String),
}

/// Promote one raw candidate to an [`Entity`].
///
/// `source` is the chunk text the candidate was extracted from; an `id` that
/// does not occur in it verbatim is cleared rather than trusted.
pub fn validate(category: Category, raw: &RawCandidate, source: &str) -> Result<Entity, Rejection> {
    let name = field(raw, "name");
    let description = field(raw, "description");

    if let Some(token) = find_placeholder(&name) {
        return Err(Rejection::Placeholder {
            field: "name",
            token,
        });
    }
    if let Some(token) = find_placeholder(&description) {
        return Err(Rejection::Placeholder {
            field: "description",
            token,
        });
    }

    if name.chars().count() < MIN_NAME_CHARS {
        return Err(Rejection::NameTooShort(name));
    }

    let id = category.has_id().then(|| {
        let id = field(raw, "id");
        if id.is_empty() || find_placeholder(&id).is_some() || !source.contains(id.as_str()) {
            if !id.is_empty() {
                debug!(%category, id = %id, "Dropping identifier not found in source text");
            }
            String::new()
        } else {
            id
        }
    });

    Ok(Entity {
        id,
        name,
        description,
    })
}

/// Trimmed string form of a field. Missing, null and nested values read as empty.
fn field(raw: &RawCandidate, key: &str) -> String {
    let value = raw.get(key).or_else(|| {
        raw.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    });

    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn find_placeholder(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    PLACEHOLDERS
        .iter()
        .find(|token| lowered.contains(&token.to_lowercase()))
        .copied()
}
