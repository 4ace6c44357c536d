//! Prompt templates for both prompting strategies.
//!
//! The item shapes shown to the model are rendered from the placeholder
//! constants below, and [`PLACEHOLDERS`] is the validator's denylist. A model
//! that echoes one of these tokens copied the instructions rather than the
//! document. Change a token here and both sides move together.

use crate::schema::Category;

pub const ID_PLACEHOLDER: &str = "<document ID>";
pub const NAME_PLACEHOLDER: &str = "<document Name>";
pub const DESCRIPTION_PLACEHOLDER: &str = "<short description>";
/// Example identifier cited in the identifier rule
pub const EXAMPLE_ID_PLACEHOLDER: &str = "<TAG-01>";
pub const GENERIC_PLACEHOLDER: &str = "<...>";

/// Every token the templates introduce
pub const PLACEHOLDERS: &[&str] = &[
    ID_PLACEHOLDER,
    NAME_PLACEHOLDER,
    DESCRIPTION_PLACEHOLDER,
    EXAMPLE_ID_PLACEHOLDER,
    GENERIC_PLACEHOLDER,
];

/// JSON shape of one item of `category`
fn item_shape(category: Category) -> String {
    if category.has_id() {
        format!(
            r#"{{ "id": "{}", "name": "{}", "description": "{}" }}"#,
            ID_PLACEHOLDER, NAME_PLACEHOLDER, DESCRIPTION_PLACEHOLDER
        )
    } else {
        format!(
            r#"{{ "name": "{}", "description": "{}" }}"#,
            NAME_PLACEHOLDER, DESCRIPTION_PLACEHOLDER
        )
    }
}

fn rules() -> String {
    format!(
        r#"RULES:
- Extract ONLY from the TEXT section below, never from these instructions.
- Copy identifiers exactly as written in the TEXT (a tag such as {}). Never invent an identifier; if the TEXT gives none, use "" for "id".
- Replace every {} placeholder with real content from the TEXT. Do not output the placeholders.
- Omit anything you cannot find in the TEXT. An empty list is a valid answer.
- Output ONLY the JSON object, no markdown, no explanations."#,
        EXAMPLE_ID_PLACEHOLDER, GENERIC_PLACEHOLDER
    )
}

pub fn build_unified_prompt(chunk_text: &str) -> String {
    let definitions = Category::ALL
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} - {}", i + 1, c.label(), c.definition()))
        .collect::<Vec<_>>()
        .join("\n");

    let schema = Category::ALL
        .iter()
        .map(|c| format!(r#"  "{}": [ {} ]"#, c.key(), item_shape(*c)))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"You are a Control Philosophy extraction model.
Classify the information in the TEXT into the following categories:

{}

IMPORTANT:
- Classify each item into the MOST SPECIFIC category.
- Do NOT collapse multiple categories into conditions.
- Physical nouns go to equipment, tunable values to parameters, measured values to variables, triggers to conditions, responses to actions.
- Return every category, using an empty list when nothing applies.

{}

SCHEMA:
{{
{}
}}

TEXT:
{}

JSON OUTPUT:"#,
        definitions,
        rules(),
        schema,
        chunk_text
    )
}

pub fn build_category_prompt(category: Category, chunk_text: &str) -> String {
    format!(
        r#"You are a Control Philosophy extraction model.
List all {} mentioned in the TEXT: {}.
Extract nothing else.

{}

SCHEMA:
{{
  "{}": [ {} ]
}}

TEXT:
{}

JSON OUTPUT:"#,
        category.key(),
        category.definition(),
        rules(),
        category.key(),
        item_shape(category),
        chunk_text
    )
}
