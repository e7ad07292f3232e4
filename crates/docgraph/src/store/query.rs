//! Native query vocabulary shared by every store backend.
//!
//! The filter language follows the document-database convention: a field-keyed
//! map whose values are either literals (equality) or operator maps
//! (`{"$gte": 18}`), plus the logical keys `$and`, `$or`, `$nor` and the
//! full-text key `$text`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StoreError;

/// A stored record, and also the shape of a native filter.
pub type Document = serde_json::Map<String, Value>;

/// Identity field used when a collection does not declare its own.
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a direction token: `asc`, `ascending`, `1`, `desc`, `descending`, `-1`.
    ///
    /// Matching is case-insensitive. Returns `None` for anything else.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(Self::Asc),
            "desc" | "descending" | "-1" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// One key of a native sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SortKey {
    /// Order by a document field.
    Field {
        field: String,
        direction: SortDirection,
    },
    /// Order by descending text-search relevance.
    TextScore,
}

impl SortKey {
    pub fn field(field: impl Into<String>, direction: SortDirection) -> Self {
        Self::Field {
            field: field.into(),
            direction,
        }
    }
}

/// Which fields a query returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "fields", rename_all = "snake_case")]
pub enum ProjectionFields {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// Field projection plus the optional computed relevance-score field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub fields: ProjectionFields,
    pub score_field: Option<String>,
}

impl Projection {
    /// Build a projection from normalized selection entries.
    ///
    /// Entries prefixed with `-` are exclusions. Inclusions take precedence:
    /// when any are present, exclusions are ignored, and the identity field is
    /// added unless it was explicitly excluded.
    pub fn from_selection(fields: &[String], id_field: &str) -> Self {
        let (included, excluded): (Vec<&String>, Vec<&String>) =
            fields.iter().partition(|f| !f.starts_with('-'));
        let excluded: Vec<String> = excluded
            .iter()
            .map(|f| f.trim_start_matches('-').to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let fields = if !included.is_empty() {
            let mut include: Vec<String> = included.into_iter().cloned().collect();
            let id_excluded = excluded.iter().any(|f| f == id_field);
            if !id_excluded && !include.iter().any(|f| f == id_field) {
                include.insert(0, id_field.to_string());
            }
            ProjectionFields::Include(include)
        } else if !excluded.is_empty() {
            ProjectionFields::Exclude(excluded)
        } else {
            ProjectionFields::All
        };

        Self {
            fields,
            score_field: None,
        }
    }

    /// Make sure `field` survives the projection.
    pub fn ensure_included(&mut self, field: &str) {
        match &mut self.fields {
            ProjectionFields::All => {}
            ProjectionFields::Include(fields) => {
                if !fields.iter().any(|f| f == field) {
                    fields.push(field.to_string());
                }
            }
            ProjectionFields::Exclude(fields) => fields.retain(|f| f != field),
        }
    }
}

/// Replace a relation reference with the referenced record(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulateClause {
    /// Path in the parent document holding the reference(s).
    pub path: String,
    /// Collection the references point into.
    pub from: String,
    /// Field in the target collection the references match.
    pub foreign_field: String,
    /// Native default filters of the target collection. Populated records
    /// must satisfy them as well as the reference match.
    pub filter: Document,
    /// Sub-projection applied to populated records.
    pub projection: Projection,
}

/// A fully assembled find query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub populate: Vec<PopulateClause>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Parsed `$text` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    pub search: String,
    pub language: Option<String>,
    pub case_sensitive: bool,
    pub diacritic_sensitive: bool,
}

impl TextQuery {
    /// Parse the value of a `$text` key.
    pub fn from_clause(clause: &Value) -> Result<Self, StoreError> {
        let obj = clause
            .as_object()
            .ok_or_else(|| StoreError::InvalidQuery("$text expects an object".to_string()))?;
        let search = obj
            .get("$search")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::InvalidQuery("$text requires a $search string".to_string()))?
            .to_string();
        Ok(Self {
            search,
            language: obj
                .get("$language")
                .and_then(Value::as_str)
                .map(str::to_string),
            case_sensitive: obj
                .get("$caseSensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            diacritic_sensitive: obj
                .get("$diacriticSensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// One stage of a raw aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Sort(Vec<SortKey>),
    Skip(u64),
    Limit(u64),
    Project(Projection),
    Count(String),
}

impl Stage {
    /// Parse a pipeline stage document such as `{"$limit": 5}`.
    pub fn parse(stage: &Document) -> Result<Self, StoreError> {
        let mut entries = stage.iter();
        let (Some((name, body)), None) = (entries.next(), entries.next()) else {
            return Err(StoreError::InvalidQuery(
                "pipeline stages must have exactly one key".to_string(),
            ));
        };

        match name.as_str() {
            "$match" => body
                .as_object()
                .cloned()
                .map(Stage::Match)
                .ok_or_else(|| StoreError::InvalidQuery("$match expects an object".to_string())),
            "$sort" => {
                let spec = body
                    .as_object()
                    .ok_or_else(|| StoreError::InvalidQuery("$sort expects an object".to_string()))?;
                let mut keys = Vec::with_capacity(spec.len());
                for (field, order) in spec {
                    if order.get("$meta").and_then(Value::as_str) == Some("textScore") {
                        keys.push(SortKey::TextScore);
                        continue;
                    }
                    let direction = match order.as_i64() {
                        Some(1) => SortDirection::Asc,
                        Some(-1) => SortDirection::Desc,
                        _ => {
                            return Err(StoreError::InvalidQuery(format!(
                                "$sort direction for '{field}' must be 1 or -1"
                            )));
                        }
                    };
                    keys.push(SortKey::field(field.clone(), direction));
                }
                Ok(Stage::Sort(keys))
            }
            "$skip" => body
                .as_u64()
                .map(Stage::Skip)
                .ok_or_else(|| StoreError::InvalidQuery("$skip expects a count".to_string())),
            "$limit" => body
                .as_u64()
                .map(Stage::Limit)
                .ok_or_else(|| StoreError::InvalidQuery("$limit expects a count".to_string())),
            "$project" => {
                let spec = body.as_object().ok_or_else(|| {
                    StoreError::InvalidQuery("$project expects an object".to_string())
                })?;
                let selection: Vec<String> = spec
                    .iter()
                    .map(|(field, flag)| {
                        let include = match flag {
                            Value::Bool(b) => *b,
                            Value::Number(n) => n.as_f64() != Some(0.0),
                            _ => true,
                        };
                        if include {
                            field.clone()
                        } else {
                            format!("-{field}")
                        }
                    })
                    .collect();
                Ok(Stage::Project(Projection::from_selection(
                    &selection,
                    DEFAULT_ID_FIELD,
                )))
            }
            "$count" => body
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|s| Stage::Count(s.to_string()))
                .ok_or_else(|| StoreError::InvalidQuery("$count expects a field name".to_string())),
            other => Err(StoreError::Unsupported(format!(
                "aggregation stage '{other}'"
            ))),
        }
    }
}

/// Whether a clause value is an operator map (`{"$gt": 1}`) rather than a literal.
pub fn is_operator_map(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}
