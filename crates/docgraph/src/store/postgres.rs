//! PostgreSQL document store.
//!
//! Every collection is a table `(id TEXT PRIMARY KEY, doc JSONB NOT NULL)`.
//! Native filters compile to SQL with SeaQuery:
//! - equality: jsonb equality, or array membership for array-valued fields
//! - comparisons: same-type jsonb comparison
//! - `$text`: `to_tsvector` / `websearch_to_tsquery`, ranked with `ts_rank`
//! - `$elemMatch`: `EXISTS` over `jsonb_array_elements`
//!
//! Projection and population run in Rust on the fetched documents.

use std::time::Duration;

use async_trait::async_trait;
use sea_query::{
    Alias, Asterisk, ColumnDef, Cond, Expr, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr, Table,
};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::document::project;
use super::populate::populate;
use super::query::{
    Document, FindQuery, SortDirection, SortKey, Stage, TextQuery, is_operator_map,
};
use super::{DocumentStore, StoreError};
use crate::registry::{CollectionDef, is_valid_collection_name};

/// Default per-statement timeout.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Column holding the document.
const DOC: &str = "doc";

/// A compiled aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub sql: String,
    /// Output field when the pipeline ends in `$count`.
    pub count_field: Option<String>,
}

/// Builds SQL for one collection.
pub struct PgQueryBuilder<'a> {
    collection: &'a CollectionDef,
}

impl<'a> PgQueryBuilder<'a> {
    pub fn new(collection: &'a CollectionDef) -> Self {
        Self { collection }
    }

    /// `CREATE TABLE IF NOT EXISTS` for the collection.
    pub fn build_create_table(&self) -> String {
        Table::create()
            .table(Alias::new(&self.collection.name))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new("id")).text().not_null().primary_key())
            .col(ColumnDef::new(Alias::new(DOC)).json_binary().not_null())
            .to_string(PostgresQueryBuilder)
    }

    /// Build the main SELECT returning `doc` and `score` columns.
    pub fn build_find(&self, query: &FindQuery) -> Result<String, StoreError> {
        Ok(self.select(query)?.to_string(PostgresQueryBuilder))
    }

    /// Build a COUNT query for `filter`.
    pub fn build_count(&self, filter: &Document) -> Result<String, StoreError> {
        let mut query = Query::select();
        query.expr(Expr::col(Asterisk).count());
        query.from(Alias::new(&self.collection.name));
        query.cond_where(self.compile_filter(filter, DOC, true)?);
        Ok(query.to_string(PostgresQueryBuilder))
    }

    /// Compile the supported pipeline shape `$match* $sort? $skip? $limit? $count?`.
    pub fn build_pipeline(&self, stages: &[Stage]) -> Result<PipelinePlan, StoreError> {
        let mut iter = stages.iter().peekable();

        let mut filter = Document::new();
        let mut conjuncts: Vec<Value> = Vec::new();
        while let Some(Stage::Match(stage_filter)) = iter.peek() {
            if stage_filter.keys().any(|k| filter.contains_key(k)) {
                conjuncts.push(Value::Object(stage_filter.clone()));
            } else {
                filter.extend(stage_filter.clone());
            }
            iter.next();
        }
        if !conjuncts.is_empty() {
            if let Some(Value::Array(existing)) = filter.get_mut("$and") {
                existing.extend(conjuncts);
            } else {
                filter.insert("$and".to_string(), Value::Array(conjuncts));
            }
        }

        let mut query = FindQuery {
            filter,
            ..Default::default()
        };
        if let Some(Stage::Sort(keys)) = iter.peek() {
            query.sort = keys.clone();
            iter.next();
        }
        if let Some(Stage::Skip(n)) = iter.peek() {
            query.skip = Some(*n);
            iter.next();
        }
        if let Some(Stage::Limit(n)) = iter.peek() {
            query.limit = Some(*n);
            iter.next();
        }
        let count_field = match iter.peek() {
            Some(Stage::Count(field)) => {
                let field = field.clone();
                iter.next();
                Some(field)
            }
            _ => None,
        };

        if let Some(stage) = iter.next() {
            return Err(StoreError::Unsupported(format!(
                "pipeline stage {stage:?} at this position; supported shape is \
                 $match* $sort? $skip? $limit? $count?"
            )));
        }

        let inner = self.build_find(&query)?;
        let sql = if count_field.is_some() {
            format!("SELECT COUNT(*) FROM ({inner}) AS matched")
        } else {
            inner
        };
        Ok(PipelinePlan { sql, count_field })
    }

    fn select(&self, query: &FindQuery) -> Result<SelectStatement, StoreError> {
        let mut select = Query::select();

        let text = match query.filter.get("$text") {
            Some(clause) => Some(TextQuery::from_clause(clause)?),
            None => None,
        };

        select.expr_as(Expr::cust(DOC), Alias::new(DOC));
        match text {
            Some(ref text) => select.expr_as(self.text_rank(text)?, Alias::new("score")),
            None => select.expr_as(Expr::cust("NULL::float8"), Alias::new("score")),
        };
        select.from(Alias::new(&self.collection.name));
        select.cond_where(self.compile_filter(&query.filter, DOC, true)?);

        for key in &query.sort {
            match key {
                SortKey::Field { field, direction } => {
                    let order = match direction {
                        SortDirection::Asc => Order::Asc,
                        SortDirection::Desc => Order::Desc,
                    };
                    select.order_by_expr(Expr::cust(json_path(DOC, field)?), order);
                }
                SortKey::TextScore => {
                    select.order_by_expr(Expr::cust("score"), Order::Desc);
                }
            }
        }

        if let Some(limit) = query.limit {
            select.limit(limit);
        }
        if let Some(skip) = query.skip.filter(|s| *s > 0) {
            select.offset(skip);
        }

        Ok(select)
    }

    /// Compile a filter document rooted at the jsonb expression `root`.
    fn compile_filter(
        &self,
        filter: &Document,
        root: &str,
        top_level: bool,
    ) -> Result<Cond, StoreError> {
        let mut cond = Cond::all();
        for (key, value) in filter {
            match key.as_str() {
                "$and" | "$or" | "$nor" => {
                    let items = value
                        .as_array()
                        .filter(|items| !items.is_empty())
                        .ok_or_else(|| {
                            StoreError::InvalidQuery(format!("{key} expects a non-empty array"))
                        })?;
                    let mut group = if key == "$and" { Cond::all() } else { Cond::any() };
                    for item in items {
                        let sub = item.as_object().ok_or_else(|| {
                            StoreError::InvalidQuery(format!("{key} entries must be objects"))
                        })?;
                        group = group.add(self.compile_filter(sub, root, false)?);
                    }
                    cond = cond.add(if key == "$nor" { group.not() } else { group });
                }
                "$text" => {
                    if !top_level {
                        return Err(StoreError::InvalidQuery(
                            "$text is only allowed at the top level of a filter".to_string(),
                        ));
                    }
                    cond = cond.add(self.text_match(&TextQuery::from_clause(value)?)?);
                }
                other if other.starts_with('$') => {
                    return Err(StoreError::InvalidQuery(format!(
                        "unknown top-level operator '{other}'"
                    )));
                }
                path => {
                    let expr = json_path(root, path)?;
                    cond = cond.add(field_condition(&expr, value)?);
                }
            }
        }
        Ok(cond)
    }

    fn text_vector(&self, text: &TextQuery) -> Result<String, StoreError> {
        let config = regconfig(text.language.as_deref());
        if self.collection.text_fields.is_empty() {
            return Ok(format!("to_tsvector('{config}', {DOC})"));
        }
        let fields = self
            .collection
            .text_fields
            .iter()
            .map(|f| json_path(DOC, f).map(|p| format!("({p} #>> '{{}}')")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("to_tsvector('{config}', concat_ws(' ', {}))", fields.join(", ")))
    }

    fn text_match(&self, text: &TextQuery) -> Result<SimpleExpr, StoreError> {
        if text.case_sensitive || text.diacritic_sensitive {
            tracing::warn!(
                collection = %self.collection.name,
                "case and diacritic sensitivity are not supported by PostgreSQL text search; ignoring"
            );
        }
        let config = regconfig(text.language.as_deref());
        let vector = self.text_vector(text)?;
        Ok(Expr::cust_with_values(
            format!("{vector} @@ websearch_to_tsquery('{config}', $1)"),
            [text.search.clone()],
        ))
    }

    fn text_rank(&self, text: &TextQuery) -> Result<SimpleExpr, StoreError> {
        let config = regconfig(text.language.as_deref());
        let vector = self.text_vector(text)?;
        Ok(Expr::cust_with_values(
            format!("ts_rank({vector}, websearch_to_tsquery('{config}', $1))::float8"),
            [text.search.clone()],
        ))
    }
}

/// Condition for one field entry: a literal or an operator map.
fn field_condition(path: &str, value: &Value) -> Result<Cond, StoreError> {
    let Some(ops) = value.as_object().filter(|_| is_operator_map(value)) else {
        return Ok(Cond::all().add(eq_expr(path, value)));
    };

    let mut cond = Cond::all();
    for (op, arg) in ops {
        let expr: SimpleExpr = match op.as_str() {
            "$eq" => eq_expr(path, arg),
            "$ne" => none_of(path, eq_expr(path, arg), std::slice::from_ref(arg)),
            "$gt" => cmp_expr(path, ">", arg),
            "$gte" => cmp_expr(path, ">=", arg),
            "$lt" => cmp_expr(path, "<", arg),
            "$lte" => cmp_expr(path, "<=", arg),
            "$in" => any_of(path, expect_array(op, arg)?),
            "$nin" => {
                let values = expect_array(op, arg)?;
                if values.is_empty() {
                    continue;
                }
                none_of(path, any_of(path, values), values)
            }
            "$all" => {
                let values = expect_array(op, arg)?;
                if values.is_empty() {
                    Expr::cust("FALSE")
                } else {
                    values
                        .iter()
                        .fold(Cond::all(), |c, v| c.add(eq_expr(path, v)))
                        .into()
                }
            }
            "$exists" => {
                let wanted = match arg {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_f64() != Some(0.0),
                    Value::Null => false,
                    _ => true,
                };
                if wanted {
                    Expr::cust(format!("{path} IS NOT NULL"))
                } else {
                    Expr::cust(format!("{path} IS NULL"))
                }
            }
            "$regex" => {
                let pattern = arg.as_str().ok_or_else(|| {
                    StoreError::InvalidQuery("$regex expects a string".to_string())
                })?;
                let insensitive = ops
                    .get("$options")
                    .and_then(Value::as_str)
                    .is_some_and(|o| o.contains('i'));
                let operator = if insensitive { "~*" } else { "~" };
                Expr::cust_with_values(
                    format!(
                        "(jsonb_typeof({path}) = 'string' AND ({path} #>> '{{}}') {operator} $1)"
                    ),
                    [pattern.to_string()],
                )
            }
            "$options" => continue,
            "$size" => {
                let n = arg.as_u64().ok_or_else(|| {
                    StoreError::InvalidQuery("$size expects a non-negative integer".to_string())
                })?;
                Expr::cust(format!(
                    "(jsonb_typeof({path}) = 'array' AND jsonb_array_length({path}) = {n})"
                ))
            }
            "$elemMatch" => elem_match(path, arg)?,
            other => {
                return Err(StoreError::InvalidQuery(format!("unknown operator '{other}'")));
            }
        };
        cond = cond.add(expr);
    }
    Ok(cond)
}

fn eq_expr(path: &str, value: &Value) -> SimpleExpr {
    if value.is_null() {
        return Expr::cust(format!("({path} IS NULL OR {path} = 'null'::jsonb)"));
    }
    let scalar = value.to_string();
    let wrapped = json!([value]).to_string();
    Expr::cust_with_values(
        format!("({path} = $1::jsonb OR (jsonb_typeof({path}) = 'array' AND {path} @> $2::jsonb))"),
        [scalar, wrapped],
    )
}

/// Negate a match against `values`. A missing field matches none of them
/// unless one of them is null.
fn none_of(path: &str, matched: SimpleExpr, values: &[Value]) -> SimpleExpr {
    let negated = Cond::all().add(matched).not();
    if values.iter().any(Value::is_null) {
        return negated.into();
    }
    Cond::any()
        .add(Expr::cust(format!("{path} IS NULL")))
        .add(negated)
        .into()
}

fn cmp_expr(path: &str, operator: &str, value: &Value) -> SimpleExpr {
    Expr::cust_with_values(
        format!("(jsonb_typeof({path}) = jsonb_typeof($1::jsonb) AND {path} {operator} $1::jsonb)"),
        [value.to_string()],
    )
}

fn any_of(path: &str, values: &[Value]) -> SimpleExpr {
    if values.is_empty() {
        return Expr::cust("FALSE");
    }
    values
        .iter()
        .fold(Cond::any(), |c, v| c.add(eq_expr(path, v)))
        .into()
}

fn expect_array<'v>(op: &str, arg: &'v Value) -> Result<&'v [Value], StoreError> {
    arg.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} expects an array")))
}

/// `EXISTS` over the array elements at `path`.
fn elem_match(path: &str, arg: &Value) -> Result<SimpleExpr, StoreError> {
    let inner = if is_operator_map(arg) {
        field_condition("value", arg)?
    } else if let Some(doc) = arg.as_object() {
        let mut cond = Cond::all();
        for (key, value) in doc {
            if key.starts_with('$') {
                return Err(StoreError::InvalidQuery(format!(
                    "'{key}' is not supported inside $elemMatch"
                )));
            }
            cond = cond.add(field_condition(&json_path("value", key)?, value)?);
        }
        cond
    } else {
        return Err(StoreError::InvalidQuery("$elemMatch expects an object".to_string()));
    };

    let where_clause = render_condition(inner);
    Ok(Expr::cust(format!(
        "EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof({path}) = 'array' \
         THEN {path} ELSE '[]'::jsonb END) AS elem(value) WHERE {where_clause})"
    )))
}

/// Render a condition to SQL text with values inlined.
fn render_condition(cond: Cond) -> String {
    let sql = Query::select()
        .expr(Expr::cust("1"))
        .cond_where(cond)
        .to_string(PostgresQueryBuilder);
    sql.split_once(" WHERE ")
        .map(|(_, clause)| clause.to_string())
        .unwrap_or_else(|| "TRUE".to_string())
}

/// Translate a dotted path into a jsonb navigation expression.
///
/// Segments must be plain identifiers; numeric segments index arrays.
pub fn json_path(root: &str, path: &str) -> Result<String, StoreError> {
    let mut expr = root.to_string();
    for segment in path.split('.') {
        if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
            expr = format!("{expr}->{segment}");
        } else if is_safe_segment(segment) {
            expr = format!("{expr}->'{segment}'");
        } else {
            return Err(StoreError::InvalidQuery(format!(
                "invalid field path '{path}'"
            )));
        }
    }
    Ok(expr)
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 63
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Map a language code or name to a PostgreSQL text-search configuration.
fn regconfig(language: Option<&str>) -> &'static str {
    match language.map(str::to_ascii_lowercase).as_deref() {
        None | Some("en") | Some("english") => "english",
        Some("es") | Some("spanish") => "spanish",
        Some("fr") | Some("french") => "french",
        Some("de") | Some("german") => "german",
        Some("it") | Some("italian") => "italian",
        Some("pt") | Some("portuguese") => "portuguese",
        Some("nl") | Some("dutch") => "dutch",
        Some("ru") | Some("russian") => "russian",
        Some("sv") | Some("swedish") => "swedish",
        Some("da") | Some("danish") => "danish",
        Some("nb") | Some("no") | Some("norwegian") => "norwegian",
        Some("fi") | Some("finnish") => "finnish",
        Some("tr") | Some("turkish") => "turkish",
        Some("hu") | Some("hungarian") => "hungarian",
        Some("ro") | Some("romanian") => "romanian",
        _ => "simple",
    }
}

/// Document store backed by PostgreSQL JSONB tables.
pub struct PgStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Create the backing table for `collection` if it does not exist.
    pub async fn ensure_collection(&self, collection: &CollectionDef) -> Result<(), StoreError> {
        check_table(collection)?;
        let sql = PgQueryBuilder::new(collection).build_create_table();
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert or replace a document, assigning a UUIDv7 identity when absent.
    pub async fn insert(
        &self,
        collection: &CollectionDef,
        mut doc: Document,
    ) -> Result<Value, StoreError> {
        check_table(collection)?;
        let id = doc
            .entry(collection.id_field.as_str())
            .or_insert_with(|| Value::String(Uuid::now_v7().to_string()))
            .clone();
        let key = match &id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let sql = format!(
            r#"INSERT INTO "{}" (id, doc) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc"#,
            collection.name
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Run `sql` inside a transaction with a statement timeout.
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<(Json<Document>, Option<f64>)>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&self.timeout_statement())
            .execute(&mut *tx)
            .await?;
        let rows = sqlx::query_as(sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn fetch_count(&self, sql: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&self.timeout_statement())
            .execute(&mut *tx)
            .await?;
        let total: i64 = sqlx::query_scalar(sql).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    fn timeout_statement(&self) -> String {
        format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        )
    }
}

fn check_table(collection: &CollectionDef) -> Result<(), StoreError> {
    if is_valid_collection_name(&collection.name) {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!(
            "invalid collection name '{}'",
            collection.name
        )))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(
        &self,
        collection: &CollectionDef,
        query: &FindQuery,
    ) -> Result<Vec<Document>, StoreError> {
        check_table(collection)?;
        let sql = PgQueryBuilder::new(collection).build_find(query)?;
        tracing::debug!(collection = %collection.name, sql = %sql, "pg find");

        let rows = self.fetch_rows(&sql).await?;
        let mut docs: Vec<Document> = rows
            .into_iter()
            .map(|(Json(doc), score)| project(&doc, &query.projection, score))
            .collect();

        if !query.populate.is_empty() {
            populate(self, &mut docs, &query.populate).await?;
        }
        Ok(docs)
    }

    async fn count(&self, collection: &CollectionDef, filter: &Document) -> Result<u64, StoreError> {
        check_table(collection)?;
        let sql = PgQueryBuilder::new(collection).build_count(filter)?;
        tracing::debug!(collection = %collection.name, sql = %sql, "pg count");
        self.fetch_count(&sql).await
    }

    async fn aggregate(
        &self,
        collection: &CollectionDef,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, StoreError> {
        check_table(collection)?;
        let stages = pipeline
            .iter()
            .map(Stage::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let plan = PgQueryBuilder::new(collection).build_pipeline(&stages)?;
        tracing::debug!(collection = %collection.name, sql = %plan.sql, "pg aggregate");

        match plan.count_field {
            Some(field) => {
                let total = self.fetch_count(&plan.sql).await?;
                let mut out = Document::new();
                out.insert(field, json!(total));
                Ok(vec![out])
            }
            None => Ok(self
                .fetch_rows(&plan.sql)
                .await?
                .into_iter()
                .map(|(Json(doc), _)| doc)
                .collect()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn people() -> CollectionDef {
        let mut def = CollectionDef::new("people");
        def.text_fields = vec!["name".to_string(), "bio".to_string()];
        def
    }

    #[test]
    fn json_paths() {
        assert_eq!(json_path("doc", "a").unwrap(), "doc->'a'");
        assert_eq!(json_path("doc", "a.b.0").unwrap(), "doc->'a'->'b'->0");
        assert!(json_path("doc", "a';DROP").is_err());
        assert!(json_path("doc", "a..b").is_err());
    }

    #[test]
    fn find_with_equality_and_range() {
        let def = people();
        let query = FindQuery {
            filter: doc(json!({"status": "active", "age": {"$gte": 18, "$lt": 65}})),
            sort: vec![SortKey::field("age", SortDirection::Desc)],
            skip: Some(20),
            limit: Some(10),
            ..Default::default()
        };
        let sql = PgQueryBuilder::new(&def).build_find(&query).unwrap();
        assert!(sql.contains(r#"FROM "people""#));
        assert!(sql.contains("doc->'status' = "));
        assert!(sql.contains("active"));
        assert!(sql.contains("doc->'age' >= '18'::jsonb"));
        assert!(sql.contains("doc->'age' < '65'::jsonb"));
        assert!(sql.contains("NULL::float8"));
        assert!(sql.contains("ORDER BY doc->'age' DESC"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 20"));
    }

    #[test]
    fn text_search_ranks_declared_fields() {
        let def = people();
        let query = FindQuery {
            filter: doc(json!({"$text": {"$search": "rust", "$language": "fr"}})),
            sort: vec![SortKey::TextScore],
            ..Default::default()
        };
        let sql = PgQueryBuilder::new(&def).build_find(&query).unwrap();
        assert!(sql.contains("to_tsvector('french', concat_ws(' ', (doc->'name' #>> '{}'), (doc->'bio' #>> '{}')))"));
        assert!(sql.contains("websearch_to_tsquery('french', 'rust')"));
        assert!(sql.contains("ts_rank("));
        assert!(sql.contains("ORDER BY score DESC"));
    }

    #[test]
    fn nested_text_is_rejected() {
        let def = people();
        let filter = doc(json!({"$or": [{"$text": {"$search": "x"}}]}));
        assert!(PgQueryBuilder::new(&def).build_count(&filter).is_err());
    }

    #[test]
    fn set_and_array_operators() {
        let def = people();
        let filter = doc(json!({
            "role": {"$in": ["admin", "editor"]},
            "tags": {"$size": 2},
            "email": {"$regex": "^a", "$options": "i"}
        }));
        let sql = PgQueryBuilder::new(&def).build_count(&filter).unwrap();
        assert!(sql.contains("COUNT(*)"));
        assert!(sql.contains("doc->'role' = "));
        assert!(sql.contains("admin"));
        assert!(sql.contains("editor"));
        assert!(sql.contains("jsonb_array_length(doc->'tags') = 2"));
        assert!(sql.contains("~* '^a'"));
    }

    #[test]
    fn negations_keep_documents_missing_the_field() {
        let def = people();
        let sql = PgQueryBuilder::new(&def)
            .build_count(&doc(json!({"status": {"$ne": "draft"}, "role": {"$nin": ["a", "b"]}})))
            .unwrap();
        assert!(sql.contains("doc->'status' IS NULL"));
        assert!(sql.contains("doc->'role' IS NULL"));
        assert_eq!(sql.matches("NOT (").count(), 2);

        let sql = PgQueryBuilder::new(&def)
            .build_count(&doc(json!({"status": {"$ne": null}})))
            .unwrap();
        assert!(!sql.contains("doc->'status' IS NULL OR NOT"));
        assert!(sql.contains("NOT"));
    }

    #[test]
    fn elem_match_uses_exists() {
        let def = people();
        let filter = doc(json!({"items": {"$elemMatch": {"sku": "a", "qty": {"$gt": 2}}}}));
        let sql = PgQueryBuilder::new(&def).build_count(&filter).unwrap();
        assert!(sql.contains("EXISTS (SELECT 1 FROM jsonb_array_elements("));
        assert!(sql.contains("value->'sku' = "));
        assert!(sql.contains("value->'qty' > '2'::jsonb"));
    }

    #[test]
    fn pipeline_subset() {
        let def = people();
        let stages = vec![
            Stage::Match(doc(json!({"status": "active"}))),
            Stage::Match(doc(json!({"status": "verified"}))),
            Stage::Limit(5),
            Stage::Count("n".to_string()),
        ];
        let plan = PgQueryBuilder::new(&def).build_pipeline(&stages).unwrap();
        assert_eq!(plan.count_field.as_deref(), Some("n"));
        assert!(plan.sql.starts_with("SELECT COUNT(*) FROM (SELECT"));
        assert!(plan.sql.contains("verified"));

        let unordered = vec![Stage::Limit(5), Stage::Match(doc(json!({"a": 1})))];
        assert!(matches!(
            PgQueryBuilder::new(&def).build_pipeline(&unordered),
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn create_table_statement() {
        let sql = PgQueryBuilder::new(&people()).build_create_table();
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "people""#));
        assert!(sql.contains("jsonb"));
    }

    #[test]
    fn language_map_falls_back_to_simple() {
        assert_eq!(regconfig(None), "english");
        assert_eq!(regconfig(Some("DE")), "german");
        assert_eq!(regconfig(Some("tlh")), "simple");
    }
}
