//! SQLite-backed [`DataStore`].
//!
//! Tables are entity types, columns are fields, and foreign keys become
//! to-one relations. Two optional tables refine the metadata:
//!
//! - `_entity_meta(entity, label)`
//! - `_field_meta(entity, field, label, field_type)`
//!
//! Tables prefixed `sqlite_` or `_` are never listed. Connections are opened
//! read-only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use serde_json::Value;

use super::domain::{Condition, DomainExpr, Operator};
use super::{
    DataStore, Domain, FieldValue, Granularity, GroupRequest, Record, SearchRequest, COUNT_KEY,
};
use crate::error::SearchError;
use crate::schema::{EntityInfo, Field, FieldType, RelationKind};

pub type StorePool = Pool<SqliteConnectionManager>;

const ENTITY_META_TABLE: &str = "_entity_meta";
const FIELD_META_TABLE: &str = "_field_meta";

/// Connection customizer that sets per-connection SQLite pragmas.
#[derive(Debug)]
struct SqlitePragmaCustomizer;

impl CustomizeConnection<Connection, rusqlite::Error> for SqlitePragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA query_only = ON;
             PRAGMA cache_size = -8000;",
        )?;
        Ok(())
    }
}

pub struct SqliteStore {
    pool: StorePool,
    path: PathBuf,
    /// Fixture file removed on drop, after the pool has closed.
    #[cfg(test)]
    _fixture: Option<tempfile::TempPath>,
}

impl SqliteStore {
    /// Open an existing database file read-only.
    pub fn open(path: &Path) -> Result<Self, SearchError> {
        if !path.exists() {
            return Err(SearchError::Configuration(format!(
                "database not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Opening data store");

        let manager = SqliteConnectionManager::file(path).with_flags(
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(SqlitePragmaCustomizer))
            .build(manager)?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            #[cfg(test)]
            _fixture: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataStore for SqliteStore {
    fn entity_types(&self) -> Result<Vec<EntityInfo>, SearchError> {
        let conn = self.pool.get()?;
        let labels = entity_labels(&conn)?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names
            .into_iter()
            .filter(|name| !is_hidden(name))
            .map(|name| {
                let label = labels
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| humanize_entity(&name));
                EntityInfo { id: name, label }
            })
            .collect())
    }

    fn fields(&self, entity: &str) -> Result<Vec<Field>, SearchError> {
        let conn = self.pool.get()?;
        Ok(load_table(&conn, entity)?.fields)
    }

    fn search_read(&self, request: &SearchRequest<'_>) -> Result<Vec<Record>, SearchError> {
        let conn = self.pool.get()?;
        let table = load_table(&conn, request.entity)?;
        let from = quote_ident(&table.name);

        let mut selects = vec![format!("{} AS \"id\"", table.id_expr(&from))];
        let mut projections = Vec::new();
        for name in request.fields {
            if name == "id" {
                continue;
            }
            let Some(field) = table.field(name) else {
                tracing::debug!(entity = request.entity, field = %name, "Skipping unknown field");
                continue;
            };
            projections.push(project(&conn, &from, field, None, &mut selects)?);
        }

        let mut params = Vec::new();
        let filter = compile_domain(&conn, &table, &from, request.domain, &mut params)?;
        params.push(SqlValue::Integer(i64::try_from(request.limit).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {} FROM {from}{} ORDER BY \"id\" LIMIT ?",
            selects.join(", "),
            where_clause(&filter),
        );
        tracing::debug!(%sql, "search_read");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut record = Record::new();
                record.insert("id".into(), decode_scalar(row, 0, &FieldType::Integer)?);
                let mut idx = 1;
                for projection in &projections {
                    let value = projection.decode(row, &mut idx)?;
                    record.insert(projection.key.clone(), value);
                }
                Ok(record)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn read_group(&self, request: &GroupRequest<'_>) -> Result<Vec<Record>, SearchError> {
        let Some(first) = request.group_by.first() else {
            return Err(SearchError::Validation(
                "Grouped query requires at least one group key".into(),
            ));
        };

        let conn = self.pool.get()?;
        let table = load_table(&conn, request.entity)?;
        let from = quote_ident(&table.name);

        let keys = if request.lazy {
            std::slice::from_ref(first)
        } else {
            request.group_by
        };

        let mut selects = Vec::new();
        let mut group_exprs = Vec::new();
        let mut projections = Vec::new();
        for key in keys {
            let field = table.field(&key.field).ok_or_else(|| {
                SearchError::Validation(format!(
                    "Field '{}' does not exist in model {}",
                    key.field, table.name
                ))
            })?;
            let granularity = match key.granularity {
                Some(g) if field.field_type.is_temporal() => Some(g),
                Some(g) => {
                    tracing::warn!(field = %field.name, granularity = g.as_str(), "Granularity ignored for non-date field");
                    None
                }
                None => None,
            };
            let mut projection = project(&conn, &from, field, granularity, &mut selects)?;
            projection.key = key.spec();
            group_exprs.push(projection.expr.clone());
            projections.push(projection);
        }

        for measure in request.measures {
            let Some(field) = table.field(measure) else {
                tracing::warn!(entity = request.entity, measure = %measure, "Skipping unknown measure");
                continue;
            };
            let column = format!("{from}.{}", quote_ident(&field.name));
            let (expr, field_type) = if field.field_type.is_numeric() {
                (format!("SUM({column})"), field.field_type.clone())
            } else {
                (format!("COUNT({column})"), FieldType::Integer)
            };
            selects.push(format!("{expr} AS {}", quote_ident(&format!("m{}", projections.len()))));
            projections.push(Projection {
                key: field.name.clone(),
                expr,
                kind: ProjectionKind::Scalar(field_type),
            });
        }
        selects.push(format!("COUNT(*) AS {}", quote_ident(COUNT_KEY)));

        let order_idx = request
            .order_by
            .and_then(|o| keys.iter().position(|k| k == o))
            .unwrap_or(0);

        let mut params = Vec::new();
        let filter = compile_domain(&conn, &table, &from, request.domain, &mut params)?;
        params.push(SqlValue::Integer(i64::try_from(request.limit).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {} FROM {from}{} GROUP BY {} ORDER BY {} ASC LIMIT ?",
            selects.join(", "),
            where_clause(&filter),
            group_exprs.join(", "),
            group_exprs[order_idx],
        );
        tracing::debug!(%sql, "read_group");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut record = Record::new();
                let mut idx = 0;
                for projection in &projections {
                    let value = projection.decode(row, &mut idx)?;
                    record.insert(projection.key.clone(), value);
                }
                record.insert(COUNT_KEY.into(), decode_scalar(row, idx, &FieldType::Integer)?);
                Ok(record)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

// ============================================================================
// Introspection
// ============================================================================

struct TableInfo {
    name: String,
    has_id: bool,
    fields: Vec<Field>,
}

impl TableInfo {
    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn id_expr(&self, table: &str) -> String {
        if self.has_id {
            format!("{table}.\"id\"")
        } else {
            format!("{table}.rowid")
        }
    }

    /// Column used as the human label of a record.
    fn display_column(&self) -> Option<&str> {
        ["display_name", "name"]
            .into_iter()
            .find(|n| self.field(n).is_some())
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| matches!(f.field_type, FieldType::Char | FieldType::Text))
                    .map(|f| f.name.as_str())
            })
    }
}

fn is_hidden(table: &str) -> bool {
    table.starts_with("sqlite_") || table.starts_with('_')
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, SearchError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn entity_labels(conn: &Connection) -> Result<HashMap<String, String>, SearchError> {
    if !table_exists(conn, ENTITY_META_TABLE)? {
        return Ok(HashMap::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT entity, label FROM {} WHERE label IS NOT NULL",
        quote_ident(ENTITY_META_TABLE)
    ))?;
    let labels = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(labels)
}

/// `field -> (label, declared type)` overrides for one entity.
fn field_meta(
    conn: &Connection,
    entity: &str,
) -> Result<HashMap<String, (Option<String>, Option<String>)>, SearchError> {
    if !table_exists(conn, FIELD_META_TABLE)? {
        return Ok(HashMap::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT field, label, field_type FROM {} WHERE entity = ?1",
        quote_ident(FIELD_META_TABLE)
    ))?;
    let meta = stmt
        .query_map([entity], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, Option<String>>(1)?, row.get::<_, Option<String>>(2)?),
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(meta)
}

fn load_table(conn: &Connection, entity: &str) -> Result<TableInfo, SearchError> {
    if is_hidden(entity) || !table_exists(conn, entity)? {
        return Err(SearchError::Validation(format!("Invalid model: {entity}")));
    }

    let mut stmt = conn.prepare("SELECT \"from\", \"table\" FROM pragma_foreign_key_list(?1)")?;
    let foreign_keys = stmt
        .query_map([entity], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let meta = field_meta(conn, entity)?;

    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([entity], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut has_id = false;
    let fields = columns
        .into_iter()
        .map(|(name, declared)| {
            has_id |= name == "id";
            let (label, declared_override) = meta.get(&name).cloned().unwrap_or_default();
            let label = label.unwrap_or_else(|| humanize_field(&name));
            match foreign_keys.get(&name) {
                Some(target) => Field::relation(name, FieldType::Many2one, label, target.clone()),
                None => {
                    let field_type = declared_override
                        .map(|t| FieldType::from_name(&t))
                        .unwrap_or_else(|| map_declared_type(&declared));
                    Field::new(name, field_type, label)
                }
            }
        })
        .collect();

    Ok(TableInfo {
        name: entity.to_string(),
        has_id,
        fields,
    })
}

/// Metadata for a relation target, or `None` when the foreign key points at a
/// table that is missing or hidden. Callers fall back to raw ids.
fn load_target(conn: &Connection, target: &str) -> Result<Option<TableInfo>, SearchError> {
    if is_hidden(target) || !table_exists(conn, target)? {
        tracing::warn!(entity = target, "Relation target not found, returning raw ids");
        return Ok(None);
    }
    load_table(conn, target).map(Some)
}

/// SQLite declared column type to field type, by affinity-style substring rules.
fn map_declared_type(declared: &str) -> FieldType {
    let t = declared.to_ascii_uppercase();
    if t.contains("DATETIME") || t.contains("TIMESTAMP") {
        FieldType::Datetime
    } else if t.contains("DATE") {
        FieldType::Date
    } else if t.contains("BOOL") {
        FieldType::Boolean
    } else if t.contains("INT") {
        FieldType::Integer
    } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|k| t.contains(k))
    {
        FieldType::Float
    } else if t.contains("CLOB") {
        FieldType::Text
    } else if t.contains("BLOB") {
        FieldType::Binary
    } else {
        FieldType::Char
    }
}

fn title_case(words: &str) -> String {
    words
        .split(|c: char| c == '_' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `res.partner` -> `Partner`
fn humanize_entity(id: &str) -> String {
    title_case(id.rsplit('.').next().unwrap_or(id))
}

/// `company_id` -> `Company`, `invoice_date` -> `Invoice Date`
fn humanize_field(name: &str) -> String {
    let base = name
        .strip_suffix("_ids")
        .or_else(|| name.strip_suffix("_id"))
        .filter(|b| !b.is_empty())
        .unwrap_or(name);
    title_case(base)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

// ============================================================================
// Projections
// ============================================================================

enum ProjectionKind {
    Scalar(FieldType),
    /// Two columns: the raw id and the target's display label.
    Relation,
}

struct Projection {
    key: String,
    /// Primary SQL expression, reused in GROUP BY.
    expr: String,
    kind: ProjectionKind,
}

impl Projection {
    fn decode(&self, row: &Row<'_>, idx: &mut usize) -> Result<FieldValue, rusqlite::Error> {
        match &self.kind {
            ProjectionKind::Scalar(field_type) => {
                let value = decode_scalar(row, *idx, field_type)?;
                *idx += 1;
                Ok(value)
            }
            ProjectionKind::Relation => {
                let value = match row.get_ref(*idx)? {
                    ValueRef::Integer(id) => {
                        let label = match row.get_ref(*idx + 1)? {
                            ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                            _ => id.to_string(),
                        };
                        FieldValue::Relation(id, label)
                    }
                    _ => FieldValue::Null,
                };
                *idx += 2;
                Ok(value)
            }
        }
    }
}

fn decode_scalar(row: &Row<'_>, idx: usize, field_type: &FieldType) -> Result<FieldValue, rusqlite::Error> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) if *field_type == FieldType::Boolean => FieldValue::Bool(i != 0),
        ValueRef::Integer(i) => FieldValue::Integer(i),
        ValueRef::Real(f) => FieldValue::Float(f),
        ValueRef::Text(t) => FieldValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => FieldValue::Null,
    })
}

/// Push the select expression(s) for `field` and describe how to decode them.
fn project(
    conn: &Connection,
    from: &str,
    field: &Field,
    granularity: Option<Granularity>,
    selects: &mut Vec<String>,
) -> Result<Projection, SearchError> {
    let alias = quote_ident(&format!("c{}", selects.len()));
    let column = format!("{from}.{}", quote_ident(&field.name));

    if let Some(g) = granularity {
        let expr = format!("strftime('{}', {column})", bucket_format(g));
        selects.push(format!("{expr} AS {alias}"));
        return Ok(Projection {
            key: field.name.clone(),
            expr,
            kind: ProjectionKind::Scalar(FieldType::Char),
        });
    }

    if let Some((RelationKind::ToOne, target)) = field.relation_target() {
        selects.push(format!("{column} AS {alias}"));
        let label_alias = quote_ident(&format!("c{}", selects.len()));
        let Some(target_info) = load_target(conn, target)? else {
            selects.push(format!("CAST({column} AS TEXT) AS {label_alias}"));
            return Ok(Projection {
                key: field.name.clone(),
                expr: column,
                kind: ProjectionKind::Relation,
            });
        };
        let rel = quote_ident("_rel");
        let label = match target_info.display_column() {
            Some(col) => format!("{rel}.{}", quote_ident(col)),
            None => format!("CAST({} AS TEXT)", target_info.id_expr(&rel)),
        };
        selects.push(format!(
            "(SELECT {label} FROM {} AS {rel} WHERE {} = {column}) AS {label_alias}",
            quote_ident(target),
            target_info.id_expr(&rel),
        ));
        return Ok(Projection {
            key: field.name.clone(),
            expr: column,
            kind: ProjectionKind::Relation,
        });
    }

    selects.push(format!("{column} AS {alias}"));
    Ok(Projection {
        key: field.name.clone(),
        expr: column,
        kind: ProjectionKind::Scalar(field.field_type.clone()),
    })
}

fn bucket_format(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Day => "%Y-%m-%d",
        Granularity::Week => "%Y-W%W",
        Granularity::Month => "%Y-%m",
        Granularity::Year => "%Y",
    }
}

// ============================================================================
// Domain compilation
// ============================================================================

fn where_clause(filter: &Option<String>) -> String {
    match filter {
        Some(f) => format!(" WHERE {f}"),
        None => String::new(),
    }
}

fn compile_domain(
    conn: &Connection,
    table: &TableInfo,
    from: &str,
    domain: &Domain,
    params: &mut Vec<SqlValue>,
) -> Result<Option<String>, SearchError> {
    match domain.tree()? {
        Some(expr) => Ok(Some(compile_expr(conn, table, from, &expr, params)?)),
        None => Ok(None),
    }
}

fn compile_expr(
    conn: &Connection,
    table: &TableInfo,
    from: &str,
    expr: &DomainExpr,
    params: &mut Vec<SqlValue>,
) -> Result<String, SearchError> {
    Ok(match expr {
        DomainExpr::And(l, r) => format!(
            "({} AND {})",
            compile_expr(conn, table, from, l, params)?,
            compile_expr(conn, table, from, r, params)?
        ),
        DomainExpr::Or(l, r) => format!(
            "({} OR {})",
            compile_expr(conn, table, from, l, params)?,
            compile_expr(conn, table, from, r, params)?
        ),
        DomainExpr::Not(inner) => {
            format!("(NOT {})", compile_expr(conn, table, from, inner, params)?)
        }
        DomainExpr::Leaf(cond) => compile_condition(conn, table, from, cond, params)?,
    })
}

fn invalid_field(field: &str, entity: &str) -> SearchError {
    SearchError::Execution(format!("Invalid field '{field}' in domain of model {entity}"))
}

fn compile_condition(
    conn: &Connection,
    table: &TableInfo,
    from: &str,
    cond: &Condition,
    params: &mut Vec<SqlValue>,
) -> Result<String, SearchError> {
    let Some((relation, sub_field)) = cond.path() else {
        return compile_leaf(table, from, &cond.field, cond, params);
    };

    if sub_field.contains('.') {
        return Err(SearchError::Execution(format!(
            "Only one level of relation traversal is supported in domains: '{}'",
            cond.field
        )));
    }
    let target = table
        .field(relation)
        .and_then(|f| match f.relation_target() {
            Some((RelationKind::ToOne, target)) => Some(target),
            _ => None,
        })
        .ok_or_else(|| invalid_field(&cond.field, &table.name))?;

    let target_info =
        load_target(conn, target)?.ok_or_else(|| invalid_field(&cond.field, &table.name))?;
    let target_from = quote_ident(target);
    let inner = compile_leaf(&target_info, &target_from, sub_field, cond, params)?;
    Ok(format!(
        "{from}.{} IN (SELECT {} FROM {target_from} WHERE {inner})",
        quote_ident(relation),
        target_info.id_expr(&target_from),
    ))
}

fn compile_leaf(
    table: &TableInfo,
    from: &str,
    field_name: &str,
    cond: &Condition,
    params: &mut Vec<SqlValue>,
) -> Result<String, SearchError> {
    let (column, is_boolean) = if field_name == "id" {
        (table.id_expr(from), false)
    } else {
        let field = table
            .field(field_name)
            .ok_or_else(|| invalid_field(field_name, &table.name))?;
        (
            format!("{from}.{}", quote_ident(&field.name)),
            field.field_type == FieldType::Boolean,
        )
    };
    let c = column;
    let unset = matches!(cond.value, Value::Null | Value::Bool(false));

    Ok(match cond.operator {
        Operator::Eq if unset => {
            if is_boolean {
                format!("({c} IS NULL OR {c} = 0)")
            } else {
                format!("{c} IS NULL")
            }
        }
        Operator::Ne if unset => {
            if is_boolean {
                format!("({c} IS NOT NULL AND {c} != 0)")
            } else {
                format!("{c} IS NOT NULL")
            }
        }
        Operator::Ne => {
            params.push(scalar_param(&cond.value)?);
            format!("({c} IS NULL OR {c} != ?)")
        }
        Operator::Eq | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            params.push(scalar_param(&cond.value)?);
            format!("{c} {} ?", cond.operator.as_str())
        }
        Operator::Like => {
            params.push(SqlValue::Text(text_param(&cond.value)?));
            format!("instr({c}, ?) > 0")
        }
        Operator::NotLike => {
            params.push(SqlValue::Text(text_param(&cond.value)?));
            format!("({c} IS NULL OR instr({c}, ?) = 0)")
        }
        Operator::ILike => {
            params.push(SqlValue::Text(contains_pattern(&text_param(&cond.value)?)));
            format!("LOWER({c}) LIKE ? ESCAPE '\\'")
        }
        Operator::NotILike => {
            params.push(SqlValue::Text(contains_pattern(&text_param(&cond.value)?)));
            format!("({c} IS NULL OR LOWER({c}) NOT LIKE ? ESCAPE '\\')")
        }
        Operator::EqLike => {
            params.push(SqlValue::Text(text_param(&cond.value)?));
            format!("{c} LIKE ?")
        }
        Operator::EqILike => {
            params.push(SqlValue::Text(text_param(&cond.value)?.to_lowercase()));
            format!("LOWER({c}) LIKE ?")
        }
        Operator::In | Operator::NotIn => {
            let values = match &cond.value {
                Value::Array(items) => items.iter().map(scalar_param).collect::<Result<Vec<_>, _>>()?,
                other => vec![scalar_param(other)?],
            };
            let negate = cond.operator == Operator::NotIn;
            if values.is_empty() {
                return Ok(if negate { "1".into() } else { "0".into() });
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            params.extend(values);
            if negate {
                format!("({c} IS NULL OR {c} NOT IN ({placeholders}))")
            } else {
                format!("{c} IN ({placeholders})")
            }
        }
    })
}

fn scalar_param(value: &Value) -> Result<SqlValue, SearchError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => {
            return Err(SearchError::Execution(format!(
                "Unsupported value in domain: {other}"
            )))
        }
    })
}

fn text_param(value: &Value) -> Result<String, SearchError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(SearchError::Execution(format!(
            "Unsupported pattern in domain: {other}"
        ))),
    }
}

/// `%value%` with LIKE wildcards in the value escaped.
fn contains_pattern(value: &str) -> String {
    let escaped = value
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// ============================================================================
// Test fixture
// ============================================================================

/// Fresh fixture database with a small ERP-like schema, opened read-only.
#[cfg(test)]
pub(crate) fn init_test_store() -> Result<SqliteStore, SearchError> {
    store_from_sql(FIXTURE_SQL)
}

/// Temp-file database built from `sql`. The file lives as long as the store.
#[cfg(test)]
pub(crate) fn store_from_sql(sql: &str) -> Result<SqliteStore, SearchError> {
    // r2d2 cannot share an in-memory database across pooled connections.
    let tmp = tempfile::Builder::new()
        .prefix("universal_search_test_")
        .suffix(".db")
        .tempfile()?
        .into_temp_path();
    {
        let conn = Connection::open(&tmp)?;
        // Bundled SQLite enforces foreign keys by default; fixtures may
        // intentionally contain dangling references.
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        conn.execute_batch(sql)?;
    }
    let mut store = SqliteStore::open(&tmp)?;
    store._fixture = Some(tmp);
    Ok(store)
}

#[cfg(test)]
const FIXTURE_SQL: &str = r#"
CREATE TABLE "res.company" (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE "res.partner" (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    company_id INTEGER REFERENCES "res.company"(id),
    create_date DATETIME
);
CREATE TABLE "res.users" (
    id INTEGER PRIMARY KEY,
    login TEXT NOT NULL,
    name TEXT,
    partner_id INTEGER REFERENCES "res.partner"(id),
    company_id INTEGER REFERENCES "res.company"(id),
    active BOOLEAN,
    create_date DATETIME,
    write_date DATETIME
);
CREATE TABLE "res.users.log" (
    id INTEGER PRIMARY KEY,
    user_id INTEGER REFERENCES "res.users"(id),
    login_date DATETIME
);
CREATE TABLE "account.move" (
    id INTEGER PRIMARY KEY,
    name TEXT,
    partner_id INTEGER REFERENCES "res.partner"(id),
    invoice_date DATE,
    amount_total REAL,
    state TEXT,
    move_type TEXT
);
CREATE TABLE "ir.config_parameter" (
    id INTEGER PRIMARY KEY,
    key TEXT,
    value TEXT
);
CREATE TABLE _entity_meta (entity TEXT PRIMARY KEY, label TEXT);
CREATE TABLE _field_meta (entity TEXT, field TEXT, label TEXT, field_type TEXT);

INSERT INTO _entity_meta VALUES
    ('res.company', 'Companies'),
    ('res.partner', 'Contact'),
    ('res.users', 'Users'),
    ('res.users.log', 'User Login'),
    ('account.move', 'Journal Entry'),
    ('ir.config_parameter', 'System Parameter');
INSERT INTO _field_meta VALUES
    ('account.move', 'state', 'Status', 'selection'),
    ('account.move', 'move_type', 'Type', 'selection'),
    ('account.move', 'invoice_date', 'Invoice/Bill Date', NULL),
    ('account.move', 'amount_total', 'Total', 'monetary');

INSERT INTO "res.company" VALUES (1, 'Acme Oy'), (2, 'Globex');
INSERT INTO "res.partner" VALUES
    (1, 'Matti Meikäläinen', 'matti@example.com', '+358 40 123 4567', 1, '2024-01-05 10:00:00'),
    (2, 'Liisa Virtanen', 'liisa@example.com', NULL, 1, '2024-01-06 11:30:00'),
    (3, 'Globex Buyer', 'buyer@globex.test', NULL, 2, '2024-02-01 09:15:00');
INSERT INTO "res.users" VALUES
    (1, 'admin', 'Administrator', 1, 1, 1, '2024-01-01 00:00:00', '2024-03-01 00:00:00'),
    (2, 'liisa', 'Liisa Virtanen', 2, 1, 1, '2024-01-06 11:30:00', '2024-01-06 11:30:00'),
    (3, 'former', 'Former Employee', NULL, 2, 0, '2023-06-01 08:00:00', '2023-12-31 17:00:00');
INSERT INTO "res.users.log" VALUES
    (1, 1, '2024-03-01 08:00:00'),
    (2, 2, '2024-03-01 09:12:00'),
    (3, 1, '2024-03-02 08:05:00');
INSERT INTO "account.move" VALUES
    (1, 'INV/2024/0001', 1, '2024-01-15', 1200.0, 'posted', 'out_invoice'),
    (2, 'INV/2024/0002', 3, '2024-01-15', 300.5, 'posted', 'out_invoice'),
    (3, 'INV/2024/0003', 3, '2024-02-03', 99.5, 'draft', 'out_invoice'),
    (4, 'BILL/2024/0001', 2, '2024-02-20', 450.0, 'posted', 'in_invoice'),
    (5, 'MISC/2024/0001', NULL, NULL, 0.0, 'cancel', 'entry');
INSERT INTO "ir.config_parameter" VALUES (1, 'web.base.url', 'http://localhost:8069');
"#;
