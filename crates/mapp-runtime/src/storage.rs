//! SQLite storage adapter.
//!
//! Table layout mirrors the normalized spec one to one: a table per model
//! named `<module>_<model>` with scalar columns for non-list fields, and a
//! child table per list field of shape `(value, position, <model>_id)`
//! with an index on the owner column. Positions persist list order.

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use mapp_core::{MappError, Record, Storage, Value, ValueType};
use mapp_spec::Spec;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
    tables: HashMap<String, TableSchema>,
}

#[derive(Debug, Clone)]
struct TableSchema {
    name: String,
    scalars: Vec<ScalarColumn>,
    lists: Vec<ListColumn>,
}

#[derive(Debug, Clone)]
struct ScalarColumn {
    name: String,
    ty: ValueType,
    sql_type: &'static str,
}

#[derive(Debug, Clone)]
struct ListColumn {
    field: String,
    element: ValueType,
    element_sql_type: &'static str,
    child_table: String,
    owner_column: String,
}

/// SQL column affinity per value type.
fn sql_type(ty: &ValueType) -> &'static str {
    match ty {
        ValueType::Bool | ValueType::Int => "INTEGER",
        ValueType::Float => "REAL",
        _ => "TEXT",
    }
}

impl SqliteStorage {
    pub fn open(db_url: &str, spec: &Spec) -> Result<Self, MappError> {
        let conn = if db_url == ":memory:" {
            Connection::open_in_memory().map_err(db_err)?
        } else {
            Connection::open(db_url).map_err(db_err)?
        };
        Ok(Self { conn: Mutex::new(conn), tables: build_schemas(spec)? })
    }

    pub fn open_in_memory(spec: &Spec) -> Result<Self, MappError> {
        Self::open(":memory:", spec)
    }

    /// Create every table derived from the spec. Idempotent.
    pub fn create_tables(&self) -> Result<(), MappError> {
        let conn = self.lock()?;
        for schema in self.tables.values() {
            let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
            for scalar in &schema.scalars {
                columns.push(format!("{} {}", scalar.name, scalar.sql_type));
            }
            conn.execute(
                &format!("CREATE TABLE IF NOT EXISTS {} ({})", schema.name, columns.join(", ")),
                [],
            )
            .map_err(db_err)?;

            for list in &schema.lists {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {} (value {}, position INTEGER NOT NULL, {} TEXT NOT NULL)",
                        list.child_table, list.element_sql_type, list.owner_column
                    ),
                    [],
                )
                .map_err(db_err)?;
                conn.execute(
                    &format!(
                        "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                        list.child_table, list.owner_column, list.child_table, list.owner_column
                    ),
                    [],
                )
                .map_err(db_err)?;
            }
            tracing::debug!(table = %schema.name, "table ready");
        }
        Ok(())
    }

    fn schema(&self, table: &str) -> Result<&TableSchema, MappError> {
        self.tables
            .get(table)
            .ok_or_else(|| MappError::NotFound(format!("table {table}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MappError> {
        self.conn
            .lock()
            .map_err(|_| MappError::ServerError("storage lock poisoned".to_string()))
    }
}

fn build_schemas(spec: &Spec) -> Result<HashMap<String, TableSchema>, MappError> {
    let mut tables = HashMap::new();
    for (module_key, module) in spec.modules.iter() {
        for (model_key, model) in module.models.iter() {
            let name = format!("{module_key}_{model_key}");
            let mut scalars = Vec::new();
            let mut lists = Vec::new();
            for (field_key, field) in model.fields.iter() {
                let ty = field.value_type()?;
                match &ty {
                    ValueType::List(element) => {
                        lists.push(ListColumn {
                            field: field_key.to_string(),
                            element_sql_type: sql_type(element),
                            element: (**element).clone(),
                            child_table: format!("{name}__{field_key}"),
                            owner_column: format!("{model_key}_id"),
                        });
                    }
                    _ => scalars.push(ScalarColumn {
                        name: field_key.to_string(),
                        sql_type: sql_type(&ty),
                        ty,
                    }),
                }
            }
            tables.insert(name.clone(), TableSchema { name, scalars, lists });
        }
    }
    Ok(tables)
}

fn encode(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int(i) => rusqlite::types::Value::Integer(*i),
        Value::Float(f) => rusqlite::types::Value::Real(*f),
        Value::Str(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Datetime(dt) => {
            rusqlite::types::Value::Text(dt.format(mapp_core::DATETIME_FORMAT).to_string())
        }
        // Lists live in child tables; structs never reach storage.
        Value::List(_) | Value::Struct(_) => {
            rusqlite::types::Value::Text(value.to_json().to_string())
        }
    }
}

fn decode(raw: rusqlite::types::Value, ty: &ValueType) -> Result<Value, MappError> {
    match raw {
        rusqlite::types::Value::Null => Ok(Value::Null),
        rusqlite::types::Value::Integer(i) => match ty {
            ValueType::Bool => Ok(Value::Bool(i != 0)),
            ValueType::Float => Ok(Value::Float(i as f64)),
            _ => Ok(Value::Int(i)),
        },
        rusqlite::types::Value::Real(f) => Ok(Value::Float(f)),
        rusqlite::types::Value::Text(s) => match ty {
            ValueType::Datetime => mapp_core::value::parse_datetime(&s),
            _ => Ok(Value::Str(s)),
        },
        rusqlite::types::Value::Blob(_) => {
            Err(MappError::ServerError("unexpected blob column".to_string()))
        }
    }
}

fn db_err(err: rusqlite::Error) -> MappError {
    tracing::warn!(error = %err, "sqlite failure");
    MappError::ServerError(err.to_string())
}

fn fetch_record(
    conn: &Connection,
    schema: &TableSchema,
    id: &str,
) -> Result<Option<Record>, MappError> {
    let column_names: Vec<&str> = schema.scalars.iter().map(|c| c.name.as_str()).collect();
    let select = if column_names.is_empty() {
        format!("SELECT id FROM {} WHERE id = ?1", schema.name)
    } else {
        format!("SELECT id, {} FROM {} WHERE id = ?1", column_names.join(", "), schema.name)
    };

    let mut stmt = conn.prepare(&select).map_err(db_err)?;
    let mut rows = stmt.query(params![id]).map_err(db_err)?;
    let Some(row) = rows.next().map_err(db_err)? else {
        return Ok(None);
    };

    let mut record = Record::new();
    let row_id: String = row.get(0).map_err(db_err)?;
    record.insert("id".to_string(), Value::Str(row_id));
    for (index, scalar) in schema.scalars.iter().enumerate() {
        let raw: rusqlite::types::Value = row.get(index + 1).map_err(db_err)?;
        let value = decode(raw, &scalar.ty)?;
        if value != Value::Null {
            record.insert(scalar.name.clone(), value);
        }
    }
    drop(rows);
    drop(stmt);

    for list in &schema.lists {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT value FROM {} WHERE {} = ?1 ORDER BY position",
                list.child_table, list.owner_column
            ))
            .map_err(db_err)?;
        let items = stmt
            .query_map(params![id], |row| row.get::<_, rusqlite::types::Value>(0))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        let mut values = Vec::with_capacity(items.len());
        for raw in items {
            values.push(decode(raw, &list.element)?);
        }
        record.insert(list.field.clone(), Value::List(values));
    }

    Ok(Some(record))
}

fn write_list_rows(
    conn: &Connection,
    list: &ListColumn,
    id: &str,
    record: &Record,
) -> Result<(), MappError> {
    if let Some(Value::List(items)) = record.get(&list.field) {
        let insert = format!(
            "INSERT INTO {} (value, position, {}) VALUES (?1, ?2, ?3)",
            list.child_table, list.owner_column
        );
        for (position, item) in items.iter().enumerate() {
            conn.execute(&insert, params![encode(item), position as i64, id])
                .map_err(db_err)?;
        }
    }
    Ok(())
}

impl Storage for SqliteStorage {
    fn insert(&self, table: &str, record: &Record) -> Result<Record, MappError> {
        let schema = self.schema(table)?.clone();
        let id = Uuid::new_v4().to_string();

        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_err)?;
        {
            let mut columns = vec!["id".to_string()];
            let mut values = vec![rusqlite::types::Value::Text(id.clone())];
            for scalar in &schema.scalars {
                columns.push(scalar.name.clone());
                values.push(match record.get(&scalar.name) {
                    Some(value) => encode(value),
                    None => rusqlite::types::Value::Null,
                });
            }
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("?{i}")).collect();
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    schema.name,
                    columns.join(", "),
                    placeholders.join(", ")
                ),
                params_from_iter(values),
            )
            .map_err(db_err)?;

            for list in &schema.lists {
                write_list_rows(&tx, list, &id, record)?;
            }
        }
        tx.commit().map_err(db_err)?;

        let mut stored = record.clone();
        stored.insert("id".to_string(), Value::Str(id));
        Ok(stored)
    }

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, MappError> {
        let schema = self.schema(table)?.clone();
        let guard = self.lock()?;
        fetch_record(&guard, &schema, id)
    }

    fn update(&self, table: &str, id: &str, record: &Record) -> Result<Record, MappError> {
        let schema = self.schema(table)?.clone();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_err)?;
        {
            let exists: bool = tx
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", schema.name),
                    params![id],
                    |row| row.get::<_, i64>(0),
                )
                .map(|count| count > 0)
                .map_err(db_err)?;
            if !exists {
                return Err(MappError::NotFound(format!("{table}/{id}")));
            }

            if !schema.scalars.is_empty() {
                let assignments: Vec<String> = schema
                    .scalars
                    .iter()
                    .enumerate()
                    .map(|(i, scalar)| format!("{} = ?{}", scalar.name, i + 1))
                    .collect();
                let mut values: Vec<rusqlite::types::Value> = schema
                    .scalars
                    .iter()
                    .map(|scalar| match record.get(&scalar.name) {
                        Some(value) => encode(value),
                        None => rusqlite::types::Value::Null,
                    })
                    .collect();
                values.push(rusqlite::types::Value::Text(id.to_string()));
                tx.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE id = ?{}",
                        schema.name,
                        assignments.join(", "),
                        schema.scalars.len() + 1
                    ),
                    params_from_iter(values),
                )
                .map_err(db_err)?;
            }

            for list in &schema.lists {
                tx.execute(
                    &format!("DELETE FROM {} WHERE {} = ?1", list.child_table, list.owner_column),
                    params![id],
                )
                .map_err(db_err)?;
                write_list_rows(&tx, list, id, record)?;
            }
        }
        tx.commit().map_err(db_err)?;

        let mut stored = record.clone();
        stored.insert("id".to_string(), Value::Str(id.to_string()));
        Ok(stored)
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), MappError> {
        let schema = self.schema(table)?.clone();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_err)?;
        for list in &schema.lists {
            tx.execute(
                &format!("DELETE FROM {} WHERE {} = ?1", list.child_table, list.owner_column),
                params![id],
            )
            .map_err(db_err)?;
        }
        tx.execute(&format!("DELETE FROM {} WHERE id = ?1", schema.name), params![id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn list(&self, table: &str, offset: u64, limit: u64) -> Result<(Vec<Record>, u64), MappError> {
        let schema = self.schema(table)?.clone();
        let guard = self.lock()?;

        let total: i64 = guard
            .query_row(&format!("SELECT COUNT(*) FROM {}", schema.name), [], |row| row.get(0))
            .map_err(db_err)?;

        let mut stmt = guard
            .prepare(&format!(
                "SELECT id FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
                schema.name
            ))
            .map_err(db_err)?;
        let ids = stmt
            .query_map(params![limit as i64, offset as i64], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        drop(stmt);

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = fetch_record(&guard, &schema, &id)? {
                records.push(record);
            }
        }
        Ok((records, total as u64))
    }

    fn count_by(&self, table: &str, field: &str, value: &Value) -> Result<u64, MappError> {
        let schema = self.schema(table)?.clone();
        ensure_scalar(&schema, field)?;
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", schema.name, field),
                params![encode(value)],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn find_by(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Record>, MappError> {
        let schema = self.schema(table)?.clone();
        ensure_scalar(&schema, field)?;
        let guard = self.lock()?;
        let id: Option<String> = guard
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE {} = ?1 ORDER BY rowid LIMIT 1",
                    schema.name, field
                ),
                params![encode(value)],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db_err(other)),
            })?;
        match id {
            Some(id) => fetch_record(&guard, &schema, &id),
            None => Ok(None),
        }
    }
}

fn ensure_scalar(schema: &TableSchema, field: &str) -> Result<(), MappError> {
    if schema.scalars.iter().any(|s| s.name == field) {
        Ok(())
    } else {
        Err(MappError::ServerError(format!(
            "cannot filter {} by {field}",
            schema.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapp_spec::{load_spec_value, normalize};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn spec() -> Spec {
        let tree = json!({
            "lingo": {"version": "generator-beta-1"},
            "project": {"name": "store test", "use_builtin_modules": false},
            "modules": {"shop": {"models": {"item": {"fields": {
                "label": {"type": "str", "examples": ["x"]},
                "count": {"type": "int", "examples": [1]},
                "fresh": {"type": "bool", "examples": [true]},
                "tags": {"type": "list", "element_type": "str", "examples": [["a"]]},
            }}}}}
        });
        normalize(load_spec_value(tree).unwrap()).unwrap()
    }

    fn record(label: &str, count: i64) -> Record {
        let mut r = Record::new();
        r.insert("label".to_string(), Value::Str(label.to_string()));
        r.insert("count".to_string(), Value::Int(count));
        r.insert("fresh".to_string(), Value::Bool(true));
        r.insert(
            "tags".to_string(),
            Value::List(vec![Value::Str("a".to_string()), Value::Str("b".to_string())]),
        );
        r
    }

    fn storage() -> SqliteStorage {
        let storage = SqliteStorage::open_in_memory(&spec()).unwrap();
        storage.create_tables().unwrap();
        storage
    }

    #[test]
    fn test_insert_then_get_preserves_list_order() {
        let storage = storage();
        let stored = storage.insert("shop_item", &record("thing", 2)).unwrap();
        let id = match stored.get("id") {
            Some(Value::Str(id)) => id.clone(),
            other => panic!("missing id: {other:?}"),
        };
        let read = storage.get("shop_item", &id).unwrap().unwrap();
        assert_eq!(
            read.get("tags"),
            Some(&Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string())
            ]))
        );
        assert_eq!(read.get("count"), Some(&Value::Int(2)));
        assert_eq!(read.get("fresh"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let storage = storage();
        let err = storage.update("shop_item", "ghost", &record("x", 1)).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let storage = storage();
        let stored = storage.insert("shop_item", &record("gone", 1)).unwrap();
        let id = match stored.get("id") {
            Some(Value::Str(id)) => id.clone(),
            other => panic!("missing id: {other:?}"),
        };
        storage.delete("shop_item", &id).unwrap();
        storage.delete("shop_item", &id).unwrap();
        assert!(storage.get("shop_item", &id).unwrap().is_none());
    }

    #[test]
    fn test_list_pagination_totals() {
        let storage = storage();
        for i in 0..25 {
            storage.insert("shop_item", &record(&format!("item {i}"), i)).unwrap();
        }
        let mut sizes = Vec::new();
        let mut offset = 0;
        loop {
            let (page, total) = storage.list("shop_item", offset, 10).unwrap();
            assert_eq!(total, 25);
            sizes.push(page.len());
            if page.is_empty() {
                break;
            }
            offset += 10;
        }
        assert_eq!(sizes, vec![10, 10, 5, 0]);
    }

    #[test]
    fn test_count_and_find_by() {
        let storage = storage();
        storage.insert("shop_item", &record("alpha", 1)).unwrap();
        storage.insert("shop_item", &record("alpha", 2)).unwrap();
        storage.insert("shop_item", &record("beta", 3)).unwrap();
        assert_eq!(
            storage
                .count_by("shop_item", "label", &Value::Str("alpha".to_string()))
                .unwrap(),
            2
        );
        let found = storage
            .find_by("shop_item", "label", &Value::Str("beta".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(found.get("count"), Some(&Value::Int(3)));
    }
}
