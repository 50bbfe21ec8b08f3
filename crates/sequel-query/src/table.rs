//! In-memory table whose operations answer with promises.
//!
//! Every operation runs on a later tick of the [`Scheduler`]: it emits the
//! `sql` statements it issued on the returned promise, then settles that
//! promise. An operation reads the stored row at the moment it runs, so
//! interleaved increments accumulate instead of overwriting each other.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use sequel_promise::{Promise, Resolution, Scheduler};
use sequel_types::{EventName, Result, SequelError, SqlStatement, Value, constants};

use crate::{
    record::Record,
    schema::{FieldKind, Row, Schema},
    sql,
};

/// Build a [`Row`] from field/value pairs.
pub fn row<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Row {
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[derive(Debug)]
struct Store {
    schema: Schema,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
}

impl Store {
    fn table_name(&self) -> String {
        self.schema.table_name()
    }

    fn not_found(&self, id: i64) -> SequelError {
        SequelError::RecordNotFound { table: self.table_name(), id }
    }

    fn insert(&mut self, mut attrs: Row, log: &mut Vec<SqlStatement>) -> Result<Row> {
        self.schema.check_known(attrs.keys())?;
        let key = attrs.entry(constants::PRIMARY_KEY.to_string()).or_insert(Value::Null);
        if key.is_null() {
            *key = Value::Int(self.next_id);
        }
        self.schema.complete(&mut attrs);
        self.schema.validate(&attrs)?;
        let row = self.schema.coerce(attrs)?;

        let id = row
            .get(constants::PRIMARY_KEY)
            .and_then(Value::as_int)
            .ok_or_else(|| SequelError::Internal("primary key missing after coercion".into()))?;
        if self.rows.contains_key(&id) {
            return Err(SequelError::DuplicateKey { table: self.table_name(), id });
        }

        log.push(sql::insert(&self.table_name(), &row));
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    fn update(&mut self, id: i64, mut attrs: Row, log: &mut Vec<SqlStatement>) -> Result<Row> {
        attrs.remove(constants::PRIMARY_KEY);
        let attrs = self.schema.prepare(attrs)?;
        let table = self.table_name();
        let not_found = self.not_found(id);
        let stored = self.rows.get_mut(&id).ok_or(not_found)?;
        log.push(sql::update(&table, &attrs, id));
        stored.extend(attrs);
        Ok(stored.clone())
    }

    fn increment(&mut self, id: i64, amounts: &[(String, i64)], log: &mut Vec<SqlStatement>) -> Result<Row> {
        let table = self.table_name();
        for (field, _) in amounts {
            match self.schema.get(field) {
                None => {
                    return Err(SequelError::UnknownField { table, field: field.clone() });
                }
                Some(f) if f.kind != FieldKind::Integer || f.name == constants::PRIMARY_KEY => {
                    return Err(SequelError::TypeMismatch {
                        field: field.clone(),
                        expected: "an incrementable INTEGER column".into(),
                    });
                }
                Some(_) => {}
            }
        }
        let not_found = self.not_found(id);
        let stored = self.rows.get_mut(&id).ok_or(not_found)?;
        log.push(sql::increment(&table, amounts, id));
        for (field, by) in amounts {
            let current = stored.get(field).and_then(Value::as_int).unwrap_or(0);
            stored.insert(field.clone(), Value::Int(current.saturating_add(*by)));
        }
        Ok(stored.clone())
    }

    fn select(&self, criteria: &Row, log: &mut Vec<SqlStatement>) -> Option<Row> {
        log.push(sql::select(&self.table_name(), criteria, true));
        self.rows
            .values()
            .find(|row| criteria.iter().all(|(k, v)| row.get(k) == Some(v)))
            .cloned()
    }

    /// Accepts a primary key or a map of field equalities.
    fn criteria(&self, criteria: Value) -> Result<Row> {
        match criteria {
            Value::Int(id) => Ok(row([(constants::PRIMARY_KEY, Value::Int(id))])),
            Value::Map(map) => self.schema.coerce(map),
            Value::Text(raw) => Err(SequelError::InvalidCriteria {
                reason: format!("raw where clause {raw:?} is not supported"),
            }),
            other => Err(SequelError::InvalidCriteria {
                reason: format!("expected an id or a field map, got {other}"),
            }),
        }
    }
}

/// Cheaply cloneable handle to one in-memory table.
#[derive(Debug, Clone)]
pub struct Table {
    store: Rc<RefCell<Store>>,
}

impl Table {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            store: Rc::new(RefCell::new(Store {
                schema,
                rows: BTreeMap::new(),
                next_id: 1,
            })),
        }
    }

    #[must_use]
    pub fn schema(&self) -> Schema {
        self.store.borrow().schema.clone()
    }

    /// Backing table name, e.g. `Users`.
    #[must_use]
    pub fn name(&self) -> String {
        self.store.borrow().table_name()
    }

    /// Stored row for `id`, read synchronously.
    #[must_use]
    pub fn peek(&self, id: i64) -> Option<Row> {
        self.store.borrow().rows.get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.borrow().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.borrow().rows.is_empty()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Table) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    // -----------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------

    /// Drop every row and recreate the table. Fulfills with no values.
    pub fn sync(&self) -> Promise {
        self.run("sync", |table, log| {
            let mut store = table.store.borrow_mut();
            log.extend(sql::recreate(&store.schema));
            store.rows.clear();
            store.next_id = 1;
            Ok(Resolution::from(()))
        })
    }

    /// Validate and insert `attrs`. Fulfills with the stored [`Record`].
    pub fn create(&self, attrs: Row) -> Promise {
        self.run("create", move |table, log| {
            let row = table.insert_row(attrs, log)?;
            Ok(Record::stored(table, row).into())
        })
    }

    /// An unsaved record; nothing is validated until [`Record::save`].
    #[must_use]
    pub fn build(&self, attrs: Row) -> Record {
        Record::unsaved(self, attrs)
    }

    /// Insert an unsaved record or write back every attribute of a stored
    /// one. Fulfills with the same record, refreshed from the store.
    pub fn save(&self, record: &Record) -> Promise {
        let record = record.clone();
        self.run("save", move |table, log| {
            let row = match record.id() {
                None => table.insert_row(record.attributes(), log)?,
                Some(id) => table.update_row(id, record.attributes(), log)?,
            };
            record.replace(row);
            Ok(Value::from(record).into())
        })
    }

    /// Fulfills with the record for `id`, or `Null` if there is none.
    pub fn find(&self, id: i64) -> Promise {
        self.find_where(Value::Int(id))
    }

    /// Fulfills with the first record matching `criteria`, or `Null`.
    ///
    /// `criteria` is a primary key or a map of field equalities. Anything
    /// else rejects with [`SequelError::InvalidCriteria`].
    pub fn find_where(&self, criteria: impl Into<Value>) -> Promise {
        let criteria = criteria.into();
        self.run("find", move |table, log| {
            let criteria = table.store.borrow().criteria(criteria)?;
            let found = table.store.borrow().select(&criteria, log);
            Ok(found.map_or(Value::Null, |row| Record::stored(table, row).into()).into())
        })
    }

    /// Fulfills with the number of stored rows.
    pub fn count(&self) -> Promise {
        self.run("count", |table, log| {
            let store = table.store.borrow();
            log.push(sql::count(&store.table_name()));
            let n = i64::try_from(store.rows.len())
                .map_err(|_| SequelError::Internal("row count overflow".into()))?;
            Ok(Resolution::from(n))
        })
    }

    /// Fulfills with two values: the matching or newly created record, and
    /// whether it was created.
    pub fn find_or_create(&self, criteria: impl Into<Value>, defaults: Row) -> Promise {
        let criteria = criteria.into();
        self.run("find_or_create", move |table, log| {
            let criteria = table.store.borrow().criteria(criteria)?;
            let found = table.store.borrow().select(&criteria, log);
            if let Some(row) = found {
                return Ok(Resolution::Values(vec![
                    Record::stored(table, row).into(),
                    Value::Bool(false),
                ]));
            }
            let mut attrs = defaults;
            attrs.extend(criteria);
            let row = table.insert_row(attrs, log)?;
            Ok(Resolution::Values(vec![Record::stored(table, row).into(), Value::Bool(true)]))
        })
    }

    /// Validate and write `attrs` to row `id`. Fulfills with the stored
    /// record; rejects with [`SequelError::RecordNotFound`] if absent.
    pub fn update(&self, id: i64, attrs: Row) -> Promise {
        self.run("update", move |table, log| {
            let row = table.update_row(id, attrs, log)?;
            Ok(Record::stored(table, row).into())
        })
    }

    /// Add `by` to each of `fields` on row `id`.
    pub fn increment(&self, id: i64, fields: &[&str], by: i64) -> Promise {
        self.increment_map(id, fields.iter().map(|f| (*f, by)))
    }

    /// Add a per-field amount on row `id`.
    pub fn increment_map<K: Into<String>>(&self, id: i64, amounts: impl IntoIterator<Item = (K, i64)>) -> Promise {
        let amounts: Vec<(String, i64)> = amounts.into_iter().map(|(k, by)| (k.into(), by)).collect();
        self.run("increment", move |table, log| {
            let row = table.increment_row(id, &amounts, log)?;
            Ok(Record::stored(table, row).into())
        })
    }

    /// Subtract `by` from each of `fields` on row `id`.
    pub fn decrement(&self, id: i64, fields: &[&str], by: i64) -> Promise {
        self.increment_map(id, fields.iter().map(|f| (*f, by.saturating_neg())))
    }

    /// Refresh `record` in place from the store. Fulfills with the same
    /// record.
    pub fn reload(&self, record: &Record) -> Promise {
        let record = record.clone();
        self.run("reload", move |table, log| {
            let id = record.persisted_id()?;
            let key = row([(constants::PRIMARY_KEY, Value::Int(id))]);
            let found = table.store.borrow().select(&key, log);
            let row = found.ok_or_else(|| table.store.borrow().not_found(id))?;
            record.replace(row);
            Ok(Value::from(record).into())
        })
    }

    // -----------------------------------------------------------------
    // Plumbing shared with `Record`
    // -----------------------------------------------------------------

    /// Run `work` on a later tick, emit its statements, then settle.
    pub(crate) fn run<F>(&self, op: &'static str, work: F) -> Promise
    where
        F: FnOnce(&Table, &mut Vec<SqlStatement>) -> Result<Resolution> + 'static,
    {
        let (promise, resolver) = Promise::pending();
        let table = self.clone();
        tracing::trace!(table = %table.name(), op, promise = %promise.id(), "Query queued");
        Scheduler::schedule(move || {
            let mut log = Vec::new();
            let result = work(&table, &mut log);
            let name = table.name();
            for stmt in log {
                tracing::trace!(table = %name, op, sql = %stmt, "Statement issued");
                resolver.emit(EventName::Sql, vec![stmt.into()]);
            }
            match result {
                Ok(resolution) => {
                    tracing::debug!(table = %name, op, "Query fulfilled");
                    resolver.resolve(resolution);
                }
                Err(err) => {
                    tracing::debug!(table = %name, op, code = err.code(), error = %err, "Query rejected");
                    resolver.reject(err);
                }
            }
        });
        promise
    }

    pub(crate) fn insert_row(&self, attrs: Row, log: &mut Vec<SqlStatement>) -> Result<Row> {
        self.store.borrow_mut().insert(attrs, log)
    }

    pub(crate) fn update_row(&self, id: i64, attrs: Row, log: &mut Vec<SqlStatement>) -> Result<Row> {
        self.store.borrow_mut().update(id, attrs, log)
    }

    pub(crate) fn increment_row(
        &self,
        id: i64,
        amounts: &[(String, i64)],
        log: &mut Vec<SqlStatement>,
    ) -> Result<Row> {
        self.store.borrow_mut().increment(id, amounts, log)
    }
}
