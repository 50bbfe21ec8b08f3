//! Row handle returned by table operations.
//!
//! Clones of a [`Record`] share their attributes, so `reload` on any clone
//! refreshes every holder. Records travel through promises as opaque
//! values; recover one with [`Record::from_value`].

use std::{cell::RefCell, fmt, rc::Rc};

use sequel_promise::{Promise, Resolution};
use sequel_types::{Result, SequelError, Value, constants};

use crate::{schema::Row, table::Table};

#[derive(Debug)]
struct RecordState {
    id: Option<i64>,
    attrs: Row,
}

#[derive(Clone)]
pub struct Record {
    table: Table,
    state: Rc<RefCell<RecordState>>,
}

impl Record {
    pub(crate) fn stored(table: &Table, row: Row) -> Self {
        let id = row.get(constants::PRIMARY_KEY).and_then(Value::as_int);
        Self {
            table: table.clone(),
            state: Rc::new(RefCell::new(RecordState { id, attrs: row })),
        }
    }

    pub(crate) fn unsaved(table: &Table, attrs: Row) -> Self {
        Self {
            table: table.clone(),
            state: Rc::new(RefCell::new(RecordState { id: None, attrs })),
        }
    }

    /// The record carried by a fulfillment value, if any.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_opaque::<Self>().cloned()
    }

    /// Primary key; `None` until first saved.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.state.borrow().id
    }

    #[must_use]
    pub fn is_new_record(&self) -> bool {
        self.id().is_none()
    }

    /// Current local value of `field` (`Null` if unset).
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        self.state.borrow().attrs.get(field).cloned().unwrap_or_default()
    }

    /// Change a local attribute. Persisted by the next [`Record::save`].
    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
        self.state.borrow_mut().attrs.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn attributes(&self) -> Row {
        self.state.borrow().attrs.clone()
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Whether both handles share the same attributes.
    #[must_use]
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn replace(&self, row: Row) {
        let mut state = self.state.borrow_mut();
        state.id = row.get(constants::PRIMARY_KEY).and_then(Value::as_int);
        state.attrs = row;
    }

    pub(crate) fn persisted_id(&self) -> Result<i64> {
        self.id()
            .ok_or_else(|| SequelError::message(format!("{} record has not been saved", self.table.name())))
    }

    // -----------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------

    pub fn save(&self) -> Promise {
        self.table.save(self)
    }

    pub fn reload(&self) -> Promise {
        self.table.reload(self)
    }

    /// Write `attrs` and merge them into this record. Fulfills with this
    /// record.
    pub fn update(&self, attrs: Row) -> Promise {
        let me = self.clone();
        self.table.run("update", move |table, log| {
            let id = me.persisted_id()?;
            let stored = table.update_row(id, attrs.clone(), log)?;
            {
                let mut state = me.state.borrow_mut();
                for name in attrs.keys() {
                    if let Some(value) = stored.get(name) {
                        state.attrs.insert(name.clone(), value.clone());
                    }
                }
            }
            Ok(me.into())
        })
    }

    /// Add `by` to `fields` in the store. Local attributes are left as
    /// they were; call [`Record::reload`] to see the result.
    pub fn increment(&self, fields: &[&str], by: i64) -> Promise {
        self.increment_map(fields.iter().map(|f| (*f, by)))
    }

    pub fn increment_map<K: Into<String>>(&self, amounts: impl IntoIterator<Item = (K, i64)>) -> Promise {
        let amounts: Vec<(String, i64)> = amounts.into_iter().map(|(k, by)| (k.into(), by)).collect();
        let me = self.clone();
        self.table.run("increment", move |table, log| {
            let id = me.persisted_id()?;
            table.increment_row(id, &amounts, log)?;
            Ok(me.into())
        })
    }

    pub fn decrement(&self, fields: &[&str], by: i64) -> Promise {
        self.increment_map(fields.iter().map(|f| (*f, by.saturating_neg())))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Record")
            .field("table", &self.table.name())
            .field("id", &state.id)
            .field("attrs", &state.attrs)
            .finish()
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::opaque(record)
    }
}

impl From<Record> for Resolution {
    fn from(record: Record) -> Self {
        Resolution::from(Value::from(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{Field, Schema},
        table::row,
    };
    use sequel_promise::Scheduler;

    fn users() -> Table {
        Table::new(Schema::new("User").field(Field::text("username")).field(Field::integer("aNumber")))
    }

    #[test]
    fn build_then_save_assigns_id() {
        let table = users();
        let record = table.build(row([("username", Value::from("a"))]));
        assert!(record.is_new_record());
        let p = record.save();
        Scheduler::run_until_idle().unwrap();
        assert_eq!(record.id(), Some(1));
        assert!(Record::from_value(&p.values().unwrap()[0]).unwrap().ptr_eq(&record));
        assert!(record.get("aNumber").is_null());
    }

    #[test]
    fn set_then_save_updates_store() {
        let table = users();
        table.create(row([("id", Value::Int(1))]));
        let found = table.find(1);
        Scheduler::run_until_idle().unwrap();
        let record = Record::from_value(&found.values().unwrap()[0]).unwrap();
        record.set("username", "changed");
        record.save();
        Scheduler::run_until_idle().unwrap();
        assert_eq!(table.peek(1).unwrap()["username"], Value::from("changed"));
    }

    #[test]
    fn unsaved_record_cannot_increment() {
        let record = users().build(Row::new());
        let p = record.increment(&["aNumber"], 1);
        p.catch(|_| Ok(()));
        Scheduler::run_until_idle().unwrap();
        assert!(p.reason().is_some());
    }

    #[test]
    fn debug_shows_attributes() {
        let record = users().build(row([("username", Value::from("x"))]));
        let dbg = format!("{record:?}");
        assert!(dbg.contains("Users"));
        assert!(dbg.contains("username"));
    }
}
