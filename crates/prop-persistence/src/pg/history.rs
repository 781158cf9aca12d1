//! `ResultHistoryStore` sobre la tabla `valuation_history` (sólo INSERT).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::debug;
use serde_json::Value;
use uuid::Uuid;

use prop_domain::{DomainError, HistoryEntry, ResultHistoryStore, ResultSource};

use super::{with_retry, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::valuation_history;

#[derive(Queryable, Debug)]
struct HistoryRow {
    result_id: Uuid,
    property_id: String,
    run_id: Uuid,
    source: String,
    valuation: Value,
    risk: Value,
    overrides: Option<Value>,
    computed_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = valuation_history)]
struct NewHistoryRow<'a> {
    result_id: &'a Uuid,
    property_id: &'a str,
    run_id: &'a Uuid,
    source: &'a str,
    valuation: &'a Value,
    risk: &'a Value,
    overrides: Option<&'a Value>,
    computed_at: &'a DateTime<Utc>,
}

fn source_from_str(s: &str) -> Result<ResultSource, PersistenceError> {
    match s {
        "Pipeline" => Ok(ResultSource::Pipeline),
        "Revaluation" => Ok(ResultSource::Revaluation),
        other => Err(PersistenceError::Codec(format!("unknown result source '{other}'"))),
    }
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = PersistenceError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry { result_id: row.result_id,
                          property_id: row.property_id,
                          run_id: row.run_id,
                          source: source_from_str(&row.source)?,
                          valuation: serde_json::from_value(row.valuation)?,
                          risk: serde_json::from_value(row.risk)?,
                          overrides: row.overrides.map(serde_json::from_value).transpose()?,
                          computed_at: row.computed_at })
    }
}

/// Historial durable de resultados.
pub struct PgResultHistory<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgResultHistory<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn load_where<F>(&self, op: &str, query: F) -> Result<Vec<HistoryEntry>, DomainError>
        where F: Fn(&mut PgConnection) -> QueryResult<Vec<HistoryRow>>
    {
        let rows = with_retry(op, || {
            let mut conn = self.provider.connection()?;
            query(&mut conn).map_err(PersistenceError::from)
        })?;
        let entries = rows.into_iter()
                          .map(HistoryEntry::try_from)
                          .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl<P: ConnectionProvider> ResultHistoryStore for PgResultHistory<P> {
    fn append(&self, entry: HistoryEntry) -> Result<(), DomainError> {
        let valuation = serde_json::to_value(&entry.valuation).map_err(PersistenceError::from)?;
        let risk = serde_json::to_value(&entry.risk).map_err(PersistenceError::from)?;
        let overrides = entry.overrides
                             .as_ref()
                             .map(serde_json::to_value)
                             .transpose()
                             .map_err(PersistenceError::from)?;
        let row = NewHistoryRow { result_id: &entry.result_id,
                                  property_id: &entry.property_id,
                                  run_id: &entry.run_id,
                                  source: entry.source.as_str(),
                                  valuation: &valuation,
                                  risk: &risk,
                                  overrides: overrides.as_ref(),
                                  computed_at: &entry.computed_at };
        with_retry("history_append", || {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(valuation_history::table).values(&row)
                                                         .execute(&mut conn)
                                                         .map_err(PersistenceError::from)
        }).map_err(|e| match e {
              PersistenceError::UniqueViolation(_) => {
                  DomainError::Storage(format!("result {} already recorded", entry.result_id))
              }
              other => other.into(),
          })?;
        debug!("history_append: property={} run={} result={} source={}",
               entry.property_id,
               entry.run_id,
               entry.result_id,
               entry.source.as_str());
        Ok(())
    }

    fn entries_for_property(&self, property_id: &str) -> Result<Vec<HistoryEntry>, DomainError> {
        self.load_where("history_by_property", |conn| {
                valuation_history::table.filter(valuation_history::property_id.eq(property_id))
                                        .order(valuation_history::computed_at.asc())
                                        .load(conn)
            })
    }

    fn entries_for_run(&self, run_id: Uuid) -> Result<Vec<HistoryEntry>, DomainError> {
        self.load_where("history_by_run", |conn| {
                valuation_history::table.filter(valuation_history::run_id.eq(run_id))
                                        .order(valuation_history::computed_at.asc())
                                        .load(conn)
            })
    }
}
