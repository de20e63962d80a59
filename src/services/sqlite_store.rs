//! SQLite persistence layer for positions, market prices and margin records.
//!
//! A single connection is shared by request handlers and background jobs
//! behind a mutex. Every method issues one statement.

use crate::services::stores::{MarginStore, PositionStore, PriceStore, StoreResult};
use crate::types::{MarginRecord, MarketPrice, Position, PriceMap};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite store backing all three persistence seams.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a statement half-applied.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                cost_basis REAL NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (client_id, symbol)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_symbol ON positions(symbol)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS market_data (
                symbol TEXT PRIMARY KEY,
                current_price REAL NOT NULL,
                observed_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS margins (
                client_id INTEGER PRIMARY KEY,
                loan_amount REAL NOT NULL CHECK (loan_amount >= 0),
                initial_margin REAL NOT NULL,
                maintenance_margin REAL NOT NULL
                    CHECK (maintenance_margin >= 0 AND maintenance_margin <= 1),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    /// Check that the database answers a trivial query.
    pub fn ping(&self) -> Result<(), rusqlite::Error> {
        self.conn().query_row("SELECT 1", [], |_| Ok(()))
    }
}

const POSITION_COLUMNS: &str =
    "id, client_id, symbol, quantity, cost_basis, created_at, updated_at";

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        client_id: row.get(1)?,
        symbol: row.get(2)?,
        quantity: row.get(3)?,
        cost_basis: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ========== Positions ==========

impl PositionStore for SqliteStore {
    fn list_by_client(&self, client_id: i64) -> StoreResult<Vec<Position>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE client_id = ?1 ORDER BY symbol"
        ))?;

        let positions = stmt
            .query_map(params![client_id], position_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(positions)
    }

    fn distinct_symbols(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM positions ORDER BY symbol")?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(symbols)
    }

    fn distinct_clients(&self) -> StoreResult<Vec<i64>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT DISTINCT client_id FROM positions ORDER BY client_id")?;
        let clients = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(clients)
    }

    fn create_position(
        &self,
        client_id: i64,
        symbol: &str,
        quantity: i64,
        cost_basis: f64,
    ) -> StoreResult<Position> {
        let conn = self.conn();
        let now = now_millis();

        let position = conn.query_row(
            &format!(
                "INSERT INTO positions
                     (client_id, symbol, quantity, cost_basis, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(client_id, symbol) DO UPDATE SET
                    quantity = excluded.quantity,
                    cost_basis = excluded.cost_basis,
                    updated_at = excluded.updated_at
                 RETURNING {POSITION_COLUMNS}"
            ),
            params![client_id, symbol, quantity, cost_basis, now],
            position_from_row,
        )?;

        debug!("Stored position {} for client {}", symbol, client_id);
        Ok(position)
    }

    fn update_position(
        &self,
        id: i64,
        client_id: i64,
        quantity: i64,
        cost_basis: f64,
    ) -> StoreResult<Option<Position>> {
        let conn = self.conn();

        conn.query_row(
            &format!(
                "UPDATE positions SET quantity = ?1, cost_basis = ?2, updated_at = ?3
                 WHERE id = ?4 AND client_id = ?5
                 RETURNING {POSITION_COLUMNS}"
            ),
            params![quantity, cost_basis, now_millis(), id, client_id],
            position_from_row,
        )
        .optional()
    }

    fn delete_position(&self, id: i64, client_id: i64) -> StoreResult<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM positions WHERE id = ?1 AND client_id = ?2",
            params![id, client_id],
        )?;
        Ok(deleted > 0)
    }
}

// ========== Market Data ==========

impl PriceStore for SqliteStore {
    fn current_price(&self, symbol: &str, fresh_since: i64) -> StoreResult<Option<MarketPrice>> {
        let conn = self.conn();

        conn.query_row(
            "SELECT symbol, current_price, observed_at FROM market_data
             WHERE symbol = ?1 AND observed_at >= ?2",
            params![symbol, fresh_since],
            |row| {
                Ok(MarketPrice {
                    symbol: row.get(0)?,
                    current_price: row.get(1)?,
                    observed_at: row.get(2)?,
                })
            },
        )
        .optional()
    }

    fn current_prices(&self, symbols: &[String], fresh_since: i64) -> StoreResult<PriceMap> {
        let unique: BTreeSet<&String> = symbols.iter().collect();
        if unique.is_empty() {
            return Ok(PriceMap::new());
        }

        let placeholders = (0..unique.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT symbol, current_price FROM market_data
             WHERE observed_at >= ?1 AND symbol IN ({placeholders})"
        );

        let mut values = Vec::with_capacity(unique.len() + 1);
        values.push(Value::Integer(fresh_since));
        values.extend(unique.into_iter().map(|s| Value::Text(s.clone())));

        let conn = self.conn();
        let mut stmt = conn.prepare(&query)?;
        let prices = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<PriceMap>>()?;
        Ok(prices)
    }

    fn upsert_price(&self, symbol: &str, price: f64, observed_at: i64) -> StoreResult<()> {
        let conn = self.conn();

        // An older observation never replaces a newer one.
        conn.execute(
            "INSERT INTO market_data (symbol, current_price, observed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(symbol) DO UPDATE SET
                current_price = excluded.current_price,
                observed_at = excluded.observed_at
             WHERE excluded.observed_at >= market_data.observed_at",
            params![symbol, price, observed_at],
        )?;
        Ok(())
    }
}

// ========== Margin Records ==========

impl MarginStore for SqliteStore {
    fn margin_for_client(&self, client_id: i64) -> StoreResult<Option<MarginRecord>> {
        let conn = self.conn();

        conn.query_row(
            "SELECT client_id, loan_amount, initial_margin, maintenance_margin,
                    created_at, updated_at
             FROM margins WHERE client_id = ?1",
            params![client_id],
            |row| {
                Ok(MarginRecord {
                    client_id: row.get(0)?,
                    loan_amount: row.get(1)?,
                    initial_margin: row.get(2)?,
                    maintenance_margin: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()
    }

    fn upsert_margin(&self, record: &MarginRecord) -> StoreResult<()> {
        let conn = self.conn();
        let now = now_millis();

        conn.execute(
            "INSERT INTO margins
             (client_id, loan_amount, initial_margin, maintenance_margin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(client_id) DO UPDATE SET
                loan_amount = excluded.loan_amount,
                initial_margin = excluded.initial_margin,
                maintenance_margin = excluded.maintenance_margin,
                updated_at = excluded.updated_at",
            params![
                record.client_id,
                record.loan_amount,
                record.initial_margin,
                record.maintenance_margin,
                now,
            ],
        )?;

        debug!("Saved margin record for client {}", record.client_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::new_in_memory().unwrap()
    }

    #[test]
    fn test_create_overwrites_existing_lot() {
        let store = store();
        let first = store.create_position(1, "AAPL", 10, 1400.0).unwrap();
        let second = store.create_position(1, "AAPL", 25, 3600.0).unwrap();

        assert_eq!(first.id, second.id);
        let positions = store.list_by_client(1).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 25);
        assert_eq!(positions[0].cost_basis, 3600.0);
    }

    #[test]
    fn test_update_requires_owning_client() {
        let store = store();
        let pos = store.create_position(1, "MSFT", 5, 1500.0).unwrap();

        assert!(store.update_position(pos.id, 2, 9, 1.0).unwrap().is_none());
        let updated = store.update_position(pos.id, 1, -3, 900.0).unwrap().unwrap();
        assert_eq!(updated.quantity, -3);
        assert_eq!(updated.created_at, pos.created_at);
    }

    #[test]
    fn test_delete_position() {
        let store = store();
        let pos = store.create_position(1, "MSFT", 5, 1500.0).unwrap();

        assert!(!store.delete_position(pos.id, 99).unwrap());
        assert!(store.delete_position(pos.id, 1).unwrap());
        assert!(store.list_by_client(1).unwrap().is_empty());
    }

    #[test]
    fn test_distinct_symbols_and_clients() {
        let store = store();
        store.create_position(2, "AAPL", 1, 1.0).unwrap();
        store.create_position(1, "AAPL", 1, 1.0).unwrap();
        store.create_position(1, "TSLA", 1, 1.0).unwrap();

        assert_eq!(store.distinct_symbols().unwrap(), vec!["AAPL", "TSLA"]);
        assert_eq!(store.distinct_clients().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_freshness_applies_to_both_lookups() {
        let store = store();
        let now = 1_700_000_000_000;
        store.upsert_price("AAPL", 150.0, now - 60_000).unwrap();
        store.upsert_price("MSFT", 300.0, now - 6 * 60_000).unwrap();

        let cutoff = now - 5 * 60_000;
        assert!(store.current_price("AAPL", cutoff).unwrap().is_some());
        assert!(store.current_price("MSFT", cutoff).unwrap().is_none());

        let prices = store
            .current_prices(&["AAPL".to_string(), "MSFT".to_string()], cutoff)
            .unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get("AAPL"), Some(&150.0));
    }

    #[test]
    fn test_older_observation_does_not_win() {
        let store = store();
        store.upsert_price("AAPL", 151.0, 2_000).unwrap();
        store.upsert_price("AAPL", 149.0, 1_000).unwrap();

        let price = store.current_price("AAPL", 0).unwrap().unwrap();
        assert_eq!(price.current_price, 151.0);
        assert_eq!(price.observed_at, 2_000);
    }

    #[test]
    fn test_current_prices_empty_and_duplicates() {
        let store = store();
        store.upsert_price("AAPL", 150.0, 1_000).unwrap();

        assert!(store.current_prices(&[], 0).unwrap().is_empty());
        let prices = store
            .current_prices(&["AAPL".to_string(), "AAPL".to_string()], 0)
            .unwrap();
        assert_eq!(prices.len(), 1);
    }

    #[test]
    fn test_margin_upsert_keyed_by_client() {
        let store = store();
        let mut record = MarginRecord {
            client_id: 5,
            loan_amount: 500.0,
            initial_margin: 0.5,
            maintenance_margin: 0.25,
            created_at: 0,
            updated_at: 0,
        };
        store.upsert_margin(&record).unwrap();
        record.loan_amount = 1400.0;
        store.upsert_margin(&record).unwrap();

        let saved = store.margin_for_client(5).unwrap().unwrap();
        assert_eq!(saved.loan_amount, 1400.0);
        assert!(store.margin_for_client(6).unwrap().is_none());
    }

    #[test]
    fn test_schema_rejects_out_of_range_margin() {
        let store = store();
        let record = MarginRecord {
            client_id: 5,
            loan_amount: 500.0,
            initial_margin: 0.5,
            maintenance_margin: 25.0,
            created_at: 0,
            updated_at: 0,
        };
        assert!(store.upsert_margin(&record).is_err());
    }
}
