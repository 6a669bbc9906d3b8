use crate::error::{Result, TradepostError};
use crate::trade::error::SettlementError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod types;
pub use types::{
    InventoryEntry, ItemId, ItemInfo, SettlementPlan, StoredNotification, TradeLine, TradeRecord,
    TradeSide, TradeStatus, User, UserId,
};

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Inventory access used by the negotiation engine and settlement executor
///
/// `item` and `quantity` back the advisory checks made while an offer is being
/// built. `settle` is the authoritative, all-or-nothing transfer.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Look up a catalog item
    async fn item(&self, item_id: ItemId) -> Result<Option<ItemInfo>>;

    /// Quantity of `item_id` currently held by `user_id` (0 when absent)
    async fn quantity(&self, user_id: UserId, item_id: ItemId) -> Result<i64>;

    /// Apply every line of `plan` and record the trade, or change nothing
    async fn settle(&self, plan: SettlementPlan) -> std::result::Result<TradeRecord, SettlementError>;
}

/// SQLite-backed inventory, trade and notification storage
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    /// Create a new storage instance
    ///
    /// Initializes the database file in the user's data directory. The
    /// `TRADEPOST_DB_PATH` environment variable overrides the location.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("TRADEPOST_DB_PATH") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "tradepost", "tradepost")
            .ok_or_else(|| TradepostError::Storage("Could not determine data directory".into()))?;

        Self::new_with_path(proj_dirs.data_dir().join("tradepost.db"))
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tradepost::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("trade.db")).unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| TradepostError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                tradeable INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS inventory (
                user_id INTEGER NOT NULL REFERENCES users(id),
                item_id INTEGER NOT NULL REFERENCES items(id),
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                PRIMARY KEY (user_id, item_id)
            );
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL REFERENCES users(id),
                receiver_id INTEGER NOT NULL REFERENCES users(id),
                status TEXT NOT NULL,
                is_live_trade INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS trade_items (
                trade_id INTEGER NOT NULL REFERENCES trades(id),
                side TEXT NOT NULL,
                item_id INTEGER NOT NULL REFERENCES items(id),
                quantity INTEGER NOT NULL CHECK (quantity > 0)
            );
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| TradepostError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Create a user and return its id
    pub fn create_user(&self, username: &str) -> Result<UserId> {
        let conn = self.open()?;
        conn.execute("INSERT INTO users (username) VALUES (?)", params![username])
            .context("Failed to insert user")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Load a user by id
    pub fn user(&self, user_id: UserId) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, username FROM users WHERE id = ?",
                params![user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(user)
    }

    /// Add an item to the catalog and return its id
    pub fn create_item(&self, name: &str, tradeable: bool) -> Result<ItemId> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO items (name, tradeable) VALUES (?, ?)",
            params![name, tradeable],
        )
        .context("Failed to insert item")
        .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Change whether an item may be traded
    pub fn set_tradeable(&self, item_id: ItemId, tradeable: bool) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE items SET tradeable = ? WHERE id = ?",
            params![tradeable, item_id],
        )
        .context("Failed to update item")
        .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Look up a catalog item
    pub fn find_item(&self, item_id: ItemId) -> Result<Option<ItemInfo>> {
        let conn = self.open()?;
        let item = conn
            .query_row(
                "SELECT id, name, tradeable FROM items WHERE id = ?",
                params![item_id],
                |row| {
                    Ok(ItemInfo {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        tradeable: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query item")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(item)
    }

    /// List the whole catalog ordered by id
    pub fn list_items(&self) -> Result<Vec<ItemInfo>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT id, name, tradeable FROM items ORDER BY id")
            .context("Failed to prepare statement")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        let items = stmt
            .query_map([], |row| {
                Ok(ItemInfo {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    tradeable: row.get(2)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("Failed to query items")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(items)
    }

    /// Add `quantity` of an item to a user's inventory
    pub fn grant_item(&self, user_id: UserId, item_id: ItemId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return Err(TradepostError::Storage(format!(
                "Grant quantity must be positive, got {}",
                quantity
            ))
            .into());
        }

        let conn = self.open()?;
        credit(&conn, user_id, item_id, quantity)
            .context("Failed to grant item")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Remove `quantity` of an item from a user's inventory
    ///
    /// The row is deleted when it reaches zero. Fails without changes when
    /// the user holds less than `quantity`.
    pub fn take_item(&self, user_id: UserId, item_id: ItemId, quantity: i64) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to start transaction")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        let owned = held_quantity(&tx, user_id, item_id)
            .context("Failed to query inventory")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        if quantity <= 0 || owned < quantity {
            return Err(TradepostError::Storage(format!(
                "Cannot take {} of item {} from user {} holding {}",
                quantity, item_id, user_id, owned
            ))
            .into());
        }

        debit(&tx, user_id, item_id, owned, quantity)
            .context("Failed to update inventory")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Quantity of an item held by a user, 0 when there is no row
    pub fn item_quantity(&self, user_id: UserId, item_id: ItemId) -> Result<i64> {
        let conn = self.open()?;
        let quantity = held_quantity(&conn, user_id, item_id)
            .context("Failed to query inventory")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(quantity)
    }

    /// A user's full inventory ordered by item id
    pub fn inventory(&self, user_id: UserId) -> Result<Vec<InventoryEntry>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT inv.item_id, it.name, inv.quantity
                FROM inventory inv
                JOIN items it ON it.id = inv.item_id
                WHERE inv.user_id = ?
                ORDER BY inv.item_id",
            )
            .context("Failed to prepare statement")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok(InventoryEntry {
                    item_id: row.get(0)?,
                    name: row.get(1)?,
                    quantity: row.get(2)?,
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("Failed to query inventory")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(entries)
    }

    /// Transfer every line of a plan and record the trade in one transaction
    ///
    /// The transaction is opened with `BEGIN IMMEDIATE`, so the write lock is
    /// held from the first quantity check until commit and two settlements
    /// touching the same rows cannot interleave. Sender lines are applied
    /// before receiver lines. Returning early drops the transaction, which
    /// rolls back anything already applied.
    pub fn settle_plan(&self, plan: &SettlementPlan) -> std::result::Result<TradeRecord, SettlementError> {
        if plan.lines.is_empty() {
            return Err(SettlementError::EmptyTrade);
        }

        let mut conn = self
            .open()
            .map_err(|e| SettlementError::Storage(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for (side, from, to) in [
            (TradeSide::Sender, plan.sender_id, plan.receiver_id),
            (TradeSide::Receiver, plan.receiver_id, plan.sender_id),
        ] {
            for line in plan.lines.iter().filter(|l| l.side == side) {
                transfer(&tx, from, to, line.item_id, line.quantity)?;
            }
        }

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO trades (sender_id, receiver_id, status, is_live_trade, created_at)
            VALUES (?, ?, ?, 1, ?)",
            params![
                plan.sender_id,
                plan.receiver_id,
                TradeStatus::Completed.as_str(),
                created_at.to_rfc3339()
            ],
        )?;
        let trade_id = tx.last_insert_rowid();

        for line in &plan.lines {
            tx.execute(
                "INSERT INTO trade_items (trade_id, side, item_id, quantity) VALUES (?, ?, ?, ?)",
                params![trade_id, line.side.as_str(), line.item_id, line.quantity],
            )?;
        }

        tx.commit()?;

        Ok(TradeRecord {
            id: trade_id,
            sender_id: plan.sender_id,
            receiver_id: plan.receiver_id,
            status: TradeStatus::Completed,
            is_live_trade: true,
            lines: plan.lines.clone(),
            created_at,
        })
    }

    /// Completed trades, newest first, optionally limited to one participant
    pub fn list_trades(&self, user_id: Option<UserId>, limit: usize) -> Result<Vec<TradeRecord>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, sender_id, receiver_id, is_live_trade, created_at
                FROM trades
                WHERE ?1 IS NULL OR sender_id = ?1 OR receiver_id = ?1
                ORDER BY id DESC
                LIMIT ?2",
            )
            .context("Failed to prepare statement")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        let headers = stmt
            .query_map(params![user_id, limit as i64], trade_header)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("Failed to query trades")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        let mut trades = Vec::with_capacity(headers.len());
        for mut trade in headers {
            trade.lines = trade_lines(&conn, trade.id)?;
            trades.push(trade);
        }
        Ok(trades)
    }

    /// Load one trade with its line items
    pub fn load_trade(&self, trade_id: i64) -> Result<Option<TradeRecord>> {
        let conn = self.open()?;
        let header = conn
            .query_row(
                "SELECT id, sender_id, receiver_id, is_live_trade, created_at
                FROM trades WHERE id = ?",
                params![trade_id],
                trade_header,
            )
            .optional()
            .context("Failed to query trade")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        match header {
            Some(mut trade) => {
                trade.lines = trade_lines(&conn, trade.id)?;
                Ok(Some(trade))
            }
            None => Ok(None),
        }
    }

    /// Persist a notification for a user
    pub fn insert_notification(&self, user_id: UserId, kind: &str, message: &str) -> Result<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO notifications (user_id, kind, message, read, created_at)
            VALUES (?, ?, ?, 0, ?)",
            params![user_id, kind, message, Utc::now().to_rfc3339()],
        )
        .context("Failed to insert notification")
        .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// A user's notifications, newest first
    pub fn notifications(&self, user_id: UserId) -> Result<Vec<StoredNotification>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, kind, message, read, created_at
                FROM notifications
                WHERE user_id = ?
                ORDER BY id DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;

        let notifications = stmt
            .query_map(params![user_id], |row| {
                let created_at: String = row.get(5)?;
                Ok(StoredNotification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    kind: row.get(2)?,
                    message: row.get(3)?,
                    read: row.get(4)?,
                    created_at: parse_timestamp(&created_at),
                })
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("Failed to query notifications")
            .map_err(|e| TradepostError::Storage(e.to_string()))?;
        Ok(notifications)
    }
}

#[async_trait]
impl InventoryStore for SqliteStorage {
    async fn item(&self, item_id: ItemId) -> Result<Option<ItemInfo>> {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || storage.find_item(item_id))
            .await
            .map_err(|e| TradepostError::Storage(format!("Storage task failed: {}", e)))?
    }

    async fn quantity(&self, user_id: UserId, item_id: ItemId) -> Result<i64> {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || storage.item_quantity(user_id, item_id))
            .await
            .map_err(|e| TradepostError::Storage(format!("Storage task failed: {}", e)))?
    }

    async fn settle(&self, plan: SettlementPlan) -> std::result::Result<TradeRecord, SettlementError> {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || storage.settle_plan(&plan))
            .await
            .map_err(|e| SettlementError::Storage(format!("Storage task failed: {}", e)))?
    }
}

fn held_quantity(conn: &Connection, user_id: UserId, item_id: ItemId) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT quantity FROM inventory WHERE user_id = ? AND item_id = ?",
        params![user_id, item_id],
        |row| row.get(0),
    )
    .optional()
    .map(|q| q.unwrap_or(0))
}

fn credit(conn: &Connection, user_id: UserId, item_id: ItemId, quantity: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO inventory (user_id, item_id, quantity) VALUES (?1, ?2, ?3)
        ON CONFLICT(user_id, item_id) DO UPDATE SET quantity = quantity + excluded.quantity",
        params![user_id, item_id, quantity],
    )?;
    Ok(())
}

/// Decrement a row known to hold `owned`, deleting it instead of storing zero
fn debit(
    conn: &Connection,
    user_id: UserId,
    item_id: ItemId,
    owned: i64,
    quantity: i64,
) -> rusqlite::Result<()> {
    if owned == quantity {
        conn.execute(
            "DELETE FROM inventory WHERE user_id = ? AND item_id = ?",
            params![user_id, item_id],
        )?;
    } else {
        conn.execute(
            "UPDATE inventory SET quantity = quantity - ? WHERE user_id = ? AND item_id = ?",
            params![quantity, user_id, item_id],
        )?;
    }
    Ok(())
}

fn transfer(
    tx: &Transaction<'_>,
    from: UserId,
    to: UserId,
    item_id: ItemId,
    quantity: i64,
) -> std::result::Result<(), SettlementError> {
    let tradeable: Option<bool> = tx
        .query_row(
            "SELECT tradeable FROM items WHERE id = ?",
            params![item_id],
            |row| row.get(0),
        )
        .optional()?;
    if tradeable != Some(true) {
        return Err(SettlementError::ItemNotTradeable(item_id));
    }

    let owned = held_quantity(tx, from, item_id)?;
    if quantity <= 0 || owned < quantity {
        return Err(SettlementError::InsufficientQuantity {
            user_id: from,
            item_id,
            owned,
            requested: quantity,
        });
    }

    debit(tx, from, item_id, owned, quantity)?;
    credit(tx, to, item_id, quantity)?;
    Ok(())
}

fn trade_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRecord> {
    let created_at: String = row.get(4)?;
    Ok(TradeRecord {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: TradeStatus::Completed,
        is_live_trade: row.get(3)?,
        lines: Vec::new(),
        created_at: parse_timestamp(&created_at),
    })
}

fn trade_lines(conn: &Connection, trade_id: i64) -> Result<Vec<TradeLine>> {
    let mut stmt = conn
        .prepare(
            "SELECT side, item_id, quantity FROM trade_items
            WHERE trade_id = ?
            ORDER BY rowid",
        )
        .context("Failed to prepare statement")
        .map_err(|e| TradepostError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(params![trade_id], |row| {
            let side: String = row.get(0)?;
            Ok((side, row.get::<_, ItemId>(1)?, row.get::<_, i64>(2)?))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .context("Failed to query trade items")
        .map_err(|e| TradepostError::Storage(e.to_string()))?;

    rows.into_iter()
        .map(|(side, item_id, quantity)| -> Result<TradeLine> {
            let side = TradeSide::parse(&side).ok_or_else(|| {
                TradepostError::Storage(format!("Unknown trade side '{}'", side))
            })?;
            Ok(TradeLine {
                side,
                item_id,
                quantity,
            })
        })
        .collect()
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
