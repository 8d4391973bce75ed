//! Database connection and schema management.

use rusqlite::Connection;
use tracing::info;

use crate::storage::error::StorageResult;

/// Database connection wrapper.
///
/// Manages the SQLite connection and schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the specified path, creating the schema if needed.
    ///
    /// `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open(path: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Gets a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Creates the run, params and metric tables.
    ///
    /// Metrics and params reference their run with `ON DELETE CASCADE`.
    /// Epoch uniqueness is checked inside the insert transaction, so the metric
    /// tables carry no unique constraint on `(run_id, epoch)`.
    fn init_schema(&self) -> StorageResult<()> {
        info!("Initializing database schema");

        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS training_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_type TEXT NOT NULL,
                name TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS training_params (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL UNIQUE,
                batch_size INTEGER NOT NULL,
                epochs INTEGER NOT NULL,
                learning_rate REAL NOT NULL,
                dataset_path TEXT,
                pretrained_weight_path TEXT,
                FOREIGN KEY (run_id) REFERENCES training_runs(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS zone_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                epoch INTEGER NOT NULL,
                train_box_loss REAL NOT NULL,
                train_obj_loss REAL NOT NULL,
                train_cls_loss REAL NOT NULL,
                val_box_loss REAL NOT NULL,
                val_obj_loss REAL NOT NULL,
                val_cls_loss REAL NOT NULL,
                metric_precision REAL NOT NULL,
                metric_recall REAL NOT NULL,
                results_path TEXT,
                confusion_matrix_path TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES training_runs(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS text_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL,
                epoch INTEGER NOT NULL,
                train_loss REAL NOT NULL,
                val_loss REAL NOT NULL,
                train_accuracy REAL NOT NULL,
                val_accuracy REAL NOT NULL,
                character_error_rate REAL NOT NULL,
                word_error_rate REAL NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (run_id) REFERENCES training_runs(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_training_runs_user_id ON training_runs(user_id)",
            [],
        )?;

        self.conn
            .execute("CREATE INDEX IF NOT EXISTS idx_zone_metrics_run_id ON zone_metrics(run_id)", [])?;

        self.conn
            .execute("CREATE INDEX IF NOT EXISTS idx_text_metrics_run_id ON text_metrics(run_id)", [])?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    /// Runs a transaction with the provided closure.
    ///
    /// Commits when the closure returns `Ok`, rolls back otherwise.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the transaction fails
    pub fn transaction<F, R>(&mut self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> StorageResult<R>,
    {
        let tx = self.conn.transaction()?;
        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }
}
