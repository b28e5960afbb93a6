use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
///
/// Each entity lives in its own collection table; embedded lists are stored as
/// JSON documents next to the scalar columns.
#[derive(Clone)]
pub struct Database {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        tracing::debug!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Close the database.
    ///
    /// The connection is closed once the last clone of the handle is released.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => mutex
                .into_inner()
                .close()
                .map_err(|(_, e)| AppError::Internal(format!("Failed to close database: {}", e))),
            Err(_) => {
                tracing::debug!("Database handle still shared, deferring close");
                Ok(())
            }
        }
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Users (mirrored from the identity provider)
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                external_id TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                picture TEXT,
                roles_json TEXT NOT NULL DEFAULT '["user"]',
                cart_json TEXT NOT NULL DEFAULT '[]',
                wishlist_json TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'active',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Authors
            CREATE TABLE IF NOT EXISTS authors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                biography TEXT NOT NULL,
                images_json TEXT NOT NULL DEFAULT '[]',
                birth_date TEXT,
                death_date TEXT,
                birth_place TEXT,
                website TEXT,
                email TEXT,
                genres_json TEXT NOT NULL DEFAULT '[]',
                awards_json TEXT NOT NULL DEFAULT '[]',
                featured INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Publishers
            CREATE TABLE IF NOT EXISTS publishers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                logo TEXT,
                description TEXT NOT NULL,
                long_description TEXT,
                founded_year INTEGER,
                headquarters TEXT,
                website TEXT,
                email TEXT,
                phone TEXT,
                imprints_json TEXT NOT NULL DEFAULT '[]',
                featured INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Books (author/publisher references are not enforced)
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                cover_image TEXT,
                price INTEGER NOT NULL,
                isbn TEXT UNIQUE NOT NULL,
                publish_date TEXT,
                page_count INTEGER,
                language TEXT,
                stock INTEGER NOT NULL DEFAULT 0,
                featured INTEGER NOT NULL DEFAULT 0,
                author_id TEXT NOT NULL,
                publisher_id TEXT NOT NULL,
                categories_json TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Orders (never deleted)
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                order_number TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                items_json TEXT NOT NULL,
                status TEXT NOT NULL,
                subtotal INTEGER NOT NULL,
                shipping INTEGER NOT NULL,
                tax INTEGER NOT NULL,
                total INTEGER NOT NULL,
                payment_status TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                payment_intent_id TEXT,
                shipping_address_json TEXT NOT NULL,
                billing_address_json TEXT NOT NULL,
                timeline_json TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Reviews (vote counts are derived from the voter sets)
            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                content TEXT NOT NULL,
                upvoters_json TEXT NOT NULL DEFAULT '[]',
                downvoters_json TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                UNIQUE (user_id, book_id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_author ON books(author_id);
            CREATE INDEX IF NOT EXISTS idx_books_publisher ON books(publisher_id);
            CREATE INDEX IF NOT EXISTS idx_books_featured ON books(featured);
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_book ON reviews(book_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }
}

/// Encode an embedded list or object as a JSON column.
pub(super) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode document: {}", e)))
}

/// Decode a JSON column.
pub(super) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode an enum stored as text.
pub(super) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = AppError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: AppError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a write error, turning unique-constraint violations into conflicts.
pub(super) fn write_error(what: &str, e: rusqlite::Error) -> AppError {
    if e.to_string().contains("UNIQUE constraint") {
        AppError::Conflict(format!("{} already exists", what))
    } else {
        AppError::Database(e)
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern and wrap it for substring matching.
pub(super) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// `ORDER BY` term for a whitelisted column. Text columns sort ignoring case.
pub(super) fn order_by(column: &str, descending: bool) -> String {
    let direction = if descending { "DESC" } else { "ASC" };
    match column {
        "title" | "name" => format!("{} COLLATE NOCASE {}", column, direction),
        _ => format!("{} {}", column, direction),
    }
}
