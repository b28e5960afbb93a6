use super::schema::{json_column, like_pattern, order_by, to_json, write_error};
use crate::db::*;
use crate::error::Result;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

const BOOK_COLUMNS: &str = "id, title, description, cover_image, price, isbn, publish_date, \
                            page_count, language, stock, featured, author_id, publisher_id, \
                            categories_json, created_at, updated_at";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        cover_image: row.get(3)?,
        price: row.get(4)?,
        isbn: row.get(5)?,
        publish_date: row.get(6)?,
        page_count: row.get(7)?,
        language: row.get(8)?,
        stock: row.get(9)?,
        featured: row.get(10)?,
        author_id: row.get(11)?,
        publisher_id: row.get(12)?,
        categories: json_column(row, 13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

/// Filter and ordering for book listings.
///
/// `sort` must already be a whitelisted column name.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    /// Substring over title, description and ISBN.
    pub query: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
    /// Author reference.
    pub author_id: Option<String>,
    /// Publisher reference.
    pub publisher_id: Option<String>,
    /// Featured flag.
    pub featured: Option<bool>,
    /// Sort column.
    pub sort: &'static str,
    /// Descending order.
    pub descending: bool,
}

impl BookFilter {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            values.push(Value::Text(like_pattern(q)));
            let n = values.len();
            conditions.push(format!(
                "(title LIKE ?{n} ESCAPE '\\' OR description LIKE ?{n} ESCAPE '\\' \
                 OR isbn LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if let Some(category) = &self.category {
            values.push(Value::Text(category.clone()));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM json_each(books.categories_json) \
                 WHERE json_each.value = ?{} COLLATE NOCASE)",
                values.len()
            ));
        }
        if let Some(author_id) = &self.author_id {
            values.push(Value::Text(author_id.clone()));
            conditions.push(format!("author_id = ?{}", values.len()));
        }
        if let Some(publisher_id) = &self.publisher_id {
            values.push(Value::Text(publisher_id.clone()));
            conditions.push(format!("publisher_id = ?{}", values.len()));
        }
        if let Some(featured) = self.featured {
            values.push(Value::Integer(featured as i64));
            conditions.push(format!("featured = ?{}", values.len()));
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }
}

impl Database {
    // ========== BOOK OPERATIONS ==========

    /// Insert a book.
    pub fn create_book(&self, book: &Book) -> Result<()> {
        let categories = to_json(&book.categories)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (id, title, description, cover_image, price, isbn, publish_date,
                                page_count, language, stock, featured, author_id, publisher_id,
                                categories_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                book.id,
                book.title,
                book.description,
                book.cover_image,
                book.price,
                book.isbn,
                book.publish_date,
                book.page_count,
                book.language,
                book.stock,
                book.featured,
                book.author_id,
                book.publisher_id,
                categories,
                book.created_at,
                book.updated_at,
            ],
        )
        .map_err(|e| write_error(&format!("ISBN '{}'", book.isbn), e))?;
        Ok(())
    }

    /// Replace every editable field of a book.
    pub fn update_book(&self, book: &Book) -> Result<bool> {
        let categories = to_json(&book.categories)?;

        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE books SET title = ?1, description = ?2, cover_image = ?3, price = ?4,
                        isbn = ?5, publish_date = ?6, page_count = ?7, language = ?8, stock = ?9,
                        featured = ?10, author_id = ?11, publisher_id = ?12, categories_json = ?13,
                        updated_at = ?14
                 WHERE id = ?15",
                params![
                    book.title,
                    book.description,
                    book.cover_image,
                    book.price,
                    book.isbn,
                    book.publish_date,
                    book.page_count,
                    book.language,
                    book.stock,
                    book.featured,
                    book.author_id,
                    book.publisher_id,
                    categories,
                    book.updated_at,
                    book.id,
                ],
            )
            .map_err(|e| write_error(&format!("ISBN '{}'", book.isbn), e))?;
        Ok(rows > 0)
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        let book = conn
            .query_row(
                &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
                params![id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    /// Get several books by ID, in no particular order. Missing IDs are skipped.
    pub fn get_books_by_ids(&self, ids: &[String]) -> Result<Vec<Book>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM books WHERE id IN ({})",
            BOOK_COLUMNS, placeholders
        ))?;
        let books = stmt
            .query_map(params_from_iter(ids.iter()), book_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(books)
    }

    /// Filtered, sorted page of books plus the total match count.
    pub fn query_books(&self, filter: &BookFilter, limit: u32, offset: u32) -> Result<(Vec<Book>, u64)> {
        let (clause, values) = filter.where_clause();
        let sort = if filter.sort.is_empty() {
            "created_at"
        } else {
            filter.sort
        };
        let order = order_by(sort, filter.descending);

        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM books{}", clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM books{} ORDER BY {}, id LIMIT {} OFFSET {}",
            BOOK_COLUMNS, clause, order, limit, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let books = stmt
            .query_map(params_from_iter(values.iter()), book_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((books, total as u64))
    }

    /// Delete book.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Decrease stock, never below zero.
    pub fn decrement_stock(&self, id: &str, quantity: u32) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE books SET stock = MAX(stock - ?1, 0), updated_at = ?2 WHERE id = ?3",
            params![quantity as i64, now_timestamp(), id],
        )?;
        Ok(rows > 0)
    }

    /// Distinct categories across the catalog, compared and sorted ignoring case.
    ///
    /// Spellings differing only in case collapse to the one that sorts first bytewise.
    pub fn book_categories(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT MIN(json_each.value) AS category
             FROM books, json_each(books.categories_json)
             GROUP BY json_each.value COLLATE NOCASE
             ORDER BY category COLLATE NOCASE",
        )?;
        let categories = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Number of books referencing an author.
    pub fn count_books_by_author(&self, author_id: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM books WHERE author_id = ?1",
            params![author_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of books referencing a publisher.
    pub fn count_books_by_publisher(&self, publisher_id: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM books WHERE publisher_id = ?1",
            params![publisher_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of books.
    pub fn count_books(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
