use super::schema::{json_column, like_pattern, order_by, to_json};
use crate::db::*;
use crate::error::Result;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

const AUTHOR_COLUMNS: &str = "id, name, biography, images_json, birth_date, death_date, \
                              birth_place, website, email, genres_json, awards_json, featured, \
                              created_at, updated_at";

fn author_from_row(row: &Row<'_>) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        name: row.get(1)?,
        biography: row.get(2)?,
        images: json_column(row, 3)?,
        birth_date: row.get(4)?,
        death_date: row.get(5)?,
        birth_place: row.get(6)?,
        website: row.get(7)?,
        email: row.get(8)?,
        genres: json_column(row, 9)?,
        awards: json_column(row, 10)?,
        featured: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl Database {
    // ========== AUTHOR OPERATIONS ==========

    /// Insert an author.
    pub fn create_author(&self, author: &Author) -> Result<()> {
        let images = to_json(&author.images)?;
        let genres = to_json(&author.genres)?;
        let awards = to_json(&author.awards)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO authors (id, name, biography, images_json, birth_date, death_date,
                                  birth_place, website, email, genres_json, awards_json, featured,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                author.id,
                author.name,
                author.biography,
                images,
                author.birth_date,
                author.death_date,
                author.birth_place,
                author.website,
                author.email,
                genres,
                awards,
                author.featured,
                author.created_at,
                author.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Replace every editable field of an author.
    pub fn update_author(&self, author: &Author) -> Result<bool> {
        let images = to_json(&author.images)?;
        let genres = to_json(&author.genres)?;
        let awards = to_json(&author.awards)?;

        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE authors SET name = ?1, biography = ?2, images_json = ?3, birth_date = ?4,
                    death_date = ?5, birth_place = ?6, website = ?7, email = ?8, genres_json = ?9,
                    awards_json = ?10, featured = ?11, updated_at = ?12
             WHERE id = ?13",
            params![
                author.name,
                author.biography,
                images,
                author.birth_date,
                author.death_date,
                author.birth_place,
                author.website,
                author.email,
                genres,
                awards,
                author.featured,
                author.updated_at,
                author.id,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Get author by ID.
    pub fn get_author(&self, id: &str) -> Result<Option<Author>> {
        let conn = self.conn.lock();
        let author = conn
            .query_row(
                &format!("SELECT {} FROM authors WHERE id = ?1", AUTHOR_COLUMNS),
                params![id],
                author_from_row,
            )
            .optional()?;
        Ok(author)
    }

    /// Filtered, sorted page of authors plus the total match count.
    ///
    /// `sort` must already be a whitelisted column name.
    #[allow(clippy::too_many_arguments)]
    pub fn query_authors(
        &self,
        query: Option<&str>,
        genre: Option<&str>,
        featured: Option<bool>,
        sort: &str,
        descending: bool,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Author>, u64)> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            values.push(Value::Text(like_pattern(q)));
            conditions.push(format!("name LIKE ?{} ESCAPE '\\'", values.len()));
        }
        if let Some(genre) = genre {
            values.push(Value::Text(genre.to_string()));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM json_each(authors.genres_json) \
                 WHERE json_each.value = ?{} COLLATE NOCASE)",
                values.len()
            ));
        }
        if let Some(featured) = featured {
            values.push(Value::Integer(featured as i64));
            conditions.push(format!("featured = ?{}", values.len()));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let order = order_by(sort, descending);

        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM authors{}", clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM authors{} ORDER BY {}, id LIMIT {} OFFSET {}",
            AUTHOR_COLUMNS, clause, order, limit, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let authors = stmt
            .query_map(params_from_iter(values.iter()), author_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((authors, total as u64))
    }

    /// Delete author.
    pub fn delete_author(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM authors WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Number of authors.
    pub fn count_authors(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM authors", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
