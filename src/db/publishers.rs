use super::schema::{json_column, like_pattern, order_by, to_json};
use crate::db::*;
use crate::error::Result;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

const PUBLISHER_COLUMNS: &str = "id, name, logo, description, long_description, founded_year, \
                                 headquarters, website, email, phone, imprints_json, featured, \
                                 created_at, updated_at";

fn publisher_from_row(row: &Row<'_>) -> rusqlite::Result<Publisher> {
    Ok(Publisher {
        id: row.get(0)?,
        name: row.get(1)?,
        logo: row.get(2)?,
        description: row.get(3)?,
        long_description: row.get(4)?,
        founded_year: row.get(5)?,
        headquarters: row.get(6)?,
        website: row.get(7)?,
        email: row.get(8)?,
        phone: row.get(9)?,
        imprints: json_column(row, 10)?,
        featured: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl Database {
    // ========== PUBLISHER OPERATIONS ==========

    /// Insert a publisher.
    pub fn create_publisher(&self, publisher: &Publisher) -> Result<()> {
        let imprints = to_json(&publisher.imprints)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO publishers (id, name, logo, description, long_description, founded_year,
                                     headquarters, website, email, phone, imprints_json, featured,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                publisher.id,
                publisher.name,
                publisher.logo,
                publisher.description,
                publisher.long_description,
                publisher.founded_year,
                publisher.headquarters,
                publisher.website,
                publisher.email,
                publisher.phone,
                imprints,
                publisher.featured,
                publisher.created_at,
                publisher.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Replace every editable field of a publisher.
    pub fn update_publisher(&self, publisher: &Publisher) -> Result<bool> {
        let imprints = to_json(&publisher.imprints)?;

        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE publishers SET name = ?1, logo = ?2, description = ?3, long_description = ?4,
                    founded_year = ?5, headquarters = ?6, website = ?7, email = ?8, phone = ?9,
                    imprints_json = ?10, featured = ?11, updated_at = ?12
             WHERE id = ?13",
            params![
                publisher.name,
                publisher.logo,
                publisher.description,
                publisher.long_description,
                publisher.founded_year,
                publisher.headquarters,
                publisher.website,
                publisher.email,
                publisher.phone,
                imprints,
                publisher.featured,
                publisher.updated_at,
                publisher.id,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Get publisher by ID.
    pub fn get_publisher(&self, id: &str) -> Result<Option<Publisher>> {
        let conn = self.conn.lock();
        let publisher = conn
            .query_row(
                &format!("SELECT {} FROM publishers WHERE id = ?1", PUBLISHER_COLUMNS),
                params![id],
                publisher_from_row,
            )
            .optional()?;
        Ok(publisher)
    }

    /// Filtered, sorted page of publishers plus the total match count.
    ///
    /// `sort` must already be a whitelisted column name.
    pub fn query_publishers(
        &self,
        query: Option<&str>,
        featured: Option<bool>,
        sort: &str,
        descending: bool,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Publisher>, u64)> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            values.push(Value::Text(like_pattern(q)));
            let n = values.len();
            conditions.push(format!(
                "(name LIKE ?{n} ESCAPE '\\' OR headquarters LIKE ?{n} ESCAPE '\\')"
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
            &format!("SELECT COUNT(*) FROM publishers{}", clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM publishers{} ORDER BY {}, id LIMIT {} OFFSET {}",
            PUBLISHER_COLUMNS, clause, order, limit, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let publishers = stmt
            .query_map(params_from_iter(values.iter()), publisher_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((publishers, total as u64))
    }

    /// Delete publisher.
    pub fn delete_publisher(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM publishers WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Number of publishers.
    pub fn count_publishers(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM publishers", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
