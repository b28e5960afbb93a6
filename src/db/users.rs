use super::schema::{enum_column, json_column, like_pattern, to_json, write_error};
use crate::db::*;
use crate::error::Result;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::collections::BTreeSet;

const USER_COLUMNS: &str = "id, external_id, name, email, picture, roles_json, cart_json, \
                            wishlist_json, status, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        picture: row.get(4)?,
        roles: json_column(row, 5)?,
        cart: json_column(row, 6)?,
        wishlist: json_column(row, 7)?,
        status: enum_column(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl Database {
    // ========== USER OPERATIONS ==========

    /// Insert a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let roles = to_json(&user.roles)?;
        let cart = to_json(&user.cart)?;
        let wishlist = to_json(&user.wishlist)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, external_id, name, email, picture, roles_json, cart_json,
                                wishlist_json, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user.id,
                user.external_id,
                user.name,
                user.email,
                user.picture,
                roles,
                cart,
                wishlist,
                user.status.as_str(),
                user.created_at,
                user.updated_at,
            ],
        )
        .map_err(|e| write_error(&format!("User '{}'", user.external_id), e))?;
        Ok(())
    }

    /// Get user by local ID.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by identity-provider ID.
    pub fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE external_id = ?1", USER_COLUMNS),
                params![external_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by local or identity-provider ID.
    pub fn find_user(&self, id: &str) -> Result<Option<User>> {
        match self.get_user(id)? {
            Some(user) => Ok(Some(user)),
            None => self.get_user_by_external_id(id),
        }
    }

    /// List users ordered by name, optionally filtered by a name/email substring.
    pub fn list_users(&self, query: Option<&str>, limit: u32, offset: u32) -> Result<(Vec<User>, u64)> {
        let mut clause = String::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            clause.push_str(" WHERE name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'");
            values.push(Value::Text(like_pattern(q.trim())));
        }

        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users{}", clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM users{} ORDER BY name COLLATE NOCASE, id LIMIT {} OFFSET {}",
            USER_COLUMNS, clause, limit, offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(values.iter()), user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((users, total as u64))
    }

    /// Update name, email and picture.
    pub fn update_user_profile(&self, user: &User) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET name = ?1, email = ?2, picture = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![user.name, user.email, user.picture, now_timestamp(), user.id],
            )
            .map_err(|e| write_error(&format!("Email '{}'", user.email), e))?;
        Ok(rows > 0)
    }

    /// Overwrite a user's cart and wishlist.
    pub fn save_user_lists(&self, user_id: &str, cart: &[CartItem], wishlist: &[String]) -> Result<bool> {
        let cart = to_json(&cart)?;
        let wishlist = to_json(&wishlist)?;

        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET cart_json = ?1, wishlist_json = ?2, updated_at = ?3 WHERE id = ?4",
            params![cart, wishlist, now_timestamp(), user_id],
        )?;
        Ok(rows > 0)
    }

    /// Replace a user's roles.
    pub fn set_user_roles(&self, user_id: &str, roles: &BTreeSet<Role>) -> Result<bool> {
        let roles = to_json(roles)?;

        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET roles_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![roles, now_timestamp(), user_id],
        )?;
        Ok(rows > 0)
    }

    /// Set a user's account status.
    pub fn set_user_status(&self, user_id: &str, status: AccountStatus) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE users SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_timestamp(), user_id],
        )?;
        Ok(rows > 0)
    }

    /// Delete user.
    pub fn delete_user(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(rows > 0)
    }

    /// Number of users.
    pub fn count_users(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
