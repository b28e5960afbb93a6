use super::schema::{json_column, to_json, write_error};
use crate::db::*;
use crate::error::Result;
use rusqlite::{OptionalExtension, Row, params};

const REVIEW_COLUMNS: &str =
    "id, book_id, user_id, rating, content, upvoters_json, downvoters_json, created_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        book_id: row.get(1)?,
        user_id: row.get(2)?,
        rating: row.get(3)?,
        content: row.get(4)?,
        upvoters: json_column(row, 5)?,
        downvoters: json_column(row, 6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    // ========== REVIEW OPERATIONS ==========

    /// Insert a review. A second review by the same user on the same book conflicts.
    pub fn create_review(&self, review: &Review) -> Result<()> {
        let upvoters = to_json(&review.upvoters)?;
        let downvoters = to_json(&review.downvoters)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reviews (id, book_id, user_id, rating, content, upvoters_json,
                                  downvoters_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                review.id,
                review.book_id,
                review.user_id,
                review.rating,
                review.content,
                upvoters,
                downvoters,
                review.created_at,
            ],
        )
        .map_err(|e| write_error("A review by this user for this book", e))?;
        Ok(())
    }

    /// Get review by ID.
    pub fn get_review(&self, id: &str) -> Result<Option<Review>> {
        let conn = self.conn.lock();
        let review = conn
            .query_row(
                &format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS),
                params![id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    /// Review left by a user on a book, if any.
    pub fn get_user_review_for_book(&self, user_id: &str, book_id: &str) -> Result<Option<Review>> {
        let conn = self.conn.lock();
        let review = conn
            .query_row(
                &format!(
                    "SELECT {} FROM reviews WHERE user_id = ?1 AND book_id = ?2",
                    REVIEW_COLUMNS
                ),
                params![user_id, book_id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    /// Reviews of a book, newest first.
    pub fn get_book_reviews(&self, book_id: &str) -> Result<Vec<Review>> {
        self.reviews_where("book_id = ?1", book_id)
    }

    /// Reviews written by a user, newest first.
    pub fn get_user_reviews(&self, user_id: &str) -> Result<Vec<Review>> {
        self.reviews_where("user_id = ?1", user_id)
    }

    fn reviews_where(&self, condition: &str, value: &str) -> Result<Vec<Review>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reviews WHERE {} ORDER BY created_at DESC, id",
            REVIEW_COLUMNS, condition
        ))?;
        let reviews = stmt
            .query_map(params![value], review_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    /// Toggle a user's vote on a review.
    ///
    /// Read and write happen under one lock acquisition, so concurrent votes on the
    /// same review are applied one after the other.
    pub fn toggle_review_vote(
        &self,
        id: &str,
        user_id: &str,
        direction: VoteDirection,
    ) -> Result<Option<Review>> {
        let conn = self.conn.lock();
        let review = conn
            .query_row(
                &format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS),
                params![id],
                review_from_row,
            )
            .optional()?;

        let Some(mut review) = review else {
            return Ok(None);
        };

        review.apply_vote(user_id, direction);
        let upvoters = to_json(&review.upvoters)?;
        let downvoters = to_json(&review.downvoters)?;

        conn.execute(
            "UPDATE reviews SET upvoters_json = ?1, downvoters_json = ?2 WHERE id = ?3",
            params![upvoters, downvoters, review.id],
        )?;
        Ok(Some(review))
    }

    /// Delete review.
    pub fn delete_review(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM reviews WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
