//! Review and voting actions.

use super::books::get_book;
use super::found;
use crate::db::{Database, Review, User, VoteDirection, new_id, now_timestamp};
use crate::error::{AppError, Result};
use crate::validation::{ReviewInput, validate_payload};
use serde::Serialize;
use std::collections::BTreeSet;

/// Aggregate of a book's ratings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    /// Number of reviews.
    pub count: usize,
    /// Mean rating, absent without reviews.
    pub average: Option<f64>,
    /// Review count per rating, index 0 is one star.
    pub distribution: [usize; 5],
}

impl RatingSummary {
    /// Summarize a set of reviews.
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mut distribution = [0usize; 5];
        for review in reviews {
            if let Some(slot) = distribution.get_mut(usize::from(review.rating).saturating_sub(1)) {
                *slot += 1;
            }
        }

        let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
        let average = if reviews.is_empty() {
            None
        } else {
            Some(f64::from(sum) / reviews.len() as f64)
        };

        Self {
            count: reviews.len(),
            average,
            distribution,
        }
    }
}

/// Reviews of a book, newest first, with their summary.
#[derive(Debug, Clone, Serialize)]
pub struct BookReviews {
    /// Rating summary.
    pub summary: RatingSummary,
    /// Reviews, newest first.
    pub reviews: Vec<Review>,
}

/// A review as seen by a voter: public counts plus the caller's own vote.
#[derive(Debug, Clone, Serialize)]
pub struct VotedReview {
    /// The review.
    #[serde(flatten)]
    pub review: Review,
    /// The caller's vote after the toggle.
    pub my_vote: Option<VoteDirection>,
}

/// Reviews of an existing book.
pub fn book_reviews(db: &Database, book_id: &str) -> Result<BookReviews> {
    get_book(db, book_id)?;
    let reviews = db.get_book_reviews(book_id)?;

    Ok(BookReviews {
        summary: RatingSummary::from_reviews(&reviews),
        reviews,
    })
}

/// Review a book. One review per user per book.
pub fn create_review(db: &Database, user: &User, book_id: &str, input: &ReviewInput) -> Result<Review> {
    validate_payload(input)?;
    get_book(db, book_id)?;

    if db.get_user_review_for_book(&user.id, book_id)?.is_some() {
        return Err(AppError::Conflict("You have already reviewed this book".into()));
    }

    let rating = u8::try_from(input.rating)
        .map_err(|_| AppError::Validation("rating: must be between 1 and 5".into()))?;

    let review = Review {
        id: new_id(),
        book_id: book_id.to_string(),
        user_id: user.id.clone(),
        rating,
        content: input.content.trim().to_string(),
        upvoters: BTreeSet::new(),
        downvoters: BTreeSet::new(),
        created_at: now_timestamp(),
    };

    db.create_review(&review)?;
    tracing::info!(review_id = %review.id, book_id = %book_id, user_id = %user.id, "Review created");
    Ok(review)
}

/// Delete a review. Only its author or an admin may do so.
pub fn delete_review(db: &Database, user: &User, id: &str) -> Result<()> {
    let review = found(db.get_review(id)?, "Review", id)?;

    if review.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only the author or an admin can delete this review".into(),
        ));
    }

    db.delete_review(id)?;
    tracing::info!(review_id = %id, user_id = %user.id, "Review deleted");
    Ok(())
}

/// Toggle the user's vote on a review.
pub fn vote(db: &Database, user: &User, id: &str, direction: VoteDirection) -> Result<VotedReview> {
    let review = found(db.toggle_review_vote(id, &user.id, direction)?, "Review", id)?;
    let my_vote = review.vote_of(&user.id);
    Ok(VotedReview { review, my_vote })
}
