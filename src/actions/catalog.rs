//! Storefront views over books, authors and publishers.

use super::books::get_book;
use super::featured_limit;
use super::reviews::RatingSummary;
use crate::config::StoreConfig;
use crate::db::{Author, Book, BookFilter, Database, Publisher};
use crate::error::Result;
use serde::Serialize;

/// Book page: the book with its resolved references and rating.
#[derive(Debug, Clone, Serialize)]
pub struct BookDetail {
    /// The book.
    pub book: Book,
    /// Author, if the reference still resolves.
    pub author: Option<Author>,
    /// Publisher, if the reference still resolves.
    pub publisher: Option<Publisher>,
    /// Review summary.
    pub rating: RatingSummary,
}

/// Book with author, publisher and rating summary.
pub fn book_detail(db: &Database, id: &str) -> Result<BookDetail> {
    let book = get_book(db, id)?;
    let author = db.get_author(&book.author_id)?;
    let publisher = db.get_publisher(&book.publisher_id)?;
    let rating = RatingSummary::from_reviews(&db.get_book_reviews(&book.id)?);

    Ok(BookDetail {
        book,
        author,
        publisher,
        rating,
    })
}

/// Featured books, newest first.
pub fn featured_books(db: &Database, store: &StoreConfig, limit: Option<u32>) -> Result<Vec<Book>> {
    let filter = BookFilter {
        featured: Some(true),
        sort: "created_at",
        descending: true,
        ..Default::default()
    };
    let (books, _) = db.query_books(&filter, featured_limit(limit, store), 0)?;
    Ok(books)
}

/// Featured authors, by name.
pub fn featured_authors(
    db: &Database,
    store: &StoreConfig,
    limit: Option<u32>,
) -> Result<Vec<Author>> {
    let (authors, _) = db.query_authors(
        None,
        None,
        Some(true),
        "name",
        false,
        featured_limit(limit, store),
        0,
    )?;
    Ok(authors)
}

/// Featured publishers, by name.
pub fn featured_publishers(
    db: &Database,
    store: &StoreConfig,
    limit: Option<u32>,
) -> Result<Vec<Publisher>> {
    let (publishers, _) =
        db.query_publishers(None, Some(true), "name", false, featured_limit(limit, store), 0)?;
    Ok(publishers)
}

/// Distinct book categories, sorted.
pub fn book_categories(db: &Database) -> Result<Vec<String>> {
    db.book_categories()
}
