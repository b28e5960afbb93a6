//! Book catalog actions.

use super::{ListQuery, Page, found};
use crate::config::StoreConfig;
use crate::db::{Book, BookFilter, Database, new_id, now_timestamp};
use crate::error::{AppError, Result};
use crate::validation::{BookInput, validate_payload};

/// Sortable book fields.
pub const BOOK_SORTS: &[&str] = &["title", "price", "publish_date", "created_at", "stock"];

/// Paginated, filtered book listing.
pub fn list_books(db: &Database, store: &StoreConfig, query: &ListQuery) -> Result<Page<Book>> {
    let paging = query.paging(store);
    let (sort, descending) = query.sort(BOOK_SORTS)?;

    let filter = BookFilter {
        query: query.text().map(str::to_string),
        category: query.category.clone().filter(|c| !c.trim().is_empty()),
        author_id: query.author_id.clone(),
        publisher_id: query.publisher_id.clone(),
        featured: query.featured,
        sort,
        descending,
    };

    let (items, total) = db.query_books(&filter, paging.limit, paging.offset)?;
    Ok(Page::new(items, paging, total))
}

/// Get a book by ID.
pub fn get_book(db: &Database, id: &str) -> Result<Book> {
    found(db.get_book(id)?, "Book", id)
}

/// Create a book from an admin payload.
pub fn create_book(db: &Database, input: &BookInput) -> Result<Book> {
    validate_payload(input)?;
    check_references(db, input)?;

    let now = now_timestamp();
    let book = Book {
        id: new_id(),
        created_at: now,
        updated_at: now,
        ..book_fields(input)
    };

    db.create_book(&book)?;
    tracing::info!(book_id = %book.id, isbn = %book.isbn, "Book created");
    Ok(book)
}

/// Replace a book's fields.
pub fn update_book(db: &Database, id: &str, input: &BookInput) -> Result<Book> {
    validate_payload(input)?;
    let existing = get_book(db, id)?;
    check_references(db, input)?;

    let book = Book {
        id: existing.id,
        created_at: existing.created_at,
        updated_at: now_timestamp(),
        ..book_fields(input)
    };

    if !db.update_book(&book)? {
        return Err(AppError::NotFound(format!("Book '{}' not found", id)));
    }
    tracing::info!(book_id = %book.id, "Book updated");
    Ok(book)
}

/// Delete a book.
pub fn delete_book(db: &Database, id: &str) -> Result<()> {
    if !db.delete_book(id)? {
        return Err(AppError::NotFound(format!("Book '{}' not found", id)));
    }
    tracing::info!(book_id = %id, "Book deleted");
    Ok(())
}

fn book_fields(input: &BookInput) -> Book {
    Book {
        id: String::new(),
        title: input.title.clone(),
        description: input.description.clone(),
        cover_image: input.cover_image.clone(),
        price: input.price,
        isbn: input.isbn.clone(),
        publish_date: input.publish_date.clone(),
        page_count: input.page_count,
        language: input.language.clone(),
        stock: input.stock,
        featured: input.featured,
        author_id: input.author_id.clone(),
        publisher_id: input.publisher_id.clone(),
        categories: input.categories.clone(),
        created_at: 0,
        updated_at: 0,
    }
}

fn check_references(db: &Database, input: &BookInput) -> Result<()> {
    if db.get_author(&input.author_id)?.is_none() {
        return Err(AppError::Validation(format!(
            "author_id: author '{}' does not exist",
            input.author_id
        )));
    }
    if db.get_publisher(&input.publisher_id)?.is_none() {
        return Err(AppError::Validation(format!(
            "publisher_id: publisher '{}' does not exist",
            input.publisher_id
        )));
    }
    Ok(())
}
