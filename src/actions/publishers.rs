//! Publisher actions.

use super::books::BOOK_SORTS;
use super::{ListQuery, Page, found};
use crate::config::StoreConfig;
use crate::db::{Book, BookFilter, Database, Publisher, new_id, now_timestamp};
use crate::error::{AppError, Result};
use crate::validation::{PublisherInput, validate_payload};

/// Sortable publisher fields.
pub const PUBLISHER_SORTS: &[&str] = &["name", "founded_year", "created_at"];

/// Paginated publisher listing.
pub fn list_publishers(
    db: &Database,
    store: &StoreConfig,
    query: &ListQuery,
) -> Result<Page<Publisher>> {
    let paging = query.paging(store);
    let (sort, descending) = query.sort(PUBLISHER_SORTS)?;

    let (items, total) = db.query_publishers(
        query.text(),
        query.featured,
        sort,
        descending,
        paging.limit,
        paging.offset,
    )?;
    Ok(Page::new(items, paging, total))
}

/// Get a publisher by ID.
pub fn get_publisher(db: &Database, id: &str) -> Result<Publisher> {
    found(db.get_publisher(id)?, "Publisher", id)
}

/// Books released by a publisher.
pub fn books_by_publisher(
    db: &Database,
    store: &StoreConfig,
    id: &str,
    query: &ListQuery,
) -> Result<Page<Book>> {
    get_publisher(db, id)?;

    let paging = query.paging(store);
    let (sort, descending) = query.sort(BOOK_SORTS)?;
    let filter = BookFilter {
        publisher_id: Some(id.to_string()),
        sort,
        descending,
        ..Default::default()
    };

    let (items, total) = db.query_books(&filter, paging.limit, paging.offset)?;
    Ok(Page::new(items, paging, total))
}

/// Create a publisher.
pub fn create_publisher(db: &Database, input: &PublisherInput) -> Result<Publisher> {
    validate_payload(input)?;

    let now = now_timestamp();
    let publisher = Publisher {
        id: new_id(),
        created_at: now,
        updated_at: now,
        ..publisher_fields(input)
    };

    db.create_publisher(&publisher)?;
    tracing::info!(publisher_id = %publisher.id, name = %publisher.name, "Publisher created");
    Ok(publisher)
}

/// Replace a publisher's fields.
pub fn update_publisher(db: &Database, id: &str, input: &PublisherInput) -> Result<Publisher> {
    validate_payload(input)?;
    let existing = get_publisher(db, id)?;

    let publisher = Publisher {
        id: existing.id,
        created_at: existing.created_at,
        updated_at: now_timestamp(),
        ..publisher_fields(input)
    };

    if !db.update_publisher(&publisher)? {
        return Err(AppError::NotFound(format!("Publisher '{}' not found", id)));
    }
    tracing::info!(publisher_id = %publisher.id, "Publisher updated");
    Ok(publisher)
}

/// Delete a publisher that no book references.
pub fn delete_publisher(db: &Database, id: &str) -> Result<()> {
    get_publisher(db, id)?;

    let books = db.count_books_by_publisher(id)?;
    if books > 0 {
        return Err(AppError::Conflict(format!(
            "Publisher '{}' is referenced by {} book(s)",
            id, books
        )));
    }

    db.delete_publisher(id)?;
    tracing::info!(publisher_id = %id, "Publisher deleted");
    Ok(())
}

fn publisher_fields(input: &PublisherInput) -> Publisher {
    Publisher {
        id: String::new(),
        name: input.name.clone(),
        logo: input.logo.clone(),
        description: input.description.clone(),
        long_description: input.long_description.clone(),
        founded_year: input.founded_year,
        headquarters: input.headquarters.clone(),
        website: input.website.clone(),
        email: input.email.clone(),
        phone: input.phone.clone(),
        imprints: input.imprints.clone(),
        featured: input.featured,
        created_at: 0,
        updated_at: 0,
    }
}
