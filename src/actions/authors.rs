//! Author actions.

use super::books::BOOK_SORTS;
use super::{ListQuery, Page, found};
use crate::config::StoreConfig;
use crate::db::{Author, Award, Book, BookFilter, Database, new_id, now_timestamp};
use crate::error::{AppError, Result};
use crate::validation::{AuthorInput, validate_payload};

/// Sortable author fields.
pub const AUTHOR_SORTS: &[&str] = &["name", "created_at"];

/// Paginated author listing.
pub fn list_authors(db: &Database, store: &StoreConfig, query: &ListQuery) -> Result<Page<Author>> {
    let paging = query.paging(store);
    let (sort, descending) = query.sort(AUTHOR_SORTS)?;
    let genre = query.genre.as_deref().map(str::trim).filter(|g| !g.is_empty());

    let (items, total) = db.query_authors(
        query.text(),
        genre,
        query.featured,
        sort,
        descending,
        paging.limit,
        paging.offset,
    )?;
    Ok(Page::new(items, paging, total))
}

/// Get an author by ID.
pub fn get_author(db: &Database, id: &str) -> Result<Author> {
    found(db.get_author(id)?, "Author", id)
}

/// Books written by an author.
pub fn books_by_author(
    db: &Database,
    store: &StoreConfig,
    id: &str,
    query: &ListQuery,
) -> Result<Page<Book>> {
    get_author(db, id)?;

    let paging = query.paging(store);
    let (sort, descending) = query.sort(BOOK_SORTS)?;
    let filter = BookFilter {
        author_id: Some(id.to_string()),
        sort,
        descending,
        ..Default::default()
    };

    let (items, total) = db.query_books(&filter, paging.limit, paging.offset)?;
    Ok(Page::new(items, paging, total))
}

/// Create an author.
pub fn create_author(db: &Database, input: &AuthorInput) -> Result<Author> {
    validate_payload(input)?;

    let now = now_timestamp();
    let author = Author {
        id: new_id(),
        created_at: now,
        updated_at: now,
        ..author_fields(input)
    };

    db.create_author(&author)?;
    tracing::info!(author_id = %author.id, name = %author.name, "Author created");
    Ok(author)
}

/// Replace an author's fields.
pub fn update_author(db: &Database, id: &str, input: &AuthorInput) -> Result<Author> {
    validate_payload(input)?;
    let existing = get_author(db, id)?;

    let author = Author {
        id: existing.id,
        created_at: existing.created_at,
        updated_at: now_timestamp(),
        ..author_fields(input)
    };

    if !db.update_author(&author)? {
        return Err(AppError::NotFound(format!("Author '{}' not found", id)));
    }
    tracing::info!(author_id = %author.id, "Author updated");
    Ok(author)
}

/// Delete an author that no book references.
pub fn delete_author(db: &Database, id: &str) -> Result<()> {
    get_author(db, id)?;

    let books = db.count_books_by_author(id)?;
    if books > 0 {
        return Err(AppError::Conflict(format!(
            "Author '{}' is referenced by {} book(s)",
            id, books
        )));
    }

    db.delete_author(id)?;
    tracing::info!(author_id = %id, "Author deleted");
    Ok(())
}

fn author_fields(input: &AuthorInput) -> Author {
    Author {
        id: String::new(),
        name: input.name.clone(),
        biography: input.biography.clone(),
        images: input.images.clone(),
        birth_date: input.birth_date.clone(),
        death_date: input.death_date.clone(),
        birth_place: input.birth_place.clone(),
        website: input.website.clone(),
        email: input.email.clone(),
        genres: input.genres.clone(),
        awards: input.awards.iter().map(Award::from).collect(),
        featured: input.featured,
        created_at: 0,
        updated_at: 0,
    }
}
