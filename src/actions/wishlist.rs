//! Wishlist actions.

use super::books::get_book;
use super::cart::{add_line, reload};
use crate::db::{Book, CartItem, Database};
use crate::error::{AppError, Result};

/// Add a book to the wishlist. Adding it again changes nothing.
pub fn add_to_wishlist(db: &Database, user_id: &str, book_id: &str) -> Result<Vec<String>> {
    get_book(db, book_id)?;

    let mut user = reload(db, user_id)?;
    if user.wishlist.iter().any(|id| id == book_id) {
        return Ok(user.wishlist);
    }

    user.wishlist.push(book_id.to_string());
    db.save_user_lists(&user.id, &user.cart, &user.wishlist)?;
    Ok(user.wishlist)
}

/// Remove a book from the wishlist.
pub fn remove_from_wishlist(db: &Database, user_id: &str, book_id: &str) -> Result<Vec<String>> {
    let mut user = reload(db, user_id)?;
    let before = user.wishlist.len();
    user.wishlist.retain(|id| id != book_id);

    if user.wishlist.len() == before {
        return Err(AppError::NotFound(format!(
            "Book '{}' is not in the wishlist",
            book_id
        )));
    }

    db.save_user_lists(&user.id, &user.cart, &user.wishlist)?;
    Ok(user.wishlist)
}

/// Wishlisted books in wishlist order. Deleted books are left out.
pub fn wishlist_books(db: &Database, user_id: &str) -> Result<Vec<Book>> {
    let user = reload(db, user_id)?;
    let mut books = db.get_books_by_ids(&user.wishlist)?;
    books.sort_by_key(|book| user.wishlist.iter().position(|id| *id == book.id));
    Ok(books)
}

/// Add every wishlisted book to the cart with quantity 1, then empty the wishlist.
pub fn move_wishlist_to_cart(db: &Database, user_id: &str) -> Result<Vec<CartItem>> {
    let mut user = reload(db, user_id)?;
    let existing: Vec<String> = db
        .get_books_by_ids(&user.wishlist)?
        .into_iter()
        .map(|book| book.id)
        .collect();

    for book_id in user.wishlist.iter().filter(|id| existing.contains(id)) {
        add_line(&mut user.cart, book_id, 1);
    }
    user.wishlist.clear();

    db.save_user_lists(&user.id, &user.cart, &user.wishlist)?;
    tracing::debug!(user_id = %user.id, moved = existing.len(), "Wishlist moved to cart");
    Ok(user.cart)
}
