//! Cart actions.
//!
//! Each operation re-reads the user's lists, edits them and writes them back whole;
//! concurrent edits from the same user resolve last write wins.

use super::books::get_book;
use crate::config::StoreConfig;
use crate::db::{Book, CartItem, Database, User};
use crate::error::{AppError, Result};
use crate::pricing::{OrderTotals, subtotal_of};
use crate::validation::{CartItemInput, QuantityInput, validate_payload};
use serde::Serialize;
use std::collections::HashMap;

/// Priced cart line.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    /// The book.
    pub book: Book,
    /// Quantity.
    pub quantity: u32,
    /// `price × quantity`.
    pub line_total: i64,
}

/// Cart contents with totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    /// Lines whose book still exists.
    pub items: Vec<CartLine>,
    /// Sum of quantities.
    pub item_count: u32,
    /// Priced totals.
    pub totals: OrderTotals,
}

/// Fresh copy of the user record.
pub(super) fn reload(db: &Database, user_id: &str) -> Result<User> {
    db.get_user(user_id)?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", user_id)))
}

/// Add a book to the cart, or increase its quantity.
pub fn add_to_cart(db: &Database, user_id: &str, input: &CartItemInput) -> Result<Vec<CartItem>> {
    validate_payload(input)?;
    get_book(db, &input.book_id)?;
    let quantity = positive_quantity(input.quantity)?;

    let mut user = reload(db, user_id)?;
    add_line(&mut user.cart, &input.book_id, quantity);
    db.save_user_lists(&user.id, &user.cart, &user.wishlist)?;
    Ok(user.cart)
}

/// Set a cart line's quantity. Quantities below 1 are rejected without a write.
pub fn update_cart_quantity(
    db: &Database,
    user_id: &str,
    book_id: &str,
    input: &QuantityInput,
) -> Result<Vec<CartItem>> {
    validate_payload(input)?;
    let quantity = positive_quantity(input.quantity)?;

    let mut user = reload(db, user_id)?;
    let line = user
        .cart
        .iter_mut()
        .find(|item| item.book_id == book_id)
        .ok_or_else(|| AppError::NotFound(format!("Book '{}' is not in the cart", book_id)))?;
    line.quantity = quantity;

    db.save_user_lists(&user.id, &user.cart, &user.wishlist)?;
    Ok(user.cart)
}

/// Remove a book from the cart.
pub fn remove_from_cart(db: &Database, user_id: &str, book_id: &str) -> Result<Vec<CartItem>> {
    let mut user = reload(db, user_id)?;
    let before = user.cart.len();
    user.cart.retain(|item| item.book_id != book_id);

    if user.cart.len() == before {
        return Err(AppError::NotFound(format!(
            "Book '{}' is not in the cart",
            book_id
        )));
    }

    db.save_user_lists(&user.id, &user.cart, &user.wishlist)?;
    Ok(user.cart)
}

/// Empty the cart.
pub fn clear_cart(db: &Database, user_id: &str) -> Result<()> {
    let user = reload(db, user_id)?;
    db.save_user_lists(&user.id, &[], &user.wishlist)?;
    Ok(())
}

/// Resolve and price the user's cart. Lines for deleted books are left out.
pub fn cart_summary(db: &Database, store: &StoreConfig, user: &User) -> Result<CartSummary> {
    let user = reload(db, &user.id)?;
    let ids: Vec<String> = user.cart.iter().map(|item| item.book_id.clone()).collect();
    let mut books: HashMap<String, Book> = db
        .get_books_by_ids(&ids)?
        .into_iter()
        .map(|book| (book.id.clone(), book))
        .collect();

    let items: Vec<CartLine> = user
        .cart
        .iter()
        .filter_map(|item| {
            books.remove(&item.book_id).map(|book| CartLine {
                line_total: book.price.saturating_mul(i64::from(item.quantity)),
                book,
                quantity: item.quantity,
            })
        })
        .collect();

    let subtotal = subtotal_of(items.iter().map(|line| (line.book.price, line.quantity)))?;

    Ok(CartSummary {
        item_count: items.iter().map(|line| line.quantity).sum(),
        totals: OrderTotals::compute(subtotal, store)?,
        items,
    })
}

/// Add `quantity` of a book to a cart, merging with an existing line.
pub(super) fn add_line(cart: &mut Vec<CartItem>, book_id: &str, quantity: u32) {
    match cart.iter_mut().find(|item| item.book_id == book_id) {
        Some(line) => line.quantity = line.quantity.saturating_add(quantity),
        None => cart.push(CartItem {
            book_id: book_id.to_string(),
            quantity,
        }),
    }
}

pub(super) fn positive_quantity(quantity: i64) -> Result<u32> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| AppError::Validation("quantity: must be at least 1".into()))
}
