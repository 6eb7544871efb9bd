//! Cart engine: identity resolution, merge-on-login, line mutations.

use sqlx::SqlitePool;
use tracing::debug;

use shoplite_core::{CartItemId, CartToken, ProductId};

use crate::db::{CartRepository, LineChange};
use crate::error::{CommerceError, Result};
use crate::identity::Identity;
use crate::models::{Cart, CartView, subtotal, total_items};

/// Cart resolution and mutation operations.
pub struct CartService<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve the caller's active cart.
    ///
    /// Authenticated callers get their single open cart, created on
    /// first touch. If that cart is empty and the caller also presented
    /// a token for a non-empty open guest cart, the guest lines are
    /// folded in first. Guests get the cart behind their token, or a
    /// fresh one with a newly generated token.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn resolve(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
    ) -> Result<Cart> {
        let repo = CartRepository::new(self.pool);
        match identity {
            Identity::User(user_id) => {
                let cart = repo.get_or_create_for_user(user_id).await?;
                if let Some(token) = cart_token {
                    if repo.items(cart.id).await?.is_empty() {
                        if let Some(guest) = repo.get_open_by_token(token).await? {
                            if !repo.items(guest.id).await?.is_empty() {
                                repo.merge_guest_into_user(guest.id, cart.id).await?;
                                debug!(
                                    guest_cart = %guest.id,
                                    user_cart = %cart.id,
                                    "merged guest cart on login"
                                );
                            }
                        }
                    }
                }
                Ok(cart)
            }
            Identity::Guest => {
                if let Some(token) = cart_token {
                    if let Some(cart) = repo.get_open_by_token(token).await? {
                        return Ok(cart);
                    }
                }
                let token = CartToken::generate();
                Ok(repo.create_guest(&token).await?)
            }
        }
    }

    /// Materialize a cart with its lines and totals.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn view(&self, cart: &Cart) -> Result<CartView> {
        let items = CartRepository::new(self.pool).items(cart.id).await?;
        Ok(CartView {
            id: cart.id,
            cart_token: cart.guest_token,
            subtotal: subtotal(&items),
            total_items: total_items(&items),
            items,
        })
    }

    /// Resolve the caller's cart and return it materialized.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn current(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
    ) -> Result<CartView> {
        let cart = self.resolve(identity, cart_token).await?;
        self.view(&cart).await
    }

    /// Add a quantity of a product to the caller's cart.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for a quantity below 1,
    /// `CommerceError::NotFound` for a missing or inactive product, and
    /// `CommerceError::InsufficientStock` when the combined line
    /// quantity would exceed stock.
    pub async fn add_item(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView> {
        if quantity < 1 {
            return Err(CommerceError::Validation("quantity must be >= 1.".to_owned()));
        }
        let cart = self.resolve(identity, cart_token).await?;
        let repo = CartRepository::new(self.pool);
        match repo.add_item(cart.id, product_id, quantity).await? {
            LineChange::Applied(_) => self.view(&cart).await,
            LineChange::MissingProduct | LineChange::MissingItem => {
                Err(CommerceError::NotFound("Product not found.".to_owned()))
            }
            LineChange::OutOfStock => {
                Err(CommerceError::InsufficientStock("Insufficient stock.".to_owned()))
            }
        }
    }

    /// Set a cart line to an absolute quantity.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for a quantity below 1,
    /// `CommerceError::NotFound` for a line not in the caller's cart,
    /// and `CommerceError::InsufficientStock` when the quantity exceeds
    /// stock.
    pub async fn update_item(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<CartView> {
        if quantity < 1 {
            return Err(CommerceError::Validation("quantity must be >= 1.".to_owned()));
        }
        let cart = self.resolve(identity, cart_token).await?;
        let repo = CartRepository::new(self.pool);
        match repo.update_item(cart.id, item_id, quantity).await? {
            LineChange::Applied(_) => self.view(&cart).await,
            LineChange::MissingItem | LineChange::MissingProduct => {
                Err(CommerceError::NotFound("Item not found.".to_owned()))
            }
            LineChange::OutOfStock => {
                Err(CommerceError::InsufficientStock("Insufficient stock.".to_owned()))
            }
        }
    }

    /// Remove a line from the caller's cart. Absent lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn remove_item(
        &self,
        identity: Identity,
        cart_token: Option<&CartToken>,
        item_id: CartItemId,
    ) -> Result<CartView> {
        let cart = self.resolve(identity, cart_token).await?;
        CartRepository::new(self.pool).remove_item(cart.id, item_id).await?;
        self.view(&cart).await
    }
}
