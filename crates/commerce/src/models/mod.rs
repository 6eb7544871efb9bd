//! Domain entities.

pub mod cart;
pub mod code;
pub mod coupon;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartItem, CartView, subtotal, total_items};
pub use code::{EmailChangeRequest, OneTimeCode};
pub use coupon::{Coupon, NewCoupon};
pub use order::{NewOrder, Order, OrderDetail, OrderItem};
pub use product::{NewProduct, Product, ProductImage};
pub use user::{NewUser, User};
