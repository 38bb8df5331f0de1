//! Rows shared by the registration site and the shop API.

mod order;
mod product;
mod user;

pub use order::{Order, OrderInput};
pub use product::{Product, ProductInput};
pub use user::{User, UserInput};
