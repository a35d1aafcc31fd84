pub mod models;
pub mod store;

pub use models::User;
pub use store::{StoreError, UserStore};
