pub mod models;
pub mod store;

pub use models::UserRecord;
pub use store::{NewUser, UserStore};
