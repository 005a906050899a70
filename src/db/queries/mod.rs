pub mod categories;
pub mod questions;
pub mod sessions;
pub mod users;
