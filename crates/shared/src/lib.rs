pub mod cache;
pub mod fetch_state;
pub mod image;
