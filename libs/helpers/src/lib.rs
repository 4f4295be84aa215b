pub mod index;
pub mod reviews;
