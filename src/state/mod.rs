pub mod chapter;
pub mod feed;
