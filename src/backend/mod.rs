pub mod favorites;
pub mod images;
pub mod proxy;
pub mod settings;

#[cfg(test)]
pub mod fake;
