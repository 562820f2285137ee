pub mod gifts;
pub mod weddings;
