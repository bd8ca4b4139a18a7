pub mod address;
pub mod money;
