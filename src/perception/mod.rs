pub mod filter;
pub mod image_input;
pub mod types;
