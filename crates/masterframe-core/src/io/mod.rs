pub mod fits;
pub mod store;
