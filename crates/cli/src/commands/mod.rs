pub mod commuters;
pub mod manager;
pub mod migrate;
