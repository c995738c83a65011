pub mod common;
pub mod domain;
pub mod warehouse;

pub use domain::*;
pub use warehouse::{SqliteWarehouse, TableSchema, Tables, Warehouse};
