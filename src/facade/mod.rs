pub mod database;

pub use database::ExpandoDb;
