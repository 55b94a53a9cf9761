pub mod accounts;
pub mod connection;
pub mod schema;
