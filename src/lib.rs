pub mod config;
pub mod credentials;
pub mod db;
pub mod enrich;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod http;
pub mod lister;
pub mod mapping;
pub mod marketplace;
pub mod model;
pub mod sync;
