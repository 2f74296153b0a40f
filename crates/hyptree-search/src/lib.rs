//! hyptree-search - the Search Gateway (SG) trait and its implementations.

pub mod gateway;
pub mod http;

pub use gateway::{NullSearchGateway, SearchGateway};
pub use http::HttpSearchGateway;
