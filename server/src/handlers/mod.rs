pub mod auth;
pub mod headers;
pub mod json;
pub mod oauth;
pub mod routes;
