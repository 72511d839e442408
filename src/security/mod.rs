pub mod admin;
pub mod headers;
pub mod payload;
pub mod rate_limit;
pub mod urls;
