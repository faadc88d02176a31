#![allow(dead_code)]

pub mod app;
pub mod builders;

pub use app::{json_request, read_json, TestApp};
pub use builders::{SessionBuilder, TEST_SECRET};
