//! HTTP request handlers for the REST API.

pub mod loan;
pub mod run;
