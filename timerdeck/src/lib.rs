pub mod app_state;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod router;
pub mod routes;
pub mod secrets;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;
