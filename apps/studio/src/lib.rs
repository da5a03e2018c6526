pub mod auth;
pub mod client;
pub mod compose;
pub mod config;
pub mod errors;
pub mod form;
pub mod llm_client;
pub mod relay;
pub mod routes;
pub mod schema;
pub mod state;
pub mod templates;
pub mod validation;

#[cfg(test)]
mod testing;
