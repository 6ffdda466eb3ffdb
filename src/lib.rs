pub mod auth;
pub mod config;
pub mod cookies;
pub mod csrf;
pub mod extractors;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod validation;
pub mod views;
pub mod workers;
