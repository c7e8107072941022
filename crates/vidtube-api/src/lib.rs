pub mod accounts;
pub mod auth;
pub mod comments;
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod media;
pub mod middleware;
pub mod password;
pub mod profile;
pub mod response;
pub mod routes;
pub mod state;
pub mod subscriptions;
pub mod tokens;
pub mod tweets;
pub mod users;
pub mod videos;
