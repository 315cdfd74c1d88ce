pub mod app;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod creation_limit;
pub mod data;
pub mod dispatch;
pub mod game;
pub mod host;
pub mod logic;
pub mod rate_limit;
pub mod registry;
pub mod render;
pub mod routes;
