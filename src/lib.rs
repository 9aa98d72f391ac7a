pub mod data;
pub mod detection;
pub mod render;
pub mod server;
pub mod services;
pub mod web;

pub mod version;
