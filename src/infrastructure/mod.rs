pub mod config;
pub mod discord;
pub mod llm;
pub mod memory;
pub mod text;
pub mod web;
