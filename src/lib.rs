// src/lib.rs

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod service;
pub mod storage;
