// src/lib.rs

//! docwatch: change monitoring for published PDF documents

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
