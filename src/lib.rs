//! Library crate for showrunner: round orchestration and live scoring for the
//! image reveal, word reveal and board/lottery game modes.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod services;
pub mod state;
