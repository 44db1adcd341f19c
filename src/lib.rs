//! # Clinic Directory Telegram Bot
//!
//! A Telegram bot for browsing clinics, finding the nearest ones and comparing
//! service prices in Russian or Uzbek, with an admin flow for managing the
//! directory. A resilience controller keeps the long-polling connection alive
//! across network failures.

pub mod bot;
pub mod clinic_model;
pub mod config;
pub mod context;
pub mod dialogue;
pub mod directory;
pub mod errors;
pub mod fallback;
pub mod geo;
pub mod health;
pub mod localization;
pub mod resilience;
pub mod retry;
pub mod session;
pub mod telegram;
pub mod transport;
