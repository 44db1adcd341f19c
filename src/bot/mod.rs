//! Bot module for handling conversation events
//!
//! This module is split into several submodules for better organization:
//! - `router`: Maps inbound events to entry points and applies the per-event retry
//! - `message_handler`: Handles commands, menu buttons and shared locations
//! - `admin_handler`: Handles the admin panel, broadcasts and clinic management
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `dialogue_manager`: Handles multi-step text input
//! - `ui_builder`: Creates keyboards and formats messages

pub mod admin_handler;
pub mod callback_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod router;
pub mod ui_builder;

// Re-export the router entry points for the transport adapter
pub use router::{dispatch_event, handle_event, route, CallbackAction, Route};

pub use admin_handler::{deliver_broadcast, BroadcastReport};
