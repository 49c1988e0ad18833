//! # deskbeam-viewer: Remote Desktop Console Viewer
//!
//! Runs on the controlling machine. Finds a host (by address or LAN
//! announcement), pairs with the code the host displays, and receives its
//! screen. Stats are logged periodically; console commands are forwarded
//! as input, clipboard and chat messages.

pub mod config;
pub mod connection;
pub mod display;
pub mod input;
