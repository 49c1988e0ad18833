//! # deskbeam-host: Remote Desktop Host Service
//!
//! Listens for a viewer, shows a six-digit pairing code in the log, and
//! once paired streams delta-encoded frames while relaying input and
//! clipboard traffic to the local collaborators.
//!
//! The bundled collaborators in [`headless`] need no desktop session: the
//! screen is a moving test pattern and input is logged rather than
//! replayed.

pub mod config;
pub mod headless;
pub mod service;
