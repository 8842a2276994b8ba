//! Vita - Mentorship matching and session booking
//!
//! Mentors publish weekly one-hour slots, mentees request sessions on them and
//! mentors accept or reject. This library provides the storage, the booking
//! lifecycle and the HTTP API; the `vita` binary wires them together.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
