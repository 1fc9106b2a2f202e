//! Integration test suite for Satchel.
//!
//! Drives the wallet engine end to end against a scripted chain source and
//! against a local Esplora-shaped HTTP server, and checks the spend
//! arithmetic under randomized inputs.

pub mod helpers;
