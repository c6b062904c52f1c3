//! Input-device layer of the front-end: tracks hot-plugged controllers and
//! turns their raw input into logical button events.

pub mod config;
pub mod controller;
pub mod logging;
pub mod mapping_db;
