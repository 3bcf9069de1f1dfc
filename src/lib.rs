//! Periodic worker that drains a durable queue of pending e-mail and sends
//! it over SMTP, with deferred delivery, bounded retry and contact history
//! recording.

pub mod boot;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod mailer;
pub mod models;
pub mod progress;
pub mod store;
pub mod tasks;
