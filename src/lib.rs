//! Solidstreak: a habit tracker driven through a Telegram bot and its Web App.
//!
//! This crate is the inbound side of the service: it admits bot updates into
//! a bounded pool of handler tasks and authenticates Web App requests signed
//! with Telegram `initData`.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::any::Any;

pub mod app;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod http;
pub mod logging;
pub mod replies;
pub mod storage;
pub mod telegram;

/// Render a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
