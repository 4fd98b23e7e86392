//! Telegram Web App request authentication.
//!
//! The Web App front-end sends its launch parameters (`initData`) in the
//! [`INIT_DATA_HEADER`] header. [`verify`] checks the signature against the
//! bot token and yields the sender's Telegram id; [`AuthLayer`] applies that
//! check to every request of a router and exposes the result as a
//! [`Principal`] request extension.

pub mod gate;
pub mod verify;

pub use gate::{AuthLayer, AuthService};
pub use verify::{
    data_check_string, parse_init_data, sign, verify, verify_with, InitData, InitDataChat,
    InitDataUser,
};

/// Header carrying the URL-encoded signed payload.
pub const INIT_DATA_HEADER: &str = "x-telegram-initdata";

/// Authenticated sender of a request.
///
/// Inserted into the request extensions by [`AuthService`]; lives only as
/// long as the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    /// Telegram user id from the signed `user` field.
    pub tg_user_id: i64,
}

/// Request authentication failures. All map to `401 Unauthorized`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The request has no signed payload header.
    #[error("missing telegram initData")]
    MissingHeader,

    /// The payload has no (or an empty) `hash` field.
    #[error("missing hash in telegram initData")]
    MissingHash,

    /// The `user` field is not a JSON object with an integer `id`.
    #[error("malformed user in telegram initData: {0}")]
    MalformedUser(String),

    /// The payload is authentic but names no user.
    #[error("missing user in telegram initData")]
    MissingUser,

    /// The recomputed signature differs from `hash`.
    #[error("request authentication failed")]
    Mismatch,

    /// The signing key could not be initialised.
    #[error("invalid signing key")]
    InvalidKey,
}
