//! `initData` signature verification.
//!
//! The signature is a keyed-hash chain:
//!
//! ```text
//! secret_key = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! hash       = hex(HMAC_SHA256(key = secret_key, msg = data_check_string))
//! ```
//!
//! where `data_check_string` is every field except `hash`, rendered as
//! `key=value`, sorted by key and joined with `\n`. Both rounds and the
//! join must match the signing client bit for bit.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Key of the first HMAC round.
const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// Verify a signed `initData` payload and return the sender's Telegram id.
///
/// Field order in the payload does not matter. The HMAC chain is never
/// computed when `hash` is absent.
///
/// # Errors
///
/// Returns [`AuthError::MissingHash`] when there is no `hash`,
/// [`AuthError::MalformedUser`] when `user` is not valid JSON with an
/// integer `id`, [`AuthError::Mismatch`] when the signature differs and
/// [`AuthError::MissingUser`] when an authentic payload carries no `user`.
pub fn verify(init_data: &str, secret: &str) -> Result<i64, AuthError> {
    verify_with(init_data, |dcs| sign(dcs, secret))
}

/// [`verify`] with the signing step supplied by the caller.
///
/// `signer` receives the data-check string and returns the expected hex
/// signature. It is not called for payloads without a `hash` or with a
/// malformed `user`.
///
/// # Errors
///
/// As for [`verify`], plus any error returned by `signer`.
pub fn verify_with(
    init_data: &str,
    signer: impl FnOnce(&str) -> Result<String, AuthError>,
) -> Result<i64, AuthError> {
    let (hash, fields) = split_hash(init_data)?;

    let user_id = match fields.get("user") {
        Some(raw) => Some(parse_user_id(raw)?),
        None => None,
    };

    let expected = signer(&data_check_string(&fields))?;
    if !bool::from(expected.as_bytes().ct_eq(hash.as_bytes())) {
        return Err(AuthError::Mismatch);
    }

    user_id.ok_or(AuthError::MissingUser)
}

/// Compute the hex signature of `data_check_string` for `secret`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidKey`] if an HMAC key is rejected.
pub fn sign(data_check_string: &str, secret: &str) -> Result<String, AuthError> {
    let mut key_mac =
        HmacSha256::new_from_slice(WEB_APP_DATA_KEY).map_err(|_| AuthError::InvalidKey)?;
    key_mac.update(secret.as_bytes());
    let secret_key = key_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key).map_err(|_| AuthError::InvalidKey)?;
    mac.update(data_check_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Render signable fields as sorted `key=value` lines joined with `\n`.
pub fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the payload, separating `hash` from the signable fields.
///
/// Repeated keys keep their first value.
fn split_hash(init_data: &str) -> Result<(String, BTreeMap<String, String>), AuthError> {
    let mut hash: Option<String> = None;
    let mut fields = BTreeMap::new();

    for (key, value) in url::form_urlencoded::parse(init_data.as_bytes()) {
        if key == "hash" {
            hash.get_or_insert_with(|| value.into_owned());
            continue;
        }
        fields
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    match hash {
        Some(h) if !h.is_empty() => Ok((h, fields)),
        _ => Err(AuthError::MissingHash),
    }
}

#[derive(Deserialize)]
struct UserId {
    id: i64,
}

fn parse_user_id(raw: &str) -> Result<i64, AuthError> {
    serde_json::from_str::<UserId>(raw)
        .map(|u| u.id)
        .map_err(|e| AuthError::MalformedUser(e.to_string()))
}

// ---------------------------------------------------------------------------
// Full payload
// ---------------------------------------------------------------------------

/// The signed `user` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitDataUser {
    /// Telegram user id.
    pub id: i64,
    /// Username without `@`.
    #[serde(default)]
    pub username: String,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
    /// IETF language tag of the client.
    #[serde(default)]
    pub language_code: String,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
}

/// The signed `chat` object, present when the app was opened from a group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitDataChat {
    /// Telegram chat id.
    pub id: i64,
}

/// Profile fields of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    /// Sender.
    pub user: InitDataUser,
    /// Originating chat, if any.
    pub chat: Option<InitDataChat>,
}

/// Extract the `user` and `chat` objects from a payload.
///
/// Does not check the signature; call it only on payloads that passed
/// [`verify`].
///
/// # Errors
///
/// Returns [`AuthError::MissingUser`] or [`AuthError::MalformedUser`].
pub fn parse_init_data(init_data: &str) -> Result<InitData, AuthError> {
    let mut user = None;
    let mut chat = None;
    for (key, value) in url::form_urlencoded::parse(init_data.as_bytes()) {
        match key.as_ref() {
            "user" if user.is_none() => {
                user = Some(
                    serde_json::from_str::<InitDataUser>(&value)
                        .map_err(|e| AuthError::MalformedUser(e.to_string()))?,
                );
            }
            "chat" if chat.is_none() => {
                chat = serde_json::from_str::<InitDataChat>(&value).ok();
            }
            _ => {}
        }
    }
    Ok(InitData {
        user: user.ok_or(AuthError::MissingUser)?,
        chat,
    })
}
