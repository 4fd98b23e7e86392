//! User endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::{parse_init_data, InitDataChat, Principal, INIT_DATA_HEADER};
use crate::storage::{save_chat, save_user, User};

use super::error::ApiError;
use super::AppState;

/// `{"data": ...}` envelope of successful responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    /// Payload.
    pub data: T,
}

/// User fields as submitted by the Web App.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputUser {
    /// Telegram user id.
    pub tg_id: i64,
    /// Username.
    #[serde(default)]
    pub tg_username: String,
    /// First name.
    #[serde(default)]
    pub tg_first_name: String,
    /// Last name.
    #[serde(default)]
    pub tg_last_name: String,
    /// Language tag.
    #[serde(default)]
    pub tg_lang_code: String,
    /// Bot flag.
    #[serde(default)]
    pub tg_is_bot: bool,
}

/// Chat fields as submitted by the Web App.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputChat {
    /// Telegram chat id.
    pub tg_id: i64,
}

/// Body of `user-info/upsert`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoData {
    /// Submitted user.
    pub user: Option<InputUser>,
    /// Submitted chat.
    pub tg_chat: Option<InputChat>,
}

/// Request envelope of `user-info/upsert`.
#[derive(Debug, Deserialize)]
pub struct PostUserInfoRequest {
    /// Request data.
    pub data: Option<UserInfoData>,
}

/// `GET /users/:user_id`: a user may only read their own record.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    user_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    let Path(user_id) =
        user_id.map_err(|_| ApiError::bad_request("invalid \"userId\" in URL params"))?;

    let user = state.users.get_by_id(user_id).await?;
    if user.tg_id != principal.tg_user_id {
        return Err(ApiError::unauthorized(
            "couldn't get user info for another user",
        ));
    }

    Ok(Json(DataResponse { data: user }))
}

/// `POST /user-info/upsert`: register the signed-in user and their chat.
///
/// The submitted profile must equal the signed one. Without a signed chat
/// the user's private chat is assumed.
pub async fn upsert_user_info(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    body: Result<Json<PostUserInfoRequest>, JsonRejection>,
) -> Result<Json<DataResponse<User>>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("invalid request payload"))?;
    let data = req
        .data
        .ok_or_else(|| ApiError::bad_request("request data is required"))?;
    let input_user = data
        .user
        .ok_or_else(|| ApiError::bad_request("user data is required"))?;
    let input_chat = data
        .tg_chat
        .ok_or_else(|| ApiError::bad_request("chat data is required"))?;

    let init_data = headers
        .get(INIT_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let signed = parse_init_data(init_data)?;
    let signed_chat = signed.chat.unwrap_or(InitDataChat {
        id: signed.user.id,
    });

    let same_user = signed.user.id == principal.tg_user_id
        && signed.user.id == input_user.tg_id
        && signed.user.username == input_user.tg_username
        && signed.user.first_name == input_user.tg_first_name
        && signed.user.last_name == input_user.tg_last_name
        && signed.user.language_code == input_user.tg_lang_code
        && signed.user.is_bot == input_user.tg_is_bot;
    if !same_user {
        return Err(ApiError::bad_request("user data does not match init data"));
    }
    if signed_chat.id != input_chat.tg_id {
        return Err(ApiError::bad_request(
            "telegram chat data does not match init data",
        ));
    }

    let mut user = User::new(
        input_user.tg_id,
        &input_user.tg_username,
        &input_user.tg_first_name,
        &input_user.tg_last_name,
        &input_user.tg_lang_code,
        input_user.tg_is_bot,
    );
    save_user(state.users.as_ref(), &mut user).await?;
    save_chat(state.chats.as_ref(), input_chat.tg_id, user.id).await?;

    Ok(Json(DataResponse { data: user }))
}
