//! JSON wire protocol.
//!
//! Every API answer is `{"ret": <code>}` optionally followed by `"data"`.
//! A `ret` of `0` is success; authorization failures are reported here, not
//! through the HTTP status.

use serde::Serialize;
use serde_repr::Serialize_repr;

use crate::message::MessageView;

/// Result code carried in `ret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr)]
#[repr(i8)]
pub enum RetCode {
    /// Success
    Ok = 0,
    /// Missing or insufficient capability token
    Unauthorized = -1,
    /// Missing or invalid request parameter
    MissingParameter = -2,
    /// Fewer body bytes arrived than declared
    Truncated = -3,
}

/// Information a manage-level user needs to share access with another
/// device.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AccessInfo {
    /// URL reachable over IPv4
    pub url: String,
    /// URL reachable over IPv6, empty when none is available
    #[serde(rename = "urlV6")]
    pub url_v6: String,
    /// Remote-access token
    #[serde(rename = "ak")]
    pub access_token: String,
}

impl std::fmt::Debug for AccessInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessInfo")
            .field("url", &self.url)
            .field("url_v6", &self.url_v6)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Payload of a successful response, one variant per response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    /// `getMsgList`
    MessageList(Vec<MessageView>),
    /// `getAccessInfo`
    AccessInfo(AccessInfo),
}

/// A JSON API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    /// Result code
    pub ret: RetCode,
    /// Present only on responses that carry data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl ApiResponse {
    /// A bare result code.
    pub fn code(ret: RetCode) -> Self {
        Self { ret, data: None }
    }

    /// `{"ret":0}`
    pub fn ok() -> Self {
        Self::code(RetCode::Ok)
    }

    /// `{"ret":-1}`
    pub fn unauthorized() -> Self {
        Self::code(RetCode::Unauthorized)
    }

    /// `{"ret":0,"data":[...]}`
    pub fn message_list(messages: Vec<MessageView>) -> Self {
        Self { ret: RetCode::Ok, data: Some(ResponseData::MessageList(messages)) }
    }

    /// `{"ret":0,"data":{"url":..,"urlV6":..,"ak":..}}`
    pub fn access_info(info: AccessInfo) -> Self {
        Self { ret: RetCode::Ok, data: Some(ResponseData::AccessInfo(info)) }
    }
}
