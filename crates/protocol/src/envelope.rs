use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Response code for a successful operation.
pub const CODE_OK: i32 = 10000;

/// Response code for a failed operation.
pub const CODE_ERROR: i32 = 20000;

/// Envelope wrapping every server response.
///
/// `data` is serialized as `null` when absent; browser clients read the
/// field unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response carrying `data`.
    pub fn ok(data: T, msg: impl Into<String>) -> Self {
        Self {
            success: true,
            code: CODE_OK,
            msg: msg.into(),
            data: Some(data),
        }
    }

    /// Creates a failed response. `data` is always `null`.
    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            code: CODE_ERROR,
            msg: msg.into(),
            data: None,
        }
    }

    /// Returns `true` when both the flag and the code report success.
    pub fn is_ok(&self) -> bool {
        self.success && self.code == CODE_OK
    }
}

impl ApiResponse<serde_json::Value> {
    /// Parses an untyped envelope, deferring `data` decoding.
    ///
    /// Failed responses may carry arbitrary error objects in `data`, so the
    /// payload is only converted once the caller knows the call succeeded.
    pub fn from_slice(body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Converts the payload into `T`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ProtocolError> {
        match self.data {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(ProtocolError::MissingField("data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::VerifyData;

    #[test]
    fn ok_response_shape() {
        let resp = ApiResponse::ok(String::new(), "file merged");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["code"], CODE_OK);
        assert_eq!(json["msg"], "file merged");
        assert_eq!(json["data"], "");
    }

    #[test]
    fn failure_serializes_null_data() {
        let resp = ApiResponse::<VerifyData>::failure("verify failed");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"data\":null"));
        assert!(json.contains("20000"));
        assert!(!resp.is_ok());
    }

    #[test]
    fn missing_data_field_defaults_to_none() {
        let resp: ApiResponse<VerifyData> =
            serde_json::from_str(r#"{"success":false,"code":20000,"msg":"x"}"#).unwrap();
        assert!(resp.data.is_none());
    }

    #[test]
    fn untyped_envelope_converts_on_demand() {
        let body = br#"{"success":true,"code":10000,"msg":"ok","data":{"shouldUpload":true,"uploadedList":["h-0"]}}"#;
        let resp = ApiResponse::from_slice(body).unwrap();
        assert!(resp.is_ok());
        let data: VerifyData = resp.into_data().unwrap();
        assert!(data.should_upload);
        assert_eq!(data.uploaded_list, vec!["h-0".to_string()]);
    }

    #[test]
    fn failed_envelope_with_error_object_still_parses() {
        let body = br#"{"success":false,"code":20000,"msg":"upload failed","data":{"errno":-28}}"#;
        let resp = ApiResponse::from_slice(body).unwrap();
        assert!(!resp.is_ok());
        assert_eq!(resp.msg, "upload failed");
    }

    #[test]
    fn into_data_without_payload_is_error() {
        let resp = ApiResponse::<serde_json::Value>::failure("nope");
        assert!(matches!(
            resp.into_data::<VerifyData>(),
            Err(ProtocolError::MissingField("data"))
        ));
    }
}
