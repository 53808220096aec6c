use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Envelope returned by every remote call; `code == 0` means the operation
/// succeeded, anything else is a domain-level rejection.
#[derive(Debug, Deserialize)]
pub struct ServiceResponse<T> {
    pub code: i32,
    pub data: Option<T>,
    pub msg: Option<String>,
}

impl<T> ServiceResponse<T> {
    pub fn into_result(self) -> Result<T> {
        if self.code != 0 {
            return Err(Error::ServerRejected {
                code: self.code,
                message: self.msg.unwrap_or_else(|| "request failed".to_string()),
            });
        }
        self.data.ok_or_else(|| Error::Parse {
            message: "missing data in successful response".to_string(),
        })
    }

    pub fn ensure_ok(self) -> Result<()> {
        if self.code != 0 {
            return Err(Error::ServerRejected {
                code: self.code,
                message: self.msg.unwrap_or_else(|| "request failed".to_string()),
            });
        }
        Ok(())
    }
}

pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<ServiceResponse<T>> {
    if !status.is_success() {
        return Err(Error::Transport {
            status: status.as_u16(),
        });
    }
    serde_json::from_str(body).map_err(|e| Error::Parse {
        message: format!("invalid json: {e}"),
    })
}
