//! # Admin wire protocol.
//!
//! Fixed-size framing, so a request is exactly one read:
//! ```text
//! request  = [4B BE operation code][64B target, NUL-padded]
//! response = [4B BE status code]
//! ```
//! A malformed request aborts that request only — the server answers ERROR
//! and closes the connection; nothing else is disturbed.

use thiserror::Error;

/// Fixed length of the target parameter, NUL-padded.
pub const PARAM_LEN: usize = 64;

/// Total request size on the wire.
pub const REQUEST_LEN: usize = 4 + PARAM_LEN;

/// Errors decoding an admin request.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AdminError {
    /// Operation code not recognized.
    #[error("unknown operation code {0}")]
    UnknownOp(u32),

    /// Target parameter empty or not valid UTF-8.
    #[error("malformed target parameter")]
    BadTarget,

    /// Target parameter does not fit the fixed field.
    #[error("target parameter exceeds {PARAM_LEN} bytes")]
    TargetTooLong,
}

/// Operator-invokable subset of lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOp {
    /// Bring matching disks into service.
    Start,
    /// Take matching disks out of service.
    Stop,
    /// Evaluate health attributes of matching disks now.
    HealthCheck,
}

impl AdminOp {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            AdminOp::Start => "start",
            AdminOp::Stop => "stop",
            AdminOp::HealthCheck => "health_check",
        }
    }

    /// Wire operation code.
    pub fn code(self) -> u32 {
        match self {
            AdminOp::Start => 1,
            AdminOp::Stop => 2,
            AdminOp::HealthCheck => 3,
        }
    }

    /// Decodes a wire operation code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(AdminOp::Start),
            2 => Some(AdminOp::Stop),
            3 => Some(AdminOp::HealthCheck),
            _ => None,
        }
    }
}

/// One operator request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminRequest {
    /// Operation to apply.
    pub op: AdminOp,
    /// Substring matched against managed device names.
    pub target: String,
}

impl AdminRequest {
    /// Decodes a request from its fixed-size wire form.
    pub fn decode(buf: &[u8; REQUEST_LEN]) -> Result<Self, AdminError> {
        let code = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let op = AdminOp::from_code(code).ok_or(AdminError::UnknownOp(code))?;

        let param = &buf[4..];
        let end = param.iter().position(|&b| b == 0).unwrap_or(PARAM_LEN);
        let target = std::str::from_utf8(&param[..end])
            .map_err(|_| AdminError::BadTarget)?
            .to_string();
        if target.is_empty() {
            return Err(AdminError::BadTarget);
        }
        Ok(Self { op, target })
    }

    /// Encodes the request into its fixed-size wire form.
    pub fn encode(&self) -> Result<[u8; REQUEST_LEN], AdminError> {
        if self.target.len() > PARAM_LEN {
            return Err(AdminError::TargetTooLong);
        }
        let mut buf = [0u8; REQUEST_LEN];
        buf[..4].copy_from_slice(&self.op.code().to_be_bytes());
        buf[4..4 + self.target.len()].copy_from_slice(self.target.as_bytes());
        Ok(buf)
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminStatus {
    /// The request matched and was applied.
    Ok,
    /// The request was malformed or matched nothing.
    Error,
}

impl AdminStatus {
    /// Wire status code.
    pub fn code(self) -> u32 {
        match self {
            AdminStatus::Ok => 0,
            AdminStatus::Error => 1,
        }
    }

    /// Decodes a wire status code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AdminStatus::Ok),
            1 => Some(AdminStatus::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let req = AdminRequest {
            op: AdminOp::Stop,
            target: "vdiskA".to_string(),
        };
        let wire = req.encode().unwrap();
        assert_eq!(wire.len(), REQUEST_LEN);
        assert_eq!(AdminRequest::decode(&wire).unwrap(), req);
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let mut wire = [0u8; REQUEST_LEN];
        wire[..4].copy_from_slice(&99u32.to_be_bytes());
        wire[4] = b'x';
        assert_eq!(
            AdminRequest::decode(&wire),
            Err(AdminError::UnknownOp(99))
        );
    }

    #[test]
    fn test_empty_target_rejected() {
        let req = AdminRequest {
            op: AdminOp::Start,
            target: String::new(),
        };
        let wire = req.encode().unwrap();
        assert_eq!(AdminRequest::decode(&wire), Err(AdminError::BadTarget));
    }

    #[test]
    fn test_non_utf8_target_rejected() {
        let mut wire = [0u8; REQUEST_LEN];
        wire[..4].copy_from_slice(&1u32.to_be_bytes());
        wire[4] = 0xFF;
        wire[5] = 0xFE;
        assert_eq!(AdminRequest::decode(&wire), Err(AdminError::BadTarget));
    }

    #[test]
    fn test_oversized_target_rejected_at_encode() {
        let req = AdminRequest {
            op: AdminOp::Start,
            target: "x".repeat(PARAM_LEN + 1),
        };
        assert_eq!(req.encode(), Err(AdminError::TargetTooLong));
    }
}
