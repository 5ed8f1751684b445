//! 两步验证 (2FA) 请求与响应模型

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Pending secret handed to the user before enabling
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    /// Base32 secret for manual entry
    pub secret: String,
    pub otpauth_url: String,
    /// `data:image/png;base64,...`
    pub qr_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EnableTwoFactorRequest {
    #[validate(length(min = 16, max = 128))]
    pub secret: String,
    #[validate(length(min = 6, max = 6))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DisableTwoFactorRequest {
    #[validate(length(min = 1))]
    pub password: String,
}

/// TOTP code or recovery code
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyTwoFactorRequest {
    #[validate(length(min = 6, max = 32))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegenerateRecoveryCodesRequest {
    #[validate(length(min = 6, max = 6))]
    pub token: String,
}

/// Plaintext codes, returned exactly once
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub remaining_recovery_codes: usize,
}
