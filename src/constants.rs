// Defaults for the Gemini backend and deployment secrets, overridable from the environment.

use std::env;

lazy_static::lazy_static! {
    pub static ref GEMINI_API_BASE: String = env::var("GEMINI_API_BASE")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
    pub static ref GEMINI_MODEL: String = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
    pub static ref SECRETS_PATH: String = env::var("SAJU_SECRETS_PATH").unwrap_or_else(|_| "secrets.toml".to_string());
}

/// Name of the credential looked up in both the environment and the secrets file.
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

pub const PAGE_TITLE: &str = "지천명 종합 운세 상담소";
pub const COUNSELOR_NAME: &str = "지천명";

/// Shown when neither the environment nor the secrets file holds a credential.
pub const MISSING_KEY_MESSAGE: &str = "API 키를 찾을 수 없습니다. Secrets 설정이나 .env 파일을 확인해주세요.";

/// Prefix of the inline transcript annotation shown when a reply fails.
pub const TURN_FAILURE_PREFIX: &str = "지천명 선생이 잠시 자리를 비웠네(오류)";

pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const REQUEST_TIMEOUT_SECS: u64 = 120;
