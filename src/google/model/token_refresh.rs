use serde::{Deserialize, Serialize};

/// 授权码换取令牌的请求体（form 编码）
#[derive(Debug, Serialize)]
pub struct CodeExchangeRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub grant_type: &'static str,
}

/// 刷新令牌的请求体（form 编码）
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub refresh_token: &'a str,
    pub grant_type: &'static str,
}

/// 令牌端点响应
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    // #[serde(default)]
    // pub token_type: Option<String>,
}

/// 令牌端点错误响应
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
