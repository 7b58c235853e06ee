//! OAuth 令牌管理
//!
//! 启动时根据缓存状态选择：交互式授权 / 刷新令牌 / 直接使用，
//! 成功后把凭证写回缓存文件。

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::google::local_server;
use crate::google::model::credentials::{ClientSecrets, StoredCredentials};
use crate::google::model::token_refresh::{
    CodeExchangeRequest, RefreshRequest, TokenErrorResponse, TokenResponse,
};
use crate::model::config::Config;

/// 等待浏览器授权的最长时间
const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(300);

/// 登录时要执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAction {
    /// 没有可用凭证，走浏览器授权
    Authenticate,
    /// 令牌已过期，用 refresh_token 刷新
    Refresh,
    /// 令牌有效，直接使用
    Authorize,
}

pub struct TokenManager {
    config: Config,
    secrets: ClientSecrets,
    credentials: Option<StoredCredentials>,
    client: Client,
}

impl TokenManager {
    pub fn new(
        config: Config,
        secrets: ClientSecrets,
        credentials: Option<StoredCredentials>,
        client: Client,
    ) -> Self {
        Self {
            config,
            secrets,
            credentials,
            client,
        }
    }

    /// 根据缓存凭证决定登录方式
    pub fn login_action(&self, now: DateTime<Utc>) -> LoginAction {
        match &self.credentials {
            None => LoginAction::Authenticate,
            Some(creds) if creds.invalid => LoginAction::Authenticate,
            Some(creds) if creds.is_expired(now) => {
                if creds.has_refresh_token() {
                    LoginAction::Refresh
                } else {
                    LoginAction::Authenticate
                }
            }
            Some(_) => LoginAction::Authorize,
        }
    }

    /// 登录并保存凭证
    pub async fn login(&mut self) -> anyhow::Result<()> {
        match self.login_action(Utc::now()) {
            LoginAction::Authenticate => {
                tracing::debug!("凭证不存在，开始授权");
                self.authenticate().await?;
            }
            LoginAction::Refresh => {
                tracing::debug!("令牌已过期，正在刷新");
                self.refresh().await?;
            }
            LoginAction::Authorize => {
                tracing::debug!("使用已保存的凭证");
            }
        }

        tracing::debug!("保存凭证到 {}", self.config.credentials_path);
        self.save()?;
        Ok(())
    }

    /// 确保令牌有效，返回 access_token
    pub async fn ensure_valid_token(&mut self) -> anyhow::Result<String> {
        match self.login_action(Utc::now()) {
            LoginAction::Authorize => {}
            LoginAction::Refresh => {
                self.refresh().await?;
                self.save()?;
            }
            LoginAction::Authenticate => anyhow::bail!("没有可用的凭证，请先完成授权"),
        }

        self.credentials
            .as_ref()
            .and_then(|c| c.access_token.clone())
            .ok_or_else(|| anyhow::anyhow!("凭证中缺少 access_token"))
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(creds) = &self.credentials {
            creds.save(&self.config.credentials_path)?;
        }
        Ok(())
    }

    fn token_uri(&self) -> String {
        self.credentials
            .as_ref()
            .and_then(|c| c.token_uri.clone())
            .unwrap_or_else(|| self.secrets.token_uri.clone())
    }

    /// 浏览器授权流程
    async fn authenticate(&mut self) -> anyhow::Result<()> {
        let (listener, port) = local_server::bind(&self.config.oauth_host, &self.config.oauth_ports).await?;
        let redirect_uri = local_server::redirect_uri(port);
        let state = local_server::generate_state();
        let url = local_server::build_authorization_url(&self.secrets, &redirect_uri, &state);

        tracing::info!("请在浏览器中打开以下地址完成授权:\n\n    {}\n", url);

        let code = local_server::wait_for_code(listener, state, AUTHORIZATION_TIMEOUT).await?;
        tracing::info!("已收到授权码");

        let request = CodeExchangeRequest {
            code: &code,
            client_id: &self.secrets.client_id,
            client_secret: &self.secrets.client_secret,
            redirect_uri: &redirect_uri,
            grant_type: "authorization_code",
        };
        let response = self.request_token(&request).await?;

        let mut creds = StoredCredentials {
            client_id: Some(self.secrets.client_id.clone()),
            client_secret: Some(self.secrets.client_secret.clone()),
            token_uri: Some(self.secrets.token_uri.clone()),
            ..Default::default()
        };
        apply_token_response(&mut creds, response, Utc::now());
        self.credentials = Some(creds);
        Ok(())
    }

    /// 用 refresh_token 换取新的 access_token
    async fn refresh(&mut self) -> anyhow::Result<()> {
        let token_uri = self.token_uri();
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("没有可刷新的凭证"))?;
        let refresh_token = creds
            .refresh_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("凭证中缺少 refresh_token"))?;
        let client_id = creds
            .client_id
            .clone()
            .unwrap_or_else(|| self.secrets.client_id.clone());
        let client_secret = creds
            .client_secret
            .clone()
            .unwrap_or_else(|| self.secrets.client_secret.clone());

        let request = RefreshRequest {
            client_id: &client_id,
            client_secret: &client_secret,
            refresh_token: &refresh_token,
            grant_type: "refresh_token",
        };

        match self.post_token(&token_uri, &request).await {
            Ok(response) => {
                if let Some(creds) = self.credentials.as_mut() {
                    apply_token_response(creds, response, Utc::now());
                }
                tracing::debug!("令牌刷新成功");
                Ok(())
            }
            Err(TokenRequestError::Rejected(reason)) => {
                // refresh_token 被吊销，下次启动重新授权
                if let Some(creds) = self.credentials.as_mut() {
                    creds.invalid = true;
                }
                self.save()?;
                anyhow::bail!("刷新令牌被拒绝，已标记凭证失效: {}", reason)
            }
            Err(TokenRequestError::Other(e)) => Err(e),
        }
    }

    async fn request_token<T: Serialize>(&self, form: &T) -> anyhow::Result<TokenResponse> {
        let token_uri = self.token_uri();
        self.post_token(&token_uri, form).await.map_err(|e| match e {
            TokenRequestError::Rejected(reason) => anyhow::anyhow!("令牌请求被拒绝: {}", reason),
            TokenRequestError::Other(e) => e,
        })
    }

    async fn post_token<T: Serialize>(
        &self,
        token_uri: &str,
        form: &T,
    ) -> Result<TokenResponse, TokenRequestError> {
        let response = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| TokenRequestError::Other(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status.as_u16(), &body));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| TokenRequestError::Other(e.into()))
    }
}

enum TokenRequestError {
    /// 令牌端点明确拒绝（invalid_grant 等）
    Rejected(String),
    Other(anyhow::Error),
}

fn classify_token_error(status: u16, body: &str) -> TokenRequestError {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(err) if status == 400 || status == 401 => {
            let reason = match err.error_description {
                Some(desc) => format!("{} ({})", err.error, desc),
                None => err.error,
            };
            TokenRequestError::Rejected(reason)
        }
        _ => TokenRequestError::Other(anyhow::anyhow!("令牌请求失败: {} {}", status, body)),
    }
}

/// 把令牌端点响应合并进缓存凭证
///
/// 刷新响应通常不带 refresh_token，此时保留旧值
pub fn apply_token_response(
    creds: &mut StoredCredentials,
    response: TokenResponse,
    now: DateTime<Utc>,
) {
    creds.access_token = Some(response.access_token);
    if let Some(refresh_token) = response.refresh_token {
        creds.refresh_token = Some(refresh_token);
    }
    creds.token_expiry = response
        .expires_in
        .map(|secs| now + chrono::Duration::seconds(secs));
    creds.invalid = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Router};
    use chrono::TimeZone;

    fn secrets() -> ClientSecrets {
        ClientSecrets {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            redirect_uris: vec![],
        }
    }

    fn manager(credentials: Option<StoredCredentials>) -> TokenManager {
        TokenManager::new(Config::default(), secrets(), credentials, Client::new())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_login_action() {
        assert_eq!(manager(None).login_action(now()), LoginAction::Authenticate);

        let valid = StoredCredentials {
            access_token: Some("a".to_string()),
            refresh_token: Some("r".to_string()),
            token_expiry: Some(now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(
            manager(Some(valid.clone())).login_action(now()),
            LoginAction::Authorize
        );

        let expired = StoredCredentials {
            token_expiry: Some(now() - chrono::Duration::hours(1)),
            ..valid.clone()
        };
        assert_eq!(
            manager(Some(expired.clone())).login_action(now()),
            LoginAction::Refresh
        );

        let no_refresh = StoredCredentials {
            refresh_token: None,
            ..expired
        };
        assert_eq!(
            manager(Some(no_refresh)).login_action(now()),
            LoginAction::Authenticate
        );

        let invalid = StoredCredentials {
            invalid: true,
            ..valid
        };
        assert_eq!(
            manager(Some(invalid)).login_action(now()),
            LoginAction::Authenticate
        );
    }

    #[test]
    fn test_apply_token_response_keeps_refresh_token() {
        let mut creds = StoredCredentials {
            refresh_token: Some("old".to_string()),
            invalid: true,
            ..Default::default()
        };
        let response = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        };
        apply_token_response(&mut creds, response, now());

        assert_eq!(creds.access_token.as_deref(), Some("new"));
        assert_eq!(creds.refresh_token.as_deref(), Some("old"));
        assert_eq!(creds.token_expiry, Some(now() + chrono::Duration::hours(1)));
        assert!(!creds.invalid);
    }

    #[test]
    fn test_token_uri_prefers_cached() {
        let creds = StoredCredentials {
            token_uri: Some("https://accounts.google.com/o/oauth2/token".to_string()),
            ..Default::default()
        };
        assert_eq!(
            manager(Some(creds)).token_uri(),
            "https://accounts.google.com/o/oauth2/token"
        );
        assert_eq!(manager(None).token_uri(), "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_classify_token_error() {
        let body = r#"{"error":"invalid_grant","error_description":"Bad Request"}"#;
        assert!(matches!(
            classify_token_error(400, body),
            TokenRequestError::Rejected(reason) if reason.contains("invalid_grant")
        ));
        assert!(matches!(
            classify_token_error(500, "oops"),
            TokenRequestError::Other(_)
        ));
    }

    /// 只认 refresh_token=good 的令牌端点
    async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> (StatusCode, String) {
        let grant = form.get("grant_type").map(String::as_str);
        let refresh = form.get("refresh_token").map(String::as_str);
        match (grant, refresh) {
            (Some("refresh_token"), Some("good")) => (
                StatusCode::OK,
                r#"{"access_token":"new","expires_in":3600,"token_type":"Bearer"}"#.to_string(),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#
                    .to_string(),
            ),
        }
    }

    async fn serve_token_endpoint() -> String {
        let app = Router::new().route("/token", post(token_endpoint));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://127.0.0.1:{}/token", port)
    }

    fn temp_credentials_path() -> PathBuf {
        std::env::temp_dir().join(format!("{}.json", uuid::Uuid::new_v4()))
    }

    fn manager_saving_to(path: &Path, credentials: StoredCredentials) -> TokenManager {
        let mut config = Config::default();
        config.credentials_path = path.to_string_lossy().into_owned();
        let client = Client::builder().no_proxy().build().unwrap();
        TokenManager::new(config, secrets(), Some(credentials), client)
    }

    fn expired_credentials(refresh_token: &str, token_uri: &str) -> StoredCredentials {
        StoredCredentials {
            access_token: Some("old".to_string()),
            refresh_token: Some(refresh_token.to_string()),
            token_expiry: Some(Utc::now() - chrono::Duration::hours(1)),
            token_uri: Some(token_uri.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_login_refreshes_and_saves() {
        let token_uri = serve_token_endpoint().await;
        let path = temp_credentials_path();

        let mut tm = manager_saving_to(&path, expired_credentials("good", &token_uri));
        tm.login().await.unwrap();

        let saved = StoredCredentials::load(&path).unwrap().unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("new"));
        assert_eq!(saved.refresh_token.as_deref(), Some("good"));
        assert!(!saved.invalid);
        assert!(!saved.is_expired(Utc::now()));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_rejected_refresh_marks_credentials_invalid() {
        let token_uri = serve_token_endpoint().await;
        let path = temp_credentials_path();

        let mut tm = manager_saving_to(&path, expired_credentials("revoked", &token_uri));
        let err = tm.login().await.unwrap_err().to_string();
        assert!(err.contains("invalid_grant"));

        let saved = StoredCredentials::load(&path).unwrap().unwrap();
        assert!(saved.invalid);
        assert_eq!(saved.access_token.as_deref(), Some("old"));

        // 下次启动走浏览器授权
        let next = manager(Some(saved));
        assert_eq!(next.login_action(Utc::now()), LoginAction::Authenticate);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_login_with_valid_credentials_saves_cache() {
        let path = temp_credentials_path();
        let creds = StoredCredentials {
            access_token: Some("cached".to_string()),
            refresh_token: Some("r".to_string()),
            token_expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };

        let mut tm = manager_saving_to(&path, creds);
        tm.login().await.unwrap();

        let saved = StoredCredentials::load(&path).unwrap().unwrap();
        assert_eq!(saved.access_token.as_deref(), Some("cached"));
        assert_eq!(saved.refresh_token.as_deref(), Some("r"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_ensure_valid_token_without_credentials() {
        let mut tm = manager(None);
        assert!(tm.ensure_valid_token().await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_valid_token_returns_cached() {
        let creds = StoredCredentials {
            access_token: Some("cached".to_string()),
            token_expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        let mut tm = manager(Some(creds));
        assert_eq!(tm.ensure_valid_token().await.unwrap(), "cached");
    }
}
