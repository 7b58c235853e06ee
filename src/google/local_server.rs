//! 本地授权回调服务器
//!
//! 首次授权时在本机起一个一次性的 HTTP 服务，浏览器完成 Google 授权后
//! 重定向到 `http://localhost:<port>/?code=...&state=...`，拿到授权码即关闭。

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

use crate::google::model::credentials::ClientSecrets;

/// Drive 读写权限
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const SUCCESS_PAGE: &str =
    "<html><body><h3>Authentication successful.</h3><p>You can close this window.</p></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><h3>Authentication failed.</h3><p>Check the terminal for details.</p></body></html>";

type CallbackResult = anyhow::Result<String>;

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<String>,
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>,
}

/// 生成 OAuth state：随机 uuid 与时间戳拼接后取 SHA-256
pub fn generate_state() -> String {
    let seed = format!(
        "{}:{}",
        uuid::Uuid::new_v4(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    hex::encode(Sha256::digest(seed.as_bytes()))
}

/// 本机回调地址
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{}/", port)
}

/// 构建浏览器授权地址
///
/// 强制 offline + approval_prompt，保证每次交互授权都拿到 refresh_token
pub fn build_authorization_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> String {
    let params = [
        ("client_id", secrets.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", DRIVE_SCOPE),
        ("response_type", "code"),
        ("access_type", "offline"),
        ("approval_prompt", "force"),
        ("state", state),
    ];
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", secrets.auth_uri, query)
}

/// 依次尝试绑定配置的端口，返回监听器与实际端口
pub async fn bind(host: &str, ports: &[u16]) -> anyhow::Result<(TcpListener, u16)> {
    for port in ports {
        match TcpListener::bind((host, *port)).await {
            Ok(listener) => {
                let actual = listener.local_addr()?.port();
                tracing::debug!("授权回调服务器监听端口 {}", actual);
                return Ok((listener, actual));
            }
            Err(e) => tracing::debug!("端口 {} 不可用: {}", port, e),
        }
    }
    anyhow::bail!("无法绑定任何授权回调端口: {:?}", ports)
}

/// 校验回调参数；既没有 code 也没有 error 的请求不算回调
fn check_callback(query: &CallbackQuery, expected_state: &str) -> Option<CallbackResult> {
    if let Some(error) = &query.error {
        return Some(Err(anyhow::anyhow!("授权被拒绝: {}", error)));
    }
    let code = query.code.as_ref()?;
    if query.state.as_deref() != Some(expected_state) {
        return Some(Err(anyhow::anyhow!("授权回调 state 不匹配")));
    }
    Some(Ok(code.clone()))
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Html<&'static str> {
    let Some(result) = check_callback(&query, &state.expected_state) else {
        return Html(FAILURE_PAGE);
    };
    let page = if result.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
    if let Some(sender) = state.sender.lock().await.take() {
        let _ = sender.send(result);
    }
    Html(page)
}

/// 在给定监听器上等待一次授权回调，返回授权码
pub async fn wait_for_code(
    listener: TcpListener,
    expected_state: String,
    timeout: Duration,
) -> anyhow::Result<String> {
    let (tx, rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let state = CallbackState {
        expected_state: Arc::new(expected_state),
        sender: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/", get(handle_callback))
        .with_state(state);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let result = tokio::time::timeout(timeout, rx).await;

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(5), server).await.is_err() {
        tracing::warn!("授权回调服务器未能及时关闭");
    }

    match result {
        Err(_) => anyhow::bail!("等待授权回调超时 ({} 秒)", timeout.as_secs()),
        Ok(Err(_)) => anyhow::bail!("授权回调通道已关闭"),
        Ok(Ok(code)) => code,
    }
}
