//! TLS 证书加载。

use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// 读取 PEM 证书与私钥并构建 Rustls 配置。
pub async fn load_rustls_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<RustlsConfig, std::io::Error> {
    let cert = fs::read(cert_path).await?;
    let key = fs::read(key_path).await?;
    let config = RustlsConfig::from_pem(cert, key).await?;
    info!(cert = ?cert_path, "loaded tls certificate");
    Ok(config)
}
