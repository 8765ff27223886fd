//! 文档获取 - 基础设施层
//!
//! 只负责"把一个引用变成 PDF 字节"，不认识发票也不解析内容

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::error::{AppResult, ConfigError, DownloadError};

/// 文档来源
pub trait DocumentSource: Send + Sync + 'static {
    /// 获取引用对应的原始字节
    fn fetch(&self, reference: &str) -> impl Future<Output = AppResult<Vec<u8>>> + Send;
}

/// 通过 HTTP 下载文档
pub struct HttpDocumentSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_bytes: u64,
}

impl HttpDocumentSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_bytes: u64) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("无法创建 HTTP 客户端: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
            max_bytes,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.download_timeout(),
            config.max_download_bytes,
        )
    }

    /// 绝对地址原样使用，其他引用视为发票编号拼到接口地址后面
    pub fn resolve_url(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                reference.trim_start_matches('/')
            )
        }
    }

    fn map_request_error(&self, reference: &str, err: reqwest::Error) -> DownloadError {
        if err.is_timeout() {
            DownloadError::Timeout {
                source_ref: reference.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            DownloadError::Network {
                source_ref: reference.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, reference: &str) -> AppResult<Vec<u8>> {
        let url = self.resolve_url(reference);
        debug!("下载文档: {}", url);

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(reference, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::BadStatus {
                source_ref: reference.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    source_ref: reference.to_string(),
                    limit: self.max_bytes,
                    actual: length,
                }
                .into());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_request_error(reference, e))?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    source_ref: reference.to_string(),
                    limit: self.max_bytes,
                    actual: body.len() as u64,
                }
                .into());
            }
        }

        debug!("下载完成: {} ({} 字节)", url, body.len());
        Ok(body)
    }
}

/// 从本地目录读取文档
pub struct FileDocumentSource {
    root: PathBuf,
    max_bytes: u64,
}

impl FileDocumentSource {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    fn io_error(reference: &str, source: std::io::Error) -> DownloadError {
        DownloadError::Io {
            source_ref: reference.to_string(),
            source,
        }
    }
}

impl DocumentSource for FileDocumentSource {
    async fn fetch(&self, reference: &str) -> AppResult<Vec<u8>> {
        let path = self.root.join(reference);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::io_error(reference, e))?;
        if metadata.len() > self.max_bytes {
            return Err(DownloadError::TooLarge {
                source_ref: reference.to_string(),
                limit: self.max_bytes,
                actual: metadata.len(),
            }
            .into());
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Self::io_error(reference, e))?;
        Ok(bytes)
    }
}

/// 按配置选择的文档来源：设置了本地目录时读本地，否则走 HTTP
pub enum ConfiguredSource {
    Http(HttpDocumentSource),
    File(FileDocumentSource),
}

impl ConfiguredSource {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(match &config.local_document_dir {
            Some(dir) => {
                ConfiguredSource::File(FileDocumentSource::new(dir, config.max_download_bytes))
            }
            None => ConfiguredSource::Http(HttpDocumentSource::from_config(config)?),
        })
    }
}

impl DocumentSource for ConfiguredSource {
    async fn fetch(&self, reference: &str) -> AppResult<Vec<u8>> {
        match self {
            ConfiguredSource::Http(source) => source.fetch(reference).await,
            ConfiguredSource::File(source) => source.fetch(reference).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 在本机起一个只应答一次的 HTTP 服务，返回其地址
    async fn serve_once(response: Vec<u8>, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[test]
    fn local_directory_selects_file_source() {
        let config = Config {
            local_document_dir: Some("/tmp/invoices".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            ConfiguredSource::from_config(&config).unwrap(),
            ConfiguredSource::File(_)
        ));
        assert!(matches!(
            ConfiguredSource::from_config(&Config::default()).unwrap(),
            ConfiguredSource::Http(_)
        ));
    }

    #[test]
    fn relative_references_join_the_api_base() {
        let source = HttpDocumentSource::new(
            "https://api.example.nl/Invoice/get-pdf-file/",
            Duration::from_secs(30),
            1024,
        )
        .unwrap();
        assert_eq!(
            source.resolve_url("INV-001"),
            "https://api.example.nl/Invoice/get-pdf-file/INV-001"
        );
        assert_eq!(
            source.resolve_url("https://cdn.example.nl/a.pdf"),
            "https://cdn.example.nl/a.pdf"
        );
    }

    #[tokio::test]
    async fn local_files_respect_the_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.pdf"), b"%PDF-1.5").unwrap();
        std::fs::write(dir.path().join("big.pdf"), vec![b'x'; 64]).unwrap();

        let source = FileDocumentSource::new(dir.path(), 32);
        assert_eq!(source.fetch("small.pdf").await.unwrap(), b"%PDF-1.5");

        let err = source.fetch("big.pdf").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Download(DownloadError::TooLarge { actual: 64, .. })
        ));
    }

    #[tokio::test]
    async fn missing_local_file_names_the_reference() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileDocumentSource::new(dir.path(), 32);
        let err = source.fetch("absent.pdf").await.unwrap_err();
        assert!(err.to_string().contains("absent.pdf"));
    }

    #[tokio::test]
    async fn http_body_within_cap_is_returned() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\n%PDF-1.7".to_vec();
        let base = serve_once(response, Duration::ZERO).await;
        let source = HttpDocumentSource::new(base, Duration::from_secs(5), 32).unwrap();
        assert_eq!(source.fetch("INV-1").await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn declared_content_length_over_cap_is_rejected() {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n".to_vec();
        response.extend(vec![b'x'; 100]);
        let base = serve_once(response, Duration::ZERO).await;

        let source = HttpDocumentSource::new(base, Duration::from_secs(5), 32).unwrap();
        let err = source.fetch("INV-1").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Download(DownloadError::TooLarge { limit: 32, actual: 100, .. })
        ));
    }

    #[tokio::test]
    async fn streamed_body_without_length_is_cut_at_cap() {
        let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        response.extend(vec![b'x'; 100]);
        let base = serve_once(response, Duration::ZERO).await;

        let source = HttpDocumentSource::new(base, Duration::from_secs(5), 32).unwrap();
        let err = source.fetch("INV-1").await.unwrap_err();
        match err {
            AppError::Download(DownloadError::TooLarge { limit, actual, .. }) => {
                assert_eq!(limit, 32);
                assert!(actual > 32);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_server_maps_to_timeout() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec();
        let base = serve_once(response, Duration::from_millis(1500)).await;

        let source = HttpDocumentSource::new(base, Duration::from_millis(300), 32).unwrap();
        let err = source.fetch("INV-1").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Download(DownloadError::Timeout { timeout_ms: 300, .. })
        ));
        assert!(err.to_string().contains("300ms"));
    }
}
