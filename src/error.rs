use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 文档下载错误
    #[error("下载错误: {0}")]
    Download(#[from] DownloadError),
    /// 文档解析错误
    #[error("解析错误: {0}")]
    Extract(#[from] ExtractError),
    /// 存储层错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 批处理任务不存在
    #[error("任务不存在: {job_id}")]
    JobNotFound { job_id: String },
    /// 比对结果不存在
    #[error("比对结果不存在: {id}")]
    ResultNotFound { id: String },
    /// 只有处理中的任务才能重启
    #[error("任务 {job_id} 当前状态为 {status}，无法重启")]
    RestartConflict { job_id: String, status: String },
    /// 后台任务异常退出（panic 或被取消）
    #[error("后台任务执行失败: {0}")]
    TaskFailed(String),
}

/// 文档下载错误
///
/// 每个变体都带上来源引用，方便在批处理结果中定位是哪一份文档出了问题
#[derive(Debug, Error)]
pub enum DownloadError {
    /// 超过墙钟超时
    #[error("下载 {source_ref} 超时 ({timeout_ms}ms)")]
    Timeout { source_ref: String, timeout_ms: u64 },
    /// 文件超过大小上限
    #[error("文件 {source_ref} 超过大小上限: {actual} > {limit} 字节")]
    TooLarge {
        source_ref: String,
        limit: u64,
        actual: u64,
    },
    /// 网络请求失败
    #[error("无法下载 {source_ref}: {message}")]
    Network { source_ref: String, message: String },
    /// 服务端返回非 2xx 状态码
    #[error("下载 {source_ref} 返回状态码 {status}")]
    BadStatus { source_ref: String, status: u16 },
    /// 本地文件读取失败
    #[error("读取文件 {source_ref} 失败: {source}")]
    Io {
        source_ref: String,
        #[source]
        source: std::io::Error,
    },
}

/// 文档解析错误
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 不是 PDF 文档
    #[error("不支持的文档格式 (缺少 %PDF 文件头)")]
    Unsupported,
    /// PDF 结构损坏
    #[error("PDF 文档损坏: {0}")]
    Corrupt(String),
    /// 页面内容流无法解码
    #[error("第 {page} 页内容流解码失败: {message}")]
    ContentStream { page: u32, message: String },
}

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读写文件失败
    #[error("存储文件 {path} 读写失败: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化/反序列化失败
    #[error("存储数据序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 非法的结果ID
    #[error("非法的结果ID: {0}")]
    InvalidId(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("无法读取文件 {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置内容不合法
    #[error("配置不合法: {0}")]
    Invalid(String),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建网络下载错误
    pub fn download_failed(source_ref: impl Into<String>, message: impl ToString) -> Self {
        AppError::Download(DownloadError::Network {
            source_ref: source_ref.into(),
            message: message.to_string(),
        })
    }

    /// 创建存储IO错误
    pub fn store_io(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Store(StoreError::Io {
            path: path.into(),
            source,
        })
    }

    /// 是否属于"找不到"类错误（任务或结果）
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::JobNotFound { .. } | AppError::ResultNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Store(StoreError::Serialization(err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::TaskFailed(err.to_string())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
