//! Ingestion 错误类型

use contracts::ContractError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 连接数据源失败
    #[error("failed to connect to '{endpoint}': {message}")]
    Connect {
        /// 目标地址
        endpoint: String,
        /// 错误消息
        message: String,
    },

    /// 数据源超时未发送任何数据（含 keep-alive）
    #[error("source '{name}' stalled for {secs}s")]
    Stalled {
        /// 数据源名称
        name: String,
        /// 静默时长
        secs: u64,
    },

    /// 数据源返回的致命错误
    #[error("source error: {0}")]
    Source(#[from] ContractError),

    /// 泵任务异常退出
    #[error("ingestion pump task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    pub fn connect(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
