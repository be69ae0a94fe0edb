//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Stream 返回了不可重试的错误
    #[error("stream error: {0}")]
    Stream(#[from] contracts::ContractError),

    /// Distributor 输入通道已关闭
    #[error("distributor input closed, {pending} record(s) not handed off")]
    DistributorClosed {
        /// 未能交付的记录数
        pending: usize,
    },

    /// Distributor 在就绪前退出
    #[error("distributor went away before signalling readiness")]
    DistributorNotReady,
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
