//! 配置校验模块
//!
//! 校验规则：
//! - 队列容量 > 0
//! - partitions > 0, group_id 非空
//! - backoff: initial_ms <= max_ms, multiplier >= 1.0
//! - max_attempts >= 1, 超时 > 0
//! - sqlite store 必须提供 sqlite_path
//! - listen_addr 为合法 socket 地址

use std::net::SocketAddr;

use contracts::{BackoffConfig, ContractError, PipelineBlueprint, StoreKind};

/// 校验 PipelineBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_stream(blueprint)?;
    validate_distributor(blueprint)?;
    validate_persistence(blueprint)?;
    validate_broadcast(blueprint)?;
    validate_server(blueprint)?;
    Ok(())
}

/// 校验 stream 配置
fn validate_stream(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let stream = &blueprint.stream;
    if stream.partitions == 0 {
        return Err(ContractError::config_validation(
            "stream.partitions",
            "partitions must be > 0",
        ));
    }
    if stream.group_id.trim().is_empty() {
        return Err(ContractError::config_validation(
            "stream.group_id",
            "group_id cannot be empty",
        ));
    }
    validate_backoff("stream.fetch_backoff", &stream.fetch_backoff)
}

/// 校验队列容量
fn validate_distributor(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let distributor = &blueprint.distributor;
    let capacities = [
        ("distributor.input_capacity", distributor.input_capacity),
        (
            "distributor.persistence_queue_capacity",
            distributor.persistence_queue_capacity,
        ),
        (
            "distributor.broadcast_queue_capacity",
            distributor.broadcast_queue_capacity,
        ),
    ];
    for (field, capacity) in capacities {
        if capacity == 0 {
            return Err(ContractError::config_validation(
                field,
                "queue capacity must be > 0",
            ));
        }
    }
    if distributor.persistence_max_wait_ms == 0 {
        return Err(ContractError::config_validation(
            "distributor.persistence_max_wait_ms",
            "persistence_max_wait_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验持久化配置
fn validate_persistence(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let persistence = &blueprint.persistence;
    if persistence.max_attempts == 0 {
        return Err(ContractError::config_validation(
            "persistence.max_attempts",
            "max_attempts must be >= 1",
        ));
    }
    if persistence.call_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "persistence.call_timeout_ms",
            "call_timeout_ms must be > 0",
        ));
    }
    if persistence.store == StoreKind::Sqlite && persistence.sqlite_path.is_none() {
        return Err(ContractError::config_validation(
            "persistence.sqlite_path",
            "sqlite store requires sqlite_path",
        ));
    }
    validate_backoff("persistence.retry_backoff", &persistence.retry_backoff)
}

fn validate_broadcast(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    if blueprint.broadcast.push_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "broadcast.push_timeout_ms",
            "push_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_server(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let addr = &blueprint.server.listen_addr;
    addr.parse::<SocketAddr>().map_err(|e| {
        ContractError::config_validation(
            "server.listen_addr",
            format!("invalid address '{addr}': {e}"),
        )
    })?;
    Ok(())
}

fn validate_backoff(field: &str, backoff: &BackoffConfig) -> Result<(), ContractError> {
    if backoff.initial_ms > backoff.max_ms {
        return Err(ContractError::config_validation(
            field,
            format!(
                "initial_ms ({}) must be <= max_ms ({})",
                backoff.initial_ms, backoff.max_ms
            ),
        ));
    }
    if backoff.multiplier < 1.0 {
        return Err(ContractError::config_validation(
            field,
            format!("multiplier must be >= 1.0, got {}", backoff.multiplier),
        ));
    }
    Ok(())
}
