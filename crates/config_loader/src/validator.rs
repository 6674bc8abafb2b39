//! 配置校验模块
//!
//! 校验规则：
//! - streaming / live / replay 段的字段范围 (validator derive)
//! - `source.kind` 选中的段必须存在
//! - track 关键字去空后非空
//! - sink name 非空且唯一

use std::collections::HashSet;

use contracts::{ContractError, SourceKind, StreamBlueprint};
use validator::{Validate, ValidationErrors};

/// 校验 StreamBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    validate_streaming(blueprint)?;
    validate_checkpoint(blueprint)?;
    validate_source(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 把 validator 的错误转换成带字段路径的 ContractError
fn from_validation_errors(prefix: &str, errors: ValidationErrors) -> ContractError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    match fields.first() {
        Some((field, errs)) => {
            let message = errs
                .iter()
                .map(|e| match &e.message {
                    Some(m) => m.to_string(),
                    None => format!("failed '{}' check", e.code),
                })
                .collect::<Vec<_>>()
                .join("; ");
            ContractError::config_validation(format!("{prefix}.{field}"), message)
        }
        None => ContractError::config_validation(prefix, errors.to_string()),
    }
}

/// 校验批处理配置
fn validate_streaming(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    blueprint
        .streaming
        .validate()
        .map_err(|e| from_validation_errors("streaming", e))
}

/// 校验 checkpoint 目录
fn validate_checkpoint(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    if blueprint.checkpoint.directory.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "checkpoint.directory",
            "checkpoint directory cannot be empty",
        ));
    }
    Ok(())
}

/// 校验数据源配置
fn validate_source(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;

    match source.kind {
        SourceKind::Live => {
            let live = source.live.as_ref().ok_or_else(|| {
                ContractError::config_validation(
                    "source.live",
                    "source.kind = \"live\" requires a [source.live] section",
                )
            })?;
            live.validate()
                .map_err(|e| from_validation_errors("source.live", e))?;

            // 全部是空白关键字也视为空
            if live.normalized_track().is_empty() {
                return Err(ContractError::config_validation(
                    "source.live.track",
                    "track must contain at least one non-blank keyword",
                ));
            }
            if live.initial_backoff_ms > live.max_backoff_ms {
                return Err(ContractError::config_validation(
                    "source.live.initial_backoff_ms",
                    format!(
                        "initial_backoff_ms ({}) must be <= max_backoff_ms ({})",
                        live.initial_backoff_ms, live.max_backoff_ms
                    ),
                ));
            }
        }
        SourceKind::Replay => {
            let replay = source.replay.as_ref().ok_or_else(|| {
                ContractError::config_validation(
                    "source.replay",
                    "source.kind = \"replay\" requires a [source.replay] section",
                )
            })?;
            replay
                .validate()
                .map_err(|e| from_validation_errors("source.replay", e))?;

            if replay.directory.as_os_str().is_empty() {
                return Err(ContractError::config_validation(
                    "source.replay.directory",
                    "replay directory cannot be empty",
                ));
            }
        }
    }

    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
