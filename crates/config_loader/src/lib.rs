//! # Config Loader
//!
//! 读取 firehose 配置文件并产出校验过的 `StreamBlueprint`。
//!
//! 格式由扩展名决定 (`.toml` / `.json`)；解析之后总是执行一次完整校验，
//! 因此调用方拿到的 blueprint 一定满足 source / sink 的交叉约束。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("firehose.toml")).unwrap();
//! println!("batch every {}s", blueprint.streaming.batch_interval_secs);
//! ```

mod parser;
mod validator;

pub use contracts::StreamBlueprint;
pub use parser::ConfigFormat;

use std::path::Path;

use contracts::ContractError;

/// Entry point for reading blueprints
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, parse and validate a configuration file
    ///
    /// # Errors
    /// Unknown extension, unreadable file, malformed content or a failed
    /// validation rule.
    pub fn load_from_path(path: &Path) -> Result<StreamBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContractError::config_parse(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::load_from_str(&content, format)
    }

    /// Parse and validate in-memory content
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<StreamBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        Self::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-run validation, e.g. after CLI overrides were applied
    pub fn validate(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Serialize a blueprint back into `format`
    pub fn render(blueprint: &StreamBlueprint, format: ConfigFormat) -> Result<String, ContractError> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(blueprint)
                .map_err(|e| ContractError::config_parse(format!("cannot render TOML: {e}"))),
            ConfigFormat::Json => serde_json::to_string_pretty(blueprint)
                .map_err(|e| ContractError::config_parse(format!("cannot render JSON: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SourceKind;

    const REPLAY_TOML: &str = r#"
[streaming]
batch_interval_secs = 5
remember_secs = 60

[checkpoint]
directory = "/tmp/firehose-checkpoint"

[source]
kind = "replay"

[source.replay]
directory = "/tmp/firehose-incoming"

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_defaults_filled_in() {
        let bp = ConfigLoader::load_from_str(REPLAY_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.streaming.batch_interval_secs, 5);
        assert_eq!(bp.source.kind, SourceKind::Replay);
        assert!(bp.streaming.enabled);
        assert_eq!(bp.streaming.max_sink_attempts, 3);
        assert!(bp.source.replay.as_ref().unwrap().watch);
    }

    #[test]
    fn test_render_keeps_adapter_identity() {
        let bp = ConfigLoader::load_from_str(REPLAY_TOML, ConfigFormat::Toml).unwrap();
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let text = ConfigLoader::render(&bp, format).unwrap();
            let again = ConfigLoader::load_from_str(&text, format).unwrap();
            assert_eq!(bp.source.fingerprint().hash(), again.source.fingerprint().hash());
            assert_eq!(bp.checkpoint.directory, again.checkpoint.directory);
        }
    }

    #[test]
    fn test_selected_source_section_required() {
        let content = r#"
[streaming]
batch_interval_secs = 5

[checkpoint]
directory = "/tmp/cp"

[source]
kind = "live"

[source.replay]
directory = "/tmp/incoming"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("source.live"));
    }

    #[test]
    fn test_load_from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("firehose.toml");
        std::fs::write(&toml_path, REPLAY_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&toml_path).is_ok());

        let yaml_path = dir.path().join("firehose.yaml");
        std::fs::write(&yaml_path, REPLAY_TOML).unwrap();
        let err = ConfigLoader::load_from_path(&yaml_path).unwrap_err();
        assert!(err.to_string().contains(".yaml"));

        let missing = dir.path().join("missing.toml");
        assert!(ConfigLoader::load_from_path(&missing).is_err());
    }
}
