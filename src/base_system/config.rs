//! 配置文件读写与带注释生成。
//!
//! 读取流程：不存在则写出默认配置；存在则与默认值合并（用户值优先），
//! 若用户文件缺少字段，则把合并后的完整配置（带注释）写回磁盘。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    fn fields() -> &'static [FieldMeta];

    /// 合并完成后的额外校验，默认不做任何检查。
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 按路径加载配置；`config_path` 优先，其次 `base_dir/FILE_NAME`，最后当前目录。
pub fn load_or_create<T: ConfigSpec>(
    config_path: Option<&Path>,
    base_dir: Option<&Path>,
) -> Result<T, ConfigError> {
    let path = resolve_path::<T>(config_path, base_dir);
    ensure_parent(&path)?;

    if !path.exists() {
        debug!(target: "config", "配置文件不存在，写出默认配置: {}", path.display());
        let default_config = T::default();
        write_with_comments(&default_config, &path)?;
        return Ok(default_config);
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let (config, missing) = merge_with_defaults::<T>(&raw).map_err(|err| match err {
        MergeError::Parse(source) => ConfigError::Parse {
            path: path.clone(),
            source,
        },
        MergeError::Validation(msg) => ConfigError::Validation(msg),
    })?;
    config.validate()?;

    if missing {
        debug!(target: "config", "配置文件缺少字段，补全后写回: {}", path.display());
        write_with_comments(&config, &path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) =
        serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))?
    else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut lines = Vec::with_capacity(T::fields().len() * 2);
    for field in T::fields() {
        if !field.description.is_empty() {
            lines.push(format!("# {}", field.description.replace('\n', "\n# ")));
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let yaml_line = serde_yaml::to_string(&Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        lines.push(yaml_line.trim().to_string());
    }

    Ok(lines.join("\n") + "\n")
}

enum MergeError {
    Parse(serde_yaml::Error),
    Validation(String),
}

/// 返回合并后的配置，以及用户文件是否缺少已知字段。
fn merge_with_defaults<T: ConfigSpec>(raw: &str) -> Result<(T, bool), MergeError> {
    let user_yaml: Value = serde_yaml::from_str(raw).map_err(MergeError::Parse)?;

    let missing = match &user_yaml {
        Value::Mapping(map) => T::fields()
            .iter()
            .any(|f| !map.contains_key(Value::String(f.name.to_string()))),
        // 空文件会被解析为 Null
        _ => true,
    };

    let mut merged =
        serde_yaml::to_value(T::default()).map_err(|e| MergeError::Validation(e.to_string()))?;
    if !matches!(user_yaml, Value::Null) {
        merge_values(&mut merged, user_yaml);
    }

    let config: T =
        serde_yaml::from_value(merged).map_err(|e| MergeError::Validation(e.to_string()))?;
    Ok((config, missing))
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                if let Some(dest_val) = dest.get_mut(&key) {
                    merge_values(dest_val, user_val);
                } else {
                    dest.insert(key, user_val);
                }
            }
        }
        (dest, other) => {
            *dest = other;
        }
    }
}

fn resolve_path<T: ConfigSpec>(path: Option<&Path>, base_dir: Option<&Path>) -> PathBuf {
    match (path, base_dir) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(base)) => base.join(T::FILE_NAME),
        (None, None) => PathBuf::from(T::FILE_NAME),
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        workers: usize,
        name: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                workers: 5,
                name: "demo".to_string(),
            }
        }
    }

    impl ConfigSpec for Sample {
        const FILE_NAME: &'static str = "sample.yml";

        fn fields() -> &'static [FieldMeta] {
            static FIELDS: [FieldMeta; 2] = [
                FieldMeta {
                    name: "workers",
                    description: "并发数",
                },
                FieldMeta {
                    name: "name",
                    description: "",
                },
            ];
            &FIELDS
        }
    }

    #[test]
    fn creates_default_file_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Sample = load_or_create(None, Some(dir.path())).unwrap();
        assert_eq!(cfg, Sample::default());

        let written = fs::read_to_string(dir.path().join("sample.yml")).unwrap();
        assert!(written.contains("# 并发数"));
        assert!(written.contains("workers: 5"));
        assert!(written.contains("name: demo"));
    }

    #[test]
    fn user_values_override_defaults_and_missing_fields_are_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(&path, "workers: 9\n").unwrap();

        let cfg: Sample = load_or_create(Some(&path), None).unwrap();
        assert_eq!(cfg.workers, 9);
        assert_eq!(cfg.name, "demo");

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("workers: 9"));
        assert!(rewritten.contains("name: demo"));
    }

    #[test]
    fn invalid_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "workers: [1, 2\n").unwrap();

        let err = load_or_create::<Sample>(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
