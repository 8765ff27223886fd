use crate::error::{AppResult, ConfigError};
use crate::models::field::FieldRuleSet;
use crate::models::job::ComparisonRecord;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 批处理清单中的单行
#[derive(Debug, Deserialize)]
struct ManifestRow {
    old: String,
    new: String,
    #[serde(default)]
    old_name: Option<String>,
    #[serde(default)]
    new_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    records: Vec<ManifestRow>,
}

async fn read_toml_file(path: &Path) -> AppResult<String> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
    Ok(content)
}

/// 解析批处理清单内容
///
/// 空的 old/new 行会被跳过（与表格中的空行一致），序号按保留下来的顺序从 1 开始编号
pub fn parse_batch_manifest(content: &str, origin: &str) -> AppResult<Vec<ComparisonRecord>> {
    let manifest: Manifest = toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
        path: origin.to_string(),
        source,
    })?;

    let records = manifest
        .records
        .into_iter()
        .filter(|row| !row.old.trim().is_empty() && !row.new.trim().is_empty())
        .enumerate()
        .map(|(idx, row)| ComparisonRecord {
            sequence_number: idx + 1,
            old_ref: row.old.trim().to_string(),
            new_ref: row.new.trim().to_string(),
            old_name: row.old_name,
            new_name: row.new_name,
        })
        .collect();

    Ok(records)
}

/// 从 TOML 文件加载批处理清单
pub async fn load_batch_manifest(path: &Path) -> AppResult<Vec<ComparisonRecord>> {
    let content = read_toml_file(path).await?;
    let records = parse_batch_manifest(&content, &path.display().to_string())?;
    tracing::info!(
        "成功加载清单 {}: {} 组记录",
        path.file_name().unwrap_or_default().to_string_lossy(),
        records.len()
    );
    Ok(records)
}

/// 从 TOML 文件加载特殊字段规则
pub async fn load_field_rules(path: &Path) -> AppResult<FieldRuleSet> {
    let content = read_toml_file(path).await?;
    let rules: FieldRuleSet = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
        path: path.display().to_string(),
        source,
    })?;

    if rules.is_empty() {
        return Err(ConfigError::Invalid(format!("规则文件 {} 中没有任何字段", path.display())).into());
    }

    tracing::info!("成功加载 {} 条特殊字段规则", rules.len());
    Ok(rules)
}
