//! 比对结果存储
//!
//! 每个结果生成后不可变，通过 UUID 取回

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::outcome::{ComparisonDetail, ComparisonOutcome};

pub trait ResultStore: Send + Sync {
    /// 保存结果并返回新分配的ID
    fn save(&self, outcome: &ComparisonOutcome) -> AppResult<String>;

    fn get(&self, id: &str) -> AppResult<ComparisonDetail>;
}

fn new_result_id() -> String {
    Uuid::new_v4().to_string()
}

/// 内存实现
#[derive(Default)]
pub struct MemoryResultStore {
    entries: Mutex<HashMap<String, ComparisonOutcome>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for MemoryResultStore {
    fn save(&self, outcome: &ComparisonOutcome) -> AppResult<String> {
        let id = new_result_id();
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| AppError::TaskFailed(e.to_string()))?;
        entries.insert(id.clone(), outcome.clone());
        Ok(id)
    }

    fn get(&self, id: &str) -> AppResult<ComparisonDetail> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| AppError::TaskFailed(e.to_string()))?;
        entries
            .get(id)
            .map(|outcome| ComparisonDetail {
                id: id.to_string(),
                outcome: outcome.clone(),
            })
            .ok_or_else(|| AppError::ResultNotFound { id: id.to_string() })
    }
}

/// 文件实现：`<dir>/<id>.json`
pub struct FileResultStore {
    dir: PathBuf,
}

impl FileResultStore {
    pub fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| AppError::store_io(dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    /// 只接受 UUID 形式的ID，拒绝任何路径片段
    fn path_for(&self, id: &str) -> AppResult<PathBuf> {
        Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))?;
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl ResultStore for FileResultStore {
    fn save(&self, outcome: &ComparisonOutcome) -> AppResult<String> {
        let id = new_result_id();
        let path = self.path_for(&id)?;
        let detail = ComparisonDetail {
            id: id.clone(),
            outcome: outcome.clone(),
        };
        let json = serde_json::to_vec_pretty(&detail)?;
        fs::write(&path, json).map_err(|e| AppError::store_io(path.display().to_string(), e))?;
        debug!("比对结果已保存: {}", path.display());
        Ok(id)
    }

    fn get(&self, id: &str) -> AppResult<ComparisonDetail> {
        let path = self.path_for(id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::ResultNotFound { id: id.to_string() })
            }
            Err(e) => return Err(AppError::store_io(path.display().to_string(), e)),
        };
        let detail: ComparisonDetail = serde_json::from_slice(&bytes)?;
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::ComparisonRecord;

    fn outcome() -> ComparisonOutcome {
        ComparisonOutcome::errored(&ComparisonRecord::new(1, "INV-1", "INV-2"), "boom", 5)
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryResultStore::new();
        let id = store.save(&outcome()).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(store.get(&id).unwrap().outcome, outcome());
        assert!(store.get("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn ids_are_unique() {
        let store = MemoryResultStore::new();
        let a = store.save(&outcome()).unwrap();
        let b = store.save(&outcome()).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn file_store_persists_details() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileResultStore::open(dir.path().join("results")).unwrap();
            store.save(&outcome()).unwrap()
        };
        let reopened = FileResultStore::open(dir.path().join("results")).unwrap();
        let detail = reopened.get(&id).unwrap();
        assert_eq!(detail.id, id);
        assert_eq!(detail.outcome.error.as_deref(), Some("boom"));
    }

    #[test]
    fn file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileResultStore::open(dir.path()).unwrap();
        let err = store.get("../jobs").unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::InvalidId(_))));
        let missing = store.get(&Uuid::new_v4().to_string()).unwrap_err();
        assert!(missing.is_not_found());
    }
}
