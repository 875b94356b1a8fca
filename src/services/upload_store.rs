//! 上传文件暂存
//!
//! 下游服务按文件路径读取文档，因此上传内容先写入暂存目录，
//! 文件名为 `{uuid}-{清洗后的原始文件名}`，下游处理完成后删除。

use std::io;
use std::path::{Path, PathBuf};

use crate::config::UploadConfig;

const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    keep_files: bool,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: config.resolved_dir(),
            keep_files: config.keep_files,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 写入暂存目录并返回文件的绝对路径
    pub async fn save(&self, file_name: &str, data: &[u8]) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("{}-{}", uuid::Uuid::new_v4(), sanitize_file_name(file_name)));
        tokio::fs::write(&path, data).await?;
        let canonical = tokio::fs::canonicalize(&path).await;
        let path = canonical.unwrap_or(path);
        tracing::info!("[UPLOAD] staged {} bytes at {}", data.len(), path.display());
        Ok(path)
    }

    /// 下游处理结束后清理暂存文件（`keep_files` 时保留）
    pub async fn discard(&self, path: &Path) {
        if self.keep_files {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("[UPLOAD] failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// 只保留字母数字、`.`、`-`、`_`，去掉路径成分
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned
        .chars()
        .rev()
        .take(MAX_NAME_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned
    }
}
