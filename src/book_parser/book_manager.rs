use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::base_system::context::safe_fs_name;
use crate::download::models::Book;

const MAX_FILE_STEM: usize = 120;

/// 输出目录与文件命名：`<书名>.epub`，以及打包前的原始数据 `<书名>.json`。
pub struct BookManager {
    output_dir: PathBuf,
}

impl BookManager {
    pub fn new(output_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn epub_path(&self, title: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.epub", safe_fs_name(title, "_", MAX_FILE_STEM)))
    }

    pub fn dump_path(&self, title: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.json", safe_fs_name(title, "_", MAX_FILE_STEM)))
    }

    /// 保存完整书籍数据（元信息 + 正文），便于排查解析问题。
    pub fn write_raw_dump(&self, book: &Book) -> Result<PathBuf> {
        let path = self.dump_path(&book.title);
        let bytes = serde_json::to_vec_pretty(book).context("serialize book")?;
        write_atomic(&path, &bytes).with_context(|| format!("write {}", path.display()))?;
        info!(target: "book_manager", "原始数据已保存: {}", path.display());
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}part",
        path.extension().and_then(|s| s.to_str()).unwrap_or("")
    ));
    fs::write(&tmp, bytes)?;
    let _ = fs::remove_file(path);
    fs::rename(tmp, path)
}
