//! 出力ファイルパスの記録とロールバック

use std::fs;
use std::path::{Path, PathBuf};

/// 出力ファイルパスの一覧
///
/// 書き込み中のパートのパスはファイルを開いた時点で記録する。
/// 書き込みが完了しないまま `rollback()` されるか破棄された場合、
/// そのファイルを削除し一覧からも取り除く。
///
/// 書き込み中のファイルハンドルはこの値より先に閉じておくこと。
#[derive(Debug, Default)]
pub struct OutputPaths {
    paths: Vec<PathBuf>,
    in_flight: bool,
}

impl OutputPaths {
    /// 空の一覧を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 書き込みを始めたファイルのパスを記録
    pub fn begin(&mut self, path: PathBuf) {
        debug_assert!(!self.in_flight);
        self.paths.push(path);
        self.in_flight = true;
    }

    /// 書き込み中のファイルのパス
    pub fn in_flight(&self) -> Option<&Path> {
        if self.in_flight {
            self.paths.last().map(PathBuf::as_path)
        } else {
            None
        }
    }

    /// 書き込み中のファイルを完了扱いにする
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    /// 書き込み中のファイルを削除して一覧から取り除く
    ///
    /// 削除の失敗は無視する。取り除いたパスを返す。
    pub fn rollback(&mut self) -> Option<PathBuf> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        let path = self.paths.pop()?;
        let _ = fs::remove_file(&path);
        Some(path)
    }

    /// 記録済みのパス (書き込み中のものを含む)
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// 完了済みのパス一覧を取り出す
    ///
    /// 書き込み中のファイルがあればロールバックする。
    pub fn into_paths(mut self) -> Vec<PathBuf> {
        self.rollback();
        std::mem::take(&mut self.paths)
    }
}

impl Drop for OutputPaths {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete() {
        let mut outputs = OutputPaths::new();
        outputs.begin(PathBuf::from("a.txt"));
        assert_eq!(outputs.in_flight(), Some(Path::new("a.txt")));
        outputs.complete();
        assert_eq!(outputs.in_flight(), None);
        assert_eq!(outputs.rollback(), None);
        assert_eq!(outputs.into_paths(), vec![PathBuf::from("a.txt")]);
    }

    #[test]
    fn test_rollback_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("done.bin");
        let partial = dir.path().join("partial.bin");
        fs::write(&done, b"done").unwrap();
        fs::write(&partial, b"part").unwrap();

        let mut outputs = OutputPaths::new();
        outputs.begin(done.clone());
        outputs.complete();
        outputs.begin(partial.clone());

        assert_eq!(outputs.rollback(), Some(partial.clone()));
        assert!(!partial.exists());
        assert!(done.exists());
        assert_eq!(outputs.paths(), &[done]);
    }

    #[test]
    fn test_drop_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("partial.bin");
        fs::write(&partial, b"part").unwrap();

        {
            let mut outputs = OutputPaths::new();
            outputs.begin(partial.clone());
        }
        assert!(!partial.exists());
    }

    #[test]
    fn test_rollback_missing_file() {
        // 削除に失敗してもパスは取り除かれる
        let mut outputs = OutputPaths::new();
        outputs.begin(PathBuf::from("/nonexistent/partial.bin"));
        assert!(outputs.rollback().is_some());
        assert!(outputs.paths().is_empty());
    }
}
