//! 出力先ファイルパスの決定
//!
//! ヘッダーフックが空でないパスを返した場合はそれをそのまま使う。
//! そうでなければ出力先ディレクトリにファイル名を連結し、
//! 既存ファイルと衝突する場合は `name(1).ext`, `name(2).ext`, ... と番号を付ける。
//!
//! 自動命名ではファイル名の最後の要素だけを使うため、
//! `../` を含むファイル名でも出力先ディレクトリの外には出ない。

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::settings::Settings;

/// 出力先パスの決定
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    settings: &'a Settings,
}

impl<'a> PathResolver<'a> {
    /// 設定から作成
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// 自動命名の出力先ディレクトリ
    pub fn output_directory(&self) -> &Path {
        &self.settings.output_directory
    }

    /// ヘッダーフックが指定したパス
    ///
    /// フックがない場合、または空のパスを返した場合は `None`
    pub fn requested(&self, file_name: &str) -> Option<PathBuf> {
        let hook = self.settings.on_header.as_ref()?;
        hook(file_name).filter(|path| !path.as_os_str().is_empty())
    }

    /// 自動命名の候補を順に返すイテレーターを作成
    ///
    /// ファイルシステムの確認は呼び出し側が行う。
    pub fn candidates(&self, file_name: &str) -> Result<Candidates, Error> {
        let name = Path::new(file_name).file_name().ok_or_else(|| {
            Error::HeaderMalformed(format!("unusable file name: {:?}", file_name))
        })?;
        Ok(Candidates::new(&self.settings.output_directory, name))
    }

    /// 出力先パスを決定 (ファイルシステムを同期的に確認する)
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, Error> {
        if let Some(path) = self.requested(file_name) {
            return Ok(path);
        }

        for candidate in self.candidates(file_name)? {
            match candidate.try_exists() {
                Ok(false) => return Ok(candidate),
                Ok(true) => continue,
                Err(e) => {
                    return Err(Error::PathResolutionFailed {
                        path: candidate,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Candidates は u64 の範囲で番号を付け続けるため到達しない
        Err(Error::PathResolutionFailed {
            path: self.output_directory().join(file_name),
            reason: "no free file name".to_string(),
        })
    }
}

/// 自動命名の候補
///
/// `dir/name.ext`, `dir/name(1).ext`, `dir/name(2).ext`, ...
#[derive(Debug, Clone)]
pub struct Candidates {
    directory: PathBuf,
    file_name: OsString,
    stem: OsString,
    extension: Option<OsString>,
    next: u64,
}

impl Candidates {
    fn new(directory: &Path, file_name: &OsStr) -> Self {
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| file_name.to_os_string());
        Self {
            directory: directory.to_path_buf(),
            file_name: file_name.to_os_string(),
            stem,
            extension: path.extension().map(OsStr::to_os_string),
            next: 0,
        }
    }
}

impl Iterator for Candidates {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        let index = self.next;
        self.next = self.next.checked_add(1)?;

        if index == 0 {
            return Some(self.directory.join(&self.file_name));
        }

        let mut name = self.stem.clone();
        name.push(format!("({})", index));
        if let Some(extension) = &self.extension {
            name.push(".");
            name.push(extension);
        }
        Some(self.directory.join(name))
    }
}
