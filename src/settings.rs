use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::boundary::Boundary;
use crate::error::Error;

/// ヘッダー読み込み時に呼ばれるフック
///
/// ヘッダーのファイル名を受け取り、出力先パスを返す。
/// `None` または空のパスを返した場合は自動でパスを決定する。
pub type HeaderHook = Arc<dyn Fn(&str) -> Option<PathBuf> + Send + Sync>;

/// ファイルの書き込み完了時に呼ばれるフック
pub type BodyCompleteHook = Arc<dyn Fn(&Path) + Send + Sync>;

/// ダウンロード設定
#[derive(Clone)]
pub struct Settings {
    /// パケットサイズ (デフォルト: 10MB)
    ///
    /// 1 回に保持するデータの上限。ファイルはこのサイズ単位で書き出される。
    pub packet_size: usize,
    /// 読み込み操作のタイムアウト (デフォルト: 30 秒)
    ///
    /// デコーダー自身はタイマーを持たない。I/O 層がこの値で読み込みを打ち切る。
    pub operation_timeout: Duration,
    /// 出力先ディレクトリ (デフォルト: カレントディレクトリ)
    pub output_directory: PathBuf,
    /// ヘッダー読み込み時のフック
    pub on_header: Option<HeaderHook>,
    /// ファイル書き込み完了時のフック
    pub on_body_complete: Option<BodyCompleteHook>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            packet_size: 10 * 1024 * 1024, // 10MB
            operation_timeout: Duration::from_secs(30),
            output_directory: PathBuf::from("."),
            on_header: None,
            on_body_complete: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("packet_size", &self.packet_size)
            .field("operation_timeout", &self.operation_timeout)
            .field("output_directory", &self.output_directory)
            .field("on_header", &self.on_header.is_some())
            .field("on_body_complete", &self.on_body_complete.is_some())
            .finish()
    }
}

impl Settings {
    /// デフォルト設定を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// パケットサイズを設定
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// 読み込みタイムアウトを設定
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// 出力先ディレクトリを設定
    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = directory.into();
        self
    }

    /// ヘッダー読み込み時のフックを設定
    pub fn with_on_header<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.on_header = Some(Arc::new(hook));
        self
    }

    /// ファイル書き込み完了時のフックを設定
    pub fn with_on_body_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.on_body_complete = Some(Arc::new(hook));
        self
    }

    /// 境界に対してパケットサイズが十分か確認
    ///
    /// パケットには少なくとも境界と CRLF + "--" を超えるバイト数が必要。
    /// 足りない場合、上限到達時に書き出せるバイトがなくなり処理が進まない。
    pub fn validate(&self, boundary: &Boundary) -> Result<(), Error> {
        let required = boundary.trailer_len();
        if self.packet_size <= required {
            return Err(Error::PacketSizeTooSmall {
                size: self.packet_size,
                required,
            });
        }
        Ok(())
    }

    /// 書き込み完了フックを呼び出す
    pub fn notify_body_complete(&self, path: &Path) {
        if let Some(hook) = &self.on_body_complete {
            hook(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_default() {
        let settings = Settings::default();
        assert_eq!(settings.packet_size, 10 * 1024 * 1024);
        assert_eq!(settings.operation_timeout, Duration::from_secs(30));
        assert_eq!(settings.output_directory, PathBuf::from("."));
        assert!(settings.on_header.is_none());
        assert!(settings.on_body_complete.is_none());
    }

    #[test]
    fn test_validate() {
        let boundary = Boundary::from_content_type("multipart/form-data; boundary=XYZ").unwrap();

        let settings = Settings::new().with_packet_size(7);
        assert_eq!(
            settings.validate(&boundary),
            Err(Error::PacketSizeTooSmall {
                size: 7,
                required: 7
            })
        );

        let settings = Settings::new().with_packet_size(8);
        assert!(settings.validate(&boundary).is_ok());
    }

    #[test]
    fn test_notify_body_complete() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = completed.clone();
        let settings = Settings::new()
            .with_on_body_complete(move |path| sink.lock().unwrap().push(path.to_path_buf()));

        settings.notify_body_complete(Path::new("a.txt"));
        settings.clone().notify_body_complete(Path::new("b.txt"));

        assert_eq!(
            *completed.lock().unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
        );
    }

    #[test]
    fn test_debug_hides_hooks() {
        let settings = Settings::new().with_on_header(|_| None);
        let debug = format!("{:?}", settings);
        assert!(debug.contains("on_header: true"));
        assert!(debug.contains("on_body_complete: false"));
    }
}
