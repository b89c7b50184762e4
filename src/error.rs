use std::fmt;
use std::io;
use std::path::PathBuf;

/// multipart ダウンロードエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Content-Type が multipart/form-data ではない
    InvalidContentType,
    /// Content-Type に boundary= がない
    BoundaryMissing,
    /// パートヘッダーが不正 (filename 属性がない、引用符が閉じていないなど)
    HeaderMalformed(String),
    /// 出力先ファイルを開けない
    CannotOpenDestination { path: PathBuf, reason: String },
    /// 出力先パスの決定中にファイルシステムの確認に失敗した
    PathResolutionFailed { path: PathBuf, reason: String },
    /// 出力先ファイルへの書き込みに失敗した
    DestinationWrite { path: PathBuf, reason: String },
    /// 入力ストリームの I/O エラー
    Stream { kind: io::ErrorKind, message: String },
    /// 読み込みタイムアウト
    Timeout,
    /// パケットサイズが境界を保持するのに足りない
    PacketSizeTooSmall { size: usize, required: usize },
}

impl Error {
    /// 入力ストリームが途中で終わった
    pub(crate) fn unexpected_eof(message: &str) -> Self {
        Error::Stream {
            kind: io::ErrorKind::UnexpectedEof,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidContentType => write!(f, "content type is not multipart/form-data"),
            Error::BoundaryMissing => write!(f, "boundary is missing in content type"),
            Error::HeaderMalformed(msg) => write!(f, "malformed part header: {}", msg),
            Error::CannotOpenDestination { path, reason } => {
                write!(f, "cannot open destination {}: {}", path.display(), reason)
            }
            Error::PathResolutionFailed { path, reason } => {
                write!(f, "cannot resolve path {}: {}", path.display(), reason)
            }
            Error::DestinationWrite { path, reason } => {
                write!(f, "cannot write destination {}: {}", path.display(), reason)
            }
            Error::Stream { kind, message } => {
                write!(f, "stream error ({:?}): {}", kind, message)
            }
            Error::Timeout => write!(f, "operation timed out"),
            Error::PacketSizeTooSmall { size, required } => {
                write!(f, "packet size too small: {} <= {}", size, required)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            // ソケットの読み込みタイムアウトはプラットフォームによって WouldBlock になる
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
            kind => Error::Stream {
                kind,
                message: e.to_string(),
            },
        }
    }
}

/// ダウンロード失敗
///
/// 失敗した時点までに書き込みが完了したファイルのパスを保持する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadError {
    /// 失敗の原因
    pub error: Error,
    /// 失敗までに完了したファイルのパス (パートの出現順)
    pub paths: Vec<PathBuf>,
}

impl DownloadError {
    /// 完了済みパスなしのエラーを作成
    pub fn new(error: Error) -> Self {
        Self {
            error,
            paths: Vec::new(),
        }
    }

    /// 完了済みパス付きのエラーを作成
    pub fn with_paths(error: Error, paths: Vec<PathBuf>) -> Self {
        Self { error, paths }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "download failed after {} file(s): {}",
            self.paths.len(),
            self.error
        )
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<Error> for DownloadError {
    fn from(e: Error) -> Self {
        DownloadError::new(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_error() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "deadline");
        assert_eq!(Error::from(timeout), Error::Timeout);

        let would_block = io::Error::new(io::ErrorKind::WouldBlock, "socket timeout");
        assert_eq!(Error::from(would_block), Error::Timeout);

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert_eq!(
            Error::from(reset),
            Error::Stream {
                kind: io::ErrorKind::ConnectionReset,
                message: "reset by peer".to_string(),
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::InvalidContentType.to_string(),
            "content type is not multipart/form-data"
        );
        assert_eq!(
            Error::PacketSizeTooSmall {
                size: 4,
                required: 7
            }
            .to_string(),
            "packet size too small: 4 <= 7"
        );

        let e = DownloadError::with_paths(Error::Timeout, vec![PathBuf::from("a.txt")]);
        assert_eq!(
            e.to_string(),
            "download failed after 1 file(s): operation timed out"
        );
    }
}
