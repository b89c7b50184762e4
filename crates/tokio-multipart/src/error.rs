//! tokio-multipart エラー型
//!
//! エラーの種別は `shiguredo_multipart` と共通。
//! ダウンロードの失敗は書き込みを完了したパスの一覧とともに返す。

use std::io;

pub use shiguredo_multipart::{DownloadError, Error};

/// ダウンロード結果
pub type Result<T> = std::result::Result<T, DownloadError>;

/// 読み込みが操作タイムアウトを超えた場合の I/O エラー
///
/// `Error` に変換すると `Error::Timeout` になる。
pub(crate) fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "read timed out")
}

/// 区切りを見つける前にストリームが終わった場合の I/O エラー
pub(crate) fn end_of_stream() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "stream ended before delimiter",
    )
}
