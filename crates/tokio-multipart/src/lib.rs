//! tokio_multipart - I/O drivers for shiguredo_multipart
//!
//! ストリームから multipart/form-data のボディを読み込み、
//! 各パートをファイルへ書き出すダウンローダー。
//!
//! ## Features
//!
//! - `blocking` - `std::io::Read` 向けのブロッキングドライバー (デフォルト有効)
//! - `full` - すべての機能を有効化
//!
//! ## 特徴
//!
//! - **shiguredo_multipart ベース**: Sans I/O ライブラリをベースにした設計
//! - **非同期 I/O**: tokio による読み込みとファイル書き込み
//! - **ストリーミング**: パケットサイズ以上のメモリを使わない
//! - **ロールバック**: 失敗時とキャンセル時に書き込み途中のファイルを削除
//!
//! ## 非同期
//!
//! ```ignore
//! use tokio_multipart::{Downloader, Settings};
//!
//! let settings = Settings::new()
//!     .with_output_directory("uploads")
//!     .with_operation_timeout(Duration::from_secs(10));
//!
//! let mut downloader = Downloader::new(stream, remaining);
//! match downloader.download(content_type, &settings).await {
//!     Ok(paths) => println!("saved: {:?}", paths),
//!     Err(e) => eprintln!("failed: {} (kept: {:?})", e.error, e.paths),
//! }
//! ```
//!
//! ## ブロッキング
//!
//! ```ignore
//! use tokio_multipart::blocking::Downloader;
//!
//! let mut downloader = Downloader::new(stream, remaining);
//! let paths = downloader.download(content_type, &settings)?;
//! ```

mod downloader;
mod error;
mod reader;

#[cfg(feature = "blocking")]
pub mod blocking;

pub use downloader::Downloader;
pub use error::{DownloadError, Error, Result};
pub use reader::FrameReader;

// Sans I/O 側の型を再エクスポート
pub use shiguredo_multipart::{BodyCompleteHook, HeaderHook, Settings};
