//! # shiguredo_multipart
//!
//! 依存なしの multipart/form-data ファイルダウンロードライブラリ (Sans I/O)
//!
//! ## 特徴
//!
//! - **依存なし**: 標準ライブラリのみ使用
//! - **Sans I/O**: 入力ストリームの読み込みを完全に分離した設計
//! - **ストリーミング**: ファイル全体をメモリに載せず、パケットサイズ単位で書き出す
//!
//! 読み込みを行うドライバー (ブロッキング / tokio) は `tokio_multipart` クレートが提供する。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_multipart::{Boundary, FrameBuffer, PartDecoder, Settings, Step};
//!
//! let settings = Settings::default();
//! let boundary = Boundary::from_content_type("multipart/form-data; boundary=XYZ").unwrap();
//! settings.validate(&boundary).unwrap();
//!
//! let mut decoder = PartDecoder::new(boundary);
//! let mut buffer = FrameBuffer::new(settings.packet_size);
//!
//! // 受信データを feed...
//! buffer.feed(b"--XYZ\r\n");
//!
//! if let Some(frame) = buffer.scan(decoder.delimiter()) {
//!     let step = decoder.decode(frame, buffer.data()).unwrap();
//!     assert_eq!(step, Step::Skip { consume: 5 });
//!     buffer.consume(step.consumed());
//! }
//! ```

mod boundary;
mod decoder;
mod error;
mod frame;
mod output;
mod resolver;
mod settings;

pub use boundary::{Boundary, DELIMITER_OVERHEAD};
pub use decoder::{PartDecoder, Phase, Step, parse_file_name};
pub use error::{DownloadError, Error};
pub use frame::{Frame, FrameBuffer};
pub use output::OutputPaths;
pub use resolver::{Candidates, PathResolver};
pub use settings::{BodyCompleteHook, HeaderHook, Settings};
