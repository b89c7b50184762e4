//! 非同期フレーム読み込み
//!
//! `AsyncRead` から区切りまでのデータを `FrameBuffer` に読み込む。
//! 1 回の読み込みごとに操作タイムアウトを適用する。

use std::io;
use std::time::Duration;

use shiguredo_multipart::{Frame, FrameBuffer, Settings};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{end_of_stream, timed_out};

/// 1 回の読み込みで要求する最大バイト数
pub(crate) const READ_CHUNK_SIZE: usize = 64 * 1024;

/// 非同期フレームリーダー
#[derive(Debug)]
pub struct FrameReader<R> {
    source: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
    timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// 読み込み元と先読み済みデータから作成
    ///
    /// HTTP ヘッダーのパース時に読み込み済みのボディ先頭を `received` に渡す。
    pub fn new(source: R, received: &[u8]) -> Self {
        let settings = Settings::default();
        Self {
            source,
            buffer: FrameBuffer::with_data(received, settings.packet_size),
            chunk: vec![0; READ_CHUNK_SIZE],
            timeout: settings.operation_timeout,
        }
    }

    /// パケットサイズと操作タイムアウトを設定
    pub fn configure(&mut self, packet_size: usize, timeout: Duration) {
        self.buffer.set_limit(packet_size);
        self.timeout = timeout;
    }

    /// 内部バッファ
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// 先頭 n バイトを消費
    pub fn consume(&mut self, n: usize) {
        self.buffer.consume(n);
    }

    /// バッファを先読み済みデータで置き換える
    pub fn reset(&mut self, received: &[u8]) {
        self.buffer.reset(received);
    }

    /// 読み込み元への参照
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// 読み込み元への可変参照
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// 読み込み元を取り出す
    pub fn into_inner(self) -> R {
        self.source
    }

    /// 区切りが見つかるかバッファが満杯になるまで読み込む
    ///
    /// 区切りより前にストリームが終わった場合は `UnexpectedEof`、
    /// 1 回の読み込みが操作タイムアウトを超えた場合は `TimedOut` を返す。
    /// どちらの場合もバッファの内容は残る。
    pub async fn read_until(&mut self, delimiter: &[u8]) -> io::Result<Frame> {
        loop {
            if let Some(frame) = self.buffer.scan(delimiter) {
                return Ok(frame);
            }

            let want = self.buffer.remaining_capacity().min(self.chunk.len());
            let n = tokio::time::timeout(self.timeout, self.source.read(&mut self.chunk[..want]))
                .await
                .map_err(|_| timed_out())??;
            if n == 0 {
                return Err(end_of_stream());
            }
            self.buffer.feed(&self.chunk[..n]);
        }
    }
}
