//! 上限付きフレームバッファ (Sans I/O)
//!
//! 区切り文字列が見つかるまで、またはバッファがパケットサイズに達するまで
//! データを蓄積する。読み込み自体は呼び出し側が行う。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_multipart::{Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new(16);
//! buffer.feed(b"abc\r\n");
//! assert_eq!(buffer.scan(b"\r\n"), Some(Frame::Delimited(5)));
//!
//! buffer.consume(5);
//! buffer.feed(b"0123456789abcdef");
//! assert_eq!(buffer.scan(b"\r\n"), Some(Frame::CapReached(16)));
//! ```

/// 区切り文字列の探索結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// 区切り文字列が見つかった (区切り文字列の末尾までのバイト数)
    Delimited(usize),
    /// 区切り文字列が見つからないままパケットサイズに達した (蓄積済みバイト数)
    CapReached(usize),
}

impl Frame {
    /// フレームのバイト数
    pub fn len(&self) -> usize {
        match self {
            Frame::Delimited(n) | Frame::CapReached(n) => *n,
        }
    }

    /// 空のフレームかどうか
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 上限付きフレームバッファ
///
/// 読み込みによってパケットサイズを超えて伸びることはない。
/// 呼び出し側から渡された先読みデータだけは上限を超えていてもそのまま保持する。
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    /// パケットサイズ
    limit: usize,
    /// 現在の区切り文字列の一致が始まりうる最小位置
    scan_from: usize,
    /// 直前に探索した区切り文字列
    last_delimiter: Vec<u8>,
}

impl FrameBuffer {
    /// 空のバッファを作成
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            scan_from: 0,
            last_delimiter: Vec::new(),
        }
    }

    /// 先読み済みデータでバッファを作成
    pub fn with_data(data: &[u8], limit: usize) -> Self {
        let mut buffer = Self::new(limit);
        buffer.buf.extend_from_slice(data);
        buffer
    }

    /// パケットサイズを取得
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// パケットサイズを変更
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// 蓄積済みデータ
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// 蓄積済みバイト数
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// バッファが空かどうか
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 上限までに追加で読み込めるバイト数
    pub fn remaining_capacity(&self) -> usize {
        self.limit.saturating_sub(self.buf.len())
    }

    /// 上限に達しているかどうか
    pub fn is_full(&self) -> bool {
        self.remaining_capacity() == 0
    }

    /// 読み込んだデータを追加
    ///
    /// 上限を超える分は呼び出し側の責任で読み込まないこと。
    pub fn feed(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.remaining_capacity());
        self.buf.extend_from_slice(data);
    }

    /// 先頭から n バイトを消費
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
        self.scan_from = self.scan_from.saturating_sub(n);
    }

    /// バッファを破棄して先読みデータで置き換える
    pub fn reset(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
        self.scan_from = 0;
        self.last_delimiter.clear();
    }

    /// 区切り文字列を探索
    ///
    /// - 見つかった場合は `Frame::Delimited`
    /// - 見つからずに上限に達している場合は `Frame::CapReached`
    /// - 見つからず、まだ読み込める場合は `None` (追加データが必要)
    ///
    /// 同じ区切り文字列で探索済みの範囲は再探索しない。
    pub fn scan(&mut self, delimiter: &[u8]) -> Option<Frame> {
        if self.last_delimiter != delimiter {
            self.last_delimiter.clear();
            self.last_delimiter.extend_from_slice(delimiter);
            self.scan_from = 0;
        }

        if let Some(pos) = find_bytes(&self.buf[self.scan_from..], delimiter) {
            let end = self.scan_from + pos + delimiter.len();
            return Some(Frame::Delimited(end));
        }

        // 末尾の区切り文字列長 - 1 バイトは次の読み込みで一致が完成する可能性がある
        self.scan_from = self
            .buf
            .len()
            .saturating_sub(delimiter.len().saturating_sub(1));

        if self.is_full() {
            Some(Frame::CapReached(self.buf.len()))
        } else {
            None
        }
    }
}

/// バイト列から部分列を検索
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
