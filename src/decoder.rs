//! multipart/form-data パートデコーダー (Sans I/O)
//!
//! 状態遷移:
//!
//! ```text
//! AwaitingFirstBoundary -> BoundaryTail -> ReadingHeader -> BodyOpen
//!                              ^                              |  ^
//!                              |                              |  | (パケット上限)
//!                              +------------------------------+--+
//! BoundaryTail -> Done ("--" で始まる境界行)
//! ```
//!
//! デコーダーは読み込みも書き込みも行わない。呼び出し側は
//!
//! 1. `delimiter()` で次に探す区切り文字列を取得し、
//! 2. `FrameBuffer::scan()` が `Frame` を返すまでデータを読み込み、
//! 3. `decode()` が返した `Step` に従ってファイルへ書き出し、
//! 4. `Step::consumed()` バイトをバッファから消費する。
//!
//! 入力が途中で終わった場合は `decode_eof()` を呼ぶ。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_multipart::{Boundary, FrameBuffer, PartDecoder, Step};
//!
//! let boundary = Boundary::from_content_type("multipart/form-data; boundary=XYZ").unwrap();
//! let mut decoder = PartDecoder::new(boundary);
//! let mut buffer = FrameBuffer::with_data(
//!     b"--XYZ\r\n\
//!       Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\n\
//!       hello\r\n\
//!       --XYZ--\r\n",
//!     1024,
//! );
//!
//! let mut body = Vec::new();
//! while !decoder.is_finished() {
//!     let frame = buffer.scan(decoder.delimiter()).unwrap();
//!     let step = decoder.decode(frame, buffer.data()).unwrap();
//!     match &step {
//!         Step::Open { file_name, .. } => assert_eq!(file_name, "a.txt"),
//!         Step::Write { len } | Step::Close { len, .. } => {
//!             body.extend_from_slice(&buffer.data()[..*len]);
//!         }
//!         Step::Skip { .. } | Step::Finish { .. } => {}
//!     }
//!     buffer.consume(step.consumed());
//! }
//! assert_eq!(body, b"hello");
//! ```

use crate::boundary::{Boundary, DELIMITER_OVERHEAD};
use crate::error::Error;
use crate::frame::Frame;

/// ヘッダー行の区切り
const CRLF: &[u8] = b"\r\n";

/// ヘッダーとボディの区切り
const HEADER_END: &[u8] = b"\r\n\r\n";

/// 終了境界の接尾辞、境界の接頭辞
const DASHES: &[u8] = b"--";

/// ファイル名属性
const FILENAME_MARKER: &str = "filename=\"";

/// デコード状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 最初の境界待ち (プリアンブルは読み捨てる)
    AwaitingFirstBoundary,
    /// 境界直後の行待ち ("--" なら終了、それ以外は次のヘッダー)
    BoundaryTail,
    /// パートヘッダー待ち
    ReadingHeader,
    /// ボディ読み取り中
    BodyOpen,
    /// 終了境界を検出
    Done,
    /// エラーで終了
    Failed,
}

/// 呼び出し側が行う処理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// データを読み捨てる
    Skip { consume: usize },
    /// 新しいファイルを開く
    Open { file_name: String, consume: usize },
    /// バッファ先頭の `len` バイトをファイルに書き出す (ボディの途中)
    Write { len: usize },
    /// バッファ先頭の `len` バイトをファイルに書き出して閉じる
    Close { len: usize, consume: usize },
    /// 終了境界に到達した
    Finish { consume: usize },
}

impl Step {
    /// 処理後にバッファから消費するバイト数
    pub fn consumed(&self) -> usize {
        match self {
            Step::Skip { consume }
            | Step::Open { consume, .. }
            | Step::Close { consume, .. }
            | Step::Finish { consume } => *consume,
            Step::Write { len } => *len,
        }
    }
}

/// パートデコーダー
#[derive(Debug, Clone)]
pub struct PartDecoder {
    boundary: Boundary,
    phase: Phase,
}

impl PartDecoder {
    /// 新しいデコーダーを作成
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            phase: Phase::AwaitingFirstBoundary,
        }
    }

    /// 境界を取得
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// 現在の状態
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 終了したかどうか (成功、失敗どちらも)
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed)
    }

    /// 次に探す区切り文字列
    pub fn delimiter(&self) -> &[u8] {
        match self.phase {
            Phase::AwaitingFirstBoundary | Phase::BodyOpen => self.boundary.as_bytes(),
            Phase::BoundaryTail => CRLF,
            Phase::ReadingHeader => HEADER_END,
            Phase::Done | Phase::Failed => &[],
        }
    }

    /// フレームを処理する
    ///
    /// `data` はフレームバッファの内容で、`frame` はその先頭からのバイト数を表す。
    pub fn decode(&mut self, frame: Frame, data: &[u8]) -> Result<Step, Error> {
        debug_assert!(frame.len() <= data.len());
        let result = self.decode_frame(frame, data);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    /// 入力が途中で終わった場合の処理
    ///
    /// `data` は読み込み済みで未消費のデータ。
    pub fn decode_eof(&mut self, data: &[u8]) -> Result<Step, Error> {
        let result = match self.phase {
            Phase::BoundaryTail if data.starts_with(DASHES) => {
                // 終了境界の後ろに CRLF がないまま閉じられた
                self.phase = Phase::Done;
                Ok(Step::Finish {
                    consume: data.len(),
                })
            }
            Phase::BoundaryTail | Phase::ReadingHeader => Err(Error::HeaderMalformed(
                "unexpected end of stream in part header".to_string(),
            )),
            Phase::AwaitingFirstBoundary => Err(Error::unexpected_eof("boundary not found")),
            Phase::BodyOpen => Err(Error::unexpected_eof(
                "unexpected end of stream in part body",
            )),
            Phase::Done => Ok(Step::Finish { consume: 0 }),
            Phase::Failed => Err(failed()),
        };
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    fn decode_frame(&mut self, frame: Frame, data: &[u8]) -> Result<Step, Error> {
        match (self.phase, frame) {
            (Phase::AwaitingFirstBoundary, Frame::Delimited(n)) => {
                self.phase = Phase::BoundaryTail;
                Ok(Step::Skip { consume: n })
            }
            (Phase::AwaitingFirstBoundary, Frame::CapReached(n)) => {
                // プリアンブルは捨てるが、途中で切れた境界の可能性がある末尾は残す
                let keep = self.boundary.len() - 1;
                Ok(Step::Skip {
                    consume: n.saturating_sub(keep),
                })
            }
            (Phase::BoundaryTail, Frame::Delimited(n)) => {
                if data[..n].starts_with(DASHES) {
                    self.phase = Phase::Done;
                    Ok(Step::Finish { consume: n })
                } else {
                    self.phase = Phase::ReadingHeader;
                    Ok(Step::Skip { consume: n })
                }
            }
            (Phase::BoundaryTail, Frame::CapReached(_)) => Err(Error::HeaderMalformed(
                "boundary line exceeds packet size".to_string(),
            )),
            (Phase::ReadingHeader, Frame::Delimited(n)) => {
                let file_name = parse_file_name(&data[..n])?;
                self.phase = Phase::BodyOpen;
                Ok(Step::Open {
                    file_name,
                    consume: n,
                })
            }
            (Phase::ReadingHeader, Frame::CapReached(_)) => Err(Error::HeaderMalformed(
                "part header exceeds packet size".to_string(),
            )),
            (Phase::BodyOpen, Frame::CapReached(n)) => {
                // 境界が読み込みの境目で分割されていても書き出さないよう、
                // CRLF + "--" + 境界の長さ分は残す
                Ok(Step::Write {
                    len: n.saturating_sub(self.boundary.trailer_len()),
                })
            }
            (Phase::BodyOpen, Frame::Delimited(n)) => {
                let trailer = self.boundary.trailer_len();
                if n < trailer {
                    return Err(Error::HeaderMalformed(
                        "boundary is not preceded by CRLF and \"--\"".to_string(),
                    ));
                }
                let len = n - trailer;
                if &data[len..len + DELIMITER_OVERHEAD] != b"\r\n--" {
                    return Err(Error::HeaderMalformed(
                        "boundary is not preceded by CRLF and \"--\"".to_string(),
                    ));
                }
                self.phase = Phase::BoundaryTail;
                Ok(Step::Close { len, consume: n })
            }
            (Phase::Done, _) => Ok(Step::Finish { consume: 0 }),
            (Phase::Failed, _) => Err(failed()),
        }
    }
}

fn failed() -> Error {
    Error::HeaderMalformed("decoder already failed".to_string())
}

/// パートヘッダーからファイル名を取り出す
///
/// `filename="` の後ろから、その行の最後の `"` までをファイル名とする。
/// ファイル名に `"` が含まれていてもよい。
pub fn parse_file_name(header: &[u8]) -> Result<String, Error> {
    let text = std::str::from_utf8(header)
        .map_err(|_| Error::HeaderMalformed("part header is not valid UTF-8".to_string()))?;

    let start = text
        .find(FILENAME_MARKER)
        .ok_or_else(|| Error::HeaderMalformed("filename attribute is missing".to_string()))?
        + FILENAME_MARKER.len();

    let rest = &text[start..];
    let line = match rest.find("\r\n") {
        Some(end) => &rest[..end],
        None => rest,
    };

    let end = line.rfind('"').ok_or_else(|| {
        Error::HeaderMalformed("filename attribute is not terminated".to_string())
    })?;

    Ok(line[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(boundary: &str) -> PartDecoder {
        let content_type = format!("multipart/form-data; boundary={}", boundary);
        PartDecoder::new(Boundary::from_content_type(&content_type).unwrap())
    }

    #[test]
    fn test_parse_file_name() {
        let header = b"Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n";
        assert_eq!(parse_file_name(header).unwrap(), "a.txt");

        // 最後の引用符までがファイル名
        let header = b"Content-Disposition: form-data; filename=\"say \"hi\".txt\"\r\n\r\n";
        assert_eq!(parse_file_name(header).unwrap(), "say \"hi\".txt");

        let header = b"Content-Disposition: form-data; filename=\"\"\r\n\r\n";
        assert_eq!(parse_file_name(header).unwrap(), "");
    }

    #[test]
    fn test_parse_file_name_malformed() {
        let missing = b"Content-Disposition: form-data; name=\"field\"\r\n\r\n";
        assert!(matches!(
            parse_file_name(missing),
            Err(Error::HeaderMalformed(_))
        ));

        let unterminated = b"Content-Disposition: form-data; filename=\"a.txt\r\n\r\n";
        assert!(matches!(
            parse_file_name(unterminated),
            Err(Error::HeaderMalformed(_))
        ));

        let invalid_utf8 = b"Content-Disposition: form-data; filename=\"\xFF\"\r\n\r\n";
        assert!(matches!(
            parse_file_name(invalid_utf8),
            Err(Error::HeaderMalformed(_))
        ));
    }

    #[test]
    fn test_single_part() {
        let mut decoder = decoder("XYZ");
        assert_eq!(decoder.delimiter(), b"XYZ");

        let data = b"--XYZ\r\n";
        let step = decoder.decode(Frame::Delimited(5), data).unwrap();
        assert_eq!(step, Step::Skip { consume: 5 });
        assert_eq!(decoder.phase(), Phase::BoundaryTail);
        assert_eq!(decoder.delimiter(), b"\r\n");

        let step = decoder.decode(Frame::Delimited(2), b"\r\n").unwrap();
        assert_eq!(step, Step::Skip { consume: 2 });
        assert_eq!(decoder.delimiter(), b"\r\n\r\n");

        let header = b"Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\n";
        let step = decoder
            .decode(Frame::Delimited(header.len()), header)
            .unwrap();
        assert_eq!(
            step,
            Step::Open {
                file_name: "a.txt".to_string(),
                consume: header.len()
            }
        );
        assert_eq!(decoder.phase(), Phase::BodyOpen);

        let body = b"hello\r\n--XYZ--\r\n";
        let step = decoder.decode(Frame::Delimited(12), body).unwrap();
        assert_eq!(step, Step::Close { len: 5, consume: 12 });

        let step = decoder.decode(Frame::Delimited(4), b"--\r\n").unwrap();
        assert_eq!(step, Step::Finish { consume: 4 });
        assert!(decoder.is_finished());
        assert_eq!(decoder.phase(), Phase::Done);
    }

    #[test]
    fn test_body_cap_reached_keeps_trailer() {
        let mut decoder = decoder("XYZ");
        decoder.phase = Phase::BodyOpen;

        // CRLF + "--" + 境界 (7 バイト) は書き出さずに残す
        let data = b"0123456789\r\n--XY";
        let step = decoder.decode(Frame::CapReached(16), data).unwrap();
        assert_eq!(step, Step::Write { len: 9 });
        assert_eq!(step.consumed(), 9);
        assert_eq!(decoder.phase(), Phase::BodyOpen);
    }

    #[test]
    fn test_body_boundary_without_prefix() {
        let mut decoder = decoder("XYZ");
        decoder.phase = Phase::BodyOpen;

        let data = b"plain XYZ text";
        let result = decoder.decode(Frame::Delimited(9), data);
        assert!(matches!(result, Err(Error::HeaderMalformed(_))));
        assert_eq!(decoder.phase(), Phase::Failed);

        let mut decoder = self::decoder("XYZ");
        decoder.phase = Phase::BodyOpen;
        let result = decoder.decode(Frame::Delimited(3), b"XYZ");
        assert!(matches!(result, Err(Error::HeaderMalformed(_))));
    }

    #[test]
    fn test_preamble_cap_reached() {
        let mut decoder = decoder("XYZ");
        let step = decoder
            .decode(Frame::CapReached(10), b"preamble-X")
            .unwrap();
        // 境界の長さ - 1 バイトは残す
        assert_eq!(step, Step::Skip { consume: 8 });
        assert_eq!(decoder.phase(), Phase::AwaitingFirstBoundary);
    }

    #[test]
    fn test_header_cap_reached() {
        let mut decoder = decoder("XYZ");
        decoder.phase = Phase::ReadingHeader;
        let result = decoder.decode(Frame::CapReached(8), b"Content-");
        assert!(matches!(result, Err(Error::HeaderMalformed(_))));
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_decode_eof() {
        let mut decoder = decoder("XYZ");
        decoder.phase = Phase::BoundaryTail;
        assert_eq!(
            decoder.decode_eof(b"--").unwrap(),
            Step::Finish { consume: 2 }
        );
        assert_eq!(decoder.phase(), Phase::Done);

        let mut decoder = self::decoder("XYZ");
        decoder.phase = Phase::ReadingHeader;
        assert!(matches!(
            decoder.decode_eof(b"Content-Disposition"),
            Err(Error::HeaderMalformed(_))
        ));

        let mut decoder = self::decoder("XYZ");
        decoder.phase = Phase::BodyOpen;
        match decoder.decode_eof(b"partial") {
            Err(Error::Stream { kind, .. }) => {
                assert_eq!(kind, std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut decoder = self::decoder("XYZ");
        assert!(matches!(
            decoder.decode_eof(b"no boundary"),
            Err(Error::Stream { .. })
        ));
    }

    #[test]
    fn test_empty_form() {
        let mut decoder = decoder("XYZ");
        decoder.decode(Frame::Delimited(5), b"--XYZ--\r\n").unwrap();
        let step = decoder.decode(Frame::Delimited(4), b"--\r\n").unwrap();
        assert_eq!(step, Step::Finish { consume: 4 });
        assert!(decoder.is_finished());
    }
}
