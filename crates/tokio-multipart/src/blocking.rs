//! ブロッキング I/O ドライバー
//!
//! `std::io::Read` から読み込み、`std::fs` でファイルに書き出す。
//! 呼び出し元のスレッドはダウンロードが終わるまでブロックする。
//!
//! 操作タイムアウトは読み込み元に設定しておくこと
//! (`TcpStream::set_read_timeout()` など)。
//! 読み込みが `TimedOut` または `WouldBlock` で失敗した場合は `Error::Timeout` になる。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_multipart::blocking::Downloader;
//! use tokio_multipart::Settings;
//!
//! stream.set_read_timeout(Some(settings.operation_timeout))?;
//! let mut downloader = Downloader::new(stream, remaining);
//! let paths = downloader.download(content_type, &settings)?;
//! ```

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use shiguredo_multipart::{
    Boundary, Error, Frame, FrameBuffer, OutputPaths, PartDecoder, PathResolver, Settings, Step,
};

use crate::error::{DownloadError, Result, end_of_stream};
use crate::reader::READ_CHUNK_SIZE;

/// ブロッキングフレームリーダー
#[derive(Debug)]
pub struct FrameReader<R> {
    source: R,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// 読み込み元と先読み済みデータから作成
    pub fn new(source: R, received: &[u8]) -> Self {
        Self {
            source,
            buffer: FrameBuffer::with_data(received, Settings::default().packet_size),
            chunk: vec![0; READ_CHUNK_SIZE],
        }
    }

    /// パケットサイズを設定
    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.buffer.set_limit(packet_size);
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

    /// 読み込み元を取り出す
    pub fn into_inner(self) -> R {
        self.source
    }

    /// 区切りが見つかるかバッファが満杯になるまで読み込む
    pub fn read_until(&mut self, delimiter: &[u8]) -> io::Result<Frame> {
        loop {
            if let Some(frame) = self.buffer.scan(delimiter) {
                return Ok(frame);
            }

            let want = self.buffer.remaining_capacity().min(self.chunk.len());
            let n = match self.source.read(&mut self.chunk[..want]) {
                Ok(0) => return Err(end_of_stream()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.buffer.feed(&self.chunk[..n]);
        }
    }
}

/// ブロッキングダウンローダー
#[derive(Debug)]
pub struct Downloader<R> {
    reader: FrameReader<R>,
    paths: Vec<PathBuf>,
}

impl<R: Read> Downloader<R> {
    /// 読み込み元と先読み済みデータから作成
    pub fn new(source: R, received: &[u8]) -> Self {
        Self {
            reader: FrameReader::new(source, received),
            paths: Vec::new(),
        }
    }

    /// 次のリクエスト用に先読み済みデータを差し替える
    pub fn reset(&mut self, received: &[u8]) {
        self.reader.reset(received);
        self.paths.clear();
    }

    /// 直前のダウンロードで書き込みを完了したパス
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// 読み込み元への参照
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// 読み込み元を取り出す
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// multipart/form-data のボディを受信してファイルに書き出す
    ///
    /// 戻り値は非同期版の `Downloader::download()` と同じ。
    pub fn download(&mut self, content_type: &str, settings: &Settings) -> Result<Vec<PathBuf>> {
        self.paths.clear();

        let boundary = Boundary::from_content_type(content_type)?;
        settings.validate(&boundary)?;
        self.reader.set_packet_size(settings.packet_size);

        let mut transfer = Transfer::default();
        let result = run(&mut self.reader, settings, boundary, &mut transfer);
        let paths = transfer.finish();
        self.paths = paths.clone();

        match result {
            Ok(()) => {
                tracing::info!(files = paths.len(), "multipart download completed");
                Ok(paths)
            }
            Err(error) => {
                tracing::warn!(error = %error, files = paths.len(), "multipart download failed");
                Err(DownloadError::with_paths(error, paths))
            }
        }
    }
}

#[derive(Default)]
struct Transfer {
    file: Option<File>,
    outputs: OutputPaths,
}

impl Transfer {
    fn open(&mut self, path: PathBuf) -> std::result::Result<(), Error> {
        let file = File::create(&path).map_err(|e| Error::CannotOpenDestination {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "destination opened");
        self.outputs.begin(path);
        self.file = Some(file);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> std::result::Result<(), Error> {
        let (Some(file), Some(path)) = (self.file.as_mut(), self.outputs.in_flight()) else {
            return Err(Error::HeaderMalformed(
                "body data without part header".to_string(),
            ));
        };
        file.write_all(data).map_err(|e| write_error(path, &e))
    }

    fn close(&mut self) -> std::result::Result<PathBuf, Error> {
        let path = self
            .outputs
            .in_flight()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::HeaderMalformed("no part in progress".to_string()))?;
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|e| write_error(&path, &e))?;
        }
        self.outputs.complete();
        tracing::debug!(path = %path.display(), "destination completed");
        Ok(path)
    }

    fn finish(self) -> Vec<PathBuf> {
        let Transfer { file, outputs } = self;
        drop(file);
        if let Some(path) = outputs.in_flight() {
            tracing::warn!(path = %path.display(), "removing incomplete destination");
        }
        outputs.into_paths()
    }
}

fn write_error(path: &Path, e: &io::Error) -> Error {
    Error::DestinationWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn run<R: Read>(
    reader: &mut FrameReader<R>,
    settings: &Settings,
    boundary: Boundary,
    transfer: &mut Transfer,
) -> std::result::Result<(), Error> {
    let resolver = PathResolver::new(settings);
    let mut decoder = PartDecoder::new(boundary);

    while !decoder.is_finished() {
        let step = match reader.read_until(decoder.delimiter()) {
            Ok(frame) => decoder.decode(frame, reader.buffer().data())?,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                decoder.decode_eof(reader.buffer().data())?
            }
            Err(e) => return Err(e.into()),
        };

        match &step {
            Step::Open { file_name, .. } => {
                let path = resolver.resolve(file_name)?;
                tracing::debug!(file_name = %file_name, "part header received");
                transfer.open(path)?;
            }
            Step::Write { len } => {
                transfer.write(&reader.buffer().data()[..*len])?;
            }
            Step::Close { len, .. } => {
                transfer.write(&reader.buffer().data()[..*len])?;
                let path = transfer.close()?;
                settings.notify_body_complete(&path);
            }
            Step::Skip { .. } | Step::Finish { .. } => {}
        }
        reader.consume(step.consumed());
    }

    Ok(())
}
