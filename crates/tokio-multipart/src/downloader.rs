//! 非同期ダウンローダー
//!
//! `PartDecoder` の指示に従って各パートのボディをファイルへ書き出す。
//! ファイル操作は `tokio::fs` で行い、ランタイムのワーカーをブロックしない。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_multipart::{Downloader, Settings};
//!
//! // remaining は HTTP ヘッダーのパース時に読み込み済みのボディ先頭
//! let mut downloader = Downloader::new(stream, remaining);
//! let settings = Settings::new().with_output_directory("uploads");
//! let paths = downloader.download(content_type, &settings).await?;
//! ```

use std::io;
use std::path::{Path, PathBuf};

use shiguredo_multipart::{
    Boundary, Error, OutputPaths, PartDecoder, PathResolver, Settings, Step,
};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::{DownloadError, Result};
use crate::reader::FrameReader;

/// 非同期ダウンローダー
///
/// 1 つの読み込み元に対して `download()` を繰り返し呼び出せる。
/// ダウンロード中の future を破棄した場合、書き込み途中のファイルは削除される。
#[derive(Debug)]
pub struct Downloader<R> {
    reader: FrameReader<R>,
    paths: Vec<PathBuf>,
}

impl<R: AsyncRead + Unpin> Downloader<R> {
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
    /// 成功した場合はリクエスト中の順序で出力パスを返す。
    /// 失敗した場合、書き込み途中のファイルは削除され、
    /// それまでに完了したパスが `DownloadError::paths` に入る。
    pub async fn download(
        &mut self,
        content_type: &str,
        settings: &Settings,
    ) -> Result<Vec<PathBuf>> {
        self.paths.clear();

        let boundary = Boundary::from_content_type(content_type)?;
        settings.validate(&boundary)?;
        self.reader
            .configure(settings.packet_size, settings.operation_timeout);

        let mut transfer = Transfer::default();
        let result = run(&mut self.reader, settings, boundary, &mut transfer).await;
        let paths = transfer.finish().await;

        match result {
            Ok(()) => {
                tracing::info!(files = paths.len(), "multipart download completed");
                self.paths = paths.clone();
                Ok(paths)
            }
            Err(error) => {
                tracing::warn!(error = %error, files = paths.len(), "multipart download failed");
                self.paths = paths.clone();
                Err(DownloadError::with_paths(error, paths))
            }
        }
    }
}

/// 1 回のダウンロードの出力状態
///
/// ファイルを先に閉じてから `OutputPaths` を破棄するようにフィールドを並べている。
#[derive(Default)]
struct Transfer {
    file: Option<File>,
    outputs: OutputPaths,
}

impl Transfer {
    async fn open(&mut self, path: PathBuf) -> std::result::Result<(), Error> {
        let file = File::create(&path)
            .await
            .map_err(|e| Error::CannotOpenDestination {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), "destination opened");
        self.outputs.begin(path);
        self.file = Some(file);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> std::result::Result<(), Error> {
        let (Some(file), Some(path)) = (self.file.as_mut(), self.outputs.in_flight()) else {
            return Err(Error::HeaderMalformed(
                "body data without part header".to_string(),
            ));
        };
        file.write_all(data).await.map_err(|e| write_error(path, &e))
    }

    async fn close(&mut self) -> std::result::Result<PathBuf, Error> {
        let path = self
            .outputs
            .in_flight()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::HeaderMalformed("no part in progress".to_string()))?;
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| write_error(&path, &e))?;
        }
        self.outputs.complete();
        tracing::debug!(path = %path.display(), "destination completed");
        Ok(path)
    }

    /// ファイルを閉じて完了済みのパスを取り出す
    async fn finish(self) -> Vec<PathBuf> {
        let Transfer { file, outputs } = self;
        if let Some(mut file) = file {
            let _ = file.flush().await;
        }
        if let Some(path) = outputs.in_flight() {
            tracing::warn!(path = %path.display(), "removing incomplete destination");
            let _ = tokio::fs::remove_file(path).await;
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

async fn run<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    settings: &Settings,
    boundary: Boundary,
    transfer: &mut Transfer,
) -> std::result::Result<(), Error> {
    let resolver = PathResolver::new(settings);
    let mut decoder = PartDecoder::new(boundary);

    while !decoder.is_finished() {
        let step = match reader.read_until(decoder.delimiter()).await {
            Ok(frame) => decoder.decode(frame, reader.buffer().data())?,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                decoder.decode_eof(reader.buffer().data())?
            }
            Err(e) => return Err(e.into()),
        };

        match &step {
            Step::Open { file_name, .. } => {
                let path = resolve(&resolver, file_name).await?;
                tracing::debug!(file_name = %file_name, "part header received");
                transfer.open(path).await?;
            }
            Step::Write { len } => {
                transfer.write(&reader.buffer().data()[..*len]).await?;
            }
            Step::Close { len, .. } => {
                transfer.write(&reader.buffer().data()[..*len]).await?;
                let path = transfer.close().await?;
                settings.notify_body_complete(&path);
            }
            Step::Skip { .. } | Step::Finish { .. } => {}
        }
        reader.consume(step.consumed());
    }

    Ok(())
}

/// 出力先パスを決定 (存在確認は `tokio::fs` で行う)
async fn resolve(
    resolver: &PathResolver<'_>,
    file_name: &str,
) -> std::result::Result<PathBuf, Error> {
    if let Some(path) = resolver.requested(file_name) {
        return Ok(path);
    }

    for candidate in resolver.candidates(file_name)? {
        match tokio::fs::try_exists(&candidate).await {
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

    Err(Error::PathResolutionFailed {
        path: resolver.output_directory().join(file_name),
        reason: "no free file name".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = b"--XYZ\r\n\
        Content-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\n\
        hello\r\n\
        --XYZ--\r\n";

    #[tokio::test]
    async fn test_download_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new().with_output_directory(dir.path());

        let mut downloader = Downloader::new(BODY, b"");
        let paths = downloader
            .download("multipart/form-data; boundary=XYZ", &settings)
            .await
            .unwrap();

        assert_eq!(paths, vec![dir.path().join("a.txt")]);
        assert_eq!(downloader.paths(), paths.as_slice());
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_download_from_received_only() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new().with_output_directory(dir.path());

        // ボディ全体が先読み済み
        let mut downloader = Downloader::new(tokio::io::empty(), BODY);
        let paths = downloader
            .download("multipart/form-data; boundary=XYZ", &settings)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_resolve_dedup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"old").unwrap();
        let settings = Settings::new().with_output_directory(dir.path());
        let resolver = PathResolver::new(&settings);

        let path = resolve(&resolver, "a.txt").await.unwrap();
        assert_eq!(path, dir.path().join("a(1).txt"));
    }

    #[tokio::test]
    async fn test_transfer_finish_removes_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");

        let mut transfer = Transfer::default();
        transfer.open(path.clone()).await.unwrap();
        transfer.write(b"partial").await.unwrap();

        assert!(transfer.finish().await.is_empty());
        assert!(!path.exists());
    }
}
