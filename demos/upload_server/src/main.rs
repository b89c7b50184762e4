//! multipart/form-data アップロードサーバーの例
//!
//! 受信したファイルを出力先ディレクトリに保存し、保存したパスを返す。
//! 1 接続につき 1 リクエストを処理して接続を閉じる。
//!
//! 使い方:
//!   # 非同期モード (ポート 8080)
//!   cargo run -p upload_server -- --output-dir uploads
//!
//!   # ブロッキングモード (接続ごとにスレッド)
//!   cargo run -p upload_server -- --blocking
//!
//!   # アップロード
//!   curl -F "file=@image.png" http://localhost:8080/
//!
//! ログレベルは RUST_LOG で変更できる (例: RUST_LOG=debug)。

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shiguredo_http11::{BodyKind, DecoderLimits, HttpHead, RequestDecoder, RequestHead, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_multipart::{DownloadError, Error, Settings};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

struct ServerOptions {
    port: u16,
    output_dir: PathBuf,
    packet_size: usize,
    timeout: Duration,
    blocking: bool,
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = parse_args()?;
    std::fs::create_dir_all(&options.output_dir)?;

    let settings = Settings::new()
        .with_output_directory(&options.output_dir)
        .with_packet_size(options.packet_size)
        .with_operation_timeout(options.timeout)
        .with_on_body_complete(|path| {
            tracing::info!(path = %path.display(), "file received");
        });
    let settings = Arc::new(settings);
    let addr = format!("0.0.0.0:{}", options.port);

    if options.blocking {
        serve_blocking(&addr, settings)
    } else {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(serve(&addr, settings))
    }
}

fn parse_args() -> Result<ServerOptions, BoxError> {
    let mut args = noargs::raw_args();
    args.metadata_mut().app_name = "upload_server";

    // --help フラグ
    noargs::HELP_FLAG.take_help(&mut args);

    // --version フラグ
    let version_flag: bool = noargs::flag("version")
        .short('V')
        .doc("Show version")
        .take(&mut args)
        .is_present();
    if version_flag {
        println!("{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // --blocking フラグ
    let blocking: bool = noargs::flag("blocking")
        .doc("Serve each connection on its own thread with blocking I/O")
        .take(&mut args)
        .is_present();

    // --port オプション
    let port: u16 = noargs::opt("port")
        .short('p')
        .doc("Port to listen on")
        .default("8080")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --output-dir オプション
    let output_dir: PathBuf = noargs::opt("output-dir")
        .short('o')
        .doc("Directory to store received files")
        .default(".")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --packet-size オプション
    let packet_size: usize = noargs::opt("packet-size")
        .doc("Maximum bytes buffered per read step")
        .default("10485760")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // --timeout オプション
    let timeout_secs: u64 = noargs::opt("timeout")
        .doc("Read timeout in seconds")
        .default("30")
        .take(&mut args)
        .then(|o| o.value().parse())
        .map_err(|e| format!("{:?}", e))?;

    // 未知の引数があればエラー、ヘルプが返されたら表示
    if let Some(help) = args.finish().map_err(|e| format!("{:?}", e))? {
        print!("{}", help);
        std::process::exit(0);
    }

    Ok(ServerOptions {
        port,
        output_dir,
        packet_size,
        timeout: Duration::from_secs(timeout_secs),
        blocking,
    })
}

/// Content-Length の上限はパケットサイズとは無関係なので外す
fn request_decoder() -> RequestDecoder {
    RequestDecoder::with_limits(DecoderLimits {
        max_body_size: usize::MAX,
        ..DecoderLimits::default()
    })
}

async fn serve(addr: &str, settings: Arc<Settings>) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "upload server listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let settings = settings.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, peer_addr, &settings).await {
                tracing::warn!(peer = %peer_addr, error = %e, "client error");
            }
        });
    }
}

async fn handle_client(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    settings: &Settings,
) -> Result<(), BoxError> {
    tracing::debug!(peer = %peer_addr, "connection accepted");

    let mut decoder = request_decoder();
    let mut buf = [0u8; 4096];

    let (head, body_kind) = loop {
        if let Some(decoded) = decoder.decode_headers()? {
            break decoded;
        }
        let n = tokio::time::timeout(settings.operation_timeout, stream.read(&mut buf)).await??;
        if n == 0 {
            tracing::debug!(peer = %peer_addr, "connection closed before request");
            return Ok(());
        }
        decoder.feed(&buf[..n])?;
    };
    tracing::info!(peer = %peer_addr, method = %head.method, uri = %head.uri, "request");

    let response = match upload_target(&head, body_kind) {
        Ok((content_type, length)) => {
            let received = &decoder.remaining()[..decoder.remaining().len().min(length)];
            let rest = (length - received.len()) as u64;
            let mut downloader = tokio_multipart::Downloader::new((&mut stream).take(rest), received);
            build_response(downloader.download(&content_type, settings).await)
        }
        Err(response) => response,
    };

    stream.write_all(&response.encode()).await?;
    stream.flush().await?;
    Ok(())
}

fn serve_blocking(addr: &str, settings: Arc<Settings>) -> Result<(), BoxError> {
    let listener = std::net::TcpListener::bind(addr)?;
    tracing::info!(addr = %addr, "upload server listening (blocking)");

    for stream in listener.incoming() {
        let stream = stream?;
        let settings = settings.clone();

        std::thread::spawn(move || {
            let peer_addr = stream.peer_addr().ok();
            if let Err(e) = handle_client_blocking(stream, &settings) {
                tracing::warn!(peer = ?peer_addr, error = %e, "client error");
            }
        });
    }
    Ok(())
}

fn handle_client_blocking(
    mut stream: std::net::TcpStream,
    settings: &Settings,
) -> Result<(), BoxError> {
    use std::io::{Read, Write};

    // ブロッキングモードでは操作タイムアウトをソケットに設定する
    stream.set_read_timeout(Some(settings.operation_timeout))?;

    let mut decoder = request_decoder();
    let mut buf = [0u8; 4096];

    let (head, body_kind) = loop {
        if let Some(decoded) = decoder.decode_headers()? {
            break decoded;
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        decoder.feed(&buf[..n])?;
    };
    tracing::info!(method = %head.method, uri = %head.uri, "request");

    let response = match upload_target(&head, body_kind) {
        Ok((content_type, length)) => {
            let received = &decoder.remaining()[..decoder.remaining().len().min(length)];
            let rest = (length - received.len()) as u64;
            let mut downloader =
                tokio_multipart::blocking::Downloader::new((&mut stream).take(rest), received);
            build_response(downloader.download(&content_type, settings))
        }
        Err(response) => response,
    };

    stream.write_all(&response.encode())?;
    stream.flush()?;
    Ok(())
}

/// アップロードとして受け付けられるリクエストか確認
///
/// 受け付ける場合は Content-Type とボディ長を返す。
fn upload_target(head: &RequestHead, body_kind: BodyKind) -> Result<(String, usize), Response> {
    if head.method != "POST" {
        return Err(text_response(405, "Method Not Allowed", "POST only\n"));
    }

    let length = match body_kind {
        BodyKind::ContentLength(length) => length,
        BodyKind::None => 0,
        BodyKind::Chunked => {
            return Err(text_response(
                411,
                "Length Required",
                "chunked request body is not supported\n",
            ));
        }
        _ => return Err(text_response(400, "Bad Request", "unexpected body\n")),
    };

    // Content-Type の検証はダウンローダーに任せる
    let content_type = head.get_header("Content-Type").unwrap_or_default();
    Ok((content_type.to_string(), length))
}

fn build_response(result: tokio_multipart::Result<Vec<PathBuf>>) -> Response {
    match result {
        Ok(paths) => {
            let mut body = format!("saved {} file(s)\n", paths.len());
            for path in &paths {
                body.push_str(&format!("  {}\n", path.display()));
            }
            text_response(200, "OK", &body)
        }
        Err(DownloadError { error, paths }) => {
            let (status_code, reason_phrase) = match error {
                Error::InvalidContentType
                | Error::BoundaryMissing
                | Error::HeaderMalformed(_)
                | Error::Stream { .. } => (400, "Bad Request"),
                Error::Timeout => (408, "Request Timeout"),
                Error::PacketSizeTooSmall { .. }
                | Error::CannotOpenDestination { .. }
                | Error::PathResolutionFailed { .. }
                | Error::DestinationWrite { .. } => (500, "Internal Server Error"),
            };

            let mut body = format!("error: {}\n", error);
            if !paths.is_empty() {
                body.push_str(&format!("saved {} file(s) before the error\n", paths.len()));
                for path in &paths {
                    body.push_str(&format!("  {}\n", path.display()));
                }
            }
            text_response(status_code, reason_phrase, &body)
        }
    }
}

fn text_response(status_code: u16, reason_phrase: &str, body: &str) -> Response {
    Response::new(status_code, reason_phrase)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Connection", "close")
        .header("Server", "upload_server")
        .body(body.as_bytes().to_vec())
}
