//! PBT テスト共通ユーティリティ

use proptest::prelude::*;

// ========================================
// 境界文字列 / ファイル名
// ========================================

/// 境界文字列 (RFC 2046 の bchars の一部)
pub fn boundary() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9'()+_,./:=?-]{1,40}".prop_map(|s| s)
}

/// 衝突しにくい境界文字列
///
/// ボディをランダムなバイト列で組み立てるテスト用。
pub fn long_boundary() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{12,32}".prop_map(|s| s)
}

/// ファイル名 (拡張子あり / なし)
pub fn file_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_-]{1,16}\\.[a-z]{1,4}",
        "[a-zA-Z0-9_-]{1,16}",
    ]
}

// ========================================
// multipart ボディ
// ========================================

/// ファイルの中身
///
/// CRLF と "--" を多めに混ぜる。
pub fn file_data() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(
        prop_oneof![
            4 => any::<u8>().prop_map(|b| vec![b]),
            1 => Just(b"\r\n".to_vec()),
            1 => Just(b"--".to_vec()),
            1 => Just(b"\r\n--".to_vec()),
        ],
        0..256,
    )
    .prop_map(|chunks| chunks.concat())
}

/// フォームに含めるファイルの一覧
pub fn files() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    proptest::collection::vec((file_name(), file_data()), 0..5)
}

/// 入力の分割サイズの列
pub fn split_sizes() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1usize..512, 1..16)
}

/// multipart/form-data のボディを組み立てる
pub fn build_body(boundary: &str, files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (file_name, data) in files {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

/// データ中に境界文字列が含まれるかどうか
pub fn contains_boundary(data: &[u8], boundary: &str) -> bool {
    data.windows(boundary.len())
        .any(|window| window == boundary.as_bytes())
}
