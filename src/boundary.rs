//! multipart/form-data 境界文字列の抽出
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_multipart::Boundary;
//!
//! let boundary = Boundary::from_content_type("multipart/form-data; boundary=XYZ").unwrap();
//! assert_eq!(boundary.as_bytes(), b"XYZ");
//! ```
//!
//! `boundary=` 以降の文字列はパーセントデコードも引用符の除去も行わず、そのまま境界として扱う。

use crate::error::Error;

/// multipart/form-data のメディアタイプ
const MEDIA_TYPE: &str = "multipart/form-data";

/// boundary パラメータの接頭辞
const BOUNDARY_MARKER: &str = "boundary=";

/// ボディ末尾から取り除く境界以外のバイト数 (CRLF と "--")
pub const DELIMITER_OVERHEAD: usize = 4;

/// パートの区切りに使う境界文字列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary(Vec<u8>);

impl Boundary {
    /// Content-Type ヘッダー値から境界を取り出す
    ///
    /// メディアタイプの確認を先に行い、multipart/form-data でなければ
    /// `Error::InvalidContentType` を返す。
    pub fn from_content_type(content_type: &str) -> Result<Self, Error> {
        if !content_type.contains(MEDIA_TYPE) {
            return Err(Error::InvalidContentType);
        }

        let position = content_type
            .find(BOUNDARY_MARKER)
            .ok_or(Error::BoundaryMissing)?;
        let value = &content_type[position + BOUNDARY_MARKER.len()..];
        if value.is_empty() {
            return Err(Error::BoundaryMissing);
        }

        Ok(Boundary(value.as_bytes().to_vec()))
    }

    /// 境界のバイト列を取得
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 境界の長さ
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 境界が空かどうか (構築時に拒否されるため常に false)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// ボディの終端で取り除くバイト数 (CRLF + "--" + 境界)
    ///
    /// パケット上限に達したときに書き出さずに残すバイト数でもある。
    pub fn trailer_len(&self) -> usize {
        self.0.len() + DELIMITER_OVERHEAD
    }
}
