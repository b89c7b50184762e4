//! パートデコーダーのプロパティテスト
//!
//! 入力の分割位置とパケットサイズを変えてもデコード結果が変わらないことを確認する。

use proptest::prelude::*;
use shiguredo_multipart::{Boundary, Error, FrameBuffer, PartDecoder, Step};

type Files = Vec<(String, Vec<u8>)>;

/// splits のサイズを繰り返し使って入力を分割しながらメモリ上でデコードする
fn decode(
    body: &[u8],
    boundary: &str,
    packet_size: usize,
    splits: &[usize],
) -> Result<Files, Error> {
    let content_type = format!("multipart/form-data; boundary={}", boundary);
    let mut decoder = PartDecoder::new(Boundary::from_content_type(&content_type)?);
    let mut buffer = FrameBuffer::new(packet_size);
    let mut splits = splits.iter().copied().cycle();
    let mut input = body;
    let mut files: Files = Vec::new();

    while !decoder.is_finished() {
        let step = loop {
            if let Some(frame) = buffer.scan(decoder.delimiter()) {
                break decoder.decode(frame, buffer.data())?;
            }
            if input.is_empty() {
                break decoder.decode_eof(buffer.data())?;
            }
            let split = splits.next().unwrap_or(1);
            let n = input.len().min(split).min(buffer.remaining_capacity());
            buffer.feed(&input[..n]);
            input = &input[n..];
        };

        match &step {
            Step::Open { file_name, .. } => files.push((file_name.clone(), Vec::new())),
            Step::Write { len } | Step::Close { len, .. } => {
                let (_, data) = files.last_mut().expect("body without header");
                data.extend_from_slice(&buffer.data()[..*len]);
            }
            Step::Skip { .. } | Step::Finish { .. } => {}
        }
        buffer.consume(step.consumed());
    }

    Ok(files)
}

// ========================================
// 分割の透過性
// ========================================

proptest! {
    #[test]
    fn decoded_files_match_form(
        boundary in pbt::long_boundary(),
        files in pbt::files(),
        packet_size in 160usize..2048,
        splits in pbt::split_sizes()
    ) {
        prop_assume!(files.iter().all(|(_, data)| !pbt::contains_boundary(data, &boundary)));

        let body = pbt::build_body(&boundary, &files);
        let decoded = decode(&body, &boundary, packet_size, &splits).unwrap();
        prop_assert_eq!(decoded, files);
    }
}

proptest! {
    #[test]
    fn packet_size_does_not_change_result(
        boundary in pbt::long_boundary(),
        files in pbt::files(),
        packet_a in 160usize..4096,
        packet_b in 160usize..4096
    ) {
        prop_assume!(files.iter().all(|(_, data)| !pbt::contains_boundary(data, &boundary)));

        let body = pbt::build_body(&boundary, &files);
        let a = decode(&body, &boundary, packet_a, &[body.len().max(1)]);
        let b = decode(&body, &boundary, packet_b, &[7]);
        prop_assert_eq!(a, b);
    }
}

// ========================================
// 任意入力
// ========================================

proptest! {
    #[test]
    fn arbitrary_input_terminates(
        data in proptest::collection::vec(any::<u8>(), 0..1024),
        packet_size in 8usize..256,
        splits in pbt::split_sizes()
    ) {
        // 書き出し位置がバッファを超えればここで panic する
        let _ = decode(&data, "XYZ", packet_size, &splits);
    }
}

proptest! {
    #[test]
    fn truncated_form_is_error(
        boundary in pbt::long_boundary(),
        files in proptest::collection::vec((pbt::file_name(), pbt::file_data()), 1..4),
        cut in any::<prop::sample::Index>()
    ) {
        prop_assume!(files.iter().all(|(_, data)| !pbt::contains_boundary(data, &boundary)));

        let body = pbt::build_body(&boundary, &files);
        // 終端の "--" より前で切る
        let terminator = boundary.len() + 6;
        let end = cut.index(body.len() - terminator);
        prop_assert!(decode(&body[..end], &boundary, 1024, &[13]).is_err());
    }
}
