#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shiguredo_multipart::{Boundary, FrameBuffer, PartDecoder, Step};

#[derive(Arbitrary, Debug)]
struct Input {
    packet_size: u16,
    chunk_sizes: Vec<u8>,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let boundary = Boundary::from_content_type("multipart/form-data; boundary=XYZ").unwrap();
    let packet_size = usize::from(input.packet_size).max(boundary.trailer_len() + 1);
    let mut decoder = PartDecoder::new(boundary);
    let mut buffer = FrameBuffer::new(packet_size);
    let mut chunks = input
        .chunk_sizes
        .iter()
        .map(|&size| usize::from(size).max(1))
        .chain(std::iter::repeat(64));
    let mut body = input.body.as_slice();

    while !decoder.is_finished() {
        let step = loop {
            if let Some(frame) = buffer.scan(decoder.delimiter()) {
                break decoder.decode(frame, buffer.data());
            }
            if body.is_empty() {
                break decoder.decode_eof(buffer.data());
            }
            let n = body
                .len()
                .min(chunks.next().unwrap_or(1))
                .min(buffer.remaining_capacity());
            buffer.feed(&body[..n]);
            body = &body[n..];
        };

        let Ok(step) = step else {
            return;
        };
        // 書き出し範囲はバッファ内に収まる
        if let Step::Write { len } | Step::Close { len, .. } = step {
            assert!(len <= buffer.len());
        }
        assert!(step.consumed() <= buffer.len());
        buffer.consume(step.consumed());
    }
});
