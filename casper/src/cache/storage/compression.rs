use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

/// Leading byte prefixed to every stored body, distinguishing a raw
/// payload from a gzip-compressed one (`spec.md` §4.5 "a fixed marker or
/// a metadata bit").
const MARKER_RAW: u8 = 0;
const MARKER_GZIP: u8 = 1;

/// Gzips `body` and prefixes the compression marker when `body` is at
/// least `threshold` bytes; otherwise stores it unmodified with the raw
/// marker (`spec.md` §4.5 "Compression").
#[must_use]
pub fn encode(body: &[u8], threshold: usize, level: u32) -> Vec<u8> {
    if body.len() < threshold {
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(MARKER_RAW);
        out.extend_from_slice(body);
        return out;
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    if encoder.write_all(body).is_err() {
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(MARKER_RAW);
        out.extend_from_slice(body);
        return out;
    }
    match encoder.finish() {
        Ok(compressed) => {
            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(MARKER_GZIP);
            out.extend(compressed);
            out
        }
        Err(_) => {
            let mut out = Vec::with_capacity(body.len() + 1);
            out.push(MARKER_RAW);
            out.extend_from_slice(body);
            out
        }
    }
}

/// Inverts [`encode`], decompressing when the marker byte says to.
/// Returns an empty body for empty input (no marker byte present).
#[must_use]
pub fn decode(stored: &[u8]) -> Vec<u8> {
    let Some((&marker, rest)) = stored.split_first() else {
        return Vec::new();
    };
    match marker {
        MARKER_GZIP => {
            let mut decoder = GzDecoder::new(rest);
            let mut out = Vec::new();
            if decoder.read_to_end(&mut out).is_ok() {
                out
            } else {
                Vec::new()
            }
        }
        _ => rest.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_body_is_stored_raw() {
        let encoded = encode(b"tiny", 1024, 6);
        assert_eq!(encoded[0], MARKER_RAW);
        assert_eq!(decode(&encoded), b"tiny");
    }

    #[test]
    fn large_body_is_compressed_and_round_trips() {
        let body = vec![b'x'; 4096];
        let encoded = encode(&body, 1024, 6);
        assert_eq!(encoded[0], MARKER_GZIP);
        assert!(encoded.len() < body.len());
        assert_eq!(decode(&encoded), body);
    }
}
