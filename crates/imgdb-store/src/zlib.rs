use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

pub(crate) fn compress(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), level);
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate one complete zlib stream. A stream that stops before its end
/// marker, or is followed by trailing bytes, is an error.
pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).max(64));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let input = &data[before_in as usize..];
        let status = inflater
            .decompress_vec(input, &mut out, FlushDecompress::Finish)
            .map_err(|e| e.to_string())?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if inflater.total_in() == before_in && inflater.total_out() == before_out {
                    return Err("truncated zlib stream".to_string());
                }
            }
        }
    }
    let consumed = inflater.total_in();
    if consumed != data.len() as u64 {
        return Err(format!(
            "{} trailing bytes after zlib stream",
            data.len() as u64 - consumed
        ));
    }
    Ok(out)
}
