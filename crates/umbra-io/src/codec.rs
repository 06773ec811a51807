use std::io::{Read, Write};

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("deflate stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoded {got} bytes, expected {expected} ({} texels)", .expected / 4)]
    LengthMismatch { expected: usize, got: usize },
    #[error("{0} texels do not fit in memory")]
    TooLarge(usize),
    #[error("background decode ended without a result")]
    TaskLost,
}

/// Worst-case deflate expansion; bounds the up-front buffer for a stream.
const MAX_INFLATE_RATIO: usize = 1032;

/// Deflate the little-endian bytes of `texels`.
pub fn compress(texels: &[u32]) -> Result<Vec<u8>, CodecError> {
    let mut enc = DeflateEncoder::new(Vec::with_capacity(texels.len()), Compression::default());
    for chunk in texels.chunks(4096) {
        let bytes: Vec<u8> = chunk.iter().flat_map(|t| t.to_le_bytes()).collect();
        enc.write_all(&bytes)?;
    }
    Ok(enc.finish()?)
}

/// Inflate `bytes` back into exactly `expected_len` texels.
///
/// A stream that ends early or carries data past `expected_len` texels is a
/// [`CodecError::LengthMismatch`].
pub fn decompress(bytes: &[u8], expected_len: usize) -> Result<Vec<u32>, CodecError> {
    let expected = expected_len
        .checked_mul(4)
        .ok_or(CodecError::TooLarge(expected_len))?;
    let mut raw = Vec::with_capacity(expected.min(bytes.len().saturating_mul(MAX_INFLATE_RATIO)));
    // One byte of slack so trailing data is detected without inflating it all.
    DeflateDecoder::new(bytes)
        .take((expected as u64).saturating_add(1))
        .read_to_end(&mut raw)?;
    if raw.len() != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            got: raw.len(),
        });
    }
    Ok(raw
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Decompression running on the rayon pool.
///
/// [`is_complete`](Self::is_complete) never blocks; [`texels`](Self::texels)
/// and [`into_texels`](Self::into_texels) wait for the result if needed.
pub struct DecodeTask {
    rx: Option<Receiver<Result<Vec<u32>, CodecError>>>,
    result: Option<Result<Vec<u32>, CodecError>>,
}

impl DecodeTask {
    pub fn spawn(bytes: Vec<u8>, expected_len: usize) -> Self {
        let (tx, rx) = bounded(1);
        rayon::spawn(move || {
            let _ = tx.send(decompress(&bytes, expected_len));
        });
        Self {
            rx: Some(rx),
            result: None,
        }
    }

    /// Already-finished task, for data that was decoded inline.
    pub fn ready(result: Result<Vec<u32>, CodecError>) -> Self {
        Self {
            rx: None,
            result: Some(result),
        }
    }

    pub fn is_complete(&mut self) -> bool {
        self.settle(false);
        self.result.is_some()
    }

    /// Borrow the decoded texels, blocking until the decode finishes.
    pub fn texels(&mut self) -> Result<&[u32], &CodecError> {
        self.settle(true);
        match self.result.as_ref() {
            Some(Ok(t)) => Ok(t.as_slice()),
            Some(Err(e)) => Err(e),
            None => unreachable!("settle(true) always stores a result"),
        }
    }

    pub fn into_texels(mut self) -> Result<Vec<u32>, CodecError> {
        self.settle(true);
        self.result.take().unwrap_or(Err(CodecError::TaskLost))
    }

    fn settle(&mut self, block: bool) {
        if self.result.is_some() {
            return;
        }
        let Some(rx) = self.rx.as_ref() else {
            self.result = Some(Err(CodecError::TaskLost));
            return;
        };
        let got = if block {
            rx.recv().map_err(|_| CodecError::TaskLost)
        } else {
            match rx.try_recv() {
                Ok(r) => Ok(r),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => Err(CodecError::TaskLost),
            }
        };
        self.rx = None;
        self.result = Some(got.and_then(|r| r));
    }
}
