//! Content codings and the streamed encoder.
//!
//! `gzip` is preferred over `deflate` (zlib framing, as HTTP defines it).
//! The encoder is a pull-driven [`Stream`]: one input chunk is encoded per
//! poll, so a slow consumer never causes more than one chunk of output to
//! be buffered.

use std::io::{self, Write};

use axum::body::Bytes;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use futures_util::stream::{self, Stream, StreamExt};

/// Supported content codings, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Gzip,
    Deflate,
}

impl Codec {
    pub const PREFERENCE: [Codec; 2] = [Codec::Gzip, Codec::Deflate];

    /// `Content-Encoding` token.
    pub fn token(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Deflate => "deflate",
        }
    }

    /// Tokens that name this coding in `Accept-Encoding`.
    fn matches(self, token: &str) -> bool {
        match self {
            Codec::Gzip => {
                token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip")
            }
            Codec::Deflate => token.eq_ignore_ascii_case("deflate"),
        }
    }
}

/// One `coding;q=value` entry of an `Accept-Encoding` header.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingPreference {
    pub token: String,
    pub quality: f32,
}

/// Parse `Accept-Encoding`. Malformed q-values count as 1.0; values are
/// clamped to `[0, 1]`.
pub fn parse_accept_encoding(value: &str) -> Vec<EncodingPreference> {
    value
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let token = parts.next()?.trim();
            if token.is_empty() {
                return None;
            }
            let quality = parts
                .filter_map(|p| p.trim().split_once('='))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("q"))
                .and_then(|(_, v)| v.trim().parse::<f32>().ok())
                .map(|q| q.clamp(0.0, 1.0))
                .unwrap_or(1.0);
            Some(EncodingPreference {
                token: token.to_string(),
                quality,
            })
        })
        .collect()
}

fn accepts(preferences: &[EncodingPreference], codec: Codec) -> bool {
    if let Some(explicit) = preferences.iter().find(|p| codec.matches(&p.token)) {
        return explicit.quality > 0.0;
    }
    preferences
        .iter()
        .any(|p| p.token == "*" && p.quality > 0.0)
}

/// The preferred acceptable codec, or `None` for identity.
pub fn select_codec(accept_encoding: Option<&str>) -> Option<Codec> {
    let preferences = parse_accept_encoding(accept_encoding?);
    Codec::PREFERENCE
        .into_iter()
        .find(|codec| accepts(&preferences, *codec))
}

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
}

impl Encoder {
    fn new(codec: Codec, level: u32) -> Self {
        let level = Compression::new(level);
        match codec {
            Codec::Gzip => Encoder::Gzip(GzEncoder::new(Vec::new(), level)),
            Codec::Deflate => Encoder::Deflate(ZlibEncoder::new(Vec::new(), level)),
        }
    }

    /// Feed `chunk` and drain whatever output the encoder produced.
    fn write(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        let out = match self {
            Encoder::Gzip(e) => {
                e.write_all(chunk)?;
                std::mem::take(e.get_mut())
            }
            Encoder::Deflate(e) => {
                e.write_all(chunk)?;
                std::mem::take(e.get_mut())
            }
        };
        Ok(Bytes::from(out))
    }

    fn finish(self) -> io::Result<Bytes> {
        let out = match self {
            Encoder::Gzip(e) => e.finish()?,
            Encoder::Deflate(e) => e.finish()?,
        };
        Ok(Bytes::from(out))
    }
}

/// Split `body` into an input stream of `chunk_size` pieces.
pub fn chunked(
    mut body: Bytes,
    chunk_size: usize,
) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(body.len() / chunk_size + 1);
    while !body.is_empty() {
        chunks.push(Ok(body.split_to(chunk_size.min(body.len()))));
    }
    stream::iter(chunks)
}

/// Encode `input` with `codec`, yielding compressed chunks as they are
/// produced. Empty intermediate outputs are skipped; the trailer is the
/// last item. The first error ends the stream.
pub fn encode_stream<S>(codec: Codec, level: u32, input: S) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    stream::unfold(Some((Encoder::new(codec, level), input)), |state| async move {
        let (mut encoder, mut input) = state?;
        loop {
            match input.next().await {
                Some(Ok(chunk)) => match encoder.write(&chunk) {
                    Ok(out) if out.is_empty() => continue,
                    Ok(out) => return Some((Ok(out), Some((encoder, input)))),
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(e), None)),
                None => return Some((encoder.finish(), None)),
            }
        }
    })
}
