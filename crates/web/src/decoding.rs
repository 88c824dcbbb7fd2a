//! Request body decompression by `Content-Encoding` and percent-decoding of request paths.

use crate::problem::ProblemDetails;
use bytes::Bytes;
use http::{HeaderValue, Request, StatusCode, header};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::io::{self, Read};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Coding {
    fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "identity" | "" => Some(Self::Identity),
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }

    fn reader<'a>(self, input: &'a [u8]) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::Identity => Box::new(input),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(input)),
            Self::Deflate => Box::new(flate2::read::ZlibDecoder::new(input)),
            Self::Brotli => Box::new(brotli::Decompressor::new(input, 4096)),
            Self::Zstd => Box::new(zstd::stream::read::Decoder::new(input)?),
        })
    }
}

/// Splits `path` into its non-empty segments and percent-decodes each one.
///
/// Splitting first keeps an encoded `/` inside its segment. A segment that is not UTF-8 once
/// decoded answers 400.
pub fn decode_path(path: &str) -> Result<Vec<String>, ProblemDetails> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            percent_decode_str(segment).decode_utf8().map(Cow::into_owned).map_err(|_e| {
                ProblemDetails::bad_request("invalid-path-encoding", format!("path segment {segment} is not valid utf-8 once decoded"))
            })
        })
        .collect()
}

/// Undoes every coding listed in `Content-Encoding`, last applied first.
///
/// The decoded body may not exceed `max_content_length`. Unknown codings answer 415, corrupt
/// input 400, oversized output 413.
pub fn decode_request(request: Request<Bytes>, max_content_length: usize) -> Result<Request<Bytes>, ProblemDetails> {
    let Some(value) = request.headers().get(header::CONTENT_ENCODING) else {
        return Ok(request);
    };

    let value = value.to_str().map_err(|_e| unsupported("content-encoding is not valid text"))?;
    let codings = value
        .split(',')
        .map(|token| Coding::parse(token).ok_or_else(|| unsupported(format!("unsupported content-encoding {}", token.trim()))))
        .collect::<Result<Vec<_>, _>>()?;

    let (mut parts, mut body) = request.into_parts();
    for coding in codings.into_iter().rev().filter(|coding| *coding != Coding::Identity) {
        body = decode(coding, &body, max_content_length)?;
        trace!(?coding, len = body.len(), "decoded request body");
    }

    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok(Request::from_parts(parts, body))
}

fn decode(coding: Coding, input: &[u8], max_content_length: usize) -> Result<Bytes, ProblemDetails> {
    let corrupt = |e: io::Error| ProblemDetails::bad_request("invalid-content-encoding", format!("failed to decode request body: {e}"));

    let reader = coding.reader(input).map_err(corrupt)?;
    let mut output = Vec::with_capacity(input.len().min(max_content_length));
    reader.take(max_content_length as u64 + 1).read_to_end(&mut output).map_err(corrupt)?;

    if output.len() > max_content_length {
        return Err(ProblemDetails::new(StatusCode::PAYLOAD_TOO_LARGE, "content-too-large")
            .detail(format!("decoded request body exceeds {max_content_length} bytes")));
    }
    Ok(Bytes::from(output))
}

fn unsupported(detail: impl Into<String>) -> ProblemDetails {
    ProblemDetails::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported-content-encoding").detail(detail)
}
