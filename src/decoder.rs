use anyhow::{anyhow, Result};
use bytes::Bytes;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use flate2::read::{DeflateDecoder, GzDecoder};
use std::io::Read;
use tracing::debug;

pub const ENC_IDENTITY: &str = "identity";
pub const ENC_GZIP: &str = "gzip";
pub const ENC_DEFLATE: &str = "deflate";
pub const ENC_ZSTD: &str = "zstd";

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = GzDecoder::new(data);
    let mut decoded_data = Vec::new();
    decoder.read_to_end(&mut decoded_data)?;
    Ok(Bytes::from(decoded_data))
}

fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decoded_data = Vec::new();
    decoder.read_to_end(&mut decoded_data)?;
    Ok(Bytes::from(decoded_data))
}

fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    Ok(Bytes::from(zstd::decode_all(data)?))
}

/// Undoes a `Content-Encoding`. Stacked codings are applied in reverse.
pub fn decompress(data: Bytes, content_encoding: Option<&str>) -> Result<Bytes> {
    let Some(content_encoding) = content_encoding else {
        return Ok(data);
    };

    let codings = content_encoding
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect::<Vec<String>>();

    codings.iter().rev().try_fold(data, |body, coding| match coding.as_str() {
        ENC_GZIP | "x-gzip" => decode_gzip(&body),
        ENC_DEFLATE => decode_deflate(&body),
        ENC_ZSTD => decode_zstd(&body),
        ENC_IDENTITY => Ok(body),
        other => Err(anyhow!("Unsupported content encoding: {other}")),
    })
}

/// Extracts the `charset` parameter of a `Content-Type` value.
pub fn charset(content_type: &str) -> Option<&'static Encoding> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, value)| Encoding::for_label(value.trim().trim_matches('"').as_bytes()))
}

/// Turns body bytes into text. A declared charset is honored; without one,
/// UTF-8 is tried first and Shift_JIS is the fallback. Bytes that fit
/// neither come out as U+FFFD, so any body can be shown.
pub fn decode_text(data: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type.and_then(charset) {
        let (text, _, had_errors) = encoding.decode(data);
        if had_errors {
            debug!("body is not valid {}, decoded lossily", encoding.name());
        }
        return text.into_owned();
    }

    match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => match SHIFT_JIS.decode_without_bom_handling_and_without_replacement(data) {
            Some(text) => text.into_owned(),
            None => {
                debug!(
                    "body is neither {} nor {}, decoded lossily",
                    UTF_8.name(),
                    SHIFT_JIS.name()
                );
                String::from_utf8_lossy(data).into_owned()
            }
        },
    }
}

pub fn decode_body(
    data: Bytes,
    content_encoding: Option<&str>,
    content_type: Option<&str>,
) -> Result<String> {
    let body = decompress(data, content_encoding)?;
    Ok(decode_text(&body, content_type))
}
