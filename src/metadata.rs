// Provenance text for generated images: Latin-1 transliteration and PNG tEXt embedding.

use byteorder::{BigEndian, ByteOrder};
use png::text_metadata::{EncodableTextChunk, TEXtChunk};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
// length + type + crc
const CHUNK_OVERHEAD: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("payload is not a PNG stream")]
    NotPng,
    #[error("truncated PNG chunk at offset {0}")]
    Truncated(usize),
    #[error("PNG stream ends without an IEND chunk")]
    MissingEnd,
    #[error("failed to encode text chunk: {0}")]
    Encode(#[from] png::EncodingError),
}

/// Descriptive fields written into an artifact. Empty or absent fields are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub copyright: Option<String>,
    pub software: Option<String>,
    pub disclaimer: Option<String>,
    pub warning: Option<String>,
    pub source: Option<String>,
    pub comment: Option<String>,
}

impl ArtifactMetadata {
    /// PNG keyword and transliterated value for every populated field.
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Description", &self.description),
            ("Copyright", &self.copyright),
            ("Software", &self.software),
            ("Disclaimer", &self.disclaimer),
            ("Warning", &self.warning),
            ("Source", &self.source),
            ("Comment", &self.comment),
        ]
        .into_iter()
        .filter_map(|(keyword, value)| {
            let encoded = encode_text(value.as_deref()?);
            (!encoded.trim().is_empty()).then_some((keyword, encoded))
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text_fields().is_empty()
    }
}

/// Restricts `input` to the Latin-1 repertoire.
///
/// Accented letters lose their marks, a few letters and typographic symbols
/// that have no decomposition are spelled out, and whatever is still outside
/// U+0000..=U+00FF (or is a control character other than `\n`) is dropped.
/// Applying it twice gives the same result as applying it once.
pub fn encode_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if let Some(replacement) = substitute(c) {
            out.push_str(replacement);
        } else if (c as u32) <= 0xFF && (c == '\n' || !c.is_control()) {
            out.push(c);
        }
    }
    out
}

fn substitute(c: char) -> Option<&'static str> {
    let replacement = match c {
        'ß' => "ss",
        'ẞ' => "SS",
        'Æ' => "AE",
        'æ' => "ae",
        'Œ' => "OE",
        'œ' => "oe",
        'Ł' => "L",
        'ł' => "l",
        'Đ' => "D",
        'đ' => "d",
        'Ħ' => "H",
        'ħ' => "h",
        'ı' => "i",
        'Ŋ' => "N",
        'ŋ' => "n",
        'Ŧ' => "T",
        'ŧ' => "t",
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
        | '\u{2212}' => "-",
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => "\"",
        '\u{2026}' => "...",
        '\u{2022}' => "*",
        '\u{20AC}' => "EUR",
        '\u{2122}' => "(TM)",
        '\u{2009}' | '\u{200A}' | '\u{202F}' | '\u{2002}' | '\u{2003}' => " ",
        _ => return None,
    };
    Some(replacement)
}

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
    end: usize,
}

fn read_chunk(bytes: &[u8], offset: usize) -> Result<Chunk<'_>, MetadataError> {
    if offset == bytes.len() {
        return Err(MetadataError::MissingEnd);
    }
    let header_end = offset
        .checked_add(8)
        .filter(|&end| end <= bytes.len())
        .ok_or(MetadataError::Truncated(offset))?;
    let length = BigEndian::read_u32(&bytes[offset..offset + 4]) as usize;
    let end = offset
        .checked_add(CHUNK_OVERHEAD)
        .and_then(|n| n.checked_add(length))
        .filter(|&end| end <= bytes.len())
        .ok_or(MetadataError::Truncated(offset))?;

    let mut kind = [0u8; 4];
    kind.copy_from_slice(&bytes[offset + 4..header_end]);
    Ok(Chunk {
        kind,
        data: &bytes[header_end..header_end + length],
        end,
    })
}

fn text_keyword(data: &[u8]) -> &[u8] {
    let nul = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    &data[..nul]
}

/// Rewrites the tEXt section of a PNG stream with the given fields.
///
/// Existing tEXt chunks whose keyword is being written are dropped, new ones
/// are inserted right before IEND. All other chunks are copied byte-for-byte,
/// so pixel data is untouched.
pub fn embed_png_text(image: &[u8], metadata: &ArtifactMetadata) -> Result<Vec<u8>, MetadataError> {
    if !image.starts_with(&PNG_SIGNATURE) {
        return Err(MetadataError::NotPng);
    }

    let fields = metadata.text_fields();
    let mut text_chunks = Vec::new();
    for (keyword, value) in &fields {
        TEXtChunk::new(*keyword, value.as_str()).encode(&mut text_chunks)?;
    }

    let mut out = Vec::with_capacity(image.len() + text_chunks.len());
    out.extend_from_slice(&PNG_SIGNATURE);

    let mut offset = PNG_SIGNATURE.len();
    loop {
        let chunk = read_chunk(image, offset)?;
        let raw = &image[offset..chunk.end];

        if &chunk.kind == b"IEND" {
            out.extend_from_slice(&text_chunks);
            out.extend_from_slice(raw);
            return Ok(out);
        }

        let replaced = &chunk.kind == b"tEXt"
            && fields
                .iter()
                .any(|(keyword, _)| keyword.as_bytes() == text_keyword(chunk.data));
        if !replaced {
            out.extend_from_slice(raw);
        }
        offset = chunk.end;
    }
}
