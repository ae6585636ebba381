//! Just enough font handling to decode shown strings and measure their width.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static CMAP_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]*)>|\[|\]").expect("valid regex"));

/// Glyph width used when a font carries no metrics, in 1/1000 em.
const FALLBACK_WIDTH: f32 = 500.0;

/// Largest code range a single `bfrange` entry may cover.
const MAX_RANGE_SPAN: u32 = 0xFFFF;

/// CIDs are two-byte codes.
const MAX_CID: u32 = 0xFFFF;

#[derive(Debug, Clone, Default)]
pub struct ToUnicodeMap {
    chars: HashMap<u32, String>,
}

impl ToUnicodeMap {
    /// Reads the `bfchar` and `bfrange` sections of a ToUnicode CMap.
    pub fn parse(content: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(content);
        let mut map = ToUnicodeMap::default();

        for section in sections(&text, "beginbfchar", "endbfchar") {
            let tokens = hex_tokens(section);
            for pair in tokens.chunks_exact(2) {
                if let (Token::Hex(code), Token::Hex(target)) = (&pair[0], &pair[1]) {
                    if let (Some(code), Some(target)) = (hex_value(code), utf16_hex(target)) {
                        map.chars.insert(code, target);
                    }
                }
            }
        }

        for section in sections(&text, "beginbfrange", "endbfrange") {
            let tokens = hex_tokens(section);
            let mut index = 0;
            while index + 2 < tokens.len() {
                let (Token::Hex(low), Token::Hex(high)) = (&tokens[index], &tokens[index + 1]) else {
                    index += 1;
                    continue;
                };
                let (Some(low), Some(high)) = (hex_value(low), hex_value(high)) else {
                    index += 3;
                    continue;
                };

                if low > high || high - low > MAX_RANGE_SPAN {
                    tracing::debug!(low, high, "ignoring malformed bfrange in ToUnicode map");
                    index += 3;
                    continue;
                }

                match &tokens[index + 2] {
                    Token::Hex(base) => {
                        if let Some(base) = hex_value(base) {
                            for (offset, code) in (low..=high).enumerate() {
                                let Some(target) = base.checked_add(offset as u32) else {
                                    break;
                                };
                                if let Some(ch) = char::from_u32(target) {
                                    map.chars.insert(code, ch.to_string());
                                }
                            }
                        }
                        index += 3;
                    }
                    Token::Open => {
                        let mut cursor = index + 3;
                        let mut code = low;
                        while let Some(Token::Hex(target)) = tokens.get(cursor) {
                            if let Some(target) = utf16_hex(target) {
                                map.chars.insert(code, target);
                            }
                            code = code.saturating_add(1);
                            cursor += 1;
                        }
                        if code <= high {
                            tracing::debug!(low, high, "short bfrange array in ToUnicode map");
                        }
                        index = cursor + 1;
                    }
                    Token::Close => index += 3,
                }
            }
        }

        if map.chars.is_empty() {
            None
        } else {
            Some(map)
        }
    }

    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.chars.get(&code).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
enum Token {
    Hex(String),
    Open,
    Close,
}

fn hex_tokens(section: &str) -> Vec<Token> {
    CMAP_TOKEN
        .captures_iter(section)
        .map(|capture| match capture.get(1) {
            Some(hex) => Token::Hex(hex.as_str().to_string()),
            None if &capture[0] == "[" => Token::Open,
            None => Token::Close,
        })
        .collect()
}

fn sections<'a>(text: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(begin) {
        let after = &rest[start + begin.len()..];
        match after.find(end) {
            Some(stop) => {
                found.push(&after[..stop]);
                rest = &after[stop + end.len()..];
            }
            None => break,
        }
    }
    found
}

fn hex_value(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

fn utf16_hex(hex: &str) -> Option<String> {
    let units = hex
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).ok().and_then(|s| u16::from_str_radix(s, 16).ok()))
        .collect::<Option<Vec<u16>>>()?;
    Some(String::from_utf16_lossy(&units))
}

/// Decoding and metrics for one font resource.
#[derive(Debug, Clone, Default)]
pub struct FontInfo {
    pub two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: Option<f32>,
    to_unicode: Option<ToUnicodeMap>,
}

impl FontInfo {
    pub fn from_dictionary(doc: &Document, font: &Dictionary) -> Self {
        let two_byte = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Type0");

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|object| resolve(doc, object))
            .and_then(|object| object.as_stream().ok())
            .and_then(stream_content)
            .and_then(|content| ToUnicodeMap::parse(&content));

        let mut info = FontInfo {
            two_byte,
            to_unicode,
            ..FontInfo::default()
        };

        if two_byte {
            if let Some(descendant) = font
                .get(b"DescendantFonts")
                .ok()
                .and_then(|object| resolve(doc, object))
                .and_then(|object| object.as_array().ok())
                .and_then(|array| array.first())
                .and_then(|object| resolve(doc, object))
                .and_then(|object| object.as_dict().ok())
            {
                info.default_width = Some(
                    descendant
                        .get(b"DW")
                        .ok()
                        .and_then(number)
                        .unwrap_or(1000.0),
                );
                if let Some(w) = descendant
                    .get(b"W")
                    .ok()
                    .and_then(|object| resolve(doc, object))
                    .and_then(|object| object.as_array().ok())
                {
                    info.cid_widths = parse_cid_widths(doc, w);
                }
            }
        } else {
            info.first_char = font
                .get(b"FirstChar")
                .ok()
                .and_then(number)
                .map(|value| value.max(0.0) as u32)
                .unwrap_or(0);
            info.widths = font
                .get(b"Widths")
                .ok()
                .and_then(|object| resolve(doc, object))
                .and_then(|object| object.as_array().ok())
                .map(|array| array.iter().filter_map(|w| number(w)).collect())
                .unwrap_or_default();
        }

        info
    }

    /// Splits a shown string into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| match pair {
                    [high, low] => u32::from(*high) << 8 | u32::from(*low),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|byte| u32::from(*byte)).collect()
        }
    }

    pub fn decode(&self, codes: &[u32]) -> String {
        codes
            .iter()
            .map(|code| match &self.to_unicode {
                Some(map) => map
                    .lookup(*code)
                    .map(str::to_string)
                    .unwrap_or_else(|| latin1(*code)),
                None if self.two_byte => char::from_u32(*code)
                    .map(|ch| ch.to_string())
                    .unwrap_or_default(),
                None => latin1(*code),
            })
            .collect()
    }

    /// Glyph advance in 1/1000 em.
    pub fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .or(self.default_width)
                .unwrap_or(1000.0);
        }

        code.checked_sub(self.first_char)
            .and_then(|index| self.widths.get(index as usize).copied())
            .filter(|width| *width > 0.0)
            .unwrap_or(FALLBACK_WIDTH)
    }
}

fn latin1(code: u32) -> String {
    match code {
        0x92 => "\u{2019}".to_string(),
        0x93 => "\u{201C}".to_string(),
        0x94 => "\u{201D}".to_string(),
        0x96 => "\u{2013}".to_string(),
        0x97 => "\u{2014}".to_string(),
        other => char::from_u32(other).map(|ch| ch.to_string()).unwrap_or_default(),
    }
}

fn parse_cid_widths(doc: &Document, array: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut index = 0;

    while index < array.len() {
        let Some(first) = number(&array[index]) else {
            index += 1;
            continue;
        };
        let first = first.clamp(0.0, MAX_CID as f32) as u32;

        match array.get(index + 1).and_then(|object| resolve(doc, object)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().filter_map(number).enumerate() {
                    match first.checked_add(offset as u32) {
                        Some(code) if code <= MAX_CID => {
                            widths.insert(code, width);
                        }
                        _ => break,
                    }
                }
                index += 2;
            }
            Some(last) => {
                if let (Some(last), Some(width)) =
                    (number(last), array.get(index + 2).and_then(number))
                {
                    let last = last.clamp(0.0, MAX_CID as f32) as u32;
                    for code in first..=last {
                        widths.insert(code, width);
                    }
                }
                index += 3;
            }
            None => break,
        }
    }

    widths
}

/// The page's `Resources`, following inheritance through the page tree.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    inherited(doc, page_id, b"Resources").and_then(|r| r.as_dict().ok())
}

/// Font resources keyed by resource name.
pub fn resource_fonts(doc: &Document, resources: &Dictionary) -> HashMap<Vec<u8>, FontInfo> {
    let Some(fonts) = resources
        .get(b"Font")
        .ok()
        .and_then(|object| resolve(doc, object))
        .and_then(|object| object.as_dict().ok())
    else {
        return HashMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, object)| {
            let dictionary = resolve(doc, object)?.as_dict().ok()?;
            Some((name.clone(), FontInfo::from_dictionary(doc, dictionary)))
        })
        .collect()
}

/// Looks a page attribute up on the page and then on its `Pages` ancestors.
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;

    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }

    None
}

/// Stream bytes with filters applied; unfiltered streams are returned as stored.
pub fn stream_content(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
