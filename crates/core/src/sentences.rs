use crate::layout::{TextLine, Word};
use crate::models::{BoundingBox, HeadingRule, PageSize, SentenceRecord};
use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]+["'\u{201D}\u{2019})\]]*$"#).expect("valid regex"));

const ABBREVIATIONS: [&str; 20] = [
    "e.g", "i.e", "mr", "mrs", "ms", "dr", "prof", "inc", "ltd", "co", "corp", "no", "vs", "fig",
    "approx", "st", "jr", "sr", "dept", "est",
];

/// Turns the lines of one page into sentence and heading records in reading order.
pub fn segment_page(
    page: u32,
    page_size: PageSize,
    lines: &[TextLine],
    rule: &HeadingRule,
) -> Vec<SentenceRecord> {
    let body_size = median_font_size(lines);
    let mut records = Vec::new();
    let mut paragraph: Vec<Word> = Vec::new();

    for line in lines {
        if line.words.is_empty() {
            continue;
        }

        if is_heading(line, body_size, rule) {
            records.extend(split_sentences(page, page_size, &paragraph));
            paragraph.clear();

            if let Some(bbox) = line.bbox() {
                records.push(SentenceRecord {
                    page,
                    text: line.text().trim().to_string(),
                    bbox,
                    is_heading: true,
                    page_size,
                });
            }
            continue;
        }

        paragraph.extend(line.words.iter().cloned());
    }

    records.extend(split_sentences(page, page_size, &paragraph));
    records
}

/// Punctuation-based segmentation. A sentence closes on a word ending in
/// `.`, `!` or `?` (optionally followed by quotes or brackets) unless that word
/// is a known abbreviation or an initial, and the next word opens like a sentence.
pub fn split_sentences(page: u32, page_size: PageSize, words: &[Word]) -> Vec<SentenceRecord> {
    let mut records = Vec::new();
    let mut start = 0;

    for index in 0..words.len() {
        let closes = match words.get(index + 1) {
            None => true,
            Some(next) => ends_sentence(&words[index].text) && starts_sentence(&next.text),
        };

        if closes {
            if let Some(record) = build_record(page, page_size, &words[start..=index]) {
                records.push(record);
            }
            start = index + 1;
        }
    }

    records
}

fn build_record(page: u32, page_size: PageSize, words: &[Word]) -> Option<SentenceRecord> {
    let text = words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if text.trim().is_empty() {
        return None;
    }

    let bbox = BoundingBox::union_all(words.iter().map(|word| &word.bbox))?;
    Some(SentenceRecord {
        page,
        text,
        bbox,
        is_heading: false,
        page_size,
    })
}

pub fn ends_sentence(word: &str) -> bool {
    if !SENTENCE_END.is_match(word) {
        return false;
    }

    let stem = word
        .trim_end_matches(|c: char| matches!(c, '"' | '\'' | '\u{201D}' | '\u{2019}' | ')' | ']'))
        .trim_end_matches('.')
        .to_lowercase();

    if word.ends_with('.') {
        let is_initial = stem.chars().count() == 1 && stem.chars().all(char::is_alphabetic);
        if is_initial || ABBREVIATIONS.contains(&stem.as_str()) {
            return false;
        }
    }

    true
}

fn starts_sentence(word: &str) -> bool {
    word.chars().next().is_some_and(|first| {
        first.is_uppercase()
            || first.is_ascii_digit()
            || matches!(first, '"' | '\'' | '\u{201C}' | '\u{2018}' | '(' | '[' | '\u{2022}')
    })
}

fn is_heading(line: &TextLine, body_size: f32, rule: &HeadingRule) -> bool {
    let text = line.text();
    let size = line.font_size();
    let has_letters = text.chars().any(char::is_alphabetic);
    if !has_letters {
        return false;
    }

    let all_upper = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(char::is_uppercase);
    if all_upper && size > rule.absolute_min_size {
        return true;
    }

    let trailing_punctuation = line
        .words
        .last()
        .is_some_and(|word| ends_sentence(&word.text));

    body_size > 0.0
        && size >= body_size * rule.relative_ratio
        && line.words.len() <= rule.max_words
        && !trailing_punctuation
}

fn median_font_size(lines: &[TextLine]) -> f32 {
    let mut sizes: Vec<f32> = lines
        .iter()
        .flat_map(|line| line.words.iter().map(|word| word.font_size))
        .collect();
    if sizes.is_empty() {
        return 0.0;
    }
    sizes.sort_by(f32::total_cmp);
    sizes[sizes.len() / 2]
}
