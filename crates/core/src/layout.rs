//! Positioned words and the lines they form on a page.

use crate::models::BoundingBox;

/// A whitespace-free run of text with its box in PDF point space.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub bbox: BoundingBox,
    pub font_size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub words: Vec<Word>,
    /// Baseline proxy: the lowest y of the first word that opened the line.
    pub y: f32,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn font_size(&self) -> f32 {
        self.words
            .iter()
            .map(|word| word.font_size)
            .fold(0.0, f32::max)
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.words.iter().map(|word| &word.bbox))
    }
}

/// Splits a positioned run into words, spreading the run's width evenly over
/// its characters.
pub fn split_run_into_words(text: &str, bbox: BoundingBox, font_size: f32) -> Vec<Word> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let advance = bbox.width() / chars.len() as f32;
    let mut words = Vec::new();
    let mut start: Option<usize> = None;

    for index in 0..=chars.len() {
        let is_space = index == chars.len() || chars[index].is_whitespace();
        match (start, is_space) {
            (None, false) => start = Some(index),
            (Some(begin), true) => {
                let word: String = chars[begin..index].iter().collect();
                let x0 = bbox.x0 + begin as f32 * advance;
                let x1 = bbox.x0 + index as f32 * advance;
                words.push(Word {
                    text: word,
                    bbox: BoundingBox::new(x0, bbox.y0, x1, bbox.y1),
                    font_size,
                });
                start = None;
            }
            _ => {}
        }
    }

    words
}

/// Groups words into lines while preserving their stream order.
///
/// Content streams are usually written in reading order, so only consecutive
/// words are merged, and only when their vertical extents overlap.
pub fn group_into_lines(words: Vec<Word>) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();

    for word in words {
        let joins_last = lines.last().is_some_and(|line| {
            line.words
                .last()
                .is_some_and(|previous| same_line(&previous.bbox, &word.bbox))
        });

        match lines.last_mut() {
            Some(line) if joins_last => line.words.push(word),
            _ => {
                let y = word.bbox.y0;
                lines.push(TextLine {
                    words: vec![word],
                    y,
                });
            }
        }
    }

    for line in &mut lines {
        line.words.sort_by(|left, right| left.bbox.x0.total_cmp(&right.bbox.x0));
    }

    lines
}

fn same_line(previous: &BoundingBox, next: &BoundingBox) -> bool {
    let overlap = previous.y1.min(next.y1) - previous.y0.max(next.y0);
    let shorter = previous.height().min(next.height());
    if shorter <= f32::EPSILON {
        return (previous.y0 - next.y0).abs() < 3.0;
    }
    overlap / shorter >= 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f32, y0: f32) -> Word {
        Word {
            text: text.to_string(),
            bbox: BoundingBox::new(x0, y0, x0 + 30.0, y0 + 12.0),
            font_size: 12.0,
        }
    }

    #[test]
    fn run_is_split_on_whitespace_with_proportional_boxes() {
        let words = split_run_into_words(
            "ab  cd",
            BoundingBox::new(0.0, 0.0, 60.0, 10.0),
            10.0,
        );

        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "ab");
        assert_eq!(words[0].bbox, BoundingBox::new(0.0, 0.0, 20.0, 10.0));
        assert_eq!(words[1].text, "cd");
        assert_eq!(words[1].bbox, BoundingBox::new(40.0, 0.0, 60.0, 10.0));
    }

    #[test]
    fn consecutive_words_on_same_baseline_form_a_line() {
        let lines = group_into_lines(vec![
            word("World", 140.0, 700.0),
            word("Hello", 100.0, 701.0),
            word("Next", 100.0, 680.0),
        ]);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "Hello World");
        assert_eq!(lines[1].text(), "Next");
        assert_eq!(lines[0].bbox(), Some(BoundingBox::new(100.0, 700.0, 170.0, 713.0)));
    }
}
