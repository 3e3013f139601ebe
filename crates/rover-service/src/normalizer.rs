//! OCR text to canonical plate text.
//!
//! The plate grammar is positional: 2 letters, 2 digits, 1 or 2 letters,
//! 4 digits. The raw string is walked once, left to right, through four
//! stages. Each character is offered to the current stage only; it is taken
//! when it already has the stage's class or has a look-alike in the stage's
//! correction table, and dropped otherwise.

use crate::error::PipelineError;
use common::PlateText;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Letters1,
    Digits1,
    Letters2,
    Digits2,
    Done,
}

/// Digits read where a letter is expected
fn digit_to_letter(c: char) -> Option<char> {
    match c {
        '0' => Some('O'),
        '1' => Some('I'),
        '2' => Some('Z'),
        '4' => Some('A'),
        '5' => Some('S'),
        '8' => Some('B'),
        '6' => Some('G'),
        _ => None,
    }
}

/// Letters read where a digit is expected
fn letter_to_digit(c: char) -> Option<char> {
    match c {
        'O' => Some('0'),
        'I' => Some('1'),
        'Z' => Some('2'),
        'S' => Some('5'),
        'B' => Some('8'),
        'G' => Some('6'),
        'Q' => Some('0'),
        'L' => Some('1'),
        'E' => Some('6'),
        'J' => Some('3'),
        ']' => Some('3'),
        _ => None,
    }
}

/// Collected letters and digits while walking the stages
#[derive(Debug, Default)]
struct Buckets {
    letters: String,
    digits: String,
}

impl Buckets {
    fn letter_count(&self) -> usize {
        self.letters.chars().count()
    }

    fn digit_count(&self) -> usize {
        self.digits.chars().count()
    }
}

impl Stage {
    /// Move past stages whose quota is already met
    fn settle(mut self, buckets: &Buckets, middle_letters: usize) -> Self {
        loop {
            let next = match self {
                Stage::Letters1 if buckets.letter_count() >= 2 => Stage::Digits1,
                Stage::Digits1 if buckets.digit_count() >= 2 => Stage::Letters2,
                Stage::Letters2 if buckets.letter_count() >= 2 + middle_letters => {
                    Stage::Digits2
                }
                Stage::Digits2 if buckets.digit_count() >= 6 => Stage::Done,
                _ => return self,
            };
            self = next;
        }
    }

    /// Offer one character to this stage
    fn accept(self, c: char, buckets: &mut Buckets) {
        match self {
            Stage::Letters1 | Stage::Letters2 => {
                if c.is_ascii_uppercase() {
                    buckets.letters.push(c);
                } else if let Some(letter) = digit_to_letter(c) {
                    buckets.letters.push(letter);
                }
            }
            Stage::Digits1 | Stage::Digits2 => {
                if c.is_ascii_digit() {
                    buckets.digits.push(c);
                } else if let Some(digit) = letter_to_digit(c) {
                    buckets.digits.push(digit);
                }
            }
            Stage::Done => {}
        }
    }
}

/// Keep ASCII letters and digits, uppercased
fn strip(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Letters in the middle group, chosen from the stripped length
fn middle_letter_quota(stripped_len: usize) -> usize {
    match stripped_len {
        10 => 2,
        9 => 1,
        _ => 0,
    }
}

/// Convert raw OCR output into a canonical plate.
///
/// Unreadable text yields [`PipelineError::Parse`]; this is an expected
/// outcome and never panics.
pub fn normalize(raw: &str) -> Result<PlateText, PipelineError> {
    let stripped = strip(raw);
    let middle_letters = middle_letter_quota(stripped.chars().count());

    let mut buckets = Buckets::default();
    let mut stage = Stage::Letters1;

    for c in stripped.chars() {
        stage = stage.settle(&buckets, middle_letters);
        if stage == Stage::Done {
            break;
        }
        stage.accept(c, &mut buckets);
    }

    if buckets.letter_count() < 3 || buckets.digit_count() < 6 {
        return Err(PipelineError::Parse {
            raw: raw.to_string(),
        });
    }

    // letters and digits are ASCII, so byte slicing is on char boundaries
    let letters = &buckets.letters;
    let digits = &buckets.digits;
    let canonical = format!(
        "{}{}{}{}",
        &letters[0..2],
        &digits[0..2],
        &letters[2..letters.len().min(4)],
        &digits[2..digits.len().min(6)]
    );

    PlateText::from_canonical(&canonical).ok_or(PipelineError::Parse {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(raw: &str) -> String {
        normalize(raw).unwrap().as_str().to_string()
    }

    #[test]
    fn test_canonical_plate_passes_through() {
        assert_eq!(normalized("MH12AB1234"), "MH12AB1234");
        assert_eq!(normalized("MH12A1234"), "MH12A1234");
    }

    #[test]
    fn test_noise_is_stripped() {
        assert_eq!(normalized("M#H1 2A B1234"), "MH12AB1234");
        assert_eq!(normalized("mh-12-ab-1234"), "MH12AB1234");
    }

    #[test]
    fn test_confusables_are_corrected_by_position() {
        // 0 in a letter slot, O and I in digit slots
        assert_eq!(normalized("0H12ABI23O"), "OH12AB1230");
        // 8 in the middle letter group, S in the tail digits
        assert_eq!(normalized("KA058S12S4"), "KA05BS1254");
        // E reads as 6 where a digit is expected
        assert_eq!(normalized("DLE4CA1234"), "DL64CA1234");
    }

    #[test]
    fn test_unmatched_characters_are_consumed() {
        // 'C' has no digit look-alike; it is dropped but still uses up a position
        assert!(matches!(
            normalize("MH1C2AB123"),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn test_ambiguous_input_does_not_panic() {
        match normalize("O0IB5678") {
            Ok(plate) => assert!(PlateText::from_canonical(plate.as_str()).is_some()),
            Err(PipelineError::Parse { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_all_digits_is_parse_error() {
        // none of 3, 7, 9 has a letter look-alike
        for raw in ["3333333333", "979397939", "7373737373"] {
            assert!(matches!(normalize(raw), Err(PipelineError::Parse { .. })));
        }
    }

    #[test]
    fn test_short_and_empty_input() {
        assert!(matches!(normalize(""), Err(PipelineError::Parse { .. })));
        assert!(matches!(normalize("MH12"), Err(PipelineError::Parse { .. })));
        assert!(matches!(
            normalize("#### ----"),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn test_unusual_length_skips_middle_letters() {
        // 11 characters: the middle letter group gets no quota
        assert!(matches!(
            normalize("MH12AB12345"),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["MH12AB1234", "M#H1 2A B1234", "KA05B1254", "0H12ABI23O"] {
            let once = normalized(raw);
            assert_eq!(normalized(&once), once);
        }
    }
}
