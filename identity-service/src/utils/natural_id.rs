//! Natural identifier (RUT): a numeric body plus one trailing check character.
//!
//! Accepted spellings: `12.345.678-5`, `12345678-5`, `123456785`. The check
//! character is normalized to uppercase (`k` -> `K`). The modulo-11 check is
//! not enforced when parsing; `from_body` uses it to complete a bare body.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NaturalIdError {
    #[error("natural id is too short")]
    TooShort,

    #[error("natural id must contain at most one hyphen")]
    Malformed,

    #[error("natural id body must be numeric")]
    InvalidBody,

    #[error("natural id check character must be a single letter or digit")]
    InvalidCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NaturalId {
    pub body: u32,
    pub check: char,
}

impl NaturalId {
    pub fn parse(input: &str) -> Result<Self, NaturalIdError> {
        let cleaned: String = input.trim().chars().filter(|c| *c != '.').collect();

        let (body, check) = match cleaned.split_once('-') {
            Some((body, check)) => {
                if check.contains('-') {
                    return Err(NaturalIdError::Malformed);
                }
                (body, check)
            }
            None => {
                let mut chars = cleaned.char_indices();
                let (last_idx, _) = chars.next_back().ok_or(NaturalIdError::TooShort)?;
                if last_idx == 0 {
                    return Err(NaturalIdError::TooShort);
                }
                cleaned.split_at(last_idx)
            }
        };

        Self::from_parts(parse_body(body)?, check)
    }

    /// Build from a body and a separately transmitted check character.
    pub fn from_parts(body: u32, check: &str) -> Result<Self, NaturalIdError> {
        let mut chars = check.trim().chars();
        let check = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase(),
            _ => return Err(NaturalIdError::InvalidCheck),
        };
        Ok(Self { body, check })
    }

    /// Complete a bare numeric body with its modulo-11 check character.
    pub fn from_body(body: u32) -> Self {
        Self {
            body,
            check: compute_check(body),
        }
    }

    /// Whether the check character matches the modulo-11 digit of the body.
    pub fn has_valid_check(&self) -> bool {
        compute_check(self.body) == self.check
    }

    /// First four decimal digits of the body, `None` for shorter bodies.
    pub fn initial_secret_prefix(&self) -> Option<String> {
        let digits = self.body.to_string();
        digits.get(..4).map(str::to_string)
    }
}

impl fmt::Display for NaturalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.body, self.check)
    }
}

fn parse_body(body: &str) -> Result<u32, NaturalIdError> {
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NaturalIdError::InvalidBody);
    }
    body.parse().map_err(|_| NaturalIdError::InvalidBody)
}

fn compute_check(body: u32) -> char {
    let mut sum = 0u32;
    let mut factor = 2u32;
    let mut rest = body;
    loop {
        sum += (rest % 10) * factor;
        factor = if factor == 7 { 2 } else { factor + 1 };
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    match 11 - sum % 11 {
        11 => '0',
        10 => 'K',
        d => char::from_digit(d, 10).unwrap_or('0'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_and_plain_forms_are_equal() {
        assert_eq!(
            NaturalId::parse("12.345.678-5"),
            NaturalId::parse("12345678-5")
        );
        let id = NaturalId::parse("12.345.678-5").unwrap();
        assert_eq!(id.body, 12345678);
        assert_eq!(id.check, '5');
    }

    #[test]
    fn test_check_character_is_case_normalized() {
        let lower = NaturalId::parse("12345670-k").unwrap();
        let upper = NaturalId::parse("12345670-K").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.check, 'K');
    }

    #[test]
    fn test_without_hyphen_last_character_is_check() {
        let id = NaturalId::parse("123456785").unwrap();
        assert_eq!(id, NaturalId { body: 12345678, check: '5' });
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(
            NaturalId::parse("  12345678-5 ").unwrap(),
            NaturalId::parse("12345678-5").unwrap()
        );
    }

    #[test]
    fn test_too_short_inputs_fail() {
        assert_eq!(NaturalId::parse(""), Err(NaturalIdError::TooShort));
        assert_eq!(NaturalId::parse("5"), Err(NaturalIdError::TooShort));
        assert_eq!(NaturalId::parse("."), Err(NaturalIdError::TooShort));
    }

    #[test]
    fn test_non_alphanumeric_check_fails() {
        assert_eq!(
            NaturalId::parse("12345678-*"),
            Err(NaturalIdError::InvalidCheck)
        );
        assert_eq!(NaturalId::parse("12345678#"), Err(NaturalIdError::InvalidCheck));
        assert_eq!(NaturalId::parse("12345678-"), Err(NaturalIdError::InvalidCheck));
        assert_eq!(
            NaturalId::parse("12345678-55"),
            Err(NaturalIdError::InvalidCheck)
        );
    }

    #[test]
    fn test_malformed_body_fails() {
        assert_eq!(NaturalId::parse("12a45678-5"), Err(NaturalIdError::InvalidBody));
        assert_eq!(NaturalId::parse("-5"), Err(NaturalIdError::InvalidBody));
        assert_eq!(NaturalId::parse("+1234-5"), Err(NaturalIdError::InvalidBody));
        assert_eq!(
            NaturalId::parse("99999999999-5"),
            Err(NaturalIdError::InvalidBody)
        );
        assert_eq!(NaturalId::parse("1-2-3"), Err(NaturalIdError::Malformed));
    }

    #[test]
    fn test_from_body_computes_check() {
        assert_eq!(NaturalId::from_body(12345678).check, '5');
        assert_eq!(NaturalId::from_body(12345670).check, 'K');
        assert_eq!(NaturalId::from_body(10000004).check, '0');
        assert!(NaturalId::parse("12.345.678-5").unwrap().has_valid_check());
        assert!(!NaturalId::parse("12.345.678-4").unwrap().has_valid_check());
    }

    #[test]
    fn test_initial_secret_prefix() {
        assert_eq!(
            NaturalId::from_body(12345678).initial_secret_prefix().as_deref(),
            Some("1234")
        );
        assert_eq!(NaturalId::from_body(1000).initial_secret_prefix().as_deref(), Some("1000"));
        assert_eq!(NaturalId::from_body(999).initial_secret_prefix(), None);
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(NaturalId::parse("12.345.670-k").unwrap().to_string(), "12345670-K");
    }
}
