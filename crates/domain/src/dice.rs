//! Dice notation parsing and server-side rolls.
//!
//! Supports `"2d6+3"`, `"d20"`, `"4d10-2"` style notation. The roll helper
//! is the authoritative randomizer for anything rolled on the server side;
//! the logic engine's model-reported rolls pass through untouched.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error when parsing dice notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    #[error("Empty dice notation")]
    Empty,
    #[error("Invalid dice notation: {0}")]
    InvalidFormat(String),
    #[error("Dice count must be at least 1")]
    InvalidCount,
    #[error("Die must have at least 2 sides")]
    InvalidSides,
}

/// A parsed dice formula like `2d6+3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceFormula {
    /// Number of dice to roll (N in NdS).
    pub count: u32,
    /// Sides per die (S in NdS).
    pub sides: u32,
    /// Flat modifier applied after summing (+M / -M).
    pub modifier: i64,
}

impl DiceFormula {
    pub fn new(count: u32, sides: u32, modifier: i64) -> Result<Self, DiceParseError> {
        if count == 0 {
            return Err(DiceParseError::InvalidCount);
        }
        if sides < 2 {
            return Err(DiceParseError::InvalidSides);
        }
        Ok(Self {
            count,
            sides,
            modifier,
        })
    }

    /// Parse notation like `"2d6+3"`, `"d20"` (implicit count of 1) or
    /// `"4d10-2"`.
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        let d_pos = input
            .find('d')
            .ok_or_else(|| DiceParseError::InvalidFormat(format!("missing 'd' in '{input}'")))?;

        let count_str = &input[..d_pos];
        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("bad dice count '{count_str}'"))
            })?
        };

        let rest = &input[d_pos + 1..];
        let (sides_str, modifier) = if let Some(pos) = rest.find(['+', '-']) {
            if pos == 0 {
                return Err(DiceParseError::InvalidFormat(format!(
                    "missing die sides in '{input}'"
                )));
            }
            let modifier: i64 = rest[pos..].parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("bad modifier '{}'", &rest[pos..]))
            })?;
            (&rest[..pos], modifier)
        } else {
            (rest, 0)
        };

        let sides: u32 = sides_str
            .parse()
            .map_err(|_| DiceParseError::InvalidFormat(format!("bad die sides '{sides_str}'")))?;

        Self::new(count, sides, modifier)
    }

    /// Roll the dice: each die is `⌊random()×sides⌋+1`, summed, plus modifier.
    pub fn roll(&self) -> DiceRollResult {
        let mut rng = rand::thread_rng();
        let rolls: Vec<i64> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides as i64))
            .collect();
        let dice_total: i64 = rolls.iter().sum();

        DiceRollResult {
            formula: *self,
            rolls,
            total: dice_total + self.modifier,
        }
    }

    pub fn min_total(&self) -> i64 {
        self.count as i64 + self.modifier
    }

    pub fn max_total(&self) -> i64 {
        (self.count as i64 * self.sides as i64) + self.modifier
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            0 => write!(f, "{}d{}", self.count, self.sides),
            m if m > 0 => write!(f, "{}d{}+{}", self.count, self.sides, m),
            m => write!(f, "{}d{}{}", self.count, self.sides, m),
        }
    }
}

/// Outcome of a server-side roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollResult {
    pub formula: DiceFormula,
    /// Individual die results, each in `1..=sides`.
    pub rolls: Vec<i64>,
    /// `sum(rolls) + modifier`.
    pub total: i64,
}

impl DiceRollResult {
    /// Format like `1d20+5 [14] = 19` for system messages.
    pub fn breakdown(&self) -> String {
        let rolls: Vec<String> = self.rolls.iter().map(|r| r.to_string()).collect();
        format!("{} [{}] = {}", self.formula, rolls.join(", "), self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiple_dice_with_modifier() {
        let formula = DiceFormula::parse("2d6+3").unwrap();
        assert_eq!(formula.count, 2);
        assert_eq!(formula.sides, 6);
        assert_eq!(formula.modifier, 3);
    }

    #[test]
    fn test_parse_shorthand() {
        let formula = DiceFormula::parse("d20").unwrap();
        assert_eq!(formula.count, 1);
        assert_eq!(formula.sides, 20);
        assert_eq!(formula.modifier, 0);
    }

    #[test]
    fn test_parse_negative_modifier() {
        let formula = DiceFormula::parse("4d10-2").unwrap();
        assert_eq!(formula.count, 4);
        assert_eq!(formula.sides, 10);
        assert_eq!(formula.modifier, -2);
    }

    #[test]
    fn test_parse_case_and_whitespace() {
        let formula = DiceFormula::parse("  1D8+1 ").unwrap();
        assert_eq!((formula.count, formula.sides, formula.modifier), (1, 8, 1));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(DiceFormula::parse(""), Err(DiceParseError::Empty));
        assert!(matches!(
            DiceFormula::parse("20"),
            Err(DiceParseError::InvalidFormat(_))
        ));
        assert_eq!(DiceFormula::parse("0d6"), Err(DiceParseError::InvalidCount));
        assert_eq!(DiceFormula::parse("1d1"), Err(DiceParseError::InvalidSides));
        assert!(matches!(
            DiceFormula::parse("d+3"),
            Err(DiceParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_roll_bounds_and_total_arithmetic() {
        let formula = DiceFormula::parse("2d6+3").unwrap();
        for _ in 0..200 {
            let result = formula.roll();
            assert_eq!(result.rolls.len(), 2);
            for die in &result.rolls {
                assert!((1..=6).contains(die), "die {die} out of range");
            }
            let sum: i64 = result.rolls.iter().sum();
            assert_eq!(result.total, sum + 3);
            assert!(result.total >= formula.min_total());
            assert!(result.total <= formula.max_total());
        }
    }

    #[test]
    fn test_roll_negative_modifier_bounds() {
        let formula = DiceFormula::parse("4d10-2").unwrap();
        for _ in 0..200 {
            let result = formula.roll();
            assert!((2..=38).contains(&result.total));
        }
    }

    #[test]
    fn test_breakdown_format() {
        let result = DiceRollResult {
            formula: DiceFormula::new(2, 6, 3).unwrap(),
            rolls: vec![4, 5],
            total: 12,
        };
        assert_eq!(result.breakdown(), "2d6+3 [4, 5] = 12");
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceFormula::new(1, 20, 0).unwrap().to_string(), "1d20");
        assert_eq!(DiceFormula::new(1, 20, 5).unwrap().to_string(), "1d20+5");
        assert_eq!(DiceFormula::new(4, 10, -2).unwrap().to_string(), "4d10-2");
    }
}
