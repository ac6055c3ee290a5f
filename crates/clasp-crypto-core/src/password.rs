//! Password generation and strength scoring.
//!
//! Generation draws every character uniformly from the union of the enabled
//! character classes using `OsRng`. Scoring is the additive heuristic used by
//! the strength meter: length thresholds, class coverage, and a repeated-run
//! penalty, bucketed into five ordered tiers.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Maximum allowed generated password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum feedback items returned by the strength meter.
pub const MAX_FEEDBACK_ITEMS: usize = 2;

// Character sets
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which character classes may appear in a generated password.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharClasses {
    /// Include uppercase letters (A-Z).
    pub upper: bool,
    /// Include lowercase letters (a-z).
    pub lower: bool,
    /// Include digits (0-9).
    pub digit: bool,
    /// Include symbols (!@#$%^&*...).
    pub symbol: bool,
}

impl Default for CharClasses {
    fn default() -> Self {
        Self {
            upper: true,
            lower: true,
            digit: true,
            symbol: true,
        }
    }
}

/// Password strength tier, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrengthTier {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl StrengthTier {
    /// Human-readable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryWeak => "very-weak",
            Self::Weak => "weak",
            Self::Medium => "medium",
            Self::Strong => "strong",
            Self::VeryStrong => "very-strong",
        }
    }

    /// Fixed meter fill percentage for this tier.
    #[must_use]
    pub const fn percentage(self) -> u8 {
        match self {
            Self::VeryWeak => 20,
            Self::Weak => 40,
            Self::Medium => 60,
            Self::Strong => 80,
            Self::VeryStrong => 100,
        }
    }
}

/// Result of scoring a candidate password.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthReport {
    /// The bucketed tier.
    pub tier: StrengthTier,
    /// Raw additive score (0-7).
    pub score: u8,
    /// Meter fill percentage (from the tier).
    pub percentage: u8,
    /// At most [`MAX_FEEDBACK_ITEMS`] suggestions, in check order.
    pub feedback: Vec<String>,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Generate a random password of `length` characters.
///
/// Every position is drawn uniformly from the union of the enabled classes,
/// so a short password is not forced to cover all classes — the strength
/// meter reports coverage instead.
///
/// # Errors
///
/// Returns [`CryptoError::PasswordGeneration`] if:
/// - No character class is enabled
/// - `length` is zero or exceeds [`MAX_PASSWORD_LENGTH`]
pub fn generate_password(length: usize, classes: &CharClasses) -> Result<String, CryptoError> {
    if length == 0 || length > MAX_PASSWORD_LENGTH {
        return Err(CryptoError::PasswordGeneration(format!(
            "length must be between 1 and {MAX_PASSWORD_LENGTH}, got {length}"
        )));
    }

    let mut pool: Vec<u8> = Vec::new();
    if classes.upper {
        pool.extend_from_slice(UPPERCASE);
    }
    if classes.lower {
        pool.extend_from_slice(LOWERCASE);
    }
    if classes.digit {
        pool.extend_from_slice(DIGITS);
    }
    if classes.symbol {
        pool.extend_from_slice(SYMBOLS);
    }

    if pool.is_empty() {
        return Err(CryptoError::PasswordGeneration(
            "at least one character class must be enabled".to_string(),
        ));
    }

    let mut rng = OsRng;
    let chars: Vec<u8> = (0..length)
        .map(|_| pool[rng.gen_range(0..pool.len())])
        .collect();

    // Safety: all pool bytes are printable ASCII.
    Ok(String::from_utf8(chars).expect("password chars are ASCII"))
}

// ---------------------------------------------------------------------------
// Strength scoring
// ---------------------------------------------------------------------------

/// Score a password with the additive strength heuristic.
///
/// Checks, in order:
/// 1. Length: ≥12 chars → +2, ≥8 → +1, otherwise a feedback item
/// 2. Lowercase present → +1
/// 3. Uppercase present → +1
/// 4. Digit present → +1
/// 5. Symbol (non-alphanumeric) present → +1
/// 6. No run of 3+ identical characters → +1
///
/// Each failed check contributes one feedback item; the list is capped at
/// [`MAX_FEEDBACK_ITEMS`] in check order. Score buckets map to the five
/// tiers: ≤2 very-weak, ≤4 weak, ≤5 medium, ≤6 strong, 7 very-strong.
#[must_use]
#[allow(clippy::arithmetic_side_effects)]
pub fn score_password_strength(password: &str) -> StrengthReport {
    let mut score: u8 = 0;
    let mut feedback: Vec<&'static str> = Vec::new();

    // Length thresholds.
    if password.len() >= 12 {
        score += 2;
    } else if password.len() >= 8 {
        score += 1;
    } else {
        feedback.push("use at least 8 characters");
    }

    // Class coverage.
    if password.chars().any(|c| c.is_ascii_lowercase()) {
        score += 1;
    } else {
        feedback.push("add lowercase letters");
    }

    if password.chars().any(|c| c.is_ascii_uppercase()) {
        score += 1;
    } else {
        feedback.push("add uppercase letters");
    }

    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    } else {
        feedback.push("add digits");
    }

    if password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        score += 1;
    } else {
        feedback.push("add symbols");
    }

    // Repeated-run penalty: 3+ identical characters in a row.
    if has_repeated_run(password) {
        feedback.push("avoid repeating the same character");
    } else {
        score += 1;
    }

    let tier = match score {
        0..=2 => StrengthTier::VeryWeak,
        3..=4 => StrengthTier::Weak,
        5 => StrengthTier::Medium,
        6 => StrengthTier::Strong,
        _ => StrengthTier::VeryStrong,
    };

    feedback.truncate(MAX_FEEDBACK_ITEMS);

    StrengthReport {
        tier,
        score,
        percentage: tier.percentage(),
        feedback: feedback.into_iter().map(str::to_owned).collect(),
    }
}

/// True if `s` contains a run of 3 or more identical characters.
fn has_repeated_run(s: &str) -> bool {
    let mut run: usize = 1;
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if prev == Some(c) {
            run = run.saturating_add(1);
            if run >= 3 {
                return true;
            }
        } else {
            run = 1;
        }
        prev = Some(c);
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
