//! Exact decimal values
//!
//! Stored as sign + unscaled digit string + scale, preserving exactly the
//! representation that came off the wire. String rendering keeps the stored
//! scale (no trailing-zero trimming); `rescale` implements the normalizing
//! write path, truncating to a declared scale with round-half-up.

use crate::error::{Error, Result};

/// An exact decimal value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    /// Sign
    negative: bool,
    /// Unscaled digits, ASCII, no sign, no leading zeros (single "0" for zero)
    digits: String,
    /// Number of digits after the decimal point
    scale: u32,
}

impl Decimal {
    /// Parse a decimal literal
    ///
    /// Accepts `[+-]ddd[.ddd]`. The stored scale is exactly the number of
    /// fraction digits written, so `"1.500"` and `"1.5"` are distinct values
    /// for rendering purposes (though numerically equal).
    pub fn parse(input: &str) -> Result<Self> {
        let bytes = input.as_bytes();
        if bytes.is_empty() {
            return Err(Error::format("DECIMAL", input, "empty literal"));
        }

        let (negative, rest) = match bytes[0] {
            b'-' => (true, &bytes[1..]),
            b'+' => (false, &bytes[1..]),
            _ => (false, bytes),
        };
        if rest.is_empty() {
            return Err(Error::format("DECIMAL", input, "sign with no digits"));
        }

        let mut int_part = String::new();
        let mut frac_part = String::new();
        let mut seen_point = false;
        for &b in rest {
            match b {
                b'0'..=b'9' => {
                    if seen_point {
                        frac_part.push(b as char);
                    } else {
                        int_part.push(b as char);
                    }
                }
                b'.' if !seen_point => seen_point = true,
                _ => {
                    return Err(Error::format(
                        "DECIMAL",
                        input,
                        format!("unexpected character {:?}", b as char),
                    ))
                }
            }
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::format("DECIMAL", input, "no digits"));
        }

        let scale = frac_part.len() as u32;
        let mut digits = int_part;
        digits.push_str(&frac_part);
        let digits = digits.trim_start_matches('0').to_string();
        let digits = if digits.is_empty() { "0".to_string() } else { digits };
        // -0 normalizes to 0
        let negative = negative && digits != "0";

        Ok(Self {
            negative,
            digits,
            scale,
        })
    }

    /// Build from an integer
    pub fn from_i64(value: i64) -> Self {
        let negative = value < 0;
        let digits = value.unsigned_abs().to_string();
        Self {
            negative,
            digits,
            scale: 0,
        }
    }

    /// The stored scale (fraction digit count)
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Whether the value is negative
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Whether the value is zero
    pub fn is_zero(&self) -> bool {
        self.digits.chars().all(|c| c == '0')
    }

    /// Convert to i64, truncating any fraction toward zero
    ///
    /// Returns None when the integer part exceeds the i64 range.
    pub fn to_i64(&self) -> Option<i64> {
        let int_digits = self.integer_digits();
        let magnitude: i128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().ok()?
        };
        let signed = if self.negative { -magnitude } else { magnitude };
        i64::try_from(signed).ok()
    }

    /// Convert to f64 (lossy by design)
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Truncate or extend to the given scale, rounding half up
    ///
    /// This is the scale-normalizing write path: a value stored through it
    /// carries exactly `new_scale` fraction digits afterwards.
    pub fn rescale(&self, new_scale: u32) -> Self {
        if new_scale >= self.scale {
            let mut digits = self.digits.clone();
            for _ in 0..(new_scale - self.scale) {
                digits.push('0');
            }
            let digits = Self::strip_leading_zeros(digits);
            return Self {
                negative: self.negative,
                digits,
                scale: new_scale,
            };
        }

        let drop = (self.scale - new_scale) as usize;
        let mut kept: Vec<u8> = if self.digits.len() > drop {
            self.digits.as_bytes()[..self.digits.len() - drop].to_vec()
        } else {
            vec![b'0']
        };
        let first_dropped = if self.digits.len() >= drop {
            self.digits.as_bytes()[self.digits.len() - drop]
        } else {
            b'0'
        };

        // round half up on the magnitude
        if first_dropped >= b'5' {
            let mut i = kept.len();
            loop {
                if i == 0 {
                    kept.insert(0, b'1');
                    break;
                }
                i -= 1;
                if kept[i] == b'9' {
                    kept[i] = b'0';
                } else {
                    kept[i] += 1;
                    break;
                }
            }
        }

        let digits = Self::strip_leading_zeros(String::from_utf8(kept).unwrap_or_default());
        let negative = self.negative && digits != "0";
        Self {
            negative,
            digits,
            scale: new_scale,
        }
    }

    fn integer_digits(&self) -> &str {
        let len = self.digits.len();
        let scale = self.scale as usize;
        if len > scale {
            &self.digits[..len - scale]
        } else {
            ""
        }
    }

    fn strip_leading_zeros(digits: String) -> String {
        let stripped = digits.trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}", self.digits);
        }
        if self.digits.len() > scale {
            let (int_part, frac_part) = self.digits.split_at(self.digits.len() - scale);
            write!(f, "{}.{}", int_part, frac_part)
        } else {
            write!(f, "0.{:0>width$}", self.digits, width = scale)
        }
    }
}
