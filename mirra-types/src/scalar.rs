//! スカラー値
//!
//! ターゲットの基本型（int, uint, long, ulong, float, double, decimal, bool, char, string）
//! の値をホスト側で保持します。

use crate::type_info::FundamentalKind;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// スカラー値
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Char(char),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
}

impl Scalar {
    /// 値の基本型
    pub fn kind(&self) -> FundamentalKind {
        match self {
            Scalar::Bool(_) => FundamentalKind::Boolean,
            Scalar::Char(_) => FundamentalKind::Char,
            Scalar::Int32(_) => FundamentalKind::Int32,
            Scalar::UInt32(_) => FundamentalKind::UInt32,
            Scalar::Int64(_) => FundamentalKind::Int64,
            Scalar::UInt64(_) => FundamentalKind::UInt64,
            Scalar::Single(_) => FundamentalKind::Single,
            Scalar::Double(_) => FundamentalKind::Double,
            Scalar::Decimal(_) => FundamentalKind::Decimal,
            Scalar::String(_) => FundamentalKind::String,
        }
    }

    /// 整数値をビットパターンとして取得する（列挙型・ポインタ用）
    pub fn as_bits(&self) -> Option<u64> {
        match self {
            Scalar::Bool(b) => Some(u64::from(*b)),
            Scalar::Char(c) => Some(u64::from(*c)),
            Scalar::Int32(v) => Some(*v as i64 as u64),
            Scalar::UInt32(v) => Some(u64::from(*v)),
            Scalar::Int64(v) => Some(*v as u64),
            Scalar::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// 整数値を i128 として取得する（配列インデックス計算用）
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Scalar::Int32(v) => Some(i128::from(*v)),
            Scalar::UInt32(v) => Some(i128::from(*v)),
            Scalar::Int64(v) => Some(i128::from(*v)),
            Scalar::UInt64(v) => Some(i128::from(*v)),
            Scalar::Char(c) => Some(i128::from(u32::from(*c))),
            _ => None,
        }
    }

    /// ビットパターンから指定の基本型の値を構築する
    pub fn from_bits(kind: FundamentalKind, bits: u64) -> Option<Scalar> {
        Some(match kind {
            FundamentalKind::Boolean => Scalar::Bool(bits != 0),
            FundamentalKind::Char => Scalar::Char(char::from_u32(bits as u32)?),
            FundamentalKind::Int32 => Scalar::Int32(bits as i32),
            FundamentalKind::UInt32 => Scalar::UInt32(bits as u32),
            FundamentalKind::Int64 => Scalar::Int64(bits as i64),
            FundamentalKind::UInt64 => Scalar::UInt64(bits),
            _ => return None,
        })
    }

    /// 16進数表記（数値以外は通常表記）
    pub fn to_hex_string(&self) -> String {
        match self {
            Scalar::Int32(v) => format!("0x{:x}", v),
            Scalar::UInt32(v) => format!("0x{:x}", v),
            Scalar::Int64(v) => format!("0x{:x}", v),
            Scalar::UInt64(v) => format!("0x{:x}", v),
            Scalar::Char(c) => format!("0x{:x}", u32::from(*c)),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Char(c) => write!(f, "'{}'", c.escape_default()),
            Scalar::Int32(v) => write!(f, "{}", v),
            Scalar::UInt32(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::UInt64(v) => write!(f, "{}", v),
            Scalar::Single(v) => write!(f, "{}", v),
            Scalar::Double(v) => write!(f, "{}", v),
            Scalar::Decimal(v) => write!(f, "{}", v),
            Scalar::String(s) => write!(f, "\"{}\"", s.escape_default()),
        }
    }
}

/// decimal 値（仮数と10進スケール）
///
/// `mantissa * 10^-scale` を表します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

/// decimal の最大スケール
const MAX_DECIMAL_SCALE: u32 = 28;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal literal `{0}`")]
pub struct ParseDecimalError(pub String);

impl Decimal {
    pub fn new(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseDecimalError(s.to_string());
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if frac_part.len() as u32 > MAX_DECIMAL_SCALE {
            return Err(err());
        }

        let mut mantissa: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10).ok_or_else(err)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit)))
                .ok_or_else(err)?;
        }
        if negative {
            mantissa = -mantissa;
        }

        Ok(Decimal {
            mantissa,
            scale: frac_part.len() as u32,
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_parse_and_display() {
        let d: Decimal = "12.50".parse().unwrap();
        assert_eq!(d.mantissa(), 1250);
        assert_eq!(d.scale(), 2);
        assert_eq!(d.to_string(), "12.50");

        let small: Decimal = "0.05".parse().unwrap();
        assert_eq!(small.to_string(), "0.05");

        let neg: Decimal = "-3".parse().unwrap();
        assert_eq!(neg.to_string(), "-3");
    }

    #[test]
    fn test_decimal_parse_invalid() {
        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_scalar_bits() {
        assert_eq!(Scalar::Int32(-1).as_bits(), Some(u64::MAX));
        assert_eq!(Scalar::UInt32(7).as_bits(), Some(7));
        assert_eq!(Scalar::String("x".into()).as_bits(), None);
        assert_eq!(
            Scalar::from_bits(FundamentalKind::Int32, u64::MAX),
            Some(Scalar::Int32(-1))
        );
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Int32(5).to_string(), "5");
        assert_eq!(Scalar::String("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(Scalar::Char('x').to_string(), "'x'");
        assert_eq!(Scalar::UInt64(255).to_hex_string(), "0xff");
    }
}
