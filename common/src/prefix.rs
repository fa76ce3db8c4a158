//! Binary (power of 1024) byte prefixes: `K` = 2^10 up to `Y` = 2^80

use anyhow::{Context, anyhow};

const PREFIXES: [&str; 9] = ["", "K", "M", "G", "T", "P", "E", "Z", "Y"];

static SIZE_REGEX: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^(\d+)(?:([KMGTPEZY])i?)?B?$").expect("size pattern must compile")
});

fn scale(index: usize) -> u128 {
    1u128 << (10 * index)
}

/// Split `value` into a mantissa and the largest prefix not exceeding it.
///
/// `in_binary_prefix(1024) == (1.0, "K")`, values below 1024 come back unscaled with `""`.
pub fn in_binary_prefix(value: u64) -> (f64, &'static str) {
    let wide = u128::from(value);
    let mut index = 0;
    while index + 1 < PREFIXES.len() && wide >= scale(index + 1) {
        index += 1;
    }
    (value as f64 / scale(index) as f64, PREFIXES[index])
}

/// Human readable form with one decimal, e.g. `1.0K`, `2.5M`, `512.0`.
pub fn format_binary_prefix(value: u64) -> String {
    let (mantissa, prefix) = in_binary_prefix(value);
    format!("{mantissa:.1}{prefix}")
}

/// Parse a size such as `10`, `10K`, `10Ki`, `10KB`, `10KiB`.
pub fn parse_binary_prefix(text: &str) -> anyhow::Result<u64> {
    let captures = SIZE_REGEX
        .captures(text)
        .ok_or_else(|| anyhow!("Parse String error: {}", text))?;
    let digits = &captures[1];
    let count: u64 = digits
        .parse()
        .with_context(|| format!("Convert string to number error: {digits}"))?;
    let multiplier = match captures.get(2) {
        Some(unit) => {
            let index = PREFIXES
                .iter()
                .position(|p| *p == unit.as_str())
                .ok_or_else(|| anyhow!("unknown prefix: {}", unit.as_str()))?;
            scale(index)
        }
        None => 1,
    };
    u128::from(count)
        .checked_mul(multiplier)
        .and_then(|bytes| u64::try_from(bytes).ok())
        .ok_or_else(|| anyhow!("size out of range: {}", text))
}

/// Byte count parsed with [`parse_binary_prefix`], usable as a clap argument value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BinarySize(pub u64);

impl std::str::FromStr for BinarySize {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_binary_prefix(s).map(BinarySize)
    }
}
