use crate::util::error::{OomdError, Result};

/// Memory thresholds accept either an absolute size or a percentage of a
/// reference total (usually MemTotal or SwapTotal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemThreshold {
    Bytes(i64),
    Percent(f64),
}

impl MemThreshold {
    pub fn resolve(&self, total: i64) -> i64 {
        match *self {
            MemThreshold::Bytes(b) => b,
            MemThreshold::Percent(p) => ((total as f64) * p / 100.0) as i64,
        }
    }
}

pub fn parse_bool(val: &str) -> bool {
    matches!(val, "true" | "True" | "1")
}

/// Parses a signed byte size with an optional binary suffix (K/M/G/T).
/// A bare integer is taken as bytes.
pub fn parse_size(s: &str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(OomdError::Config("empty size".to_string()));
    }

    let (body, mult) = match s.chars().last().unwrap() {
        'k' | 'K' => (&s[..s.len() - 1], 1i64 << 10),
        'm' | 'M' => (&s[..s.len() - 1], 1i64 << 20),
        'g' | 'G' => (&s[..s.len() - 1], 1i64 << 30),
        't' | 'T' => (&s[..s.len() - 1], 1i64 << 40),
        _ => (s, 1i64),
    };

    let val: i64 = body
        .parse()
        .map_err(|_| OomdError::Config(format!("invalid size \"{}\"", s)))?;
    Ok(val * mult)
}

/// Parses a memory threshold argument. "N%" is a percentage; a suffixed
/// value is an absolute size; a bare integer is MiB for compatibility with
/// older configs.
pub fn parse_mem_threshold(s: &str) -> Result<MemThreshold> {
    let s = s.trim();
    if let Some(body) = s.strip_suffix('%') {
        let pct: f64 = body
            .parse()
            .map_err(|_| OomdError::Config(format!("invalid threshold \"{}\"", s)))?;
        return Ok(MemThreshold::Percent(pct));
    }

    if s.chars().last().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Ok(MemThreshold::Bytes(parse_size(s)?));
    }

    let mib: i64 = s
        .parse()
        .map_err(|_| OomdError::Config(format!("invalid threshold \"{}\"", s)))?;
    Ok(MemThreshold::Bytes(mib * (1 << 20)))
}
