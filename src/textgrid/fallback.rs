//! Token-level reader for the TextGrid inputs the `textgrid` crate does not
//! accept: Praat's own layout with its blank separator line, `number =`
//! point times, UTF-16 files, `""` escapes, multi-line labels and
//! zero-length or reversed intervals.

use super::lexer::{Lexer, Token};
use super::{Interval, Point, TextGrid, TextGridError, Tier, TierItems};

pub(super) fn parse(src: &str) -> Result<TextGrid, TextGridError> {
    let mut p = Parser {
        tokens: Lexer::new(src),
    };

    let file_type = p.string("file type")?;
    if file_type != "ooTextFile" {
        return Err(TextGridError::UnexpectedToken {
            expected: "\"ooTextFile\"",
            found: format!("string \"{file_type}\""),
        });
    }
    let class = p.string("object class")?;
    if class != "TextGrid" {
        return Err(TextGridError::NotATextGrid(class));
    }

    let xmin = p.number("xmin")?;
    let xmax = p.number("xmax")?;
    // A grid written with `tiers? <absent>` simply ends here.
    let size = match p.tokens.next() {
        Some(Token::Num(n)) => n as usize,
        None => 0,
        Some(other) => {
            return Err(TextGridError::UnexpectedToken {
                expected: "tier count",
                found: other.describe(),
            });
        }
    };

    let mut tiers = Vec::with_capacity(size.min(64));
    for _ in 0..size {
        tiers.push(p.tier()?);
    }

    Ok(TextGrid { xmin, xmax, tiers })
}

struct Parser<'a> {
    tokens: Lexer<'a>,
}

impl Parser<'_> {
    fn string(&mut self, what: &'static str) -> Result<String, TextGridError> {
        match self.tokens.next() {
            Some(Token::Str(s)) => Ok(s),
            Some(other) => Err(TextGridError::UnexpectedToken {
                expected: what,
                found: other.describe(),
            }),
            None => Err(TextGridError::UnexpectedEnd(what)),
        }
    }

    fn number(&mut self, what: &'static str) -> Result<f64, TextGridError> {
        match self.tokens.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(other) => Err(TextGridError::UnexpectedToken {
                expected: what,
                found: other.describe(),
            }),
            None => Err(TextGridError::UnexpectedEnd(what)),
        }
    }

    fn count(&mut self, what: &'static str) -> Result<usize, TextGridError> {
        let n = self.number(what)?;
        if n < 0.0 || n.fract() != 0.0 {
            return Err(TextGridError::UnexpectedToken {
                expected: what,
                found: format!("number {n}"),
            });
        }
        Ok(n as usize)
    }

    fn tier(&mut self) -> Result<Tier, TextGridError> {
        let class = self.string("tier class")?;
        let name = self.string("tier name")?;
        let xmin = self.number("tier xmin")?;
        let xmax = self.number("tier xmax")?;

        let items = match class.as_str() {
            "IntervalTier" => {
                let n = self.count("interval count")?;
                let mut intervals = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    intervals.push(Interval {
                        xmin: self.number("interval xmin")?,
                        xmax: self.number("interval xmax")?,
                        text: self.string("interval text")?,
                    });
                }
                TierItems::Intervals(intervals)
            }
            "TextTier" => {
                let n = self.count("point count")?;
                let mut points = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    points.push(Point {
                        time: self.number("point time")?,
                        mark: self.string("point mark")?,
                    });
                }
                TierItems::Points(points)
            }
            _ => return Err(TextGridError::UnknownTierClass(class)),
        };

        Ok(Tier {
            name,
            xmin,
            xmax,
            items,
        })
    }
}

/// Praat writes either UTF-8 or UTF-16 with a byte-order mark.
pub(super) fn decode_text(bytes: &[u8]) -> Result<String, TextGridError> {
    let utf16 = |chunks: std::slice::ChunksExact<'_, u8>, big_endian: bool| {
        let units: Vec<u16> = chunks
            .map(|c| {
                if big_endian {
                    u16::from_be_bytes([c[0], c[1]])
                } else {
                    u16::from_le_bytes([c[0], c[1]])
                }
            })
            .collect();
        String::from_utf16(&units).map_err(|_| TextGridError::Encoding)
    };

    match bytes {
        [0xFE, 0xFF, rest @ ..] => utf16(rest.chunks_exact(2), true),
        [0xFF, 0xFE, rest @ ..] => utf16(rest.chunks_exact(2), false),
        [0xEF, 0xBB, 0xBF, rest @ ..] => {
            String::from_utf8(rest.to_vec()).map_err(|_| TextGridError::Encoding)
        }
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| TextGridError::Encoding),
    }
}
