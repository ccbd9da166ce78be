//! Praat TextGrid reader.
//!
//! Loads an annotation file into memory and answers the questions the
//! measurement stages ask of it: how many tiers, what each one is called,
//! and what the n-th interval or point of a named tier holds. Positions are
//! 1-based, as in Praat.
//!
//! Files are read with the `textgrid` crate. Layouts it rejects (Praat's
//! blank separator line, UTF-16, multi-line labels, degenerate intervals)
//! go through [`fallback`].

mod fallback;
pub mod lexer;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextGridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File is not valid UTF-8 or UTF-16 text")]
    Encoding,
    #[error("Not a TextGrid (object class {0:?})")]
    NotATextGrid(String),
    #[error("Unexpected end of file while reading {0}")]
    UnexpectedEnd(&'static str),
    #[error("Expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },
    #[error("Unknown tier class {0:?}")]
    UnknownTierClass(String),
}

/// A bounded, labelled stretch of a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub xmin: f64,
    pub xmax: f64,
    pub text: String,
}

impl Interval {
    pub fn duration(&self) -> f64 {
        self.xmax - self.xmin
    }
}

/// An instantaneous, labelled mark on a point tier.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub time: f64,
    pub mark: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierItems {
    Intervals(Vec<Interval>),
    Points(Vec<Point>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    pub name: String,
    pub xmin: f64,
    pub xmax: f64,
    pub items: TierItems,
}

impl Tier {
    pub fn is_interval_tier(&self) -> bool {
        matches!(self.items, TierItems::Intervals(_))
    }

    pub fn class_name(&self) -> &'static str {
        match self.items {
            TierItems::Intervals(_) => "IntervalTier",
            TierItems::Points(_) => "TextTier",
        }
    }

    /// Intervals of an interval tier; `None` for a point tier.
    pub fn intervals(&self) -> Option<&[Interval]> {
        match &self.items {
            TierItems::Intervals(v) => Some(v),
            TierItems::Points(_) => None,
        }
    }

    /// Points of a point tier; `None` for an interval tier.
    pub fn points(&self) -> Option<&[Point]> {
        match &self.items {
            TierItems::Points(v) => Some(v),
            TierItems::Intervals(_) => None,
        }
    }

    /// Number of intervals or points, whichever the tier holds.
    pub fn item_count(&self) -> usize {
        match &self.items {
            TierItems::Intervals(v) => v.len(),
            TierItems::Points(v) => v.len(),
        }
    }

    /// 1-based interval lookup.
    pub fn interval(&self, position: usize) -> Option<&Interval> {
        self.intervals()?.get(position.checked_sub(1)?)
    }

    /// 1-based point lookup.
    pub fn point(&self, position: usize) -> Option<&Point> {
        self.points()?.get(position.checked_sub(1)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextGrid {
    pub xmin: f64,
    pub xmax: f64,
    pub tiers: Vec<Tier>,
}

impl TextGrid {
    pub fn from_file(path: &Path) -> Result<Self, TextGridError> {
        let bytes = std::fs::read(path)?;
        let text = fallback::decode_text(&bytes)?;
        if crate_can_read(&bytes, &text) {
            match read_with_crate(path) {
                Ok(grid) => return Ok(grid),
                Err(e) => log::trace!("{}: {e}; using the token reader", path.display()),
            }
        }
        Self::parse(&text)
    }

    /// Parse TextGrid text in the long or short format.
    pub fn parse(src: &str) -> Result<Self, TextGridError> {
        fallback::parse(src)
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// 1-based tier name lookup.
    pub fn tier_name(&self, index: usize) -> Option<&str> {
        self.tiers
            .get(index.checked_sub(1)?)
            .map(|t| t.name.as_str())
    }

    /// Find a tier by exact, case-sensitive name.
    ///
    /// When several tiers share the name the last one wins.
    pub fn find_tier(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().rev().find(|t| t.name == name)
    }

    /// Every tier carrying `name`, in file order.
    pub fn tiers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tier> + 'a {
        self.tiers.iter().filter(move |t| t.name == name)
    }
}

fn read_with_crate(path: &Path) -> Result<TextGrid, textgrid::TextGridError> {
    textgrid::TextGrid::from_file(path).map(TextGrid::from)
}

/// The crate's text reader panics on a long-format point tier and on a
/// label line holding a lone quote; those files skip it.
fn crate_can_read(bytes: &[u8], text: &str) -> bool {
    let plain_utf8 = !matches!(bytes, [0xFE, 0xFF, ..] | [0xFF, 0xFE, ..] | [0xEF, 0xBB, 0xBF, ..]);
    plain_utf8
        && !text.contains("points: size")
        && !text.lines().any(|l| {
            let l = l.trim_end();
            l.trim_start() == "\"" || l.ends_with("= \"")
        })
}

/// Praat doubles quotes inside labels; the crate keeps them as written.
fn unescape(label: String) -> String {
    if label.contains("\"\"") {
        label.replace("\"\"", "\"")
    } else {
        label
    }
}

impl From<textgrid::Tier> for Tier {
    fn from(tier: textgrid::Tier) -> Self {
        let items = match tier.tier_type {
            textgrid::TierType::IntervalTier => TierItems::Intervals(
                tier.intervals
                    .into_iter()
                    .map(|iv| Interval {
                        xmin: iv.xmin,
                        xmax: iv.xmax,
                        text: unescape(iv.text),
                    })
                    .collect(),
            ),
            textgrid::TierType::PointTier => TierItems::Points(
                tier.points
                    .into_iter()
                    .map(|p| Point {
                        time: p.time,
                        mark: unescape(p.mark),
                    })
                    .collect(),
            ),
        };
        Tier {
            name: unescape(tier.name),
            xmin: tier.xmin,
            xmax: tier.xmax,
            items,
        }
    }
}

impl From<textgrid::TextGrid> for TextGrid {
    fn from(grid: textgrid::TextGrid) -> Self {
        TextGrid {
            xmin: grid.xmin,
            xmax: grid.xmax,
            tiers: grid.tiers.into_iter().map(Tier::from).collect(),
        }
    }
}
