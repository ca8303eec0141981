//! Run-length-encoded pattern files
//!
//! The seeding collaborator for `--file`. The format is the RLE dialect the
//! original tool consumed: `#` comment lines, an optional header
//! `x = W, y = H[, rule = B../S..]`, then a body where `b` is a dead cell,
//! any of `o`, `x`, `y`, `z` is a live cell, a digit run is a repeat count,
//! `$` advances one or more rows, and `!` terminates the pattern. Malformed
//! input is a hard failure; no partial pattern is ever returned.

use std::path::Path;

use crate::error::ParseError;
use crate::grid::{ALIVE, DEAD};
use crate::rules::RuleSet;

/// A parsed pattern: a WxH box of cell states plus the header rule, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    width: u32,
    height: u32,
    cells: Vec<u8>,
    rule: Option<RuleSet>,
}

impl Pattern {
    /// Build a pattern directly from cells, row-major. Used by tests.
    pub fn from_cells(width: u32, height: u32, cells: Vec<u8>) -> Self {
        assert_eq!(cells.len(), width as usize * height as usize);
        Self {
            width,
            height,
            cells,
            rule: None,
        }
    }

    /// Read and parse a pattern file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse pattern text.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Parser::new(text)?.run()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        debug_assert!(x < self.width && y < self.height);
        self.cells[(y * self.width + x) as usize]
    }

    /// Rule declared in the header, if the file carried one.
    pub fn rule(&self) -> Option<RuleSet> {
        self.rule
    }
}

/// Declared dimensions from a header line, when present.
struct Declared {
    width: u32,
    height: u32,
    rule: Option<RuleSet>,
}

struct Parser<'a> {
    body: std::str::Chars<'a>,
    declared: Option<Declared>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Result<Self, ParseError> {
        // Comments and blank lines only matter up front; `#` inside the body
        // is not part of the alphabet and will be rejected as a bad character.
        let mut rest = text;
        loop {
            let line_end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
            let line = rest[..line_end].trim();
            if line.is_empty() || line.starts_with('#') {
                if line_end == rest.len() {
                    rest = "";
                    break;
                }
                rest = &rest[line_end..];
            } else {
                break;
            }
        }

        // An 'x' starting the first content line can only open a header:
        // a body's leading live-cell run never carries the `x = ` shape.
        // A header line that fails to parse is a hard error, not body text.
        let declared = if rest.trim_start().starts_with("x ")
            || rest.trim_start().starts_with("x=")
        {
            let line_end = rest.find('\n').unwrap_or(rest.len());
            let header = &rest[..line_end];
            rest = &rest[line_end..];
            Some(Self::parse_header(header)?)
        } else {
            None
        };

        Ok(Self {
            body: rest.chars(),
            declared,
        })
    }

    fn parse_header(line: &str) -> Result<Declared, ParseError> {
        let mut width = None;
        let mut height = None;
        let mut rule = None;
        for part in line.split(',') {
            let (key, value) = part.split_once('=').ok_or(ParseError::BadHeader)?;
            let value = value.trim();
            match key.trim() {
                "x" => width = value.parse::<u32>().ok(),
                "y" => height = value.parse::<u32>().ok(),
                "rule" => {
                    rule = Some(
                        RuleSet::parse(value)
                            .map_err(|_| ParseError::BadRule(value.to_string()))?,
                    )
                }
                _ => return Err(ParseError::BadHeader),
            }
        }
        let width = width.filter(|&w| w > 0).ok_or(ParseError::BadHeader)?;
        let height = height.filter(|&h| h > 0).ok_or(ParseError::BadHeader)?;
        Ok(Declared {
            width,
            height,
            rule,
        })
    }

    fn run(mut self) -> Result<Pattern, ParseError> {
        let mut rows: Vec<Vec<u8>> = Vec::new();
        let mut row: Vec<u8> = Vec::new();
        let mut count: u32 = 0;
        let mut has_count = false;
        let mut terminated = false;

        while let Some(c) = self.body.next() {
            match c {
                ' ' | '\t' | '\r' | '\n' => continue,
                '0'..='9' => {
                    count = count
                        .saturating_mul(10)
                        .saturating_add(c as u32 - '0' as u32);
                    has_count = true;
                }
                'b' => {
                    self.push_cells(&mut row, DEAD, if has_count { count } else { 1 })?;
                    count = 0;
                    has_count = false;
                }
                'o' | 'x' | 'y' | 'z' => {
                    self.push_cells(&mut row, ALIVE, if has_count { count } else { 1 })?;
                    count = 0;
                    has_count = false;
                }
                '$' => {
                    let advance = if has_count { count } else { 1 };
                    self.end_rows(&mut rows, &mut row, advance)?;
                    count = 0;
                    has_count = false;
                }
                '!' => {
                    terminated = true;
                    break;
                }
                other => return Err(ParseError::BadCharacter(other)),
            }
        }

        if !terminated {
            return Err(ParseError::MissingTerminator);
        }
        if !row.is_empty() || rows.is_empty() {
            rows.push(std::mem::take(&mut row));
        }

        let (width, height, rule) = match &self.declared {
            Some(d) => {
                if rows.len() as u32 > d.height {
                    return Err(ParseError::Overflow("height", d.height));
                }
                (d.width, d.height, d.rule)
            }
            None => {
                let width = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
                let height = rows.len() as u32;
                if width == 0 || height == 0 {
                    return Err(ParseError::BadHeader);
                }
                (width, height, None)
            }
        };

        // Short rows and missing trailing rows are padded dead, matching the
        // original's fill-rest-of-line behavior at '$' and '!'.
        let mut cells = vec![DEAD; width as usize * height as usize];
        for (y, r) in rows.iter().enumerate() {
            if r.len() as u32 > width {
                return Err(ParseError::Overflow("width", width));
            }
            let base = y * width as usize;
            cells[base..base + r.len()].copy_from_slice(r);
        }

        Ok(Pattern {
            width,
            height,
            cells,
            rule,
        })
    }

    fn push_cells(&self, row: &mut Vec<u8>, state: u8, count: u32) -> Result<(), ParseError> {
        if let Some(d) = &self.declared {
            if row.len() as u32 + count > d.width {
                return Err(ParseError::Overflow("width", d.width));
            }
        }
        row.extend(std::iter::repeat(state).take(count as usize));
        Ok(())
    }

    fn end_rows(
        &self,
        rows: &mut Vec<Vec<u8>>,
        row: &mut Vec<u8>,
        advance: u32,
    ) -> Result<(), ParseError> {
        rows.push(std::mem::take(row));
        // A count above 1 inserts blank (all-dead) rows.
        for _ in 1..advance {
            rows.push(Vec::new());
        }
        if let Some(d) = &self.declared {
            if rows.len() as u32 > d.height {
                return Err(ParseError::Overflow("height", d.height));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(pattern: &Pattern) -> Vec<Vec<bool>> {
        (0..pattern.height())
            .map(|y| {
                (0..pattern.width())
                    .map(|x| pattern.get(x, y) == ALIVE)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn parses_glider() {
        let p = Pattern::parse("bob$2bo$3o!").unwrap();
        assert_eq!((p.width(), p.height()), (3, 3));
        assert_eq!(
            states(&p),
            vec![
                vec![false, true, false],
                vec![false, false, true],
                vec![true, true, true],
            ]
        );
    }

    #[test]
    fn parses_header_and_rule() {
        let text = "#C a blinker\nx = 3, y = 1, rule = B3/S23\n3o!";
        let p = Pattern::parse(text).unwrap();
        assert_eq!((p.width(), p.height()), (3, 1));
        assert_eq!(p.rule(), Some(RuleSet::conway()));
        assert_eq!(p.get(0, 0), ALIVE);
    }

    #[test]
    fn header_dims_pad_short_body() {
        let p = Pattern::parse("x = 4, y = 3\noo!").unwrap();
        assert_eq!((p.width(), p.height()), (4, 3));
        assert_eq!(p.get(0, 0), ALIVE);
        assert_eq!(p.get(3, 0), DEAD);
        assert_eq!(p.get(0, 2), DEAD);
    }

    #[test]
    fn repeated_row_advance() {
        let p = Pattern::parse("o3$o!").unwrap();
        assert_eq!((p.width(), p.height()), (1, 4));
        assert_eq!(p.get(0, 0), ALIVE);
        assert_eq!(p.get(0, 1), DEAD);
        assert_eq!(p.get(0, 2), DEAD);
        assert_eq!(p.get(0, 3), ALIVE);
    }

    #[test]
    fn alternate_live_aliases() {
        let p = Pattern::parse("xyz!").unwrap();
        let live = (0..p.width()).filter(|&x| p.get(x, 0) == ALIVE).count();
        assert_eq!(live, 3);
    }

    #[test]
    fn missing_terminator_fails() {
        assert!(matches!(
            Pattern::parse("3o$3o"),
            Err(ParseError::MissingTerminator)
        ));
    }

    #[test]
    fn bad_character_fails() {
        assert!(matches!(
            Pattern::parse("2q!"),
            Err(ParseError::BadCharacter('q'))
        ));
    }

    #[test]
    fn body_wider_than_header_fails() {
        assert!(matches!(
            Pattern::parse("x = 2, y = 1\n3o!"),
            Err(ParseError::Overflow("width", 2))
        ));
    }

    #[test]
    fn body_taller_than_header_fails() {
        assert!(matches!(
            Pattern::parse("x = 1, y = 2\no$o$o!"),
            Err(ParseError::Overflow("height", 2))
        ));
    }

    #[test]
    fn malformed_header_fails() {
        assert!(Pattern::parse("x = , y = 3\noo!").is_err());
    }

    #[test]
    fn bad_header_rule_fails() {
        assert!(matches!(
            Pattern::parse("x = 2, y = 1, rule = B9/S23\noo!"),
            Err(ParseError::BadRule(_))
        ));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let text = "# comment\n\n#another\nbo$ob!";
        let p = Pattern::parse(text).unwrap();
        assert_eq!((p.width(), p.height()), (2, 2));
    }
}
