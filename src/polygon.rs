//! Polygon geometry text accepted by spatial filters.
//!
//! Input is the text form `POLYGON((x y, x y, ...), (...))` with longitude/latitude
//! pairs in WGS84. The first ring is the exterior boundary; any further rings are
//! holes. Nothing is reprojected.

use std::{fmt, str::FromStr};

use crate::error::PolygonError;

/// Spatial reference id every polygon and stored point is interpreted in.
pub const SRID: i32 = 4326;

const KEYWORD: &str = "POLYGON";
const MIN_RING_PAIRS: usize = 4;
const PREVIEW_CHARS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A validated polygon: every ring has at least four finite pairs and is closed.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    rings: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn parse(input: &str) -> Result<Self, PolygonError> {
        let mut cursor = Cursor::new(input);
        cursor.skip_ws();
        let keyword = cursor.take_while(|ch| ch.is_ascii_alphabetic());
        if !keyword.eq_ignore_ascii_case(KEYWORD) {
            let found = if keyword.is_empty() {
                input.trim()
            } else {
                keyword
            };
            return Err(PolygonError::NotAPolygon {
                found: preview(found),
            });
        }

        check_balanced(input, cursor.pos)?;

        cursor.skip_ws();
        cursor.expect('(', "`(`")?;
        let mut rings = Vec::new();
        loop {
            cursor.skip_ws();
            cursor.expect('(', "`(` opening a ring")?;
            let ring_text = cursor.ring_body()?;
            rings.push(parse_ring(ring_text, rings.len() + 1)?);
            cursor.skip_ws();
            if cursor.eat(',') {
                continue;
            }
            cursor.expect(')', "`,` or `)`")?;
            break;
        }

        cursor.skip_ws();
        if !cursor.at_end() {
            return Err(PolygonError::TrailingInput {
                position: cursor.pos,
            });
        }

        Ok(Self { rings })
    }

    pub fn exterior(&self) -> &[Coord] {
        &self.rings[0]
    }

    pub fn interiors(&self) -> &[Vec<Coord>] {
        &self.rings[1..]
    }

    pub fn rings(&self) -> &[Vec<Coord>] {
        &self.rings
    }

    /// Canonical geometry text, the only form handed to the store.
    pub fn to_wkt(&self) -> String {
        self.to_string()
    }

    /// True when the point lies inside the polygon or on any of its boundaries.
    pub fn intersects_point(&self, x: f64, y: f64) -> bool {
        let point = Coord::new(x, y);
        match locate(self.exterior(), point) {
            Location::Outside => false,
            Location::Boundary => true,
            Location::Inside => self
                .interiors()
                .iter()
                .all(|hole| locate(hole, point) != Location::Inside),
        }
    }
}

impl FromStr for Polygon {
    type Err = PolygonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("POLYGON(")?;
        for (i, ring) in self.rings.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("(")?;
            for (j, coord) in ring.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{} {}", coord.x, coord.y)?;
            }
            f.write_str(")")?;
        }
        f.write_str(")")
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|ch: char| !pred(ch)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.rest().starts_with(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char, expected: &'static str) -> Result<(), PolygonError> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(PolygonError::Syntax {
                expected,
                position: self.pos,
            })
        }
    }

    /// Text up to the ring's closing parenthesis; the cursor moves past it.
    fn ring_body(&mut self) -> Result<&'a str, PolygonError> {
        let rest = self.rest();
        let end = rest
            .find([')', '('])
            .ok_or(PolygonError::UnbalancedParentheses {
                position: self.input.len(),
            })?;
        if rest[end..].starts_with('(') {
            return Err(PolygonError::Syntax {
                expected: "a coordinate pair",
                position: self.pos + end,
            });
        }
        self.pos += end + 1;
        Ok(&rest[..end])
    }
}

fn check_balanced(input: &str, from: usize) -> Result<(), PolygonError> {
    let mut open = Vec::new();
    for (offset, ch) in input[from..].char_indices() {
        match ch {
            '(' => open.push(from + offset),
            ')' => {
                if open.pop().is_none() {
                    return Err(PolygonError::UnbalancedParentheses {
                        position: from + offset,
                    });
                }
            }
            _ => {}
        }
    }
    match open.pop() {
        Some(position) => Err(PolygonError::UnbalancedParentheses { position }),
        None => Ok(()),
    }
}

fn parse_ring(text: &str, ring: usize) -> Result<Vec<Coord>, PolygonError> {
    if text.trim().is_empty() {
        return Err(PolygonError::InsufficientCoordinatePairs { ring, found: 0 });
    }

    let mut coords = Vec::new();
    for (index, raw) in text.split(',').enumerate() {
        let pair = index + 1;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(PolygonError::CoordinateArity {
                ring,
                pair,
                found: tokens.len(),
            });
        }
        let x = parse_coordinate(tokens[0], ring, pair)?;
        let y = parse_coordinate(tokens[1], ring, pair)?;
        coords.push(Coord::new(x, y));
    }

    if coords.len() < MIN_RING_PAIRS {
        return Err(PolygonError::InsufficientCoordinatePairs {
            ring,
            found: coords.len(),
        });
    }
    if coords.first() != coords.last() {
        return Err(PolygonError::Unclosed { ring });
    }
    Ok(coords)
}

fn parse_coordinate(token: &str, ring: usize, pair: usize) -> Result<f64, PolygonError> {
    let value: f64 = token
        .parse()
        .map_err(|_| PolygonError::NonNumericCoordinate {
            ring,
            pair,
            token: preview(token),
        })?;
    if !value.is_finite() {
        return Err(PolygonError::NonFiniteCoordinate { ring, pair });
    }
    Ok(value)
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push('…');
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Inside,
    Boundary,
    Outside,
}

// Even-odd ray casting; points on an edge are reported as Boundary.
fn locate(ring: &[Coord], p: Coord) -> Location {
    let mut inside = false;
    for edge in ring.windows(2) {
        let (a, b) = (edge[0], edge[1]);
        if on_segment(a, b, p) {
            return Location::Boundary;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    cross == 0.0
        && p.x >= a.x.min(b.x)
        && p.x <= a.x.max(b.x)
        && p.y >= a.y.min(b.y)
        && p.y <= a.y.max(b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))";

    #[test]
    fn parses_square() {
        let polygon = Polygon::parse(SQUARE).unwrap();
        assert_eq!(polygon.exterior().len(), 5);
        assert!(polygon.interiors().is_empty());
        assert_eq!(polygon.to_wkt(), "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))");
    }

    #[test]
    fn keyword_is_case_insensitive_and_whitespace_tolerant() {
        let polygon =
            Polygon::parse("  polygon ( ( 0 0 ,10 0, 10   10,0 10 , 0 0 ) ) ").unwrap();
        assert_eq!(polygon.to_wkt(), "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))");
    }

    #[test]
    fn negative_and_fractional_coordinates() {
        let polygon =
            Polygon::parse("POLYGON((-74.1 40.5, -73.7 40.5, -73.7 40.9, -74.1 40.5))").unwrap();
        assert_eq!(polygon.exterior()[0], Coord::new(-74.1, 40.5));
    }

    #[test]
    fn interior_rings_are_holes() {
        let polygon = Polygon::parse(
            "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0), (4 4, 6 4, 6 6, 4 6, 4 4))",
        )
        .unwrap();
        assert_eq!(polygon.interiors().len(), 1);
        assert!(polygon.intersects_point(1.0, 1.0));
        assert!(!polygon.intersects_point(5.0, 5.0));
        // hole boundary still touches the polygon
        assert!(polygon.intersects_point(4.0, 5.0));
    }

    #[test]
    fn intersection_includes_boundary() {
        let polygon = Polygon::parse(SQUARE).unwrap();
        assert!(polygon.intersects_point(5.0, 5.0));
        assert!(polygon.intersects_point(0.0, 5.0));
        assert!(polygon.intersects_point(10.0, 10.0));
        assert!(!polygon.intersects_point(10.5, 5.0));
        assert!(!polygon.intersects_point(-0.1, -0.1));
    }

    #[test]
    fn two_pairs_is_insufficient() {
        let err = Polygon::parse("POLYGON((0 0, 1 1))").unwrap_err();
        assert_eq!(
            err,
            PolygonError::InsufficientCoordinatePairs { ring: 1, found: 2 }
        );
        assert!(err.to_string().contains("coordinate pairs"));
    }

    #[test]
    fn open_ring_is_rejected() {
        let err = Polygon::parse("POLYGON((0 0, 1 0, 1 1, 0 1))").unwrap_err();
        assert_eq!(err, PolygonError::Unclosed { ring: 1 });
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn unbalanced_parentheses() {
        assert!(matches!(
            Polygon::parse("POLYGON((0 0, 1 0, 1 1, 0 0)"),
            Err(PolygonError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            Polygon::parse("POLYGON((0 0, 1 0, 1 1, 0 0)))"),
            Err(PolygonError::UnbalancedParentheses { position: 29 })
        ));
    }

    #[test]
    fn non_numeric_coordinate_names_the_pair() {
        let err = Polygon::parse("POLYGON((0 0, 1 x, 1 1, 0 0))").unwrap_err();
        assert_eq!(
            err,
            PolygonError::NonNumericCoordinate {
                ring: 1,
                pair: 2,
                token: "x".into()
            }
        );
        assert!(err.to_string().contains("non-numeric coordinate at pair 2"));
    }

    #[test]
    fn pairs_need_exactly_two_values() {
        let err = Polygon::parse("POLYGON((0 0 0, 1 0 0, 1 1 0, 0 0 0))").unwrap_err();
        assert_eq!(
            err,
            PolygonError::CoordinateArity {
                ring: 1,
                pair: 1,
                found: 3
            }
        );
    }

    #[test]
    fn non_finite_values_rejected() {
        let err = Polygon::parse("POLYGON((0 0, inf 0, 1 1, 0 0))").unwrap_err();
        assert_eq!(err, PolygonError::NonFiniteCoordinate { ring: 1, pair: 2 });
        let err = Polygon::parse("POLYGON((0 0, 1 0, NaN 1, 0 0))").unwrap_err();
        assert_eq!(err, PolygonError::NonFiniteCoordinate { ring: 1, pair: 3 });
    }

    #[test]
    fn other_geometry_kinds_rejected() {
        assert!(matches!(
            Polygon::parse("POINT(1 2)"),
            Err(PolygonError::NotAPolygon { .. })
        ));
        assert!(matches!(
            Polygon::parse("MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)))"),
            Err(PolygonError::NotAPolygon { .. })
        ));
        assert!(matches!(
            Polygon::parse(""),
            Err(PolygonError::NotAPolygon { .. })
        ));
    }

    #[test]
    fn empty_and_nested_rings() {
        assert_eq!(
            Polygon::parse("POLYGON(())").unwrap_err(),
            PolygonError::InsufficientCoordinatePairs { ring: 1, found: 0 }
        );
        assert!(matches!(
            Polygon::parse("POLYGON(((0 0, 1 0, 1 1, 0 0)))"),
            Err(PolygonError::Syntax { .. })
        ));
        assert!(matches!(
            Polygon::parse("POLYGON EMPTY"),
            Err(PolygonError::Syntax { .. })
        ));
    }

    #[test]
    fn trailing_input_rejected() {
        assert!(matches!(
            Polygon::parse("POLYGON((0 0, 1 0, 1 1, 0 0)) junk"),
            Err(PolygonError::TrailingInput { .. })
        ));
    }

    #[test]
    fn second_ring_errors_name_the_ring() {
        let err =
            Polygon::parse("POLYGON((0 0, 10 0, 10 10, 0 0), (1 1, 2 1, 2 2))").unwrap_err();
        assert_eq!(
            err,
            PolygonError::InsufficientCoordinatePairs { ring: 2, found: 3 }
        );
    }
}
