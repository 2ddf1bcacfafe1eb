use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Bits used per axis when a position is packed into a scalar key.
pub const KEY_AXIS_BITS: u32 = 12;

const KEY_AXIS_SPAN: i64 = 1 << KEY_AXIS_BITS;
const KEY_AXIS_HALF: i64 = KEY_AXIS_SPAN / 2;

/// Smallest block coordinate addressable through a scalar key, on every axis.
pub const MIN_COORD: i32 = -(KEY_AXIS_HALF as i32);
/// Largest block coordinate addressable through a scalar key, on every axis.
pub const MAX_COORD: i32 = (KEY_AXIS_HALF - 1) as i32;

/// Map block position, in block (not node) units.
///
/// Ordering is lexicographic on `(x, y, z)`; it only exists so failure
/// samples can be kept deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Pack into the scalar key used by point-keyed backends:
    /// `z·2^24 + y·2^12 + x`.
    ///
    /// Injective for axes in `[MIN_COORD, MAX_COORD]` and, separately, for
    /// axes in `[0, 4095]`.
    pub const fn to_key(&self) -> i64 {
        (self.z as i64) * KEY_AXIS_SPAN * KEY_AXIS_SPAN + (self.y as i64) * KEY_AXIS_SPAN + self.x as i64
    }

    /// Inverse of [`Position::to_key`] for positions in the signed range.
    pub fn from_key(key: i64) -> Self {
        let x = unsigned_to_signed(key.rem_euclid(KEY_AXIS_SPAN));
        let key = (key - x) / KEY_AXIS_SPAN;
        let y = unsigned_to_signed(key.rem_euclid(KEY_AXIS_SPAN));
        let key = (key - y) / KEY_AXIS_SPAN;
        let z = unsigned_to_signed(key.rem_euclid(KEY_AXIS_SPAN));
        Self::new(x as i32, y as i32, z as i32)
    }
}

fn unsigned_to_signed(value: i64) -> i64 {
    if value < KEY_AXIS_HALF {
        value
    } else {
        value - KEY_AXIS_SPAN
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid position `{0}`, expected `x,y,z`")]
pub struct ParsePositionError(String);

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePositionError(s.to_string());
        let mut axes = s.split(',').map(|part| part.trim().parse::<i32>());
        let (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) =
            (axes.next(), axes.next(), axes.next(), axes.next())
        else {
            return Err(err());
        };
        Ok(Self::new(x, y, z))
    }
}

/// Axis-aligned box of block positions, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub min: Position,
    pub max: Position,
}

impl Region {
    /// Every position a scalar key can address.
    pub const WORLD: Region = Region {
        min: Position::new(MIN_COORD, MIN_COORD, MIN_COORD),
        max: Position::new(MAX_COORD, MAX_COORD, MAX_COORD),
    };

    /// Build a region from two corners given in any order.
    pub fn new(a: Position, b: Position) -> Self {
        Self {
            min: Position::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Position::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Overlap of two regions, or `None` when they are disjoint.
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let min = Position::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z.max(other.min.z),
        );
        let max = Position::new(
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z.min(other.max.z),
        );
        (min.x <= max.x && min.y <= max.y && min.z <= max.z).then_some(Region { min, max })
    }

    pub fn contains(&self, pos: Position) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// Scalar keys that can belong to this region.
    ///
    /// Within the signed key range, key order is lexicographic on
    /// `(z, y, x)`, so every contained position falls between the keys of
    /// the two corners. The converse does not hold: callers still filter
    /// with [`Region::contains`].
    pub fn key_range(&self) -> RangeInclusive<i64> {
        self.min.to_key()..=self.max.to_key()
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::WORLD
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_matches_reference_packing() {
        assert_eq!(Position::new(0, 0, 0).to_key(), 0);
        assert_eq!(Position::new(1, 2, 3).to_key(), 3 * 0x1000000 + 2 * 0x1000 + 1);
        assert_eq!(Position::new(-1, 0, 0).to_key(), -1);
        assert_eq!(Position::new(0, -1, 0).to_key(), -4096);
    }

    #[test]
    fn key_roundtrip_signed_range() {
        for &x in &[MIN_COORD, -1, 0, 1, MAX_COORD] {
            for &y in &[MIN_COORD, -7, 0, 33, MAX_COORD] {
                for &z in &[MIN_COORD, -300, 0, 5, MAX_COORD] {
                    let pos = Position::new(x, y, z);
                    assert_eq!(Position::from_key(pos.to_key()), pos, "key roundtrip for {pos}");
                }
            }
        }
    }

    #[test]
    fn key_injective_unsigned_range() {
        // Sweep each axis fully while holding the others at corner values;
        // any collision between distinct positions would show up as a
        // duplicate key.
        let corners = [0, 1, 2047, 2048, 4094, 4095];
        let mut seen = HashSet::new();
        let mut positions = HashSet::new();
        for a in 0..4096 {
            for &b in &corners {
                for &c in &corners {
                    for pos in [
                        Position::new(a, b, c),
                        Position::new(b, a, c),
                        Position::new(b, c, a),
                    ] {
                        if positions.insert(pos) {
                            assert!(seen.insert(pos.to_key()), "collision at {pos}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn region_normalizes_corners() {
        let r = Region::new(Position::new(5, -2, 3), Position::new(-1, 4, 3));
        assert_eq!(r.min, Position::new(-1, -2, 3));
        assert_eq!(r.max, Position::new(5, 4, 3));
        assert!(r.contains(Position::new(0, 0, 3)));
        assert!(r.contains(Position::new(5, 4, 3)));
        assert!(!r.contains(Position::new(0, 0, 4)));
    }

    #[test]
    fn intersection_clips_to_world() {
        let huge = Region::new(Position::new(-9000, 0, 5), Position::new(9000, 10, 5));
        let clipped = huge.intersection(&Region::WORLD).unwrap();
        assert_eq!(clipped.min, Position::new(MIN_COORD, 0, 5));
        assert_eq!(clipped.max, Position::new(MAX_COORD, 10, 5));

        let far = Region::new(Position::new(5000, 0, 0), Position::new(6000, 0, 0));
        assert_eq!(far.intersection(&Region::WORLD), None);
    }

    #[test]
    fn contained_positions_lie_in_key_range() {
        let r = Region::new(Position::new(-3, -3, -3), Position::new(3, 3, 3));
        let keys = r.key_range();
        for x in -3..=3 {
            for y in -3..=3 {
                for z in -3..=3 {
                    assert!(keys.contains(&Position::new(x, y, z).to_key()));
                }
            }
        }
        // Inside the key range but outside the box.
        let outside = Position::new(10, 0, 0);
        assert!(keys.contains(&outside.to_key()));
        assert!(!r.contains(outside));
    }

    #[test]
    fn parse_position() {
        assert_eq!("1,-2, 3".parse::<Position>().unwrap(), Position::new(1, -2, 3));
        assert!("1,2".parse::<Position>().is_err());
        assert!("1,2,3,4".parse::<Position>().is_err());
        assert!("a,b,c".parse::<Position>().is_err());
    }
}
