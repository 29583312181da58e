//! Chunk Coordinates and Keys
//!
//! Converts world positions to chunk grid coordinates, snapped chunk origins
//! and compact 128-bit chunk keys.
//!
//! # Key layout
//!
//! ```text
//!  127   126        84 83        42 41         0
//! ┌─────┬────────────┬────────────┬────────────┐
//! │ 0 0 │  x + bias  │  y + bias  │  z + bias  │
//! └─────┴────────────┴────────────┴────────────┘
//! ```
//!
//! Each axis stores its grid index in 42 bits with a bias of `2^41`, so every
//! index in `[-(2^41 - 1), 2^41 - 1]` has exactly one key. The supported
//! world range is that index range times the chunk edge length, further
//! capped at `2^53` where `f64` stops representing every integer. With the
//! default 1000 unit edge this is about ±2.2e15 units, comfortably past the
//! ~1e12 scale of an interstellar world.
//!
//! Positions outside the range are rejected instead of wrapping onto a
//! neighbouring key.

use core::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamingError};

/// Bits used per axis inside a [`ChunkKey`]
pub const KEY_AXIS_BITS: u32 = 42;

/// Largest grid index magnitude a key can hold on any axis
pub const MAX_GRID_INDEX: i64 = (1 << (KEY_AXIS_BITS - 1)) - 1;

/// Largest coordinate magnitude for which `f64` still represents every integer
pub const MAX_EXACT_COORDINATE: f64 = 9_007_199_254_740_992.0;

const AXIS_BIAS: i64 = 1 << (KEY_AXIS_BITS - 1);
const AXIS_MASK: u128 = (1 << KEY_AXIS_BITS) - 1;

/// Relative tolerance when accepting an externally supplied origin
const ALIGNMENT_TOLERANCE: f64 = 1e-6;

/// Integer grid coordinate of a chunk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl ChunkCoord {
    pub const ZERO: Self = Self::new(0, 0, 0);

    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Coordinate shifted by a grid offset, `None` on integer overflow
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    /// Whether every axis fits in the key's index range
    pub fn is_addressable(&self) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .all(|v| (-MAX_GRID_INDEX..=MAX_GRID_INDEX).contains(v))
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Dense key uniquely identifying a chunk's grid coordinate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(u128);

impl ChunkKey {
    /// Pack a grid coordinate, `None` if any axis is out of range
    pub fn pack(coord: ChunkCoord) -> Option<Self> {
        if !coord.is_addressable() {
            return None;
        }
        let x = (coord.x + AXIS_BIAS) as u128;
        let y = (coord.y + AXIS_BIAS) as u128;
        let z = (coord.z + AXIS_BIAS) as u128;
        Some(Self((x << (2 * KEY_AXIS_BITS)) | (y << KEY_AXIS_BITS) | z))
    }

    /// Unpack the grid coordinate
    pub fn coord(self) -> ChunkCoord {
        let axis = |shift: u32| ((self.0 >> shift) & AXIS_MASK) as i64 - AXIS_BIAS;
        ChunkCoord::new(axis(2 * KEY_AXIS_BITS), axis(KEY_AXIS_BITS), axis(0))
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#034x}", self.0)
    }
}

/// Converts between world positions, chunk origins and chunk keys
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkKeyCodec {
    edge_length: f64,
    max_coordinate: f64,
}

impl ChunkKeyCodec {
    /// Create a codec for cubical chunks of the given edge length
    pub fn new(edge_length: f64) -> Result<Self> {
        if !edge_length.is_finite() || edge_length <= 0.0 {
            return Err(StreamingError::InvalidEdgeLength(edge_length));
        }
        let max_coordinate = (MAX_GRID_INDEX as f64 * edge_length).min(MAX_EXACT_COORDINATE);
        Ok(Self {
            edge_length,
            max_coordinate,
        })
    }

    /// Chunk edge length in world units
    pub fn edge_length(&self) -> f64 {
        self.edge_length
    }

    /// Largest absolute world coordinate this codec accepts on any axis
    pub fn max_supported_coordinate(&self) -> f64 {
        self.max_coordinate
    }

    /// Ensure a world of the given half-extent is fully addressable
    pub fn check_world_scale(&self, scale: f64) -> Result<()> {
        if !scale.is_finite() || scale > self.max_coordinate {
            return Err(StreamingError::WorldScaleOutOfRange {
                scale,
                max: self.max_coordinate,
            });
        }
        Ok(())
    }

    /// Grid coordinate of the chunk containing `pos`
    pub fn world_to_coord(&self, pos: DVec3) -> Result<ChunkCoord> {
        if !pos.is_finite() {
            return Err(StreamingError::NonFinitePosition(pos));
        }
        if pos.abs().max_element() > self.max_coordinate {
            return Err(self.out_of_range(pos));
        }

        let coord = ChunkCoord::new(
            (pos.x / self.edge_length).floor() as i64,
            (pos.y / self.edge_length).floor() as i64,
            (pos.z / self.edge_length).floor() as i64,
        );
        if !coord.is_addressable() {
            return Err(self.out_of_range(pos));
        }
        Ok(coord)
    }

    /// Snapped origin (minimum corner) of the chunk containing `pos`
    pub fn world_to_origin(&self, pos: DVec3) -> Result<DVec3> {
        Ok(self.coord_to_origin(self.world_to_coord(pos)?))
    }

    /// Origin of a grid coordinate
    pub fn coord_to_origin(&self, coord: ChunkCoord) -> DVec3 {
        DVec3::new(
            coord.x as f64 * self.edge_length,
            coord.y as f64 * self.edge_length,
            coord.z as f64 * self.edge_length,
        )
    }

    /// Grid coordinate of a chunk origin
    pub fn origin_to_coord(&self, origin: DVec3) -> Result<ChunkCoord> {
        if !origin.is_finite() {
            return Err(StreamingError::NonFinitePosition(origin));
        }
        if origin.abs().max_element() > self.max_coordinate {
            return Err(self.out_of_range(origin));
        }

        let cells = (origin / self.edge_length).round();
        let snapped = cells * self.edge_length;
        let tolerance = self.edge_length * ALIGNMENT_TOLERANCE;
        if (snapped - origin).abs().max_element() > tolerance {
            return Err(StreamingError::UnalignedOrigin {
                origin,
                edge_length: self.edge_length,
            });
        }

        let coord = ChunkCoord::new(cells.x as i64, cells.y as i64, cells.z as i64);
        if !coord.is_addressable() {
            return Err(self.out_of_range(origin));
        }
        Ok(coord)
    }

    /// Key of a chunk origin
    pub fn origin_to_key(&self, origin: DVec3) -> Result<ChunkKey> {
        let coord = self.origin_to_coord(origin)?;
        ChunkKey::pack(coord).ok_or_else(|| self.out_of_range(origin))
    }

    /// Origin encoded by a key
    pub fn key_to_origin(&self, key: ChunkKey) -> DVec3 {
        self.coord_to_origin(key.coord())
    }

    /// Key of a grid coordinate
    pub fn coord_to_key(&self, coord: ChunkCoord) -> Result<ChunkKey> {
        ChunkKey::pack(coord).ok_or_else(|| self.out_of_range(self.coord_to_origin(coord)))
    }

    /// Key of the chunk containing `pos`, verified by decoding it again
    pub fn world_to_key(&self, pos: DVec3) -> Result<ChunkKey> {
        let origin = self.world_to_origin(pos)?;
        self.verified_key(origin)
    }

    /// Key of `origin`, rejecting any key that does not decode back to it
    pub fn verified_key(&self, origin: DVec3) -> Result<ChunkKey> {
        let key = self.origin_to_key(origin)?;
        let decoded = self.key_to_origin(key);
        if decoded != origin {
            return Err(StreamingError::KeyCollision {
                origin,
                decoded,
                key,
            });
        }
        Ok(key)
    }

    fn out_of_range(&self, position: DVec3) -> StreamingError {
        StreamingError::CoordinateOutOfRange {
            position,
            max: self.max_coordinate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> ChunkKeyCodec {
        ChunkKeyCodec::new(1000.0).unwrap()
    }

    #[test]
    fn test_world_to_origin_floors_each_axis() {
        let codec = codec();
        assert_eq!(
            codec.world_to_origin(DVec3::new(1500.0, 999.9, 0.0)).unwrap(),
            DVec3::new(1000.0, 0.0, 0.0)
        );
        assert_eq!(
            codec.world_to_origin(DVec3::new(-0.5, -1000.0, -1000.1)).unwrap(),
            DVec3::new(-1000.0, -1000.0, -2000.0)
        );
    }

    #[test]
    fn test_round_trip_across_scales() {
        let codec = codec();
        let samples = [
            DVec3::ZERO,
            DVec3::new(1.0, -1.0, 0.5),
            DVec3::new(123_456.7, -98_765.4, 42.0),
            DVec3::new(1e9, -1e9, 3.3e8),
            DVec3::new(1e12, 1e12, -1e12),
            DVec3::new(-7.5e11, 2.5e11, 9.99e11),
            DVec3::splat(codec.max_supported_coordinate()),
            DVec3::splat(-codec.max_supported_coordinate()),
        ];

        for pos in samples {
            let origin = codec.world_to_origin(pos).unwrap();
            let key = codec.origin_to_key(origin).unwrap();
            assert_eq!(codec.key_to_origin(key), origin, "round trip failed for {:?}", pos);
            assert_eq!(codec.world_to_key(pos).unwrap(), key);
        }
    }

    #[test]
    fn test_distinct_coords_distinct_keys_at_range_edges() {
        let edges = [-MAX_GRID_INDEX, -MAX_GRID_INDEX + 1, -1, 0, 1, MAX_GRID_INDEX - 1, MAX_GRID_INDEX];
        let mut seen = std::collections::HashSet::new();
        for &x in &edges {
            for &y in &edges {
                for &z in &edges {
                    let coord = ChunkCoord::new(x, y, z);
                    let key = ChunkKey::pack(coord).unwrap();
                    assert_eq!(key.coord(), coord);
                    assert!(seen.insert(key), "duplicate key for {}", coord);
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        let codec = codec();
        let too_far = codec.max_supported_coordinate() * 2.0;

        assert!(matches!(
            codec.world_to_key(DVec3::new(too_far, 0.0, 0.0)),
            Err(StreamingError::CoordinateOutOfRange { .. })
        ));
        assert!(ChunkKey::pack(ChunkCoord::new(MAX_GRID_INDEX + 1, 0, 0)).is_none());
    }

    #[test]
    fn test_non_finite_rejected() {
        let codec = codec();
        assert!(matches!(
            codec.world_to_coord(DVec3::new(f64::NAN, 0.0, 0.0)),
            Err(StreamingError::NonFinitePosition(_))
        ));
        assert!(matches!(
            codec.world_to_coord(DVec3::new(0.0, f64::INFINITY, 0.0)),
            Err(StreamingError::NonFinitePosition(_))
        ));
    }

    #[test]
    fn test_unaligned_origin_rejected() {
        let codec = codec();
        assert!(matches!(
            codec.origin_to_key(DVec3::new(1500.0, 0.0, 0.0)),
            Err(StreamingError::UnalignedOrigin { .. })
        ));
    }

    #[test]
    fn test_world_scale_check() {
        let codec = codec();
        assert!(codec.check_world_scale(1e12).is_ok());

        let err = codec.check_world_scale(1e18).unwrap_err();
        assert!(err.is_fatal());

        // Tiny chunks shrink the addressable world
        let fine = ChunkKeyCodec::new(0.001).unwrap();
        assert!(fine.check_world_scale(1e12).is_err());
    }

    #[test]
    fn test_invalid_edge_length() {
        assert!(ChunkKeyCodec::new(0.0).is_err());
        assert!(ChunkKeyCodec::new(-5.0).is_err());
        assert!(ChunkKeyCodec::new(f64::NAN).is_err());
    }
}
