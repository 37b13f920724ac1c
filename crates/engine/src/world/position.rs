use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Number of chunks along each axis of a region.
pub const REGION_SIZE: i32 = 16;

/// Name of a world. Cloning is a refcount bump, so it is cheap to embed in
/// every key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(Arc<str>);

impl WorldId {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorldId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Absolute block position in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl BlockPos {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The chunk this block belongs to.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: (self.x >> 4) as i32,
            z: (self.z >> 4) as i32,
        }
    }

    /// Position within the chunk (0..16 on x and z, absolute y).
    pub const fn local(&self) -> LocalBlockPos {
        LocalBlockPos {
            x: (self.x & 0xF) as u8,
            y: self.y,
            z: (self.z & 0xF) as u8,
        }
    }

    /// Euclidean distance from the centre of this block to `point`.
    pub fn center_distance(&self, point: [f64; 3]) -> f64 {
        let dx = self.x as f64 + 0.5 - point[0];
        let dy = self.y as f64 + 0.5 - point[1];
        let dz = self.z as f64 + 0.5 - point[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Chunk column position (each chunk is 16x16 blocks horizontally).
///
/// Serialized as `"x,z"` so it can key a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn block_origin(&self, y: i64) -> BlockPos {
        BlockPos::new((self.x as i64) << 4, y, (self.z as i64) << 4)
    }

    /// The region file this chunk is stored in.
    pub const fn region(&self) -> RegionPos {
        RegionPos {
            x: self.x.div_euclid(REGION_SIZE),
            z: self.z.div_euclid(REGION_SIZE),
        }
    }

    pub const fn offset(&self, dx: i32, dz: i32) -> ChunkPos {
        ChunkPos::new(self.x + dx, self.z + dz)
    }
}

/// Region position: a 16x16 group of chunks sharing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

/// Block position local to a chunk (x, z in 0..16, absolute y).
///
/// Serialized as `"x,y,z"`; this is the key of a block inside a chunk's
/// metadata map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalBlockPos {
    pub x: u8,
    pub y: i64,
    pub z: u8,
}

impl LocalBlockPos {
    pub const fn new(x: u8, y: i64, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Absolute position of this block inside `chunk`.
    pub const fn in_chunk(&self, chunk: ChunkPos) -> BlockPos {
        let origin = chunk.block_origin(self.y);
        BlockPos::new(origin.x + self.x as i64, self.y, origin.z + self.z as i64)
    }
}

// ── World-qualified keys ────────────────────────────────────────────────────

/// A block in a specific world.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub world: WorldId,
    pub pos: BlockPos,
}

impl BlockKey {
    pub fn new(world: WorldId, pos: BlockPos) -> Self {
        Self { world, pos }
    }

    pub fn chunk(&self) -> ChunkKey {
        ChunkKey::new(self.world.clone(), self.pos.chunk())
    }

    pub fn local(&self) -> LocalBlockPos {
        self.pos.local()
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{},{}", self.world, self.pos.x, self.pos.y, self.pos.z)
    }
}

/// A chunk in a specific world. The canonical key of every per-chunk map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub world: WorldId,
    pub pos: ChunkPos,
}

impl ChunkKey {
    pub fn new(world: WorldId, pos: ChunkPos) -> Self {
        Self { world, pos }
    }

    pub fn region(&self) -> RegionKey {
        RegionKey::new(self.world.clone(), self.pos.region())
    }

    pub fn offset(&self, dx: i32, dz: i32) -> ChunkKey {
        ChunkKey::new(self.world.clone(), self.pos.offset(dx, dz))
    }

    /// The 3x3 square of chunks centred on this one, this chunk included.
    pub fn neighborhood(&self) -> [ChunkKey; 9] {
        std::array::from_fn(|i| self.offset(i as i32 / 3 - 1, i as i32 % 3 - 1))
    }

    /// A block of this chunk addressed by its local position.
    pub fn block(&self, local: LocalBlockPos) -> BlockKey {
        BlockKey::new(self.world.clone(), local.in_chunk(self.pos))
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.world, self.pos)
    }
}

/// A region in a specific world. One region file exists per key and
/// metadata kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub world: WorldId,
    pub pos: RegionPos,
}

impl RegionKey {
    pub fn new(world: WorldId, pos: RegionPos) -> Self {
        Self { world, pos }
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:r.{}.{}", self.world, self.pos.x, self.pos.z)
    }
}

// ── Text form ───────────────────────────────────────────────────────────────

/// Failure to parse a `"x,z"` or `"x,y,z"` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed position key {0:?}")]
pub struct ParsePosError(String);

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

impl FromStr for ChunkPos {
    type Err = ParsePosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePosError(s.to_string());
        let (x, z) = s.split_once(',').ok_or_else(err)?;
        Ok(ChunkPos::new(
            x.trim().parse().map_err(|_| err())?,
            z.trim().parse().map_err(|_| err())?,
        ))
    }
}

impl fmt::Display for LocalBlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl FromStr for LocalBlockPos {
    type Err = ParsePosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePosError(s.to_string());
        let mut parts = s.split(',').map(str::trim);
        let (Some(x), Some(y), Some(z), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let x: u8 = x.parse().map_err(|_| err())?;
        let z: u8 = z.parse().map_err(|_| err())?;
        if x > 15 || z > 15 {
            return Err(err());
        }
        Ok(LocalBlockPos::new(x, y.parse().map_err(|_| err())?, z))
    }
}

impl Serialize for ChunkPos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkPos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Serialize for LocalBlockPos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalBlockPos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_blocks_map_to_negative_chunks() {
        let pos = BlockPos::new(-1, 70, -17);
        assert_eq!(pos.chunk(), ChunkPos::new(-1, -2));
        assert_eq!(pos.local(), LocalBlockPos::new(15, 70, 15));
        assert_eq!(pos.local().in_chunk(pos.chunk()), pos);
    }

    #[test]
    fn regions_group_sixteen_chunks_per_axis() {
        assert_eq!(ChunkPos::new(0, 15).region(), RegionPos { x: 0, z: 0 });
        assert_eq!(ChunkPos::new(16, -1).region(), RegionPos { x: 1, z: -1 });
        assert_eq!(ChunkPos::new(-16, -17).region(), RegionPos { x: -1, z: -2 });
    }

    #[test]
    fn neighborhood_is_centred_and_complete() {
        let center = ChunkKey::new(WorldId::new("world"), ChunkPos::new(4, -3));
        let hood = center.neighborhood();
        assert!(hood.contains(&center));
        for dx in -1..=1 {
            for dz in -1..=1 {
                assert!(hood.contains(&center.offset(dx, dz)));
            }
        }
    }

    #[test]
    fn keys_parse_their_display_form() {
        let local = LocalBlockPos::new(3, -60, 12);
        assert_eq!(local.to_string(), "3,-60,12");
        assert_eq!("3,-60,12".parse::<LocalBlockPos>().unwrap(), local);
        assert_eq!("-4,7".parse::<ChunkPos>().unwrap(), ChunkPos::new(-4, 7));

        assert!("16,0,0".parse::<LocalBlockPos>().is_err());
        assert!("1,2".parse::<LocalBlockPos>().is_err());
        assert!("1,2,3".parse::<ChunkPos>().is_err());
    }
}
