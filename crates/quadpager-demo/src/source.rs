//! Synthetic tile source with seeded latency and failures.

use std::thread;
use std::time::Duration;

use quadpager_config::DemoConfig;
use quadpager_sampler::{FetchFailure, TileData, TileSource};
use quadpager_tile::TileId;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Bytes generated per tile frame.
const PAYLOAD_BYTES: usize = 64;

/// Levels at or above this are served from the local queue.
const LOCAL_LEVELS: u32 = 2;

/// Serves pseudo-random bytes for every tile in `min_zoom..=max_zoom`.
///
/// Each (tile, frame) pair gets its own generator, so the same request always
/// sees the same latency, outcome and payload regardless of thread timing.
pub(crate) struct SyntheticSource {
    seed: u64,
    max_latency_ms: u64,
    failure_rate: f64,
    min_zoom: u32,
    max_zoom: u32,
    tile_size: u32,
}

impl SyntheticSource {
    pub(crate) fn new(demo: &DemoConfig, min_zoom: u32, max_zoom: u32, tile_size: u32) -> Self {
        Self {
            seed: demo.seed,
            max_latency_ms: demo.max_latency_ms,
            failure_rate: demo.failure_rate.clamp(0.0, 1.0),
            min_zoom,
            max_zoom,
            tile_size,
        }
    }

    fn rng_for(&self, tile: &TileId, frame: usize) -> Xoshiro256StarStar {
        let key = (u64::from(tile.level) << 58) ^ (u64::from(tile.x) << 29) ^ u64::from(tile.y);
        let frame = (frame as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Xoshiro256StarStar::seed_from_u64(self.seed ^ key ^ frame)
    }
}

impl TileSource for SyntheticSource {
    fn min_zoom(&self) -> u32 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u32 {
        self.max_zoom
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn valid_tile(&self, tile: &TileId) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&tile.level)
    }

    fn tile_is_local(&self, tile: &TileId) -> bool {
        tile.level <= LOCAL_LEVELS
    }

    fn fetch(&self, tile: &TileId, frame: usize) -> Result<TileData, FetchFailure> {
        let mut rng = self.rng_for(tile, frame);
        if self.max_latency_ms > 0 && !self.tile_is_local(tile) {
            thread::sleep(Duration::from_millis(rng.gen_range(0..=self.max_latency_ms)));
        }
        if rng.gen_bool(self.failure_rate) {
            return Err(FetchFailure::Source(format!("synthetic failure for {tile}")));
        }
        let mut payload = vec![0u8; PAYLOAD_BYTES];
        rng.fill(&mut payload[..]);
        Ok(payload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(failure_rate: f64) -> SyntheticSource {
        let demo = DemoConfig {
            max_latency_ms: 0,
            failure_rate,
            ..Default::default()
        };
        SyntheticSource::new(&demo, 0, 10, 256)
    }

    #[test]
    fn test_fetch_is_deterministic() {
        let source = source(0.0);
        let tile = TileId::new(5, 3, 7);
        let a = source.fetch(&tile, 0).unwrap();
        let b = source.fetch(&tile, 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), PAYLOAD_BYTES);
        assert_ne!(a, source.fetch(&tile, 1).unwrap());
    }

    #[test]
    fn test_failure_rate_one_always_fails() {
        let source = source(1.0);
        assert!(matches!(
            source.fetch(&TileId::new(1, 0, 0), 0),
            Err(FetchFailure::Source(_))
        ));
    }

    #[test]
    fn test_valid_and_local_tiles() {
        let source = source(0.0);
        assert!(source.valid_tile(&TileId::new(10, 0, 0)));
        assert!(!source.valid_tile(&TileId::new(11, 0, 0)));
        assert!(source.tile_is_local(&TileId::ROOT));
        assert!(!source.tile_is_local(&TileId::new(3, 0, 0)));
    }
}
