//! Tunable formulas: how likely a damaged block is to count as healthy, and
//! how explosion damage falls off with distance.

/// Probability that a block at a given relative durability is "healthy":
/// drops its items when mined and survives its territory being lost.
pub trait HealthPolicy: Send + Sync {
    fn healthy_probability(&self, relative_durability: f64) -> f64;
}

/// `exp(-steepness * (1 - d))`: certain at full durability, unlikely near
/// zero.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialHealth {
    pub steepness: f64,
}

impl Default for ExponentialHealth {
    fn default() -> Self {
        Self { steepness: 3.0 }
    }
}

impl HealthPolicy for ExponentialHealth {
    fn healthy_probability(&self, relative_durability: f64) -> f64 {
        (-self.steepness * (1.0 - relative_durability)).exp()
    }
}

/// Absolute durability an explosion of `power` takes from a block
/// `distance` blocks away from its centre.
pub trait DamagePolicy: Send + Sync {
    fn damage(&self, power: i64, distance: f64) -> i64;
}

/// `floor(power * exp(-(distance - 1)))`: full power one block away, more
/// inside the block, decaying exponentially beyond.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialFalloff;

impl DamagePolicy for ExponentialFalloff {
    fn damage(&self, power: i64, distance: f64) -> i64 {
        (power as f64 * (-(distance - 1.0)).exp()).floor() as i64
    }
}
