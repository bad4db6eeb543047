//! Action Space
//!
//! Continuous three-component action sent back to the game client:
//! planar move x, planar move z, and an auxiliary scalar signal.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};

/// Dimension of the continuous action space
pub const ACTION_DIM: usize = 3;

/// Policy output for a single agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BridgeAction {
    /// Planar move along x, in [-1, 1]
    pub move_x: f32,
    /// Planar move along z, in [-1, 1]
    pub move_z: f32,
    /// Auxiliary signal, in [-1, 1]
    pub aux: f32,
}

impl Default for BridgeAction {
    fn default() -> Self {
        Self::zero()
    }
}

impl BridgeAction {
    pub fn new(move_x: f32, move_z: f32, aux: f32) -> Self {
        Self {
            move_x,
            move_z,
            aux,
        }
    }

    /// All-zero action, used for invalid requests
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Uniform random planar move with a zero auxiliary component.
    ///
    /// Returned while no policy is available for the requesting role.
    pub fn random_fallback() -> Self {
        let mut rng = rand::thread_rng();
        Self::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0), 0.0)
    }

    /// Build from a policy sample; missing components are zero
    pub fn from_slice(values: &[f32]) -> Self {
        let at = |i: usize| values.get(i).copied().unwrap_or(0.0);
        Self::new(at(0), at(1), at(2))
    }

    /// Parse a reported action.
    ///
    /// At least the two planar components are required; the auxiliary
    /// component defaults to zero and extra components are ignored.
    pub fn from_reported(values: &[f32]) -> Result<Self> {
        if values.len() < 2 {
            return Err(TrainerError::Protocol(format!(
                "action needs at least 2 components, got {}",
                values.len()
            )));
        }
        Ok(Self::from_slice(values))
    }

    pub fn to_array(self) -> [f32; ACTION_DIM] {
        [self.move_x, self.move_z, self.aux]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_range() {
        for _ in 0..200 {
            let a = BridgeAction::random_fallback();
            assert!((-1.0..=1.0).contains(&a.move_x));
            assert!((-1.0..=1.0).contains(&a.move_z));
            assert_eq!(a.aux, 0.0);
        }
    }

    #[test]
    fn test_reported_action_padding() {
        let a = BridgeAction::from_reported(&[0.5, -0.5]).unwrap();
        assert_eq!(a.to_array(), [0.5, -0.5, 0.0]);

        let a = BridgeAction::from_reported(&[0.1, 0.2, 0.3, 0.9]).unwrap();
        assert_eq!(a.to_array(), [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_reported_action_too_short() {
        assert!(matches!(
            BridgeAction::from_reported(&[0.5]),
            Err(TrainerError::Protocol(_))
        ));
    }
}
