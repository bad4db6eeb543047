//! Role Routing
//!
//! Each observation carries a role flag at a fixed position of the
//! observation schema. The game client writes `1.0` there for the seeker
//! ("it") and `0.0` for the hider.
//!
//! A hider feature that happens to reach 0.5 at this index would be routed
//! to the seeker policy. The client schema reserves the slot, so nothing
//! here guards against that.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of the role flag inside the observation vector
pub const ROLE_FLAG_INDEX: usize = 8;

/// Flag values at or above this threshold route to the seeker
pub const ROLE_FLAG_THRESHOLD: f32 = 0.5;

/// One of the two adversarial participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seeker,
    Hider,
}

impl Role {
    /// Both roles in a fixed order
    pub const ALL: [Role; 2] = [Role::Seeker, Role::Hider];

    /// Stable lowercase name used in file names and metrics columns
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Hider => "hider",
        }
    }

    /// Index into per-role arrays
    pub fn index(self) -> usize {
        match self {
            Role::Seeker => 0,
            Role::Hider => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an observation into a role.
///
/// Observations too short to carry the flag route to the hider.
pub fn route_role(obs: &[f32]) -> Role {
    match obs.get(ROLE_FLAG_INDEX) {
        Some(flag) if *flag >= ROLE_FLAG_THRESHOLD => Role::Seeker,
        _ => Role::Hider,
    }
}

/// Fixed-size pair of values, one per role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerRole<T> {
    pub seeker: T,
    pub hider: T,
}

impl<T> PerRole<T> {
    pub fn new(seeker: T, hider: T) -> Self {
        Self { seeker, hider }
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Seeker => &self.seeker,
            Role::Hider => &self.hider,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Seeker => &mut self.seeker,
            Role::Hider => &mut self.hider,
        }
    }

    /// Iterate `(role, value)` pairs in `Role::ALL` order
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        [(Role::Seeker, &self.seeker), (Role::Hider, &self.hider)].into_iter()
    }
}
