use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A positioning capability that clients reference independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// Standalone satellite positioning
    Gps,
    /// Network (cell / wifi) positioning
    Nps,
    /// Assisted GPS
    Agps,
    Geofence,
}

impl ResourceClass {
    /// Number of resource classes.
    pub const COUNT: usize = 4;

    /// Every resource class, in index order.
    pub const ALL: [ResourceClass; Self::COUNT] = [
        ResourceClass::Gps,
        ResourceClass::Nps,
        ResourceClass::Agps,
        ResourceClass::Geofence,
    ];

    /// Position of this class in per-class arrays.
    pub fn index(self) -> usize {
        match self {
            ResourceClass::Gps => 0,
            ResourceClass::Nps => 1,
            ResourceClass::Agps => 2,
            ResourceClass::Geofence => 3,
        }
    }

    /// Raw method number used on the wire.
    pub fn method(self) -> i32 {
        self.index() as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceClass::Gps => "gps",
            ResourceClass::Nps => "nps",
            ResourceClass::Agps => "agps",
            ResourceClass::Geofence => "geofence",
        }
    }
}

impl TryFrom<i32> for ResourceClass {
    type Error = ProtocolError;

    fn try_from(method: i32) -> Result<Self, Self::Error> {
        usize::try_from(method)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(ProtocolError::InvalidResource(method))
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ResourceClass {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|r| r.name() == lower)
            .ok_or_else(|| ProtocolError::Parameter(format!("unknown resource class '{}'", s)))
    }
}
