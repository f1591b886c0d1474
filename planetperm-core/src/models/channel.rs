use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{ChannelId, PlanetId};

/// Kinds of permission targets inside a planet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    PlanetChat,
    PlanetCategory,
    PlanetVoice,
}

impl ChannelType {
    pub const ALL: [Self; 3] = [Self::PlanetChat, Self::PlanetCategory, Self::PlanetVoice];

    /// Slot of this type in per-type arrays
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::PlanetChat => 0,
            Self::PlanetCategory => 1,
            Self::PlanetVoice => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlanetChat => "chat",
            Self::PlanetCategory => "category",
            Self::PlanetVoice => "voice",
        }
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" | "planet_chat" => Ok(Self::PlanetChat),
            "category" | "planet_category" => Ok(Self::PlanetCategory),
            "voice" | "planet_voice" => Ok(Self::PlanetVoice),
            _ => Err(format!("Unknown channel type: {s}")),
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat channel, category or voice channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub planet_id: PlanetId,
    pub name: String,
    pub channel_type: ChannelType,
    pub parent_id: Option<ChannelId>,
    /// Resolve permissions against the parent instead of this channel
    pub inherits_perms: bool,
    /// The planet's landing channel; visible to every member
    pub is_default: bool,
    /// Ordering within the planet's channel list
    pub position: u32,
}

impl Channel {
    /// Whether a change from `self` to `updated` affects permission inheritance
    #[must_use]
    pub fn inheritance_differs(&self, updated: &Self) -> bool {
        self.parent_id != updated.parent_id || self.inherits_perms != updated.inherits_perms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_type_index_is_dense() {
        let indices: Vec<usize> = ChannelType::ALL.iter().map(|t| t.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_channel_type_parse() {
        assert_eq!("voice".parse::<ChannelType>().unwrap(), ChannelType::PlanetVoice);
        assert_eq!("PLANET_CHAT".parse::<ChannelType>().unwrap(), ChannelType::PlanetChat);
        assert!("thread".parse::<ChannelType>().is_err());
    }
}
