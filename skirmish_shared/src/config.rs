//! Configuration system.
//!
//! Loads game configuration from JSON strings/files. A single `GameConfig`
//! value is passed explicitly to the server and each session.

use std::{fmt, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Tilemap description for the room's level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilemapConfig {
    pub key: String,
    /// Map data file, relative to `maps_dir`.
    pub data: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub image: String,
    pub src: String,
    pub layers: Vec<String>,
}

impl Default for TilemapConfig {
    fn default() -> Self {
        Self {
            key: "level1".to_string(),
            data: "level1.json".to_string(),
            kind: "tiled".to_string(),
            image: "tiles.png".to_string(),
            src: "tiles".to_string(),
            layers: vec!["ground".to_string()],
        }
    }
}

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Playable area, in world units.
    pub game_width: u32,
    pub game_height: u32,
    #[serde(default = "default_player_size")]
    pub player_width: u32,
    #[serde(default = "default_player_size")]
    pub player_height: u32,
    #[serde(default = "default_room_id")]
    pub room_id: String,
    /// Path to maps directory.
    #[serde(default = "default_maps_dir")]
    pub maps_dir: String,
    #[serde(default)]
    pub map: TilemapConfig,
}

fn default_player_size() -> u32 {
    32
}

fn default_room_id() -> String {
    "lobby".to_string()
}

fn default_maps_dir() -> String {
    "maps".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 30,
            canvas_width: 800,
            canvas_height: 600,
            game_width: 1600,
            game_height: 1200,
            player_width: default_player_size(),
            player_height: default_player_size(),
            room_id: default_room_id(),
            maps_dir: default_maps_dir(),
            map: TilemapConfig::default(),
        }
    }
}

impl GameConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Checks the values a running server depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.game_width < self.player_width || self.game_height < self.player_height {
            return Err(ConfigError::AreaSmallerThanPlayer {
                area: (self.game_width, self.game_height),
                player: (self.player_width, self.player_height),
            });
        }
        if self.map.layers.is_empty() {
            return Err(ConfigError::NoMapLayers);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroTickRate,
    AreaSmallerThanPlayer { area: (u32, u32), player: (u32, u32) },
    NoMapLayers,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTickRate => write!(f, "tick_hz must be greater than zero"),
            ConfigError::AreaSmallerThanPlayer { area, player } => write!(
                f,
                "game area {}x{} is smaller than the player footprint {}x{}",
                area.0, area.1, player.0, player.1
            ),
            ConfigError::NoMapLayers => write!(f, "map has no layers"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn parse_fills_optional_fields() {
        let cfg = GameConfig::from_json_str(
            r#"{
                "server_addr": "0.0.0.0:9000",
                "tick_hz": 20,
                "canvas_width": 640,
                "canvas_height": 480,
                "game_width": 2000,
                "game_height": 1000,
                "map": {"key": "m1", "data": "d.json", "type": "tmx",
                        "image": "i.png", "src": "s", "layers": ["bg"]}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.tick_hz, 20);
        assert_eq!(cfg.player_width, 32);
        assert_eq!(cfg.room_id, "lobby");
        assert_eq!(cfg.maps_dir, "maps");
        assert_eq!(cfg.map.kind, "tmx");
    }

    #[test]
    fn rejects_area_smaller_than_player() {
        let cfg = GameConfig {
            game_width: 16,
            ..GameConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::AreaSmallerThanPlayer { .. })
        ));
    }
}
