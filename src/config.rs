use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Location;

/// Server-side game policy loaded from game.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Minimum roster size accepted by start_game. The game is playable from
    /// one player upward; raise this for meaningful spy rounds.
    #[serde(rename = "minPlayers", default = "default_min_players")]
    pub min_players: usize,
    #[serde(rename = "defaultGameLengthMinutes", default = "default_game_length")]
    pub default_game_length_minutes: u64,
}

fn default_min_players() -> usize {
    1
}

fn default_game_length() -> u64 {
    5
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: default_min_players(),
            default_game_length_minutes: default_game_length(),
        }
    }
}

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

/// Initialize config directory with defaults if missing.
pub fn init() {
    let base = config_path("");
    if !base.exists() {
        fs::create_dir_all(&base).expect("Failed to create config directory");
    }

    let game_path = config_path("game.json");
    if !game_path.exists() {
        let default_config = serde_json::json!({
            "minPlayers": 1,
            "defaultGameLengthMinutes": 5
        });
        fs::write(&game_path, serde_json::to_string_pretty(&default_config).unwrap())
            .expect("Failed to write default game.json");
    }

    let locations_path = config_path("locations.json");
    if !locations_path.exists() {
        fs::write(
            &locations_path,
            serde_json::to_string_pretty(&default_locations()).unwrap(),
        )
        .expect("Failed to write default locations.json");
    }
}

/// Load the game configuration.
pub fn load_game_config() -> GameConfig {
    let path = config_path("game.json");
    let data = fs::read_to_string(&path).expect("Failed to read game.json");
    serde_json::from_str(&data).expect("Failed to parse game.json")
}

/// Load the location catalog. Falls back to the built-in catalog when the
/// file is missing or unreadable so the server always has something to deal.
pub fn load_locations() -> Vec<Location> {
    let path = config_path("locations.json");
    let data = match fs::read_to_string(&path) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("Failed to read locations.json: {}", e);
            return default_locations();
        }
    };

    match serde_json::from_str::<Vec<Location>>(&data) {
        Ok(locations) if !locations.is_empty() => locations,
        Ok(_) => {
            tracing::error!("locations.json is empty, using built-in catalog");
            default_locations()
        }
        Err(e) => {
            tracing::error!("Failed to parse locations.json: {}", e);
            default_locations()
        }
    }
}

fn location(name: &str, roles: &[&str]) -> Location {
    Location {
        name: name.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

/// The built-in location catalog.
pub fn default_locations() -> Vec<Location> {
    vec![
        location(
            "Airplane",
            &["Pilot", "Flight Attendant", "Air Marshal", "Mechanic", "Tourist", "Businessperson"],
        ),
        location(
            "Bank",
            &["Teller", "Manager", "Security Guard", "Robber", "Consultant", "Customer"],
        ),
        location(
            "Beach",
            &["Lifeguard", "Surfer", "Ice Cream Vendor", "Photographer", "Beachgoer", "Kite Surfer"],
        ),
        location(
            "Casino",
            &["Dealer", "Bouncer", "Gambler", "Bartender", "Manager", "Card Counter"],
        ),
        location(
            "Hospital",
            &["Doctor", "Nurse", "Surgeon", "Anesthesiologist", "Patient", "Intern"],
        ),
        location(
            "Hotel",
            &["Receptionist", "Bellhop", "Housekeeper", "Chef", "Guest", "Manager"],
        ),
        location(
            "Movie Studio",
            &["Director", "Actor", "Camera Operator", "Stunt Double", "Makeup Artist", "Producer"],
        ),
        location(
            "Pirate Ship",
            &["Captain", "First Mate", "Cook", "Cannoneer", "Prisoner", "Deckhand"],
        ),
        location(
            "Police Station",
            &["Detective", "Patrol Officer", "Dispatcher", "Lawyer", "Journalist", "Suspect"],
        ),
        location(
            "Restaurant",
            &["Chef", "Waiter", "Sommelier", "Food Critic", "Dishwasher", "Customer"],
        ),
        location(
            "School",
            &["Teacher", "Principal", "Janitor", "Student", "Coach", "Lunch Lady"],
        ),
        location(
            "Space Station",
            &["Commander", "Scientist", "Engineer", "Doctor", "Space Tourist", "Alien"],
        ),
        location(
            "Submarine",
            &["Captain", "Sonar Technician", "Navigator", "Cook", "Radio Operator", "Sailor"],
        ),
        location(
            "Supermarket",
            &["Cashier", "Butcher", "Stocker", "Janitor", "Customer", "Food Sampler"],
        ),
        location(
            "Theater",
            &["Actor", "Usher", "Director", "Prompter", "Stagehand", "Audience Member"],
        ),
    ]
}
