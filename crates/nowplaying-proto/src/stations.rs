//! Station allow-list.
//!
//! The HTTP API and the CLI only ever resolve symbolic station ids through
//! this table, so nobody can point the fetcher at an arbitrary URL.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::config::StationsConfig;
use crate::protocol::StationInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub url: String,
}

const BUILTIN: &[(&str, &str, &str)] = &[
    (
        "CLASS95",
        "Class 95",
        "https://playerservices.streamtheworld.com/api/livestream-redirect/CLASS95.mp3",
    ),
    (
        "GOLD905",
        "Gold 905",
        "https://playerservices.streamtheworld.com/api/livestream-redirect/GOLD905.mp3",
    ),
    (
        "YES933",
        "YES 933",
        "https://playerservices.streamtheworld.com/api/livestream-redirect/YES933.mp3",
    ),
    (
        "987FM",
        "987FM",
        "https://playerservices.streamtheworld.com/api/livestream-redirect/987FM.mp3",
    ),
    (
        "883JIA",
        "883JIA",
        "https://playerservices.streamtheworld.com/api/livestream-redirect/883JIA.mp3",
    ),
];

#[derive(Debug, Clone)]
pub struct StationTable {
    stations: Vec<Station>,
}

impl StationTable {
    pub fn builtin() -> Self {
        let stations = BUILTIN
            .iter()
            .map(|(id, name, url)| Station {
                id: id.to_string(),
                name: name.to_string(),
                url: url.to_string(),
            })
            .collect();
        Self { stations }
    }

    /// Build a table, normalising ids and rejecting anything the fetcher
    /// would refuse anyway.
    pub fn new(stations: Vec<Station>) -> anyhow::Result<Self> {
        let mut normalized: Vec<Station> = Vec::with_capacity(stations.len());
        for mut station in stations {
            station.id = normalize_id(&station.id);
            if station.id.is_empty() {
                bail!("station {:?} has an empty id", station.name);
            }
            if normalized.iter().any(|s| s.id == station.id) {
                bail!("duplicate station id {}", station.id);
            }
            let url = reqwest::Url::parse(&station.url)
                .with_context(|| format!("station {} has an invalid url", station.id))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("station {} must use http or https, got {}", station.id, url.scheme());
            }
            normalized.push(station);
        }
        Ok(Self {
            stations: normalized,
        })
    }

    /// Use `stations.toml` when it exists, otherwise the built-in list.
    pub fn load(config: &StationsConfig) -> anyhow::Result<Self> {
        let path = &config.stations_toml;
        if path.exists() {
            let stations = load_stations_from_toml(path)?;
            let table = Self::new(stations)?;
            info!("Loaded {} stations from {:?}", table.len(), path);
            return Ok(table);
        }
        debug!("No station file at {:?}, using built-in stations", path);
        Ok(Self::builtin())
    }

    /// Case-insensitive id lookup.
    pub fn lookup(&self, id: &str) -> Option<&Station> {
        let id = normalize_id(id);
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn infos(&self) -> Vec<StationInfo> {
        self.stations
            .iter()
            .map(|s| StationInfo {
                id: s.id.clone(),
                name: s.name.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

// ── TOML station loader ───────────────────────────────────────────────────────

/// Matches the TOML `[[station]]` table.  `name` falls back to the id.
#[derive(Debug, Deserialize)]
struct TomlStationFile {
    station: Vec<TomlStation>,
}

#[derive(Debug, Deserialize)]
struct TomlStation {
    id: String,
    #[serde(default)]
    name: String,
    url: String,
}

pub fn load_stations_from_toml(path: &Path) -> anyhow::Result<Vec<Station>> {
    let content = std::fs::read_to_string(path)?;
    parse_stations_from_toml_str(&content)
}

pub fn parse_stations_from_toml_str(content: &str) -> anyhow::Result<Vec<Station>> {
    let file: TomlStationFile = toml::from_str(content)?;
    let stations = file
        .station
        .into_iter()
        .map(|s| Station {
            name: if s.name.is_empty() { s.id.clone() } else { s.name },
            id: s.id,
            url: s.url,
        })
        .collect();
    Ok(stations)
}
