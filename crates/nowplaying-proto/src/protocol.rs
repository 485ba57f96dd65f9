use serde::{Deserialize, Serialize};

/// Body of a `200` answer from `/api/nowplaying`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: String,
}

/// Body of a `4xx` answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn unsupported_station() -> Self {
        Self {
            error: "Unsupported station".to_string(),
        }
    }
}

/// Entry of `/api/stations`.  Stream URLs stay server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub id: String,
    pub name: String,
}
