// Record model - unified detection/alert shape shared by every ingestion path
//
// Push events, REST snapshots, and stress scans all normalize into `Record`
// before they reach the store. Validation happens here, at the boundary, so
// downstream components can assume every stored record is well-formed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coords;

/// Why a record or polygon was rejected at the ingestion boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("coordinate out of range: lat={lat} lon={lon}")]
    CoordinateOutOfRange { lat: f64, lon: f64 },

    #[error("unknown severity label: {0:?}")]
    UnknownSeverity(String),

    #[error("unknown source category: {0:?}")]
    UnknownCategory(String),

    #[error("malformed field polygon: {0}")]
    BadPolygon(String),
}

/// Source category of a record. The set is extensible; these three are what
/// the monitoring system produces today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Drone imagery disease detection.
    Drone,
    /// Manually raised alert (admin / field staff).
    Manual,
    /// Vegetation-index stress scan result. Full-refresh category: each
    /// update replaces the whole subset, never merges.
    Stress,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Drone => "drone",
            Category::Manual => "manual",
            Category::Stress => "stress",
        }
    }

    /// Parse a source label as delivered by the detections feed.
    pub fn parse(label: &str) -> Result<Self, ValidationError> {
        match label.to_ascii_lowercase().as_str() {
            "drone" => Ok(Category::Drone),
            "manual" => Ok(Category::Manual),
            "stress" => Ok(Category::Stress),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

/// Canonical severity scale, ordered.
///
/// Source data is inconsistent about the second level: drone/manual sources
/// say "Medium", the stress classifier says "Moderate". Both normalize to
/// `Moderate` here; the display name is "Moderate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse accepting the "Medium" synonym.
    pub fn parse(label: &str) -> Result<Self, ValidationError> {
        match label.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" | "moderate" => Ok(Severity::Moderate),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ValidationError::UnknownSeverity(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

/// Relative authority of an ingestion path. Push outranks poll when the same
/// id arrives from both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Push,
    Poll,
}

/// Category-specific payload carried alongside the common fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Drone {
        /// Model confidence of the detection, 0..1.
        confidence: f64,
    },
    Manual {
        /// Free-text note from whoever raised the alert.
        message: String,
    },
    Stress {
        /// Latest vegetation index at the location.
        current_index: f64,
        /// Rolling baseline the drop was measured against.
        baseline_index: f64,
        /// baseline - current; what the severity was classified from.
        drop: f64,
    },
}

/// A single detection or alert, unified across categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within the store. Synthesized as "{category}-{source id}" for
    /// categories without their own id space (stress, manual).
    pub id: String,
    pub category: Category,
    pub lat: f64,
    pub lon: f64,
    pub severity: Severity,
    pub disease: String,
    /// Observation time, Unix seconds. Stamped at ingestion when the source
    /// omits it.
    pub timestamp: f64,
    pub tier: SourceTier,
    pub payload: Payload,
}

impl Record {
    /// Boundary validation: finite in-range coordinates, non-empty identity.
    /// Invalid records are rejected, never stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.disease.is_empty() {
            return Err(ValidationError::MissingField("disease"));
        }
        if !coords::in_range(self.lat, true) || !coords::in_range(self.lon, false) {
            return Err(ValidationError::CoordinateOutOfRange {
                lat: self.lat,
                lon: self.lon,
            });
        }
        Ok(())
    }
}

/// A field boundary with its registration metadata. Consumed read-only from
/// the fields endpoint; never merged into the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolygon {
    pub id: i64,
    /// Ordered [lat, lon] vertex pairs.
    pub vertices: Vec<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farmer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_photo_url: Option<String>,
}

impl FieldPolygon {
    /// Decode the vertex list from whichever shape the API delivered: a
    /// native JSON array of pairs, or that same array JSON-encoded into a
    /// string. A failure here skips the one field, not the batch.
    pub fn decode_vertices(value: &serde_json::Value) -> Result<Vec<[f64; 2]>, ValidationError> {
        let decoded;
        let array = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::String(s) => {
                decoded = serde_json::from_str::<serde_json::Value>(s)
                    .map_err(|e| ValidationError::BadPolygon(e.to_string()))?;
                &decoded
            }
            other => {
                return Err(ValidationError::BadPolygon(format!(
                    "expected array or encoded string, got {}",
                    other
                )))
            }
        };

        let pairs = array
            .as_array()
            .ok_or_else(|| ValidationError::BadPolygon("not an array".to_string()))?;

        let mut vertices = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let point = pair
                .as_array()
                .filter(|p| p.len() >= 2)
                .ok_or_else(|| ValidationError::BadPolygon("vertex is not a pair".to_string()))?;
            let lat = point[0]
                .as_f64()
                .ok_or_else(|| ValidationError::BadPolygon("non-numeric vertex".to_string()))?;
            let lon = point[1]
                .as_f64()
                .ok_or_else(|| ValidationError::BadPolygon("non-numeric vertex".to_string()))?;
            vertices.push([lat, lon]);
        }

        if vertices.is_empty() {
            return Err(ValidationError::BadPolygon("empty vertex list".to_string()));
        }

        Ok(vertices)
    }
}
