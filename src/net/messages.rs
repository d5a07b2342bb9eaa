// Wire message definitions
// DTOs for the push event stream and the REST endpoints, plus their
// conversion into validated records

use serde::Deserialize;

use crate::constants::STRESS_DISEASE_LABEL;
use crate::record::{Category, FieldPolygon, Payload, Record, Severity, SourceTier, ValidationError};

/// Events delivered on the push channel, one JSON object per line.
/// Unknown event types fail deserialization and are dropped by the reader.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// A single new detection or manual alert.
    NewDetection {
        #[serde(flatten)]
        detection: DetectionDto,
    },
    /// Full-refresh batch of vegetation-stress alerts.
    StressUpdate {
        alerts: Vec<StressAlertDto>,
    },
}

/// One row of the detections feed (REST map data or a push event).
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionDto {
    pub id: i64,
    pub disease: String,
    pub severity: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub confidence: f64,
    /// "drone" unless the feed says otherwise.
    #[serde(default)]
    pub source: Option<String>,
    /// Only present for manual alerts.
    #[serde(default)]
    pub message: Option<String>,
    /// Unix seconds; most feeds omit it and the engine stamps ingestion time.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl DetectionDto {
    /// Normalize into a validated record. `now` supplies the timestamp when
    /// the feed omitted one.
    pub fn into_record(self, tier: SourceTier, now: f64) -> Result<Record, ValidationError> {
        let category = match self.source.as_deref() {
            None => Category::Drone,
            Some(label) => Category::parse(label)?,
        };
        let severity = Severity::parse(&self.severity)?;

        // Manual alerts live in their own id space; prefix so they cannot
        // collide with detection ids.
        let id = match category {
            Category::Manual => format!("manual-{}", self.id),
            _ => self.id.to_string(),
        };

        let payload = match category {
            Category::Manual => Payload::Manual {
                message: self.message.unwrap_or_default(),
            },
            _ => Payload::Drone {
                confidence: self.confidence,
            },
        };

        let record = Record {
            id,
            category,
            lat: self.lat,
            lon: self.lon,
            severity,
            disease: self.disease,
            timestamp: self.timestamp.unwrap_or(now),
            tier,
            payload,
        };
        record.validate()?;
        Ok(record)
    }
}

/// One row of the stress-alerts feed. Always a full snapshot of the active
/// alerts; never a delta.
#[derive(Debug, Clone, Deserialize)]
pub struct StressAlertDto {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub severity: String,
    #[serde(default)]
    pub baseline_ndvi: f64,
    #[serde(default)]
    pub current_ndvi: f64,
    #[serde(default)]
    pub drop: f64,
}

impl StressAlertDto {
    /// Normalize into a validated stress record. Id is synthesized as
    /// "stress-{id}" to avoid colliding with detection ids; the disease label
    /// is the fixed stress placeholder.
    pub fn into_record(self, tier: SourceTier, now: f64) -> Result<Record, ValidationError> {
        let record = Record {
            id: format!("stress-{}", self.id),
            category: Category::Stress,
            lat: self.lat,
            lon: self.lon,
            severity: Severity::parse(&self.severity)?,
            disease: STRESS_DISEASE_LABEL.to_string(),
            timestamp: now,
            tier,
            payload: Payload::Stress {
                current_index: self.current_ndvi,
                baseline_index: self.baseline_ndvi,
                drop: self.drop,
            },
        };
        record.validate()?;
        Ok(record)
    }
}

/// One row of the fields endpoint. The polygon arrives either as a native
/// array of vertex pairs or as that array JSON-encoded into a string.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDto {
    pub id: i64,
    #[serde(default)]
    pub polygon: Option<serde_json::Value>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub farmer_id: Option<i64>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub field_photo_url: Option<String>,
}

impl FieldDto {
    /// Decode into a renderable polygon. `Ok(None)` means the field has no
    /// boundary registered (skipped silently); `Err` means the boundary was
    /// present but malformed (skipped with a report).
    pub fn into_polygon(self) -> Result<Option<FieldPolygon>, ValidationError> {
        let value = match self.polygon {
            Some(v) => v,
            None => return Ok(None),
        };
        let vertices = FieldPolygon::decode_vertices(&value)?;
        Ok(Some(FieldPolygon {
            id: self.id,
            vertices,
            village: self.village,
            crop: self.crop,
            phone: self.phone,
            farmer_id: self.farmer_id,
            photo_url: self.photo_url,
            field_photo_url: self.field_photo_url,
        }))
    }
}

/// On-demand vegetation index sample for a point query.
#[derive(Debug, Clone, Deserialize)]
pub struct VegetationIndexDto {
    pub ndvi: f64,
    #[serde(default)]
    pub status: String,
    /// Acquisition date of the imagery the value came from.
    #[serde(default)]
    pub date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_new_detection() {
        let json = r#"{
            "type": "new_detection",
            "id": 41,
            "disease": "Leaf Rust",
            "severity": "High",
            "lat": 28.6,
            "lon": 77.2,
            "confidence": 0.91
        }"#;

        let event: PushEvent = serde_json::from_str(json).unwrap();
        match event {
            PushEvent::NewDetection { detection } => {
                assert_eq!(detection.id, 41);
                assert_eq!(detection.disease, "Leaf Rust");
                assert_eq!(detection.confidence, 0.91);
            }
            _ => panic!("Expected NewDetection"),
        }
    }

    #[test]
    fn test_deserialize_stress_update() {
        let json = r#"{
            "type": "stress_update",
            "alerts": [
                {"id": 7, "lat": 20.1, "lon": 78.0, "severity": "Moderate",
                 "baseline_ndvi": 0.61, "current_ndvi": 0.44, "drop": 0.17},
                {"id": 8, "lat": 20.2, "lon": 78.1, "severity": "Critical",
                 "baseline_ndvi": 0.66, "current_ndvi": 0.21, "drop": 0.45}
            ]
        }"#;

        let event: PushEvent = serde_json::from_str(json).unwrap();
        match event {
            PushEvent::StressUpdate { alerts } => {
                assert_eq!(alerts.len(), 2);
                assert_eq!(alerts[1].drop, 0.45);
            }
            _ => panic!("Expected StressUpdate"),
        }
    }

    #[test]
    fn test_unknown_event_type_fails() {
        let json = r#"{"type": "new_alert", "id": 1}"#;
        assert!(serde_json::from_str::<PushEvent>(json).is_err());
    }

    #[test]
    fn test_detection_into_record() {
        let dto = DetectionDto {
            id: 41,
            disease: "Leaf Rust".to_string(),
            severity: "Medium".to_string(),
            lat: 28.6,
            lon: 77.2,
            confidence: 0.91,
            source: None,
            message: None,
            timestamp: None,
        };
        let record = dto.into_record(SourceTier::Push, 1234.0).unwrap();
        assert_eq!(record.id, "41");
        assert_eq!(record.category, Category::Drone);
        assert_eq!(record.severity, Severity::Moderate);
        assert_eq!(record.timestamp, 1234.0);
        assert_eq!(record.payload, Payload::Drone { confidence: 0.91 });
    }

    #[test]
    fn test_manual_alert_id_prefixed() {
        let dto = DetectionDto {
            id: 5,
            disease: "Blight".to_string(),
            severity: "Low".to_string(),
            lat: 20.0,
            lon: 78.0,
            confidence: 0.0,
            source: Some("manual".to_string()),
            message: Some("seen near the canal".to_string()),
            timestamp: Some(99.0),
        };
        let record = dto.into_record(SourceTier::Poll, 1234.0).unwrap();
        assert_eq!(record.id, "manual-5");
        assert_eq!(record.category, Category::Manual);
        assert_eq!(record.timestamp, 99.0);
        assert_eq!(
            record.payload,
            Payload::Manual {
                message: "seen near the canal".to_string()
            }
        );
    }

    #[test]
    fn test_detection_with_bad_coordinates_rejected() {
        let dto = DetectionDto {
            id: 9,
            disease: "Blight".to_string(),
            severity: "High".to_string(),
            lat: 95.0,
            lon: 77.2,
            confidence: 0.5,
            source: None,
            message: None,
            timestamp: None,
        };
        assert!(dto.into_record(SourceTier::Push, 0.0).is_err());
    }

    #[test]
    fn test_stress_into_record() {
        let dto = StressAlertDto {
            id: 7,
            lat: 20.1,
            lon: 78.0,
            severity: "Moderate".to_string(),
            baseline_ndvi: 0.61,
            current_ndvi: 0.44,
            drop: 0.17,
        };
        let record = dto.into_record(SourceTier::Push, 555.0).unwrap();
        assert_eq!(record.id, "stress-7");
        assert_eq!(record.disease, STRESS_DISEASE_LABEL);
        assert_eq!(record.timestamp, 555.0);
        match record.payload {
            Payload::Stress { current_index, baseline_index, drop } => {
                assert_eq!(current_index, 0.44);
                assert_eq!(baseline_index, 0.61);
                assert_eq!(drop, 0.17);
            }
            _ => panic!("Expected Stress payload"),
        }
    }

    #[test]
    fn test_field_polygon_forms() {
        let native: FieldDto = serde_json::from_str(
            r#"{"id": 1, "polygon": [[28.6, 77.2], [28.7, 77.3]], "village": "Rampur"}"#,
        )
        .unwrap();
        let poly = native.into_polygon().unwrap().unwrap();
        assert_eq!(poly.vertices.len(), 2);
        assert_eq!(poly.village.as_deref(), Some("Rampur"));

        let encoded: FieldDto =
            serde_json::from_str(r#"{"id": 2, "polygon": "[[28.6, 77.2], [28.7, 77.3]]"}"#)
                .unwrap();
        assert_eq!(encoded.into_polygon().unwrap().unwrap().vertices.len(), 2);

        let missing: FieldDto = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert!(missing.into_polygon().unwrap().is_none());

        let malformed: FieldDto =
            serde_json::from_str(r#"{"id": 4, "polygon": "{broken"}"#).unwrap();
        assert!(malformed.into_polygon().is_err());
    }
}
