// Map layer composition - derives renderable layer state from the record
// collection plus user view options
//
// Purely derivational: no network, no timers. The one piece of retained state
// is the last-applied focus point, used to keep the fly-to directive one-shot.

use serde::Serialize;

use crate::aggregate::{self, Filters};
use crate::constants::{
    DEFAULT_CENTER, DEFAULT_ZOOM, FOCUS_ZOOM, HEAT_WEIGHT_BASE, HEAT_WEIGHT_MODERATE,
    HEAT_WEIGHT_SEVERE,
};
use crate::record::{FieldPolygon, Record, Severity};

/// Process-wide view state. Initialized to defaults, mutated only through the
/// engine's toggle/filter/locate operations, read on every derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    pub show_heatmap: bool,
    pub show_satellite: bool,
    pub show_vegetation_overlay: bool,
    pub severity_filter: Option<Severity>,
    pub disease_filter: Option<String>,
    pub focus_point: Option<(f64, f64)>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        ViewOptions {
            show_heatmap: false,
            show_satellite: false,
            // The vegetation overlay starts on; everything else starts off.
            show_vegetation_overlay: true,
            severity_filter: None,
            disease_filter: None,
            focus_point: None,
        }
    }
}

impl ViewOptions {
    pub fn filters(&self) -> Filters {
        Filters {
            severity: self.severity_filter,
            disease: self.disease_filter.clone(),
        }
    }
}

/// Marker icon tier, keyed off severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerIcon {
    Red,
    Orange,
    Green,
}

impl MarkerIcon {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::High | Severity::Critical => MarkerIcon::Red,
            Severity::Moderate => MarkerIcon::Orange,
            Severity::Low => MarkerIcon::Green,
        }
    }
}

/// Heat intensity heuristic, not a measured quantity.
pub fn heat_weight(severity: Severity) -> f64 {
    match severity {
        Severity::High | Severity::Critical => HEAT_WEIGHT_SEVERE,
        Severity::Moderate => HEAT_WEIGHT_MODERATE,
        Severity::Low => HEAT_WEIGHT_BASE,
    }
}

/// One map marker with the popup data the rendering surface shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub icon: MarkerIcon,
    pub disease: String,
    pub severity: Severity,
}

/// "Move the map here" instruction, emitted once per distinct focus point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlyTo {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

/// Everything the rendering surface needs for one frame of the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerState {
    /// Initial viewport for a fresh map instance.
    pub center: (f64, f64),
    pub zoom: u8,
    pub show_satellite: bool,
    pub show_vegetation_overlay: bool,
    pub markers: Vec<Marker>,
    /// [lat, lon, weight] triples; empty unless the heatmap toggle is on.
    pub heat_points: Vec<[f64; 3]>,
    pub polygons: Vec<FieldPolygon>,
    /// One-shot; absent when the focus point has already been applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fly_to: Option<FlyTo>,
}

/// Derives layer state from `(snapshot, view options, field polygons)`.
pub struct MapLayerComposer {
    /// Focus point most recently emitted as a fly-to directive. Re-deriving
    /// with the same unchanged focus point must not re-trigger movement.
    last_focus: Option<(f64, f64)>,
}

impl MapLayerComposer {
    pub fn new() -> Self {
        MapLayerComposer { last_focus: None }
    }

    pub fn compose(
        &mut self,
        snapshot: &[Record],
        view: &ViewOptions,
        fields: &[FieldPolygon],
    ) -> LayerState {
        let filters = view.filters();
        let filtered = aggregate::filter_records(snapshot, &filters);

        let markers = filtered
            .iter()
            .map(|r| Marker {
                id: r.id.clone(),
                lat: r.lat,
                lon: r.lon,
                icon: MarkerIcon::for_severity(r.severity),
                disease: r.disease.clone(),
                severity: r.severity,
            })
            .collect();

        let heat_points = if view.show_heatmap {
            filtered
                .iter()
                .map(|r| [r.lat, r.lon, heat_weight(r.severity)])
                .collect()
        } else {
            Vec::new()
        };

        let fly_to = self.take_focus_directive(view);

        LayerState {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            show_satellite: view.show_satellite,
            show_vegetation_overlay: view.show_vegetation_overlay,
            markers,
            heat_points,
            polygons: fields.to_vec(),
            fly_to,
        }
    }

    /// Emit the fly-to directive when the focus point changed since the last
    /// derivation, and record it as applied.
    pub fn take_focus_directive(&mut self, view: &ViewOptions) -> Option<FlyTo> {
        if view.focus_point == self.last_focus {
            return None;
        }
        self.last_focus = view.focus_point;
        view.focus_point.map(|(lat, lon)| FlyTo {
            lat,
            lon,
            zoom: FOCUS_ZOOM,
        })
    }
}

impl Default for MapLayerComposer {
    fn default() -> Self {
        Self::new()
    }
}
