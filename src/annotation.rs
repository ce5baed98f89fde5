//! Annotation model and JSON persistence.
//!
//! Annotations live in level-0 pixel coordinates, independent of the view.
//! A document on disk looks like:
//!
//! ```json
//! {
//!   "annotations": [
//!     {
//!       "id": "6f1c2d9e-4b7a-4e0c-9a51-3d8f2b7c1e05",
//!       "name": "Tumor region",
//!       "type": "Polygon",
//!       "coordinates": [[100.0, 100.0], [400.0, 100.0], [250.0, 300.0]],
//!       "color": [0, 255, 0],
//!       "group": "default",
//!       "visible": true,
//!       "properties": {}
//!     }
//!   ]
//! }
//! ```
//!
//! Missing `id` fields get a fresh identifier on load; `color`, `group`,
//! `visible` and `properties` fall back to their defaults.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::AnnotationError;
use crate::geometry::Rect;

/// Group annotations are placed in when none is given.
pub const DEFAULT_GROUP: &str = "default";

/// Default outline colour (green).
pub const DEFAULT_COLOR: [u8; 3] = [0, 255, 0];

// =============================================================================
// Model
// =============================================================================

/// Shape of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    Polygon,
    Point,
    Rectangle,
    Spline,
}

/// One annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default = "new_annotation_id")]
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: AnnotationKind,

    /// Vertices in level-0 pixels
    pub coordinates: Vec<[f64; 2]>,

    #[serde(default = "default_color")]
    pub color: [u8; 3],

    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default = "default_visible")]
    pub visible: bool,

    /// Selection state; never persisted
    #[serde(skip)]
    pub selected: bool,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn default_color() -> [u8; 3] {
    DEFAULT_COLOR
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn default_visible() -> bool {
    true
}

/// Fresh random (v4) UUID string.
pub fn new_annotation_id() -> String {
    Uuid::new_v4().to_string()
}

impl Annotation {
    /// New visible annotation in the default group.
    pub fn new(name: impl Into<String>, kind: AnnotationKind, coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            id: new_annotation_id(),
            name: name.into(),
            kind,
            coordinates,
            color: DEFAULT_COLOR,
            group: default_group(),
            visible: true,
            selected: false,
            properties: Map::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    /// Bounding box of the vertices; empty at the origin when there are none.
    pub fn bounds(&self) -> Rect {
        let Some(first) = self.coordinates.first() else {
            return Rect::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first[0], first[1], first[0], first[1]);
        for &[x, y] in &self.coordinates[1..] {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Rect::from_edges(min_x, min_y, max_x, max_y)
    }

    /// Point-in-polygon test (ray casting).
    ///
    /// Only polygons with at least three vertices contain anything.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        if self.kind != AnnotationKind::Polygon || self.coordinates.len() < 3 {
            return false;
        }

        let n = self.coordinates.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = self.coordinates[i];
            let [xj, yj] = self.coordinates[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Polygon area (shoelace formula); 0 for anything else.
    pub fn area(&self) -> f64 {
        if self.kind != AnnotationKind::Polygon || self.coordinates.len() < 3 {
            return 0.0;
        }
        let n = self.coordinates.len();
        let twice: f64 = (0..n)
            .map(|i| {
                let [x0, y0] = self.coordinates[i];
                let [x1, y1] = self.coordinates[(i + 1) % n];
                x0 * y1 - x1 * y0
            })
            .sum();
        twice.abs() / 2.0
    }
}

// =============================================================================
// Collection
// =============================================================================

#[derive(Serialize, Deserialize)]
struct AnnotationDocument {
    annotations: Vec<Annotation>,
}

/// Ordered collection of annotations with a single selection.
#[derive(Debug, Clone, Default)]
pub struct AnnotationList {
    annotations: Vec<Annotation>,
    selected: Option<String>,
}

impl AnnotationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Remove by id. Clears the selection if it pointed at the removed item.
    pub fn remove(&mut self, id: &str) -> Option<Annotation> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
        Some(self.annotations.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    /// Select one annotation (or none). Returns `false` for an unknown id,
    /// leaving the selection cleared.
    pub fn select(&mut self, id: Option<&str>) -> bool {
        for annotation in &mut self.annotations {
            annotation.selected = false;
        }
        self.selected = None;

        let Some(id) = id else {
            return true;
        };
        match self.get_mut(id) {
            Some(annotation) => {
                annotation.selected = true;
                self.selected = Some(id.to_string());
                true
            }
            None => false,
        }
    }

    pub fn selected(&self) -> Option<&Annotation> {
        self.selected.as_deref().and_then(|id| self.get(id))
    }

    /// Members of a group, in insertion order.
    pub fn group(&self, name: &str) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| a.group == name).collect()
    }

    /// Every group name, always including the default group.
    pub fn group_names(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.annotations.iter().map(|a| a.group.as_str()).collect();
        names.insert(DEFAULT_GROUP);
        names
    }

    /// Visible annotations containing a level-0 point.
    pub fn at_point(&self, x: f64, y: f64) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| a.visible && a.contains_point(x, y))
            .collect()
    }

    /// Visible annotations whose bounding box touches `rect` (edges count).
    pub fn in_rect(&self, rect: &Rect) -> Vec<&Annotation> {
        self.annotations
            .iter()
            .filter(|a| {
                let b = a.bounds();
                a.visible
                    && b.right() >= rect.left()
                    && b.left() <= rect.right()
                    && b.bottom() >= rect.top()
                    && b.top() <= rect.bottom()
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.selected = None;
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    /// Serialize as a pretty-printed `{"annotations": [...]}` document.
    pub fn to_json(&self) -> Result<String, AnnotationError> {
        let document = AnnotationDocument {
            annotations: self.annotations.clone(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Parse a document. Nothing is kept from the current list.
    pub fn from_json(json: &str) -> Result<Self, AnnotationError> {
        let document: AnnotationDocument = serde_json::from_str(json)?;
        Ok(Self {
            annotations: document.annotations,
            selected: None,
        })
    }

    pub fn save_to_json(&self, path: impl AsRef<Path>) -> Result<(), AnnotationError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| AnnotationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!("Saved {} annotations to {}", self.len(), path.display());
        Ok(())
    }

    /// Replace the contents with a document from disk. On error the list is
    /// left unchanged.
    pub fn load_from_json(&mut self, path: impl AsRef<Path>) -> Result<(), AnnotationError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| AnnotationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        *self = Self::from_json(&json)?;
        info!("Loaded {} annotations from {}", self.len(), path.display());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
