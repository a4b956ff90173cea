//! Data models for the skyline layout.
//!
//! This module defines the items that flow through the layout driver:
//! - `Tile`: an item to be laid out, with its ideal and optional min/max sizes
//! - `PlacedTile`: a tile with the rectangle the packer assigned to it
//!
//! Both implement the traits from the `types` module.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::layout::{Proposal, SizeThatFits};
use crate::types::{Dimensional, Rect, Size};

/// Validation error for tile data.
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidDimension(String),
    InvalidConfiguration(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidDimension(msg) => write!(f, "Invalid dimension: {}", msg),
            ValidationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Helper function to validate a pair of dimensions.
fn validate_dims(dims: (f64, f64), label: &str) -> Result<(), ValidationError> {
    crate::types::validation::validate_dimensions_2d(dims)
        .map_err(|msg| ValidationError::InvalidDimension(format!("{}: {}", label, msg)))
}

/// Validates the container width shared by a layout pass.
pub fn validate_container_width(width: f64) -> Result<(), ValidationError> {
    crate::types::validation::validate_dimension(width, "Container width")
        .map_err(ValidationError::InvalidConfiguration)
}

/// A rectangular item to be laid out.
///
/// # Fields
/// * `id` - Identification number of the tile
/// * `dims` - Ideal size (width, height)
/// * `min_dims` - Size the tile reports for a zero proposal, if it can shrink
/// * `max_dims` - Size the tile reports for an unbounded proposal, if it can grow
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Tile {
    pub id: usize,
    #[schema(value_type = [f64; 2], example = json!([40.0, 20.0]))]
    pub dims: (f64, f64),
    #[serde(default)]
    #[schema(value_type = Option<[f64; 2]>, nullable = true)]
    pub min_dims: Option<(f64, f64)>,
    #[serde(default)]
    #[schema(value_type = Option<[f64; 2]>, nullable = true)]
    pub max_dims: Option<(f64, f64)>,
}

impl Tile {
    /// Creates a new tile with validation.
    ///
    /// # Examples
    /// ```
    /// use skyline_layout::model::Tile;
    ///
    /// assert!(Tile::new(1, (40.0, 20.0)).is_ok());
    /// assert!(Tile::new(1, (-40.0, 20.0)).is_err());
    /// ```
    pub fn new(id: usize, dims: (f64, f64)) -> Result<Self, ValidationError> {
        validate_dims(dims, "Tile size")?;
        Ok(Self {
            id,
            dims,
            min_dims: None,
            max_dims: None,
        })
    }

    /// Adds a minimum size after validating it.
    pub fn with_min(mut self, dims: (f64, f64)) -> Result<Self, ValidationError> {
        validate_dims(dims, "Minimum size")?;
        self.min_dims = Some(dims);
        Ok(self)
    }

    /// Adds a maximum size after validating it.
    pub fn with_max(mut self, dims: (f64, f64)) -> Result<Self, ValidationError> {
        validate_dims(dims, "Maximum size")?;
        self.max_dims = Some(dims);
        Ok(self)
    }

    /// Re-validates a tile that arrived through deserialization.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let mut tile = Tile::new(self.id, self.dims)?;
        if let Some(min) = self.min_dims {
            tile = tile.with_min(min)?;
        }
        if let Some(max) = self.max_dims {
            tile = tile.with_max(max)?;
        }
        Ok(tile)
    }

    /// Converts the ideal dimensions to a Size.
    #[inline]
    pub fn ideal_size(&self) -> Size {
        Size::from_tuple(self.dims)
    }
}

impl Dimensional for Tile {
    fn dimensions(&self) -> Size {
        self.ideal_size()
    }
}

impl SizeThatFits for Tile {
    fn size_that_fits(&self, proposal: Proposal) -> Size {
        match proposal {
            Proposal::Unspecified => self.ideal_size(),
            Proposal::Zero => Size::from_tuple(self.min_dims.unwrap_or(self.dims)),
            Proposal::Infinite => Size::from_tuple(self.max_dims.unwrap_or(self.dims)),
            Proposal::Width(width) => Size::new(self.dims.0.min(width), self.dims.1),
        }
    }
}

/// A tile together with the rectangle it was placed in.
#[derive(Clone, Debug)]
pub struct PlacedTile {
    pub tile: Tile,
    pub rect: Rect,
}

impl PlacedTile {
    pub fn new(tile: Tile, rect: Rect) -> Self {
        Self { tile, rect }
    }

    /// Position (x, y) of the upper left corner.
    pub fn position(&self) -> (f64, f64) {
        (self.rect.x, self.rect.y)
    }

    /// Lower edge of the placed tile.
    pub fn bottom(&self) -> f64 {
        self.rect.max_y()
    }
}

impl Dimensional for PlacedTile {
    fn dimensions(&self) -> Size {
        self.rect.size()
    }
}
