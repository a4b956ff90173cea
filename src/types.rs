//! Common types and traits for 2D layout geometry.
//!
//! This module defines the small value types shared by the skyline packer,
//! the layout driver and the HTTP surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for width bookkeeping on the skyline (coverage, remainders, fits).
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Smallest depth used when dividing by the distance to the reference height.
///
/// Keeps pit ratios finite for segments that already sit at the reference.
pub const EPSILON_DEPTH: f64 = 1e-3;

/// Width and height of an item, in layout units.
///
/// # Examples
/// ```
/// use skyline_layout::types::Size;
///
/// let size = Size::new(40.0, 20.0);
/// assert_eq!(size.area(), 800.0);
/// assert!(size.is_valid_dimension());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Creates a new size.
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// The empty size.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Converts to tuple format for API compatibility.
    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Creates from tuple format.
    #[inline]
    pub const fn from_tuple(tuple: (f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1)
    }

    /// Calculates the area (width × height).
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Checks if both components are positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    /// Rounds both components up to whole units.
    #[inline]
    pub fn ceil(&self) -> Self {
        Self::new(self.width.ceil(), self.height.ceil())
    }
}

/// Axis-aligned rectangle assigned to one inserted item.
///
/// `y` grows downwards from the container's top edge, like a newspaper
/// column: the skyline is the lower boundary of everything placed so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Creates a new rectangle.
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The zero-size sentinel returned for degenerate items.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Returns `true` for the zero-size sentinel (or any empty rectangle).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Right edge (`x + width`).
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    /// Lower edge (`y + height`).
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Returns the size of the rectangle.
    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Checks if two rectangles intersect.
    ///
    /// Separating axis test: touching edges do not count as an intersection.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !(self.max_x() <= other.x
            || other.max_x() <= self.x
            || self.max_y() <= other.y
            || other.max_y() <= self.y)
    }
}

/// Trait for objects with 2D dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Size;

    /// Calculates the area.
    fn area(&self) -> f64 {
        self.dimensions().area()
    }
}

/// Validation functions shared by the model and the API layer.
pub mod validation {

    /// Validates a single dimension.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        Ok(())
    }

    /// Validates both dimensions of a 2D object.
    ///
    /// # Parameters
    /// * `dims` - The dimensions to validate (width, height)
    pub fn validate_dimensions_2d(dims: (f64, f64)) -> Result<(), String> {
        validate_dimension(dims.0, "Width")?;
        validate_dimension(dims.1, "Height")?;
        Ok(())
    }
}
