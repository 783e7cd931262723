// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared payload types referenced by records.
//!
//! Images, meshes, text blobs, filters, path effects and color sources are
//! produced elsewhere (an imaging pipeline, a text shaper) and are opaque to
//! the display list beyond the few properties the recorder needs to compute
//! summary metadata. Records
//! hold them through [`Arc`] so one resource can back many records and many
//! recordings.

use alloc::sync::Arc;
use alloc::vec::Vec;

use kurbo::{BezPath, Point, Rect, Vec2};

use crate::paint::{BlendMode, Color, Sampling, VertexMode};
use crate::recording::Recording;

/// An opaque decoded image.
///
/// `thread_safe` is `false` for images backed by a thread-affine external
/// object (e.g. a texture that belongs to one GPU context); recordings that
/// reference such an image report
/// [`is_ui_thread_safe`](Recording::is_ui_thread_safe) as `false`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Image {
    /// Caller-assigned identity.
    pub id: u64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether the image may be used from any thread.
    pub thread_safe: bool,
}

impl Image {
    /// Creates a thread-safe image description.
    #[must_use]
    pub const fn new(id: u64, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            thread_safe: true,
        }
    }

    /// Creates an image description bound to the thread that created it.
    #[must_use]
    pub const fn thread_affine(id: u64, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            thread_safe: false,
        }
    }

    /// The image's pixel bounds, anchored at the origin.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// An opaque shaped run of glyphs.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlob {
    /// Caller-assigned identity.
    pub id: u64,
    /// Conservative bounds of all glyphs relative to the draw origin.
    pub bounds: Rect,
}

impl TextBlob {
    /// Creates a text blob description.
    #[must_use]
    pub const fn new(id: u64, bounds: Rect) -> Self {
        Self { id, bounds }
    }
}

/// A per-pixel color transform applied after shading.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorFilter {
    /// Blends a constant color over every pixel.
    Blend {
        /// Constant source color.
        color: Color,
        /// How the constant is blended with the pixel.
        mode: BlendMode,
    },
    /// A 4×5 row-major color matrix on non-premultiplied RGBA.
    Matrix([f32; 20]),
    /// Converts sRGB-encoded values to linear.
    SrgbToLinear,
    /// Converts linear values to sRGB encoding.
    LinearToSrgb,
}

impl ColorFilter {
    /// Whether applying the filter to a transparent-black pixel can produce a
    /// visible one.
    #[must_use]
    pub fn modifies_transparent_black(&self) -> bool {
        match self {
            Self::Blend { color, mode } => {
                !color.is_transparent() && !mode.nops_on_transparent_dst()
            }
            Self::Matrix(m) => m[4] != 0.0 || m[9] != 0.0 || m[14] != 0.0 || m[19] != 0.0,
            Self::SrgbToLinear | Self::LinearToSrgb => false,
        }
    }

    /// Whether filtering then scaling alpha equals scaling alpha then
    /// filtering.
    #[must_use]
    pub fn can_commute_with_opacity(&self) -> bool {
        match self {
            Self::Blend { .. } => false,
            Self::Matrix(m) => {
                let alpha_row_is_identity =
                    m[15] == 0.0 && m[16] == 0.0 && m[17] == 0.0 && m[18] == 1.0 && m[19] == 0.0;
                let no_offsets = m[4] == 0.0 && m[9] == 0.0 && m[14] == 0.0;
                let no_alpha_input = m[3] == 0.0 && m[8] == 0.0 && m[13] == 0.0;
                alpha_row_is_identity && no_offsets && no_alpha_input
            }
            Self::SrgbToLinear | Self::LinearToSrgb => true,
        }
    }
}

/// A filter applied to the rendered result of an operation or layer.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageFilter {
    /// Gaussian blur.
    Blur {
        /// Horizontal standard deviation.
        sigma_x: f64,
        /// Vertical standard deviation.
        sigma_y: f64,
    },
    /// Morphological dilation.
    Dilate {
        /// Horizontal radius.
        radius_x: f64,
        /// Vertical radius.
        radius_y: f64,
    },
    /// Morphological erosion.
    Erode {
        /// Horizontal radius.
        radius_x: f64,
        /// Vertical radius.
        radius_y: f64,
    },
    /// Translates the result.
    Offset(Vec2),
    /// Applies a color filter to the result.
    Color(Arc<ColorFilter>),
}

impl ImageFilter {
    /// Maps input bounds to the bounds of the filtered output.
    ///
    /// Returns `None` when the output is unbounded, i.e. it can touch pixels
    /// outside any finite input rectangle.
    #[must_use]
    pub fn map_bounds(&self, input: Rect) -> Option<Rect> {
        match self {
            Self::Blur { sigma_x, sigma_y } => {
                Some(input.inflate(sigma_x.abs() * 3.0, sigma_y.abs() * 3.0))
            }
            Self::Dilate { radius_x, radius_y } => {
                Some(input.inflate(radius_x.abs(), radius_y.abs()))
            }
            Self::Erode { .. } => Some(input),
            Self::Offset(delta) => Some(input + *delta),
            Self::Color(filter) => (!filter.modifies_transparent_black()).then_some(input),
        }
    }

    /// Whether the filter can turn transparent-black input visible.
    #[must_use]
    pub fn modifies_transparent_black(&self) -> bool {
        match self {
            Self::Color(filter) => filter.modifies_transparent_black(),
            _ => false,
        }
    }
}

/// Reshapes geometry before it is stroked or filled.
#[derive(Clone, Debug, PartialEq)]
pub enum PathEffect {
    /// Dashes the outline with alternating on and off lengths.
    Dash {
        /// On and off lengths, starting with on.
        intervals: Vec<f64>,
        /// Offset into the interval pattern.
        phase: f64,
    },
}

impl PathEffect {
    /// Maps geometry bounds to the bounds of the reshaped geometry.
    ///
    /// Returns `None` when the effect can reach outside any finite input.
    #[must_use]
    pub fn map_bounds(&self, input: Rect) -> Option<Rect> {
        match self {
            // Dashes are pieces of the input outline.
            Self::Dash { .. } => Some(input),
        }
    }
}

/// A triangle mesh with optional per-vertex colors and texture coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Vertices {
    /// How `positions` (or `indices`) form triangles.
    pub mode: VertexMode,
    /// Vertex positions.
    pub positions: Vec<Point>,
    /// Texture coordinates, one per position.
    pub texture_coords: Option<Vec<Point>>,
    /// Colors, one per position.
    pub colors: Option<Vec<Color>>,
    /// Indices into `positions`; when absent, positions are used in order.
    pub indices: Option<Vec<u16>>,
}

impl Vertices {
    /// Creates an untextured, uncolored, unindexed mesh.
    #[must_use]
    pub fn new(mode: VertexMode, positions: Vec<Point>) -> Self {
        Self {
            mode,
            positions,
            texture_coords: None,
            colors: None,
            indices: None,
        }
    }

    /// Bounds of every position, or `None` for an empty mesh.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        self.positions
            .iter()
            .map(|p| Rect::from_points(*p, *p))
            .reduce(|acc, r| acc.union(r))
    }
}

/// A shader that supplies per-pixel source colors instead of a flat color.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorSource {
    /// Samples an image.
    Image {
        /// The sampled image.
        image: Arc<Image>,
        /// Sampling quality.
        sampling: Sampling,
    },
    /// A two-point linear gradient.
    LinearGradient {
        /// Gradient start.
        start: Point,
        /// Gradient end.
        end: Point,
        /// Stop colors.
        colors: Vec<Color>,
        /// Stop positions in `0..=1`.
        stops: Vec<f32>,
    },
    /// A radial gradient.
    RadialGradient {
        /// Gradient center.
        center: Point,
        /// Gradient radius.
        radius: f64,
        /// Stop colors.
        colors: Vec<Color>,
        /// Stop positions in `0..=1`.
        stops: Vec<f32>,
    },
    /// A caller-compiled shader program.
    RuntimeEffect {
        /// Caller-assigned identity of the compiled program.
        effect_id: u64,
        /// Packed uniform values.
        uniforms: Vec<f32>,
        /// Child sources the program samples.
        samplers: Vec<Arc<ColorSource>>,
    },
}

impl ColorSource {
    /// Whether every color this source can produce is fully transparent.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        match self {
            Self::Image { .. } | Self::RuntimeEffect { .. } => false,
            Self::LinearGradient { colors, .. } | Self::RadialGradient { colors, .. } => {
                colors.iter().all(|c| c.is_transparent())
            }
        }
    }

    /// Whether the source may be sampled from any thread.
    #[must_use]
    pub fn is_ui_thread_safe(&self) -> bool {
        match self {
            Self::Image { image, .. } => image.thread_safe,
            Self::RuntimeEffect { samplers, .. } => {
                samplers.iter().all(|s| s.is_ui_thread_safe())
            }
            Self::LinearGradient { .. } | Self::RadialGradient { .. } => true,
        }
    }
}

/// An owned shared payload in a store's resource table.
///
/// Records reference resources by slot index; the store releases a slot
/// when the record that owns it is disposed.
#[derive(Debug)]
pub(crate) enum Resource {
    Path(Arc<BezPath>),
    Image(Arc<Image>),
    TextBlob(Arc<TextBlob>),
    ColorFilter(Arc<ColorFilter>),
    ImageFilter(Arc<ImageFilter>),
    ColorSource(Arc<ColorSource>),
    PathEffect(Arc<PathEffect>),
    Vertices(Arc<Vertices>),
    Recording(Arc<Recording>),
}

impl Resource {
    /// Whether both slots hold equal content of the same kind.
    pub(crate) fn same_content(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Image(a), Self::Image(b)) => a == b,
            (Self::TextBlob(a), Self::TextBlob(b)) => a == b,
            (Self::ColorFilter(a), Self::ColorFilter(b)) => a == b,
            (Self::ImageFilter(a), Self::ImageFilter(b)) => a == b,
            (Self::ColorSource(a), Self::ColorSource(b)) => a == b,
            (Self::PathEffect(a), Self::PathEffect(b)) => a == b,
            (Self::Vertices(a), Self::Vertices(b)) => a == b,
            (Self::Recording(a), Self::Recording(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Image(_) => "image",
            Self::TextBlob(_) => "text blob",
            Self::ColorFilter(_) => "color filter",
            Self::ImageFilter(_) => "image filter",
            Self::ColorSource(_) => "color source",
            Self::PathEffect(_) => "path effect",
            Self::Vertices(_) => "vertices",
            Self::Recording(_) => "recording",
        }
    }
}
