//! Layout-Logik rund um den Skyline-Packer.
//!
//! Dieses Modul übernimmt alles, was der Packer selbst nicht wissen soll:
//! - Größenauflösung: jedes Objekt wird mit mehreren Vorschlägen befragt,
//!   die kleinste brauchbare Antwort wird auf ganze Einheiten aufgerundet
//! - Begrenzung der Breite auf einen Anteil der Containerbreite
//! - Aggregation der Inhaltsgröße und Diagnose nach dem Durchlauf
//! - Fortschritts-Ereignisse für Live-Visualisierung

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{PlacedTile, Tile};
use crate::skyline::{Segment, SkylineConfig, SkylineError, SkylinePacker};
use crate::types::{Dimensional, Size};

/// Konfiguration für einen Layout-Durchlauf.
#[derive(Copy, Clone, Debug)]
pub struct LayoutConfig {
    /// Parameter des Skyline-Packers
    pub skyline: SkylineConfig,
    /// Maximaler Anteil der Containerbreite, den ein einzelnes Objekt belegen darf
    pub max_width_ratio: f64,
}

impl LayoutConfig {
    pub const DEFAULT_MAX_WIDTH_RATIO: f64 = 1.0;
    pub const MIN_WIDTH_RATIO: f64 = 0.01;

    /// Erstellt einen Builder für benutzerdefinierte Konfiguration.
    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder::default()
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            skyline: SkylineConfig::default(),
            max_width_ratio: Self::DEFAULT_MAX_WIDTH_RATIO,
        }
    }
}

/// Builder-Pattern für LayoutConfig.
#[derive(Clone, Debug, Default)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl LayoutConfigBuilder {
    /// Setzt die komplette Packer-Konfiguration.
    pub fn skyline(mut self, skyline: SkylineConfig) -> Self {
        self.config.skyline = skyline;
        self
    }

    /// Setzt den maximalen Breitenanteil pro Objekt.
    pub fn max_width_ratio(mut self, ratio: f64) -> Self {
        self.config.max_width_ratio = ratio;
        self
    }

    /// Erstellt die finale Konfiguration.
    pub fn build(self) -> LayoutConfig {
        self.config
    }
}

/// Größenvorschlag, mit dem ein Objekt befragt wird.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Proposal {
    /// Ideale Größe ohne Einschränkung
    Unspecified,
    /// So klein wie möglich
    Zero,
    /// So groß wie gewünscht
    Infinite,
    /// Breite begrenzt, Höhe frei
    Width(f64),
}

/// Objekte, die auf einen Größenvorschlag antworten können.
pub trait SizeThatFits {
    fn size_that_fits(&self, proposal: Proposal) -> Size;
}

/// Löst für jedes Objekt genau eine konkrete Größe auf.
#[derive(Clone, Copy, Debug)]
pub struct SizeResolver {
    max_width_ratio: f64,
}

impl SizeResolver {
    /// Erstellt einen Resolver; der Anteil wird auf `[0.01, 1.0]` begrenzt.
    pub fn new(max_width_ratio: f64) -> Self {
        let ratio = if max_width_ratio.is_nan() {
            LayoutConfig::DEFAULT_MAX_WIDTH_RATIO
        } else {
            max_width_ratio.clamp(LayoutConfig::MIN_WIDTH_RATIO, 1.0)
        };
        Self {
            max_width_ratio: ratio,
        }
    }

    pub fn max_width_ratio(&self) -> f64 {
        self.max_width_ratio
    }

    /// Befragt das Objekt mit allen Vorschlägen und wählt die kleinste Fläche.
    ///
    /// # Parameter
    /// * `item` - Das zu befragende Objekt
    /// * `container_width` - Breite des Containers
    ///
    /// # Rückgabewert
    /// `Some(size)` aufgerundet auf ganze Einheiten, `None` wenn keine Antwort brauchbar ist
    pub fn resolve(&self, item: &impl SizeThatFits, container_width: f64) -> Option<Size> {
        let cap = container_width * self.max_width_ratio;
        [
            Proposal::Unspecified,
            Proposal::Zero,
            Proposal::Infinite,
            Proposal::Width(cap),
        ]
        .into_iter()
        .map(|proposal| item.size_that_fits(proposal))
        .filter(Size::is_valid_dimension)
        .map(|size| Size::new(size.width.min(cap), size.height))
        .min_by(|a, b| a.area().total_cmp(&b.area()))
        .map(|size| size.ceil())
    }
}

/// Objekt, das nicht platziert werden konnte.
#[derive(Clone, Debug)]
pub struct UnplacedTile {
    pub tile: Tile,
    pub reason: UnplacedReason,
}

/// Gründe, warum ein Objekt nicht platziert werden konnte.
#[derive(Clone, Debug, PartialEq)]
pub enum UnplacedReason {
    NoUsableSize,
    WiderThanContainer,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::NoUsableSize => "no_usable_size",
            UnplacedReason::WiderThanContainer => "wider_than_container",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::NoUsableSize => {
                write!(f, "Objekt liefert für keinen Vorschlag eine positive Größe")
            }
            UnplacedReason::WiderThanContainer => {
                write!(f, "Objekt ist breiter als der Container")
            }
        }
    }
}

/// Kennzahlen eines abgeschlossenen Durchlaufs.
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct LayoutDiagnostics {
    /// Anzahl der Segmente im finalen Profil
    pub segment_count: usize,
    /// Summe der Flächen aller platzierten Objekte
    pub placed_area: f64,
    /// Anteil der platzierten Fläche an `Breite × Inhaltshöhe` in Prozent
    pub utilization_percent: f64,
    /// Höchste Stelle des finalen Profils
    pub peak_height: f64,
    /// Tiefste Stelle des finalen Profils
    pub lowest_height: f64,
}

/// Ergebnis eines Layout-Durchlaufs.
#[derive(Clone, Debug)]
pub struct LayoutResult {
    pub width: f64,
    pub placed: Vec<PlacedTile>,
    pub unplaced: Vec<UnplacedTile>,
    /// `(max(x + width), max(y + height))` über alle Platzierungen
    pub content_size: Size,
    /// Finales Profil, nur zur Diagnose
    pub skyline: Vec<Segment>,
    pub diagnostics: LayoutDiagnostics,
}

impl LayoutResult {
    /// Gibt an, ob alle Objekte platziert wurden.
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }
}

/// Ereignisse während des Layouts, um Live-Visualisierung zu ermöglichen.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum LayoutEvent {
    /// Ein Durchlauf beginnt.
    LayoutStarted { width: f64, tiles: usize },
    /// Ein Objekt wurde platziert.
    TilePlaced {
        id: usize,
        pos: (f64, f64),
        dims: (f64, f64),
        content_height: f64,
    },
    /// Ein Objekt konnte nicht platziert werden.
    TileRejected {
        id: usize,
        reason_code: String,
        reason_text: String,
    },
    /// Layout abgeschlossen.
    Finished {
        placed: usize,
        unplaced: usize,
        content_size: (f64, f64),
    },
}

/// Legt Objekte mit Standardkonfiguration aus.
///
/// # Parameter
/// * `tiles` - Objekte in Ankunftsreihenfolge
/// * `width` - Breite des Containers
pub fn layout_tiles(tiles: Vec<Tile>, width: f64) -> Result<LayoutResult, SkylineError> {
    layout_tiles_with_config(tiles, width, LayoutConfig::default())
}

/// Wie `layout_tiles`, aber mit anpassbaren Parametern.
pub fn layout_tiles_with_config(
    tiles: Vec<Tile>,
    width: f64,
    config: LayoutConfig,
) -> Result<LayoutResult, SkylineError> {
    layout_tiles_with_progress(tiles, width, config, |_| {})
}

/// Layout mit Live-Progress Callback.
///
/// Die Reihenfolge der Objekte bleibt erhalten; jedes Objekt wird genau
/// einmal aufgelöst und an den Packer übergeben. Nur eine divergierende
/// Normalisierung bricht den Durchlauf ab.
pub fn layout_tiles_with_progress(
    tiles: Vec<Tile>,
    width: f64,
    config: LayoutConfig,
    mut on_event: impl FnMut(&LayoutEvent),
) -> Result<LayoutResult, SkylineError> {
    let resolver = SizeResolver::new(config.max_width_ratio);
    let mut packer = SkylinePacker::with_config(width, config.skyline);

    on_event(&LayoutEvent::LayoutStarted {
        width,
        tiles: tiles.len(),
    });

    let mut placed: Vec<PlacedTile> = Vec::with_capacity(tiles.len());
    let mut unplaced: Vec<UnplacedTile> = Vec::new();
    let mut content_size = Size::zero();

    for tile in tiles {
        let outcome = match resolver.resolve(&tile, width) {
            Some(size) => match packer.insert(size) {
                Ok(rect) if rect.is_empty() => Err(UnplacedReason::NoUsableSize),
                Ok(rect) => Ok(rect),
                Err(SkylineError::ItemTooWide { .. }) => Err(UnplacedReason::WiderThanContainer),
                Err(err) => return Err(err),
            },
            None => Err(UnplacedReason::NoUsableSize),
        };

        match outcome {
            Ok(rect) => {
                content_size.width = content_size.width.max(rect.max_x());
                content_size.height = content_size.height.max(rect.max_y());
                on_event(&LayoutEvent::TilePlaced {
                    id: tile.id,
                    pos: (rect.x, rect.y),
                    dims: (rect.width, rect.height),
                    content_height: content_size.height,
                });
                placed.push(PlacedTile::new(tile, rect));
            }
            Err(reason) => {
                on_event(&LayoutEvent::TileRejected {
                    id: tile.id,
                    reason_code: reason.code().to_string(),
                    reason_text: reason.to_string(),
                });
                unplaced.push(UnplacedTile { tile, reason });
            }
        }
    }

    let diagnostics = diagnose(&packer, &placed, content_size);
    on_event(&LayoutEvent::Finished {
        placed: placed.len(),
        unplaced: unplaced.len(),
        content_size: content_size.as_tuple(),
    });

    Ok(LayoutResult {
        width,
        placed,
        unplaced,
        content_size,
        skyline: packer.profile().to_vec(),
        diagnostics,
    })
}

/// Berechnet die Kennzahlen nach dem Durchlauf.
fn diagnose(
    packer: &SkylinePacker,
    placed: &[PlacedTile],
    content_size: Size,
) -> LayoutDiagnostics {
    let placed_area: f64 = placed.iter().map(Dimensional::area).sum();
    let total_area = packer.max_width() * content_size.height;
    let utilization_percent = if total_area > 0.0 {
        (placed_area / total_area) * 100.0
    } else {
        0.0
    };

    LayoutDiagnostics {
        segment_count: packer.profile().len(),
        placed_area,
        utilization_percent,
        peak_height: packer.peak_height(),
        lowest_height: packer.lowest_height(),
    }
}
