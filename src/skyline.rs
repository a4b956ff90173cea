//! Skyline-Packer für die Online-Platzierung von Rechtecken.
//!
//! Objekte kommen einzeln und in fester Reihenfolge an und werden gierig in
//! einen Container fester Breite und unbegrenzter Höhe gelegt. Bereits
//! platzierte Objekte werden nie verschoben. Der Packer merkt sich dafür nur
//! das Profil ("Skyline"): die belegte Höhe über jeder horizontalen Position.
//!
//! Vor jeder Suche wird das Profil normalisiert:
//! - schmale Lücken hinter der Objektbreite werden zugeschüttet
//! - fast gleiche Höhen werden zusammengefasst
//! - schmale, tiefe Gruben werden aufgefüllt
//! - einzelne Türme werden durch Anheben der tiefsten Ebene entschärft
//!
//! Danach folgt die Suche (direkter Treffer, dann Absorption von Nachbarn)
//! und als letzter Ausweg eine neue Reihe auf der aktuellen Maximalhöhe.

use serde::Serialize;
use tracing::{debug, trace};
use utoipa::ToSchema;

use crate::types::{EPSILON_DEPTH, EPSILON_GENERAL, Rect, Size};

/// Faktor, ab dem das höchste Segment als Turm gilt (bezogen auf die mittlere Höhe).
const TOWER_FACTOR: f64 = 1.5;

/// Ein maximaler horizontaler Abschnitt konstanter Höhe im Profil.
///
/// # Felder
/// * `x` - Linke Kante des Abschnitts
/// * `y` - Aktuell belegte Höhe über dem Abschnitt
/// * `width` - Breite des Abschnitts, immer größer als 0
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Segment {
    pub x: f64,
    pub y: f64,
    pub width: f64,
}

impl Segment {
    /// Erstellt ein neues Segment.
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64) -> Self {
        Self { x, y, width }
    }

    /// Rechte Kante (`x + width`).
    #[inline]
    pub fn end(&self) -> f64 {
        self.x + self.width
    }
}

/// Regel, nach der Gruben im Profil erkannt werden.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PitPolicy {
    /// Beide Nachbarn müssen höher sein (am Rand genügt der eine Nachbar);
    /// Referenzhöhe ist die Maximalhöhe plus die Höhe des neuen Objekts.
    #[default]
    Flanked,
    /// Keine Nachbarprüfung; Referenzhöhe ist die rohe Maximalhöhe.
    Peak,
}

impl PitPolicy {
    pub fn code(&self) -> &'static str {
        match self {
            PitPolicy::Flanked => "flanked",
            PitPolicy::Peak => "peak",
        }
    }

    /// Liest eine Regel aus ihrem Code (Groß-/Kleinschreibung egal).
    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flanked" => Some(PitPolicy::Flanked),
            "peak" => Some(PitPolicy::Peak),
            _ => None,
        }
    }
}

/// Umgang mit Objekten, die breiter als der Container sind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OversizePolicy {
    /// Breite auf die Containerbreite begrenzen.
    #[default]
    Clamp,
    /// Objekt ablehnen, Profil bleibt unverändert.
    Reject,
}

/// Konfiguration für den Skyline-Packer.
///
/// Bleibt für die Lebensdauer eines Packers unverändert.
#[derive(Copy, Clone, Debug)]
pub struct SkylineConfig {
    /// Segmente schmaler als dieser Wert gelten als unbrauchbare Lücke
    pub min_gap_width: f64,
    /// Höhenunterschiede kleiner als dieser Wert werden zusammengefasst
    pub min_gap_height: f64,
    /// Verhältnis Breite/Tiefe, ab dem ein Segment als Grube gilt
    pub min_pit_ratio: f64,
    pub pit_policy: PitPolicy,
    pub oversize_policy: OversizePolicy,
}

impl SkylineConfig {
    pub const DEFAULT_MIN_GAP_WIDTH: f64 = 10.0;
    pub const DEFAULT_MIN_GAP_HEIGHT: f64 = 2.0;
    pub const DEFAULT_MIN_PIT_RATIO: f64 = 0.10;

    /// Erstellt einen Builder für benutzerdefinierte Konfiguration.
    pub fn builder() -> SkylineConfigBuilder {
        SkylineConfigBuilder::default()
    }
}

impl Default for SkylineConfig {
    fn default() -> Self {
        Self {
            min_gap_width: Self::DEFAULT_MIN_GAP_WIDTH,
            min_gap_height: Self::DEFAULT_MIN_GAP_HEIGHT,
            min_pit_ratio: Self::DEFAULT_MIN_PIT_RATIO,
            pit_policy: PitPolicy::default(),
            oversize_policy: OversizePolicy::default(),
        }
    }
}

/// Builder-Pattern für SkylineConfig.
#[derive(Clone, Debug, Default)]
pub struct SkylineConfigBuilder {
    config: SkylineConfig,
}

impl SkylineConfigBuilder {
    /// Setzt die minimale Lückenbreite.
    pub fn min_gap_width(mut self, width: f64) -> Self {
        self.config.min_gap_width = width;
        self
    }

    /// Setzt die minimale Höhendifferenz.
    pub fn min_gap_height(mut self, height: f64) -> Self {
        self.config.min_gap_height = height;
        self
    }

    /// Setzt das Grubenverhältnis.
    pub fn min_pit_ratio(mut self, ratio: f64) -> Self {
        self.config.min_pit_ratio = ratio;
        self
    }

    /// Setzt die Regel zur Grubenerkennung.
    pub fn pit_policy(mut self, policy: PitPolicy) -> Self {
        self.config.pit_policy = policy;
        self
    }

    /// Setzt den Umgang mit zu breiten Objekten.
    pub fn oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.config.oversize_policy = policy;
        self
    }

    /// Erstellt die finale Konfiguration.
    pub fn build(self) -> SkylineConfig {
        self.config
    }
}

/// Fehler des Skyline-Packers.
#[derive(Clone, Debug, PartialEq)]
pub enum SkylineError {
    /// Objekt ist breiter als der Container (nur mit `OversizePolicy::Reject`).
    ItemTooWide { width: f64, max_width: f64 },
    /// Die Normalisierung hat ihre Durchlaufgrenze überschritten.
    NormalizationDiverged { passes: usize },
    /// Das Profil deckt `[0, max_width)` nicht mehr lückenlos ab.
    ProfileCorrupted(String),
}

impl std::fmt::Display for SkylineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkylineError::ItemTooWide { width, max_width } => write!(
                f,
                "Objekt ist {} breit, der Container nur {}",
                width, max_width
            ),
            SkylineError::NormalizationDiverged { passes } => write!(
                f,
                "Normalisierung nach {} Durchläufen nicht stabil",
                passes
            ),
            SkylineError::ProfileCorrupted(msg) => write!(f, "Profil beschädigt: {}", msg),
        }
    }
}

impl std::error::Error for SkylineError {}

/// Online-Packer mit Skyline-Profil.
///
/// Ein Packer gehört zu genau einem Layout-Durchlauf mit fester Breite.
/// `insert` verlangt `&mut self`; gleichzeitige Aufrufe sind damit ausgeschlossen.
#[derive(Clone, Debug)]
pub struct SkylinePacker {
    max_width: f64,
    config: SkylineConfig,
    segments: Vec<Segment>,
    accepted: usize,
}

impl SkylinePacker {
    /// Erstellt einen Packer mit Standardkonfiguration.
    pub fn new(max_width: f64) -> Self {
        Self::with_config(max_width, SkylineConfig::default())
    }

    /// Erstellt einen Packer mit eigener Konfiguration.
    pub fn with_config(max_width: f64, config: SkylineConfig) -> Self {
        Self {
            max_width,
            config,
            segments: Vec::new(),
            accepted: 0,
        }
    }

    pub fn max_width(&self) -> f64 {
        self.max_width
    }

    /// Aktuelles Profil, nur lesend (für Diagnose und Overlays).
    pub fn profile(&self) -> &[Segment] {
        &self.segments
    }

    /// Anzahl der bisher angenommenen Objekte.
    pub fn accepted_count(&self) -> usize {
        self.accepted
    }

    /// Höchste belegte Höhe im Profil (0 für einen leeren Packer).
    pub fn peak_height(&self) -> f64 {
        self.segments.iter().map(|s| s.y).fold(0.0, f64::max)
    }

    /// Niedrigste belegte Höhe im Profil (0 für einen leeren Packer).
    pub fn lowest_height(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.y)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Platziert das nächste Objekt.
    ///
    /// # Parameter
    /// * `size` - Aufgelöste Größe des Objekts
    ///
    /// # Rückgabewert
    /// Das zugewiesene Rechteck; das Null-Rechteck für entartete Größen.
    /// `Err` nur für abgelehnte zu breite Objekte oder eine divergierende
    /// Normalisierung.
    pub fn insert(&mut self, size: Size) -> Result<Rect, SkylineError> {
        if !size.is_valid_dimension() {
            trace!(width = size.width, height = size.height, "degenerate item ignored");
            return Ok(Rect::zero());
        }

        let size = self.admit(size)?;
        if !size.is_valid_dimension() {
            return Ok(Rect::zero());
        }

        let placement = if self.segments.is_empty() {
            self.seed(size)
        } else {
            self.place(size)?
        };
        self.accepted += 1;

        if cfg!(debug_assertions) {
            if let Err(err) = self.check_invariants() {
                panic!("Profil nach insert verletzt: {err}");
            }
        }
        Ok(placement)
    }

    /// Prüft die Abdeckung von `[0, max_width)` durch das Profil.
    pub fn check_invariants(&self) -> Result<(), SkylineError> {
        let Some(first) = self.segments.first() else {
            return Ok(());
        };
        let tolerance = EPSILON_GENERAL * self.max_width.abs().max(1.0);

        if first.x.abs() > tolerance {
            return Err(SkylineError::ProfileCorrupted(format!(
                "erstes Segment beginnt bei {}",
                first.x
            )));
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if segment.width <= 0.0 {
                return Err(SkylineError::ProfileCorrupted(format!(
                    "Segment {} hat Breite {}",
                    idx, segment.width
                )));
            }
        }
        for (idx, pair) in self.segments.windows(2).enumerate() {
            if (pair[0].end() - pair[1].x).abs() > tolerance {
                return Err(SkylineError::ProfileCorrupted(format!(
                    "Lücke oder Überlappung zwischen Segment {} und {}",
                    idx,
                    idx + 1
                )));
            }
        }
        let end = self.segments.last().map(Segment::end).unwrap_or(0.0);
        if (end - self.max_width).abs() > tolerance {
            return Err(SkylineError::ProfileCorrupted(format!(
                "Profil endet bei {} statt {}",
                end, self.max_width
            )));
        }
        Ok(())
    }

    fn admit(&self, size: Size) -> Result<Size, SkylineError> {
        if size.width <= self.max_width + EPSILON_GENERAL {
            return Ok(size);
        }
        match self.config.oversize_policy {
            OversizePolicy::Clamp => {
                debug!(
                    width = size.width,
                    max_width = self.max_width,
                    "clamping oversized item"
                );
                Ok(Size::new(self.max_width, size.height))
            }
            OversizePolicy::Reject => Err(SkylineError::ItemTooWide {
                width: size.width,
                max_width: self.max_width,
            }),
        }
    }

    /// Erstes Objekt: Profil direkt anlegen, ohne Normalisierung und Suche.
    fn seed(&mut self, size: Size) -> Rect {
        let rest = self.max_width - size.width;
        if rest > EPSILON_GENERAL {
            self.segments.push(Segment::new(0.0, size.height, size.width));
            self.segments.push(Segment::new(size.width, 0.0, rest));
        } else {
            self.segments
                .push(Segment::new(0.0, size.height, self.max_width));
        }
        Rect::new(0.0, 0.0, size.width, size.height)
    }

    fn place(&mut self, size: Size) -> Result<Rect, SkylineError> {
        self.normalize(size)?;

        if let Some(rect) = self.place_direct(size) {
            return Ok(rect);
        }
        if let Some(rect) = self.place_absorbing(size) {
            return Ok(rect);
        }
        Ok(self.start_row(size))
    }

    /// Normalisiert das Profil, bis weder Gruben noch Türme mehr korrigiert werden.
    ///
    /// Jede Korrektur entfernt ein Segment oder eine Höhenstufe; mehr als
    /// `2 × (Objekte + 1)` Durchläufe bedeuten einen internen Fehler.
    pub(crate) fn normalize(&mut self, size: Size) -> Result<(), SkylineError> {
        let cap = 2 * (self.accepted + 1);
        let mut passes = 0;

        loop {
            self.defragment(size.width);
            self.coalesce_heights();

            let corrected = self.resolve_pits(size.height) || self.flatten_towers(size.width);
            if !corrected {
                return Ok(());
            }

            passes += 1;
            if passes > cap {
                return Err(SkylineError::NormalizationDiverged { passes });
            }
        }
    }

    /// Schüttet schmale Lücken hinter der Objektbreite in ihren linken Nachbarn.
    pub(crate) fn defragment(&mut self, item_width: f64) {
        let min_gap_width = self.config.min_gap_width;
        while let Some(idx) = self
            .segments
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.x >= item_width && s.width < min_gap_width)
            .map(|(idx, _)| idx)
        {
            let sliver = self.segments.remove(idx);
            let left = &mut self.segments[idx - 1];
            left.width = sliver.end() - left.x;
            // Ein höherer Splitter darf nicht abgesenkt werden, sonst überlappen spätere Objekte.
            left.y = left.y.max(sliver.y);
            trace!(x = sliver.x, width = sliver.width, "plugged gap");
        }
    }

    /// Fasst Läufe fast gleicher Höhe zu einem Segment auf ihrer Maximalhöhe zusammen.
    pub(crate) fn coalesce_heights(&mut self) {
        let min_gap_height = self.config.min_gap_height;
        let segments = std::mem::take(&mut self.segments);
        let before = segments.len();

        let mut coalesced: Vec<Segment> = Vec::with_capacity(before);
        let mut run_low = 0.0;
        for segment in segments {
            if let Some(last) = coalesced.last_mut() {
                let low = f64::min(run_low, segment.y);
                let high = last.y.max(segment.y);
                if high - low < min_gap_height {
                    last.width = segment.end() - last.x;
                    last.y = high;
                    run_low = low;
                    continue;
                }
            }
            run_low = segment.y;
            coalesced.push(segment);
        }

        if coalesced.len() < before {
            trace!(merged = before - coalesced.len(), "plugged heights");
        }
        self.segments = coalesced;
    }

    /// Findet Gruben; Indizes aufsteigend.
    pub(crate) fn find_pits(&self, item_height: f64) -> Vec<usize> {
        let peak = self.peak_height();
        let top = match self.config.pit_policy {
            PitPolicy::Flanked => peak + item_height,
            PitPolicy::Peak => peak,
        };

        self.segments
            .iter()
            .enumerate()
            .filter(|&(idx, segment)| {
                let flanked = match self.config.pit_policy {
                    PitPolicy::Flanked => self.is_flanked(idx),
                    PitPolicy::Peak => true,
                };
                let depth = (top - segment.y).max(EPSILON_DEPTH);
                flanked && segment.width / depth <= self.config.min_pit_ratio
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    fn is_flanked(&self, idx: usize) -> bool {
        let y = self.segments[idx].y;
        let left = idx
            .checked_sub(1)
            .map_or(true, |left| self.segments[left].y > y);
        let right = self
            .segments
            .get(idx + 1)
            .map_or(true, |right| right.y > y);
        left && right
    }

    /// Füllt alle Gruben auf; `true`, wenn sich das Profil geändert hat.
    pub(crate) fn resolve_pits(&mut self, item_height: f64) -> bool {
        if self.segments.len() < 3 {
            return false;
        }
        let pits = self.find_pits(item_height);
        if pits.is_empty() {
            return false;
        }

        // Von hinten nach vorne, damit die vorderen Indizes gültig bleiben
        for &idx in pits.iter().rev() {
            self.merge_pit(idx);
        }
        debug!(
            count = pits.len(),
            positions = ?pits,
            "plugged pits"
        );
        true
    }

    fn merge_pit(&mut self, idx: usize) {
        let left = idx.checked_sub(1);
        let right = (idx + 1 < self.segments.len()).then_some(idx + 1);
        let target = match (left, right) {
            (Some(l), Some(r)) => {
                if self.segments[l].y <= self.segments[r].y {
                    l
                } else {
                    r
                }
            }
            (Some(l), None) => l,
            (None, Some(r)) => r,
            (None, None) => return,
        };

        let (first, second) = if target < idx {
            (target, idx)
        } else {
            (idx, target)
        };
        let a = self.segments[first];
        let b = self.segments[second];
        self.segments[first] = Segment::new(a.x, a.y.max(b.y), b.end() - a.x);
        self.segments.remove(second);
    }

    /// Hebt die tiefste Ebene auf die zweittiefste, wenn sich ein Turm gebildet hat.
    pub(crate) fn flatten_towers(&mut self, item_width: f64) -> bool {
        let count = self.segments.len();
        if count <= 3 {
            return false;
        }
        match self.segments.last() {
            Some(last) if last.width < item_width => {}
            _ => return false,
        }

        let peak = self.peak_height();
        let mean = self.segments.iter().map(|s| s.y).sum::<f64>() / count as f64;
        if peak <= TOWER_FACTOR * mean {
            return false;
        }

        let floor = self.lowest_height();
        let second = self
            .segments
            .iter()
            .map(|s| s.y)
            .filter(|&y| y > floor)
            .fold(f64::INFINITY, f64::min);
        if !second.is_finite() {
            return false;
        }

        for segment in self.segments.iter_mut().filter(|s| s.y < second) {
            segment.y = second;
        }
        debug!(peak, mean, raised_to = second, "flattened tower");
        true
    }

    /// Direkter Treffer: niedrigstes Segment, das breit genug ist (erstes bei Gleichstand).
    pub(crate) fn place_direct(&mut self, size: Size) -> Option<Rect> {
        let (idx, segment) = self
            .segments
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, s)| s.width + EPSILON_GENERAL >= size.width)
            .min_by(|(_, a), (_, b)| a.y.total_cmp(&b.y))?;

        let rest = segment.width - size.width;
        if rest > EPSILON_GENERAL {
            self.segments.splice(
                idx..=idx,
                [
                    Segment::new(segment.x, segment.y + size.height, size.width),
                    Segment::new(segment.x + size.width, segment.y, rest),
                ],
            );
        } else {
            self.segments[idx] = Segment::new(segment.x, segment.y + size.height, segment.width);
        }

        Some(Rect::new(segment.x, segment.y, size.width, size.height))
    }

    /// Absorption: von unten nach oben Nachbarn einsammeln, die nicht höher sind.
    pub(crate) fn place_absorbing(&mut self, size: Size) -> Option<Rect> {
        let mut order: Vec<usize> = (0..self.segments.len()).collect();
        order.sort_by(|&a, &b| self.segments[a].y.total_cmp(&self.segments[b].y));

        for idx in order {
            let floor = self.segments[idx].y;

            let mut start = idx;
            while start > 0 && self.segments[start - 1].y <= floor {
                start -= 1;
            }
            let mut end = idx;
            while end + 1 < self.segments.len() && self.segments[end + 1].y <= floor {
                end += 1;
            }

            let run_width = self.segments[end].end() - self.segments[start].x;
            if run_width + EPSILON_GENERAL < size.width {
                continue;
            }

            let x = self.segments[start].x;
            self.absorb(start, end, floor, size);
            trace!(x, y = floor, "plugged fragments");
            return Some(Rect::new(x, floor, size.width, size.height));
        }
        None
    }

    fn absorb(&mut self, start: usize, end: usize, floor: f64, size: Size) {
        let x = self.segments[start].x;
        let right = x + size.width;

        let mut last = start;
        while last < end && self.segments[last].end() + EPSILON_GENERAL < right {
            last += 1;
        }

        let consumed = self.segments[last];
        let remainder = consumed.end() - right;
        let mut replacement = vec![Segment::new(x, floor + size.height, size.width)];
        if remainder > EPSILON_GENERAL {
            replacement.push(Segment::new(right, consumed.y, remainder));
        } else {
            replacement[0].width = consumed.end() - x;
        }
        self.segments.splice(start..=last, replacement);
    }

    /// Letzter Ausweg: neue Reihe auf der aktuellen Maximalhöhe beginnen.
    ///
    /// Vollständig überdeckte Segmente verschwinden, teilweise überdeckte
    /// werden auf `size.width` gekürzt.
    pub(crate) fn start_row(&mut self, size: Size) -> Rect {
        let base = self.peak_height();
        let width = size.width;

        let mut row = Vec::with_capacity(self.segments.len() + 1);
        row.push(Segment::new(0.0, base + size.height, width));
        for segment in &self.segments {
            if segment.end() <= width + EPSILON_GENERAL {
                continue;
            }
            if segment.x < width {
                row.push(Segment::new(width, segment.y, segment.end() - width));
            } else {
                row.push(*segment);
            }
        }
        if row.len() == 1 {
            row[0].width = self.max_width;
        }

        debug!(base, width, "generated holes, new row started");
        self.segments = row;
        Rect::new(0.0, base, size.width, size.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packer_with(max_width: f64, segments: &[(f64, f64, f64)]) -> SkylinePacker {
        let mut packer = SkylinePacker::new(max_width);
        packer.segments = segments
            .iter()
            .map(|&(x, y, width)| Segment::new(x, y, width))
            .collect();
        packer.accepted = segments.len();
        packer
    }

    fn as_tuples(packer: &SkylinePacker) -> Vec<(f64, f64, f64)> {
        packer
            .profile()
            .iter()
            .map(|s| (s.x, s.y, s.width))
            .collect()
    }

    #[test]
    fn first_item_seeds_profile() {
        let mut packer = SkylinePacker::new(100.0);
        let rect = packer.insert(Size::new(40.0, 20.0)).unwrap();

        assert_eq!(rect, Rect::new(0.0, 0.0, 40.0, 20.0));
        assert_eq!(as_tuples(&packer), vec![(0.0, 20.0, 40.0), (40.0, 0.0, 60.0)]);
        assert_eq!(packer.accepted_count(), 1);
    }

    #[test]
    fn full_width_seed_keeps_no_empty_segment() {
        let mut packer = SkylinePacker::new(100.0);
        packer.insert(Size::new(100.0, 5.0)).unwrap();
        assert_eq!(as_tuples(&packer), vec![(0.0, 5.0, 100.0)]);
    }

    #[test]
    fn newspaper_scenario_places_lowest_fitting_segment() {
        let mut packer = SkylinePacker::new(100.0);

        packer.insert(Size::new(40.0, 20.0)).unwrap();

        let second = packer.insert(Size::new(30.0, 10.0)).unwrap();
        assert_eq!(second, Rect::new(40.0, 0.0, 30.0, 10.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 20.0, 40.0), (40.0, 10.0, 30.0), (70.0, 0.0, 30.0)]
        );

        let third = packer.insert(Size::new(30.0, 30.0)).unwrap();
        assert_eq!(third, Rect::new(70.0, 0.0, 30.0, 30.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 20.0, 40.0), (40.0, 10.0, 30.0), (70.0, 30.0, 30.0)]
        );
    }

    #[test]
    fn degenerate_items_return_zero_rect_without_mutation() {
        let mut packer = SkylinePacker::new(100.0);
        assert_eq!(packer.insert(Size::new(0.0, 10.0)).unwrap(), Rect::zero());
        assert!(packer.profile().is_empty());

        packer.insert(Size::new(40.0, 20.0)).unwrap();
        let before = as_tuples(&packer);
        for size in [
            Size::new(-5.0, 10.0),
            Size::new(10.0, 0.0),
            Size::new(f64::NAN, 3.0),
        ] {
            assert_eq!(packer.insert(size).unwrap(), Rect::zero());
        }
        assert_eq!(as_tuples(&packer), before);
        assert_eq!(packer.accepted_count(), 1);
    }

    #[test]
    fn oversized_item_is_clamped_by_default() {
        let mut packer = SkylinePacker::new(100.0);
        let rect = packer.insert(Size::new(150.0, 10.0)).unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 100.0, 10.0));
        assert!(packer.check_invariants().is_ok());
    }

    #[test]
    fn oversized_item_is_rejected_with_reject_policy() {
        let config = SkylineConfig::builder()
            .oversize_policy(OversizePolicy::Reject)
            .build();
        let mut packer = SkylinePacker::with_config(100.0, config);
        packer.insert(Size::new(40.0, 20.0)).unwrap();
        let before = as_tuples(&packer);

        let err = packer.insert(Size::new(120.0, 10.0)).unwrap_err();
        assert!(matches!(err, SkylineError::ItemTooWide { .. }));
        assert_eq!(as_tuples(&packer), before);
    }

    #[test]
    fn defragment_merges_sliver_into_left_neighbor() {
        let mut packer = packer_with(100.0, &[(0.0, 10.0, 50.0), (50.0, 5.0, 5.0), (55.0, 20.0, 45.0)]);
        packer.defragment(30.0);
        assert_eq!(as_tuples(&packer), vec![(0.0, 10.0, 55.0), (55.0, 20.0, 45.0)]);
    }

    #[test]
    fn defragment_keeps_height_of_taller_sliver() {
        let mut packer = packer_with(100.0, &[(0.0, 10.0, 50.0), (50.0, 40.0, 5.0), (55.0, 20.0, 45.0)]);
        packer.defragment(30.0);
        assert_eq!(as_tuples(&packer), vec![(0.0, 40.0, 55.0), (55.0, 20.0, 45.0)]);
    }

    #[test]
    fn defragment_ignores_slivers_before_item_width() {
        let segments = [(0.0, 10.0, 20.0), (20.0, 0.0, 5.0), (25.0, 30.0, 75.0)];
        let mut packer = packer_with(100.0, &segments);
        packer.defragment(30.0);
        assert_eq!(as_tuples(&packer), segments.to_vec());
    }

    #[test]
    fn coalesce_merges_runs_within_gap_height() {
        let mut packer = packer_with(
            100.0,
            &[(0.0, 10.0, 20.0), (20.0, 11.0, 20.0), (40.0, 11.5, 20.0), (60.0, 30.0, 40.0)],
        );
        packer.coalesce_heights();
        assert_eq!(as_tuples(&packer), vec![(0.0, 11.5, 60.0), (60.0, 30.0, 40.0)]);
    }

    #[test]
    fn coalesce_checks_every_pair_in_run() {
        let mut packer = packer_with(100.0, &[(0.0, 10.0, 40.0), (40.0, 11.5, 40.0), (80.0, 12.5, 20.0)]);
        packer.coalesce_heights();
        assert_eq!(as_tuples(&packer), vec![(0.0, 11.5, 80.0), (80.0, 12.5, 20.0)]);
    }

    #[test]
    fn flanked_pit_is_merged_into_lower_neighbor() {
        let mut packer = packer_with(100.0, &[(0.0, 60.0, 45.0), (45.0, 0.0, 5.0), (50.0, 60.0, 50.0)]);
        assert_eq!(packer.find_pits(10.0), vec![1]);

        assert!(packer.resolve_pits(10.0));
        assert_eq!(as_tuples(&packer), vec![(0.0, 60.0, 50.0), (50.0, 60.0, 50.0)]);
    }

    #[test]
    fn pit_resolution_restarts_search_on_clean_profile() {
        let mut packer = packer_with(100.0, &[(0.0, 200.0, 40.0), (40.0, 0.0, 12.0), (52.0, 200.0, 48.0)]);
        let rect = packer.insert(Size::new(30.0, 10.0)).unwrap();

        assert_eq!(rect, Rect::new(0.0, 200.0, 30.0, 10.0));
        assert_eq!(as_tuples(&packer), vec![(0.0, 210.0, 30.0), (30.0, 200.0, 70.0)]);
    }

    #[test]
    fn pit_policies_differ_on_one_sided_steps() {
        let segments = [(0.0, 100.0, 40.0), (40.0, 50.0, 5.0), (45.0, 0.0, 55.0)];

        let flanked = packer_with(100.0, &segments);
        assert!(flanked.find_pits(10.0).is_empty());

        let mut peak = packer_with(100.0, &segments);
        peak.config.pit_policy = PitPolicy::Peak;
        assert_eq!(peak.find_pits(10.0), vec![1]);
    }

    #[test]
    fn normalized_profile_has_no_pits_left() {
        let mut packer = packer_with(
            200.0,
            &[
                (0.0, 300.0, 40.0),
                (40.0, 0.0, 12.0),
                (52.0, 300.0, 60.0),
                (112.0, 20.0, 11.0),
                (123.0, 290.0, 77.0),
            ],
        );
        let item = Size::new(30.0, 10.0);
        packer.normalize(item).unwrap();

        assert!(packer.find_pits(item.height).is_empty());
        assert!(packer.check_invariants().is_ok());
    }

    #[test]
    fn tower_is_flattened_to_second_lowest_height() {
        let mut packer = packer_with(
            100.0,
            &[(0.0, 0.0, 30.0), (30.0, 200.0, 20.0), (50.0, 20.0, 40.0), (90.0, 5.0, 10.0)],
        );
        assert!(packer.flatten_towers(20.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 5.0, 30.0), (30.0, 200.0, 20.0), (50.0, 20.0, 40.0), (90.0, 5.0, 10.0)]
        );
    }

    #[test]
    fn insert_flattens_tower_before_placing() {
        let mut packer = packer_with(
            100.0,
            &[(0.0, 0.0, 40.0), (40.0, 100.0, 10.0), (50.0, 10.0, 30.0), (80.0, 30.0, 20.0)],
        );

        // Zwei Durchläufe: 0 -> 10, dann 10 -> 30; danach verschmelzen die 30er-Segmente
        let rect = packer.insert(Size::new(30.0, 10.0)).unwrap();

        assert_eq!(rect, Rect::new(0.0, 30.0, 30.0, 10.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 40.0, 30.0), (30.0, 30.0, 10.0), (40.0, 100.0, 10.0), (50.0, 30.0, 50.0)]
        );
    }

    #[test]
    fn tower_is_left_alone_when_rightmost_segment_is_wide_enough() {
        let mut packer = packer_with(
            100.0,
            &[(0.0, 0.0, 30.0), (30.0, 200.0, 20.0), (50.0, 20.0, 20.0), (70.0, 5.0, 30.0)],
        );
        assert!(!packer.flatten_towers(20.0));
    }

    #[test]
    fn absorption_combines_lower_neighbors() {
        let mut packer = SkylinePacker::new(100.0);
        packer.insert(Size::new(40.0, 20.0)).unwrap();
        packer.insert(Size::new(30.0, 10.0)).unwrap();
        packer.insert(Size::new(30.0, 30.0)).unwrap();

        // Kein Segment ist 50 breit: Segment 0 (y=20) schluckt das tiefere Segment 1
        let rect = packer.insert(Size::new(50.0, 5.0)).unwrap();
        assert_eq!(rect, Rect::new(0.0, 20.0, 50.0, 5.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 25.0, 50.0), (50.0, 10.0, 20.0), (70.0, 30.0, 30.0)]
        );
    }

    #[test]
    fn absorption_leaves_remainder_at_original_height() {
        let mut packer = packer_with(100.0, &[(0.0, 30.0, 40.0), (40.0, 10.0, 30.0), (70.0, 0.0, 30.0)]);
        let rect = packer.insert(Size::new(50.0, 5.0)).unwrap();

        assert_eq!(rect, Rect::new(40.0, 10.0, 50.0, 5.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 30.0, 40.0), (40.0, 15.0, 50.0), (90.0, 0.0, 10.0)]
        );
    }

    #[test]
    fn full_width_item_on_fragmented_profile_lands_on_peak() {
        let mut packer = packer_with(100.0, &[(0.0, 20.0, 40.0), (40.0, 10.0, 30.0), (70.0, 30.0, 30.0)]);
        let rect = packer.insert(Size::new(100.0, 5.0)).unwrap();

        assert_eq!(rect, Rect::new(0.0, 30.0, 100.0, 5.0));
        assert_eq!(as_tuples(&packer), vec![(0.0, 35.0, 100.0)]);
    }

    /// Jede Grube legt nach dem Auffüllen die nächste frei.
    fn nested_pits() -> SkylinePacker {
        packer_with(
            100.0,
            &[
                (0.0, 3000.0, 40.0),
                (40.0, 2000.0, 8.0),
                (48.0, 1000.0, 4.0),
                (52.0, 0.0, 2.0),
                (54.0, 1000.0, 4.0),
                (58.0, 2000.0, 8.0),
                (66.0, 3000.0, 34.0),
            ],
        )
    }

    #[test]
    fn normalization_fails_after_too_many_passes() {
        let mut packer = nested_pits();
        packer.accepted = 0;

        let err = packer.normalize(Size::new(100.0, 10.0)).unwrap_err();
        assert_eq!(err, SkylineError::NormalizationDiverged { passes: 3 });

        let mut packer = nested_pits();
        packer.accepted = 0;
        assert!(matches!(
            packer.insert(Size::new(100.0, 10.0)),
            Err(SkylineError::NormalizationDiverged { .. })
        ));
    }

    #[test]
    fn nested_pits_settle_within_pass_limit() {
        let mut packer = nested_pits();
        packer.normalize(Size::new(100.0, 10.0)).unwrap();
        assert_eq!(as_tuples(&packer), vec![(0.0, 3000.0, 100.0)]);
    }

    #[test]
    fn fallback_row_clips_partially_covered_segments() {
        let mut packer = packer_with(100.0, &[(0.0, 10.0, 30.0), (30.0, 50.0, 30.0), (60.0, 20.0, 40.0)]);
        let rect = packer.start_row(Size::new(45.0, 10.0));

        assert_eq!(rect, Rect::new(0.0, 50.0, 45.0, 10.0));
        assert_eq!(
            as_tuples(&packer),
            vec![(0.0, 60.0, 45.0), (45.0, 50.0, 15.0), (60.0, 20.0, 40.0)]
        );
        assert!(packer.check_invariants().is_ok());
    }

    #[test]
    fn check_invariants_reports_gaps() {
        let packer = packer_with(100.0, &[(0.0, 10.0, 30.0), (40.0, 0.0, 60.0)]);
        assert!(matches!(
            packer.check_invariants(),
            Err(SkylineError::ProfileCorrupted(_))
        ));

        let short = packer_with(100.0, &[(0.0, 10.0, 30.0), (30.0, 0.0, 60.0)]);
        assert!(short.check_invariants().is_err());
    }

    #[test]
    fn pit_policy_codes_round_trip() {
        assert_eq!(PitPolicy::from_code("Flanked"), Some(PitPolicy::Flanked));
        assert_eq!(PitPolicy::from_code(" peak "), Some(PitPolicy::Peak));
        assert_eq!(PitPolicy::from_code("valley"), None);
        assert_eq!(PitPolicy::Peak.code(), "peak");
    }

    mod proptest_normalize {
        use super::*;
        use proptest::prelude::*;

        fn policy_strategy() -> impl Strategy<Value = PitPolicy> {
            prop_oneof![Just(PitPolicy::Flanked), Just(PitPolicy::Peak)]
        }

        proptest! {
            #[test]
            fn normalized_profile_keeps_no_pits(
                dims in prop::collection::vec((1u32..=120, 1u32..=40), 1..80),
                policy in policy_strategy(),
            ) {
                let config = SkylineConfig::builder().pit_policy(policy).build();
                let mut packer = SkylinePacker::with_config(100.0, config);

                for (w, h) in dims {
                    let size = Size::new(f64::from(w).min(100.0), f64::from(h));
                    if !packer.profile().is_empty() {
                        packer.normalize(size).unwrap();
                        // Unter drei Segmenten wird nicht aufgefüllt
                        if packer.profile().len() >= 3 {
                            prop_assert!(packer.find_pits(size.height).is_empty());
                        }
                        prop_assert!(packer.check_invariants().is_ok());
                    }
                    packer.insert(size).unwrap();
                }
            }
        }
    }
}
