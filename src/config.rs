use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ratatui::style::Color;
use serde::Deserialize;

use crate::map::gesture::DRAG_SENSITIVITY;
use crate::map::renderer::{MarkerIcon, Palette};
use crate::map::view::ViewSettings;

/// Regions smaller than this (steradians) get a pin when they have a label
/// position. Roughly a 0.9° x 0.9° square at the equator.
pub const DEFAULT_MARKER_AREA_THRESHOLD: f64 = 2.5e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MapMode {
    /// Orthographic world globe
    Globe,
    /// Albers conic map of the United States
    Usa,
}

/// Which way auto-rotate spins. Written as `1` or `-1` in config files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i8")]
pub enum RotateDirection {
    Forward,
    Reverse,
}

impl RotateDirection {
    pub fn sign(self) -> f64 {
        match self {
            RotateDirection::Forward => 1.0,
            RotateDirection::Reverse => -1.0,
        }
    }
}

impl TryFrom<i8> for RotateDirection {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(RotateDirection::Forward),
            -1 => Ok(RotateDirection::Reverse),
            other => Err(format!("direction must be 1 or -1, got {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct AutoRotate {
    /// Milliseconds between one-degree steps
    pub speed_ms: u64,
    #[serde(default = "default_direction")]
    pub direction: RotateDirection,
}

fn default_direction() -> RotateDirection {
    RotateDirection::Forward
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MarkerAsset {
    /// Directory the icon is looked up in
    pub base_path: PathBuf,
    pub icon: String,
    /// Terminal stand-in for the icon image
    pub glyph: char,
}

impl Default for MarkerAsset {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("assets"),
            icon: "pin.svg".to_string(),
            glyph: '●',
        }
    }
}

impl MarkerAsset {
    pub fn icon(&self) -> MarkerIcon {
        MarkerIcon {
            source: self.base_path.join(&self.icon),
            glyph: self.glyph,
        }
    }
}

/// Colour names as ratatui parses them (`green`, `lightblue`, `#ffcc00`, ...)
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub default_fill: String,
    pub selected_fill: String,
    pub border: String,
    pub marker: String,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            default_fill: "green".to_string(),
            selected_fill: "yellow".to_string(),
            border: "gray".to_string(),
            marker: "red".to_string(),
        }
    }
}

impl PaletteConfig {
    pub fn palette(&self) -> Result<Palette> {
        let color = |field: &str, raw: &str| {
            Color::from_str(raw).map_err(|_| anyhow::anyhow!("palette.{field}: unknown colour {raw:?}"))
        };
        Ok(Palette {
            default_fill: color("default_fill", &self.default_fill)?,
            selected_fill: color("selected_fill", &self.selected_fill)?,
            border: color("border", &self.border)?,
            marker: color("marker", &self.marker)?,
        })
    }
}

/// Everything the viewer can be told before it starts. Read from TOML, then
/// overridden by command line flags.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub mode: MapMode,
    /// GeoJSON dataset; the built-in sample is used when absent
    pub data: Option<PathBuf>,
    /// Region selected at startup
    pub selected: Option<String>,
    pub show_borders: bool,
    pub show_markers: bool,
    pub show_zoom_controls: bool,
    pub auto_rotate: Option<AutoRotate>,
    pub sensitivity: f64,
    pub marker_area_threshold: f64,
    /// Zoom (relative to the fitted scale) a selected region is shown at;
    /// depends on the mode when unset
    pub min_focus_zoom: Option<f64>,
    pub marker: MarkerAsset,
    pub palette: PaletteConfig,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            mode: MapMode::Globe,
            data: None,
            selected: None,
            show_borders: true,
            show_markers: true,
            show_zoom_controls: true,
            auto_rotate: None,
            sensitivity: DRAG_SENSITIVITY,
            marker_area_threshold: DEFAULT_MARKER_AREA_THRESHOLD,
            min_focus_zoom: None,
            marker: MarkerAsset::default(),
            palette: PaletteConfig::default(),
        }
    }
}

impl ViewConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).context("Invalid view config")
    }

    pub fn min_focus_zoom(&self) -> f64 {
        self.min_focus_zoom.unwrap_or(match self.mode {
            MapMode::Globe => 2.0,
            MapMode::Usa => 1.5,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sensitivity.is_finite() && self.sensitivity > 0.0) {
            bail!("sensitivity must be a positive number, got {}", self.sensitivity);
        }
        if !(self.marker_area_threshold.is_finite() && self.marker_area_threshold > 0.0) {
            bail!(
                "marker_area_threshold must be a positive number, got {}",
                self.marker_area_threshold
            );
        }
        let zoom = self.min_focus_zoom();
        if !(zoom.is_finite() && zoom > 0.0) {
            bail!("min_focus_zoom must be a positive number, got {zoom}");
        }
        if let Some(auto) = self.auto_rotate {
            if auto.speed_ms == 0 {
                bail!("auto_rotate.speed_ms must be greater than zero");
            }
        }
        Ok(())
    }

    /// Validated settings for a map view
    pub fn view_settings(&self) -> Result<ViewSettings> {
        self.validate()?;
        Ok(ViewSettings {
            show_borders: self.show_borders,
            show_markers: self.show_markers,
            show_zoom_controls: self.show_zoom_controls,
            sensitivity: self.sensitivity,
            marker_area_threshold: self.marker_area_threshold,
            min_focus_zoom: self.min_focus_zoom(),
            palette: self.palette.palette()?,
            icon: Arc::new(self.marker.icon()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: ViewConfig = toml::from_str("").unwrap();
        assert_eq!(config.mode, MapMode::Globe);
        assert!(config.show_borders);
        assert_eq!(config.sensitivity, 75.0);
        assert_eq!(config.min_focus_zoom(), 2.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_full_file() {
        let config: ViewConfig = toml::from_str(
            r#"
            mode = "usa"
            show_borders = false
            selected = "New Mexico"
            auto_rotate = { speed_ms = 50, direction = -1 }

            [marker]
            base_path = "/srv/quiz/static"
            icon = "flag.png"

            [palette]
            selected_fill = "lightblue"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, MapMode::Usa);
        assert_eq!(config.min_focus_zoom(), 1.5);
        assert_eq!(config.selected.as_deref(), Some("New Mexico"));
        assert_eq!(
            config.auto_rotate,
            Some(AutoRotate {
                speed_ms: 50,
                direction: RotateDirection::Reverse
            })
        );

        let settings = config.view_settings().unwrap();
        assert!(!settings.show_borders);
        assert_eq!(settings.palette.selected_fill, Color::LightBlue);
        assert_eq!(settings.palette.default_fill, Color::Green);
        assert_eq!(settings.icon.source, PathBuf::from("/srv/quiz/static/flag.png"));
        assert_eq!(settings.icon.glyph, '●');
    }

    #[test]
    fn test_bad_direction_rejected() {
        let parsed: std::result::Result<ViewConfig, _> =
            toml::from_str("auto_rotate = { speed_ms = 50, direction = 2 }");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = ViewConfig {
            auto_rotate: Some(AutoRotate {
                speed_ms: 0,
                direction: RotateDirection::Forward,
            }),
            ..ViewConfig::default()
        };
        assert!(config.validate().is_err());

        config.auto_rotate = None;
        config.sensitivity = f64::NAN;
        assert!(config.validate().is_err());

        config.sensitivity = 75.0;
        config.palette.border = "not-a-colour".to_string();
        assert!(config.view_settings().is_err());
    }
}
