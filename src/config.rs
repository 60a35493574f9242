use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub map: MapConfig,
    pub chart: ChartConfig,
    pub palette: PaletteConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Target regions geometry (.geojson or .shp) — joined, colored, interactive.
    pub regions: PathBuf,
    /// Background reference boundaries, rendered once and undecorated.
    pub background: PathBuf,
    pub stats_csv: PathBuf,
    /// Key column name, shared by the CSV and the geometry properties.
    pub join_column: String,
    pub name_column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    pub width: f64,
    pub height: f64,
    /// Albers equal-area conic parameters.
    pub center_lon: f64,
    pub center_lat: f64,
    pub parallel_lower: f64,
    pub parallel_upper: f64,
    pub scale: f64,
    /// Graticule spacing in degrees.
    pub graticule_step: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    pub width: f64,
    pub height: f64,
    pub left_padding: f64,
    pub right_padding: f64,
    pub top_bottom_padding: f64,
    /// Visual transition length applied on re-render, in milliseconds.
    pub transition_ms: u32,
}

impl ChartConfig {
    pub fn inner_width(&self) -> f64 {
        self.width - self.left_padding - self.right_padding
    }

    pub fn inner_height(&self) -> f64 {
        self.height - self.top_bottom_padding * 2.0
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaletteConfig {
    /// Ordered class colors, low to high. Quantile classification uses
    /// exactly this many classes.
    pub classes: Vec<String>,
    pub no_data: String,
    pub region_stroke: String,
    pub region_stroke_width: f64,
    pub highlight_stroke: String,
    pub highlight_stroke_width: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub svg_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        if config.palette.classes.is_empty() {
            anyhow::bail!("palette.classes must list at least one color");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r##"
[input]
regions = "data/FranceRegions.geojson"
background = "data/EuropeCountries.geojson"
stats_csv = "data/unitsData.csv"
join_column = "adm1_code"
name_column = "name"

[map]
width = 700.0
height = 460.0
center_lon = 2.0
center_lat = 46.2
parallel_lower = 43.0
parallel_upper = 62.0
scale = 2500.0
graticule_step = 5.0

[chart]
width = 550.0
height = 473.0
left_padding = 25.0
right_padding = 2.0
top_bottom_padding = 5.0
transition_ms = 1000

[palette]
classes = ["#D4B9DA", "#C994C7", "#DF65B0", "#DD1C77", "#980043"]
no_data = "#ccc"
region_stroke = "#000"
region_stroke_width = 0.5
highlight_stroke = "blue"
highlight_stroke_width = 2.0

[output]
svg_dir = "output"

[server]
port = 3000
"##;

    #[test]
    fn sample_config_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.palette.classes.len(), 5);
        assert_eq!(config.chart.transition_ms, 1000);
        assert!((config.chart.inner_width() - 523.0).abs() < 1e-9);
        assert!((config.chart.inner_height() - 463.0).abs() < 1e-9);
    }

    #[test]
    fn empty_palette_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let broken = SAMPLE.replace(
            r##"classes = ["#D4B9DA", "#C994C7", "#DF65B0", "#DD1C77", "#980043"]"##,
            "classes = []",
        );
        file.write_all(broken.as_bytes()).unwrap();
        assert!(AppConfig::load_from_file(file.path()).is_err());
    }
}
