use crate::classify::QuantileScale;
use crate::config::AppConfig;
use crate::data::Inputs;
use crate::project::Albers;
use crate::types::{Attribute, StatRecord};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::fs;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unrendered,
    Rendered,
}

/// Owns the one piece of shared mutable state in the system: which
/// attribute is currently expressed. Every render reads it from here, never
/// from a captured copy, so the map and chart cannot desynchronize after a
/// selection change.
#[derive(Debug)]
pub struct ViewSession {
    expressed: Attribute,
    phase: Phase,
}

impl ViewSession {
    pub fn new() -> Self {
        ViewSession {
            expressed: Attribute::initial(),
            phase: Phase::Unrendered,
        }
    }

    pub fn expressed(&self) -> Attribute {
        self.expressed
    }

    /// First render: draw every region and every bar once, then the session
    /// is live. Unrendered -> Rendered.
    pub fn initial_render(&mut self, inputs: &Inputs, config: &AppConfig) -> Result<()> {
        let views = render_views(inputs, config, self.expressed);
        write_current(config, &views)?;
        self.phase = Phase::Rendered;
        info!(attribute = %self.expressed, "Initial render complete");
        Ok(())
    }

    /// SelectionChanged command: update the expressed attribute, then
    /// reclassify and redraw both views. Rendered -> Rendered, idempotent.
    /// The state update strictly precedes the render so nothing can read a
    /// stale attribute.
    pub fn change_attribute(
        &mut self,
        attr: Attribute,
        inputs: &Inputs,
        config: &AppConfig,
    ) -> Result<()> {
        anyhow::ensure!(
            self.phase == Phase::Rendered,
            "selection change before initial render"
        );
        self.expressed = attr;
        let views = render_views(inputs, config, self.expressed);
        write_current(config, &views)?;
        info!(attribute = %self.expressed, "Re-rendered for new attribute");
        Ok(())
    }
}

impl Default for ViewSession {
    fn default() -> Self {
        Self::new()
    }
}

/// A rendered map/chart pair. Pure output of (inputs, config, attribute);
/// writing it anywhere is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedViews {
    pub map_svg: String,
    pub chart_svg: String,
}

pub fn render_views(inputs: &Inputs, config: &AppConfig, expressed: Attribute) -> RenderedViews {
    let scale = QuantileScale::from_records(&inputs.records, expressed, &config.palette.classes);
    RenderedViews {
        map_svg: render_map(inputs, config, &scale, expressed),
        chart_svg: render_chart(&inputs.records, config, &scale, expressed),
    }
}

/// Pre-render the map/chart pair for every attribute, in parallel. `serve`
/// only ever rewrites the pair for the live selection; this gives `generate`
/// a full set up front.
pub fn pregenerate_all(inputs: &Inputs, config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.output.svg_dir).context("Failed to create SVG output directory")?;

    Attribute::ALL.par_iter().try_for_each(|attr| {
        let views = render_views(inputs, config, *attr);
        fs::write(
            config.output.svg_dir.join(format!("map-{attr}.svg")),
            &views.map_svg,
        )?;
        fs::write(
            config.output.svg_dir.join(format!("chart-{attr}.svg")),
            &views.chart_svg,
        )?;
        info!(attribute = %attr, "Rendered view pair");
        Ok(())
    })
}

fn write_current(config: &AppConfig, views: &RenderedViews) -> Result<()> {
    fs::create_dir_all(&config.output.svg_dir).context("Failed to create SVG output directory")?;
    fs::write(config.output.svg_dir.join("map.svg"), &views.map_svg)
        .context("Failed to write map.svg")?;
    fs::write(config.output.svg_dir.join("chart.svg"), &views.chart_svg)
        .context("Failed to write chart.svg")?;
    Ok(())
}

fn render_map(
    inputs: &Inputs,
    config: &AppConfig,
    scale: &QuantileScale,
    expressed: Attribute,
) -> String {
    let map = &config.map;
    let palette = &config.palette;
    let proj = Albers::new(map);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="map" width="{}" height="{}">"#,
        map.width, map.height
    );
    push_transition_style(&mut svg, config.chart.transition_ms);

    for line in proj.graticule(map.graticule_step) {
        let _ = write!(
            svg,
            r##"<path class="gratLines" d="{line}" fill="none" stroke="#999" stroke-width="0.3"/>"##
        );
    }

    // Background boundaries: drawn once, never joined or recolored.
    for geometry in &inputs.background {
        let _ = write!(
            svg,
            r##"<path class="countries" d="{}" fill="#e8e8e8" stroke="#fff" stroke-width="0.5"/>"##,
            proj.path_data(geometry)
        );
    }

    for region in &inputs.regions {
        let fill = match region.value(expressed) {
            Some(v) => scale.color(v),
            None => palette.no_data.as_str(),
        };
        let _ = write!(
            svg,
            r#"<path class="region {}" d="{}" fill="{}" stroke="{}" stroke-width="{}"/>"#,
            region.code,
            proj.path_data(&region.geometry),
            fill,
            palette.region_stroke,
            palette.region_stroke_width
        );
    }

    svg.push_str("</svg>");
    svg
}

fn render_chart(
    records: &[StatRecord],
    config: &AppConfig,
    scale: &QuantileScale,
    expressed: Attribute,
) -> String {
    let chart = &config.chart;
    let palette = &config.palette;
    let inner_w = chart.inner_width();
    let inner_h = chart.inner_height();
    let pad = chart.top_bottom_padding;

    // Domain top carries 10% headroom over the largest expressed value so
    // the tallest bar never touches the frame. Missing values contribute
    // nothing to the domain.
    let max = records
        .iter()
        .filter_map(|r| r.value(expressed))
        .fold(0.0_f64, f64::max);
    let domain_max = max * 1.1;

    let ordered = bar_order(records, expressed);
    let slot = inner_w / records.len().max(1) as f64;
    let bar_w = slot - 1.0;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" class="chart" width="{}" height="{}">"#,
        chart.width, chart.height
    );
    push_transition_style(&mut svg, chart.transition_ms);

    let _ = write!(
        svg,
        r##"<rect class="chartBackground" x="{}" y="{}" width="{}" height="{}" fill="#f7f7f7"/>"##,
        chart.left_padding, pad, inner_w, inner_h
    );

    for (i, record) in ordered.iter().enumerate() {
        let (y, height, fill) = match record.value(expressed) {
            Some(v) => {
                let y = scale_y(v, domain_max, inner_h);
                (y + pad, inner_h - y, scale.color(v))
            }
            // No data: zero-height bar at the baseline, fallback gray.
            None => (inner_h + pad, 0.0, palette.no_data.as_str()),
        };
        let x = i as f64 * slot + chart.left_padding;
        let _ = write!(
            svg,
            r#"<rect class="bar {}" x="{x:.2}" y="{y:.2}" width="{bar_w:.2}" height="{height:.2}" fill="{fill}"/>"#,
            record.code
        );
    }

    let _ = write!(
        svg,
        r#"<text class="chartTitle" x="40" y="40">Number of Variable {expressed} in each region</text>"#
    );

    push_axis(&mut svg, chart.left_padding, pad, inner_h, domain_max);

    let _ = write!(
        svg,
        r##"<rect class="chartFrame" x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#999"/>"##,
        chart.left_padding, pad, inner_w, inner_h
    );

    svg.push_str("</svg>");
    svg
}

/// Records in bar order: descending by expressed value, records with no
/// usable value after all numeric ones. Ordering among the valueless is
/// left to sort stability.
pub fn bar_order<'a>(records: &'a [StatRecord], expressed: Attribute) -> Vec<&'a StatRecord> {
    let mut ordered: Vec<&StatRecord> = records.iter().collect();
    ordered.sort_by(|a, b| match (a.value(expressed), b.value(expressed)) {
        (Some(va), Some(vb)) => vb.partial_cmp(&va).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ordered
}

/// Linear y scale: range [inner_height, 0] over domain [0, domain_max].
fn scale_y(value: f64, domain_max: f64, inner_h: f64) -> f64 {
    if domain_max <= 0.0 {
        return inner_h;
    }
    inner_h * (1.0 - value / domain_max)
}

fn push_transition_style(svg: &mut String, transition_ms: u32) {
    // Re-rendered documents swap in with an animated fill/position change
    // instead of a snap. A newer render simply overwrites the target of an
    // older one.
    let _ = write!(
        svg,
        "<style>.region,.bar{{transition:fill {ms}ms,y {ms}ms,height {ms}ms;}}</style>",
        ms = transition_ms
    );
}

fn push_axis(svg: &mut String, left: f64, pad: f64, inner_h: f64, domain_max: f64) {
    const TICKS: usize = 5;
    let _ = write!(
        svg,
        r##"<g class="axis"><line x1="{left}" y1="{pad}" x2="{left}" y2="{}" stroke="#333"/>"##,
        pad + inner_h
    );
    for i in 0..=TICKS {
        let value = domain_max * i as f64 / TICKS as f64;
        let y = scale_y(value, domain_max, inner_h) + pad;
        let _ = write!(
            svg,
            r##"<line x1="{}" y1="{y:.2}" x2="{left}" y2="{y:.2}" stroke="#333"/><text x="{}" y="{y:.2}" text-anchor="end" font-size="10">{value:.0}</text>"##,
            left - 6.0,
            left - 8.0
        );
    }
    svg.push_str("</g>");
}
