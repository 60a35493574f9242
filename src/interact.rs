use crate::config::PaletteConfig;
use crate::types::{Attribute, Region};
use serde::Serialize;
use std::collections::HashMap;

/// Which rendered view an element lives in. Highlighting is linked: one
/// hovered key lights up its element in both views at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Map,
    Chart,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ElementKey {
    pub view: View,
    pub code: String,
}

impl ElementKey {
    fn both(code: &str) -> [ElementKey; 2] {
        [
            ElementKey {
                view: View::Map,
                code: code.to_string(),
            },
            ElementKey {
                view: View::Chart,
                code: code.to_string(),
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleSnapshot {
    pub stroke: String,
    pub stroke_width: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StyledElement {
    pub key: ElementKey,
    pub style: StyleSnapshot,
}

/// Style side table for linked highlighting. Instead of reading styles back
/// out of the rendered output, the prior style of every touched element is
/// captured here on hover and handed back verbatim on leave. Elements keep
/// whatever style they had, not a single default.
#[derive(Debug, Default)]
pub struct HighlightState {
    saved: HashMap<ElementKey, StyleSnapshot>,
}

impl HighlightState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emphasize every element sharing `code` across both views. Saves each
    /// element's current style first and returns the emphasis style to apply.
    pub fn highlight(
        &mut self,
        code: &str,
        current: &StyleSnapshot,
        palette: &PaletteConfig,
    ) -> Vec<StyledElement> {
        ElementKey::both(code)
            .into_iter()
            .map(|key| {
                self.saved.entry(key.clone()).or_insert_with(|| current.clone());
                StyledElement {
                    key,
                    style: StyleSnapshot {
                        stroke: palette.highlight_stroke.clone(),
                        stroke_width: palette.highlight_stroke_width,
                    },
                }
            })
            .collect()
    }

    /// Restore the exact styles captured when `code` was highlighted. The
    /// saved entries are consumed; a leave without a prior hover restores
    /// nothing.
    pub fn dehighlight(&mut self, code: &str) -> Vec<StyledElement> {
        ElementKey::both(code)
            .into_iter()
            .filter_map(|key| {
                self.saved
                    .remove(&key)
                    .map(|style| StyledElement { key, style })
            })
            .collect()
    }

    pub fn is_highlighted(&self, code: &str) -> bool {
        ElementKey::both(code).iter().any(|k| self.saved.contains_key(k))
    }
}

/// Content of the floating label shown while hovering: the expressed value
/// (or "no data"), the attribute, and the region's display name.
#[derive(Debug, Clone, Serialize)]
pub struct InfoLabel {
    pub code: String,
    pub name: String,
    pub attribute: Attribute,
    pub value: Option<f64>,
}

impl InfoLabel {
    pub fn for_region(region: &Region, expressed: Attribute) -> Self {
        InfoLabel {
            code: region.code.clone(),
            name: region.display_name().to_string(),
            attribute: expressed,
            value: region.value(expressed),
        }
    }

    pub fn value_text(&self) -> String {
        match self.value {
            Some(v) => format!("{v}"),
            None => "no data".to_string(),
        }
    }
}

/// Top-left corner for the floating label, following the pointer. The label
/// sits right of and above the pointer; it flips left when within
/// `label_width + 20` px of the right viewport edge and flips below when
/// within 75 px of the top edge, so it is never clipped off-screen.
pub fn place_label(
    pointer: (f64, f64),
    viewport: (f64, f64),
    label_width: f64,
) -> (f64, f64) {
    let (px, py) = pointer;
    let (vw, _vh) = viewport;

    let x = if px > vw - label_width - 20.0 {
        px - label_width - 10.0
    } else {
        px + 10.0
    };
    let y = if py < 75.0 { py + 25.0 } else { py - 75.0 };

    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn palette() -> PaletteConfig {
        PaletteConfig {
            classes: vec!["#D4B9DA".into()],
            no_data: "#ccc".into(),
            region_stroke: "#000".into(),
            region_stroke_width: 0.5,
            highlight_stroke: "blue".into(),
            highlight_stroke_width: 2.0,
        }
    }

    fn default_style() -> StyleSnapshot {
        StyleSnapshot {
            stroke: "#000".into(),
            stroke_width: 0.5,
        }
    }

    #[test]
    fn highlight_covers_both_views() {
        let mut state = HighlightState::new();
        let styled = state.highlight("FR-A", &default_style(), &palette());
        assert_eq!(styled.len(), 2);
        let views: Vec<View> = styled.iter().map(|s| s.key.view).collect();
        assert!(views.contains(&View::Map));
        assert!(views.contains(&View::Chart));
        assert!(styled.iter().all(|s| s.style.stroke == "blue"));
        assert!(state.is_highlighted("FR-A"));
    }

    #[test]
    fn dehighlight_restores_captured_styles_per_element() {
        let mut state = HighlightState::new();
        let prior = StyleSnapshot {
            stroke: "#123".into(),
            stroke_width: 1.5,
        };
        state.highlight("FR-A", &prior, &palette());
        let restored = state.dehighlight("FR-A");
        assert_eq!(restored.len(), 2);
        assert!(restored.iter().all(|s| s.style == prior));
        assert!(!state.is_highlighted("FR-A"));
        // A second leave has nothing left to restore.
        assert!(state.dehighlight("FR-A").is_empty());
    }

    #[test]
    fn untouched_regions_are_not_in_the_side_table() {
        let mut state = HighlightState::new();
        state.highlight("FR-A", &default_style(), &palette());
        assert!(!state.is_highlighted("FR-B"));
        assert!(state.dehighlight("FR-B").is_empty());
    }

    #[test]
    fn label_sits_right_of_and_above_pointer() {
        let (x, y) = place_label((300.0, 400.0), (1200.0, 800.0), 100.0);
        assert_eq!((x, y), (310.0, 325.0));
    }

    #[test]
    fn label_flips_left_near_right_edge() {
        // threshold: pointer.x > vw - label_width - 20
        let vw = 1200.0;
        let w = 100.0;
        let (x, _) = place_label((vw - w - 19.0, 400.0), (vw, 800.0), w);
        assert_eq!(x, vw - w - 19.0 - w - 10.0);
        let (x, _) = place_label((vw - w - 21.0, 400.0), (vw, 800.0), w);
        assert_eq!(x, vw - w - 21.0 + 10.0);
    }

    #[test]
    fn label_flips_below_near_top_edge() {
        let (_, y) = place_label((300.0, 74.0), (1200.0, 800.0), 100.0);
        assert_eq!(y, 74.0 + 25.0);
        let (_, y) = place_label((300.0, 75.0), (1200.0, 800.0), 100.0);
        assert_eq!(y, 75.0 - 75.0);
    }

    #[test]
    fn label_reports_no_data_for_missing_values() {
        let region = Region {
            code: "FR-Z".into(),
            name: Some("Zone".into()),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
            ]]),
            attrs: Default::default(),
        };
        let label = InfoLabel::for_region(&region, Attribute::VarA);
        assert_eq!(label.value_text(), "no data");
        assert_eq!(label.name, "Zone");
    }
}
