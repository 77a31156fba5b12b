use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    Horizontal,
    Vertical,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTemplate {
    pub id: &'static str,
    pub direction: SplitDirection,
    pub panel_count: usize,
}

pub static LAYOUT_TEMPLATES: [LayoutTemplate; 6] = [
    LayoutTemplate {
        id: "single",
        direction: SplitDirection::Horizontal,
        panel_count: 1,
    },
    LayoutTemplate {
        id: "horizontal-2",
        direction: SplitDirection::Horizontal,
        panel_count: 2,
    },
    LayoutTemplate {
        id: "vertical-2",
        direction: SplitDirection::Vertical,
        panel_count: 2,
    },
    LayoutTemplate {
        id: "horizontal-3",
        direction: SplitDirection::Horizontal,
        panel_count: 3,
    },
    LayoutTemplate {
        id: "vertical-3",
        direction: SplitDirection::Vertical,
        panel_count: 3,
    },
    LayoutTemplate {
        id: "grid-4",
        direction: SplitDirection::Grid,
        panel_count: 4,
    },
];

pub fn find_template(id: &str) -> Option<&'static LayoutTemplate> {
    LAYOUT_TEMPLATES.iter().find(|t| t.id == id)
}

pub fn panel_id(index: usize) -> String {
    format!("panel-{index}")
}
