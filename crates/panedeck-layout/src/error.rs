use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Unknown layout: {0}")]
    UnknownLayout(String),
    #[error("Unknown panel: {0}")]
    UnknownPanel(String),
    #[error("Expected {expected} ratios, got {actual}")]
    RatioCountMismatch { expected: usize, actual: usize },
}

impl LayoutError {
    pub fn suggestion(&self) -> String {
        match self {
            LayoutError::UnknownLayout(_) => format!(
                "Use one of: {}",
                crate::LAYOUT_TEMPLATES
                    .iter()
                    .map(|t| t.id)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            LayoutError::UnknownPanel(_) => {
                "Use 'layout.get' to list the panels of the current layout.".to_string()
            }
            LayoutError::RatioCountMismatch { .. } => {
                "Send exactly one ratio per panel.".to_string()
            }
        }
    }
}
