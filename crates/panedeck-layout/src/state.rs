use panedeck_common::TerminalId;
use serde::Deserialize;
use serde::Serialize;

use crate::LayoutError;
use crate::RATIO_TOTAL;
use crate::SplitDirection;
use crate::find_template;
use crate::panel_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSlot {
    pub panel_id: String,
    pub assigned_terminal_id: Option<TerminalId>,
    pub ratio: f64,
}

/// Panels of the current split layout, in display order.
///
/// Ratios always sum to [`RATIO_TOTAL`] after any mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitLayoutState {
    layout_id: String,
    direction: SplitDirection,
    panels: Vec<PanelSlot>,
    active_panel: Option<String>,
}

impl Default for SplitLayoutState {
    fn default() -> Self {
        Self::build("single", SplitDirection::Horizontal, 1, Vec::new())
    }
}

impl SplitLayoutState {
    pub fn new(layout_id: &str) -> Result<Self, LayoutError> {
        let template =
            find_template(layout_id).ok_or_else(|| LayoutError::UnknownLayout(layout_id.into()))?;
        Ok(Self::build(
            template.id,
            template.direction,
            template.panel_count,
            Vec::new(),
        ))
    }

    fn build(
        layout_id: &str,
        direction: SplitDirection,
        panel_count: usize,
        carried: Vec<TerminalId>,
    ) -> Self {
        let mut carried = carried.into_iter();
        let ratios = equal_split(panel_count);
        let panels: Vec<PanelSlot> = ratios
            .into_iter()
            .enumerate()
            .map(|(index, ratio)| PanelSlot {
                panel_id: panel_id(index),
                assigned_terminal_id: carried.next(),
                ratio,
            })
            .collect();
        let active_panel = panels.first().map(|p| p.panel_id.clone());
        Self {
            layout_id: layout_id.to_string(),
            direction,
            panels,
            active_panel,
        }
    }

    pub fn layout_id(&self) -> &str {
        &self.layout_id
    }

    pub fn direction(&self) -> SplitDirection {
        self.direction
    }

    pub fn panels(&self) -> &[PanelSlot] {
        &self.panels
    }

    pub fn active_panel(&self) -> Option<&str> {
        self.active_panel.as_deref()
    }

    pub fn ratios(&self) -> Vec<f64> {
        self.panels.iter().map(|p| p.ratio).collect()
    }

    pub fn panel(&self, panel_id: &str) -> Option<&PanelSlot> {
        self.panels.iter().find(|p| p.panel_id == panel_id)
    }

    pub fn panel_for_terminal(&self, terminal: &TerminalId) -> Option<&PanelSlot> {
        self.panels
            .iter()
            .find(|p| p.assigned_terminal_id.as_ref() == Some(terminal))
    }

    pub fn assigned_terminals(&self) -> impl Iterator<Item = &TerminalId> {
        self.panels
            .iter()
            .filter_map(|p| p.assigned_terminal_id.as_ref())
    }

    /// Switches to another template, carrying assigned terminals over in order.
    ///
    /// The Nth assigned terminal lands in the Nth new panel; surplus
    /// assignments are dropped and extra panels start empty. The active
    /// panel resets to the first slot.
    pub fn select_layout(&mut self, layout_id: &str) -> Result<(), LayoutError> {
        let template =
            find_template(layout_id).ok_or_else(|| LayoutError::UnknownLayout(layout_id.into()))?;
        let carried: Vec<TerminalId> = self.assigned_terminals().cloned().collect();
        *self = Self::build(
            template.id,
            template.direction,
            template.panel_count,
            carried,
        );
        Ok(())
    }

    pub fn assign(
        &mut self,
        panel_id: &str,
        terminal: Option<TerminalId>,
    ) -> Result<(), LayoutError> {
        let slot = self.slot_mut(panel_id)?;
        slot.assigned_terminal_id = terminal;
        Ok(())
    }

    /// Drops `terminal` onto `target_panel`.
    ///
    /// The slot that previously showed `terminal`, if any, receives whatever
    /// the target showed before, so no terminal is orphaned.
    pub fn swap(&mut self, terminal: &TerminalId, target_panel: &str) -> Result<(), LayoutError> {
        let target = self.index_of(target_panel)?;
        let source = self
            .panels
            .iter()
            .position(|p| p.assigned_terminal_id.as_ref() == Some(terminal));

        if source == Some(target) {
            return Ok(());
        }

        let previous = self.panels[target]
            .assigned_terminal_id
            .replace(terminal.clone());
        if let Some(source) = source {
            self.panels[source].assigned_terminal_id = previous;
        }
        Ok(())
    }

    /// Applies ratios positionally and renormalizes them to sum to 100.
    ///
    /// Non-finite and negative values count as zero. If nothing positive
    /// remains the panels are split equally.
    pub fn update_ratios(&mut self, ratios: &[f64]) -> Result<(), LayoutError> {
        if ratios.len() != self.panels.len() {
            return Err(LayoutError::RatioCountMismatch {
                expected: self.panels.len(),
                actual: ratios.len(),
            });
        }
        for (slot, ratio) in self.panels.iter_mut().zip(normalize(ratios)) {
            slot.ratio = ratio;
        }
        Ok(())
    }

    pub fn set_active_panel(&mut self, panel_id: &str) -> Result<(), LayoutError> {
        let index = self.index_of(panel_id)?;
        self.active_panel = Some(self.panels[index].panel_id.clone());
        Ok(())
    }

    fn index_of(&self, panel_id: &str) -> Result<usize, LayoutError> {
        self.panels
            .iter()
            .position(|p| p.panel_id == panel_id)
            .ok_or_else(|| LayoutError::UnknownPanel(panel_id.to_string()))
    }

    fn slot_mut(&mut self, panel_id: &str) -> Result<&mut PanelSlot, LayoutError> {
        let index = self.index_of(panel_id)?;
        Ok(&mut self.panels[index])
    }
}

fn equal_split(count: usize) -> Vec<f64> {
    normalize(&vec![1.0; count])
}

fn normalize(ratios: &[f64]) -> Vec<f64> {
    let Some(last_index) = ratios.len().checked_sub(1) else {
        return Vec::new();
    };
    let cleaned: Vec<f64> = ratios
        .iter()
        .map(|r| if r.is_finite() && *r > 0.0 { *r } else { 0.0 })
        .collect();
    let total: f64 = cleaned.iter().sum();
    let weights = if total > 0.0 && total.is_finite() {
        cleaned
    } else {
        vec![1.0; ratios.len()]
    };
    let total: f64 = weights.iter().sum();

    let mut out: Vec<f64> = weights.iter().map(|w| w / total * RATIO_TOTAL).collect();
    // The last panel absorbs rounding drift.
    let head: f64 = out[..last_index].iter().sum();
    out[last_index] = (RATIO_TOTAL - head).max(0.0);
    out
}
