use std::collections::BTreeSet;

use shared::domain::LeadId;

/// Rows checked for a bulk action. Only ever holds IDs of rendered rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<LeadId>,
}

impl Selection {
    pub fn toggle(&mut self, id: LeadId) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    /// Selects exactly `visible`, or clears when all of it is already selected.
    pub fn toggle_all(&mut self, visible: &[LeadId]) {
        let all_selected =
            !visible.is_empty() && visible.iter().all(|id| self.ids.contains(id));
        self.ids.clear();
        if !all_selected {
            self.ids.extend(visible.iter().copied());
        }
    }

    pub fn retain_visible(&mut self, visible: &[LeadId]) {
        self.ids.retain(|id| visible.contains(id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: LeadId) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> Vec<LeadId> {
        self.ids.iter().copied().collect()
    }
}
