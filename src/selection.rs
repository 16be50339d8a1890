use std::collections::BTreeSet;

use tracing::trace;

use crate::domain::RowId;

/// How the current selection is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// `explicit_ids` holds the selected rows.
    Explicit,
    /// Every row in the current universe is selected except `except_ids`,
    /// including rows not yet fetched locally.
    AllExcept,
}

/// Row selection across server pages.
///
/// "Select all" flips into an inversion representation that stores only the
/// exceptions, so selecting a million-row universe never materializes a
/// million ids. The set that does not belong to the current mode is always
/// empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTracker {
    mode: SelectionMode,
    explicit_ids: BTreeSet<RowId>,
    except_ids: BTreeSet<RowId>,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        SelectionTracker {
            mode: SelectionMode::Explicit,
            explicit_ids: BTreeSet::new(),
            except_ids: BTreeSet::new(),
        }
    }
}

impl SelectionTracker {
    pub fn new() -> Self {
        SelectionTracker::default()
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    fn check_invariant(&self) {
        debug_assert!(
            match self.mode {
                SelectionMode::Explicit => self.except_ids.is_empty(),
                SelectionMode::AllExcept => self.explicit_ids.is_empty(),
            },
            "selection set active outside its mode"
        );
    }

    pub fn is_selected(&self, id: &RowId) -> bool {
        self.check_invariant();
        match self.mode {
            SelectionMode::Explicit => self.explicit_ids.contains(id),
            SelectionMode::AllExcept => !self.except_ids.contains(id),
        }
    }

    /// Flip one row. In all-except mode this toggles membership in the
    /// exception set, so an excepted row becomes selected again.
    pub fn toggle_row(&mut self, id: RowId) {
        self.check_invariant();
        let set = match self.mode {
            SelectionMode::Explicit => &mut self.explicit_ids,
            SelectionMode::AllExcept => &mut self.except_ids,
        };
        if !set.remove(&id) {
            set.insert(id);
        }
    }

    /// Switch modes: turning select-all on means the whole filtered/sorted
    /// universe with no exceptions; turning it off empties the selection.
    pub fn toggle_select_all(&mut self) {
        self.check_invariant();
        match self.mode {
            SelectionMode::Explicit => {
                self.mode = SelectionMode::AllExcept;
                self.explicit_ids.clear();
                self.except_ids.clear();
            }
            SelectionMode::AllExcept => {
                self.mode = SelectionMode::Explicit;
                self.explicit_ids.clear();
                self.except_ids.clear();
            }
        }
        trace!(mode = ?self.mode, "select-all toggled");
    }

    pub fn selected_count(&self, universe_size: usize) -> usize {
        self.check_invariant();
        match self.mode {
            SelectionMode::Explicit => self.explicit_ids.len(),
            SelectionMode::AllExcept => universe_size.saturating_sub(self.except_ids.len()),
        }
    }

    /// Must be called whenever a filter or search change redefines what
    /// "all rows" means. A select-all taken under one filter must not leak
    /// rows that only become visible once that filter is relaxed.
    pub fn on_universe_changed(&mut self) {
        self.mode = SelectionMode::Explicit;
        self.explicit_ids.clear();
        self.except_ids.clear();
    }

    /// The callback payload: ids that are NOT selected. A pure projection of
    /// the model: in all-except mode it is the exception set itself, in
    /// explicit mode it is the loaded rows minus the selected ones.
    pub fn unselected_ids(&self, loaded: &[RowId]) -> Vec<RowId> {
        self.check_invariant();
        match self.mode {
            SelectionMode::AllExcept => self.except_ids.iter().cloned().collect(),
            SelectionMode::Explicit => loaded
                .iter()
                .filter(|id| !self.explicit_ids.contains(*id))
                .cloned()
                .collect(),
        }
    }
}
