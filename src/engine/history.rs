use super::EditorState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateTag {
    #[default]
    Default,
    /// Folds the change into the most recent undo entry.
    HistoryMerge,
    /// Leaves the undo stack untouched.
    SkipHistory,
}

/// Undo/redo stacks of committed states.
#[derive(Clone, Debug)]
pub struct History {
    undo: Vec<EditorState>,
    redo: Vec<EditorState>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Records `previous` as the state to return to before a tagged commit.
    pub fn record(&mut self, previous: EditorState, tag: UpdateTag) {
        match tag {
            UpdateTag::Default => {
                self.undo.push(previous);
                if self.undo.len() > self.limit {
                    self.undo.remove(0);
                }
                self.redo.clear();
            }
            UpdateTag::HistoryMerge | UpdateTag::SkipHistory => {}
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo(&mut self, current: EditorState) -> Option<EditorState> {
        let previous = self.undo.pop()?;
        self.redo.push(current);
        Some(previous)
    }

    pub fn redo(&mut self, current: EditorState) -> Option<EditorState> {
        let next = self.redo.pop()?;
        self.undo.push(current);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
