//! Recorded debug history of one attached component.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::{CompiledFilter, Filter, FilterError};
use crate::protocol::SnapshotMeta;
use crate::runtime::ComponentId;
use crate::value::{nullable, Value};

/// One recorded state transition, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalSnapshot {
    pub meta: SnapshotMeta,
    /// Absent for the attach snapshot and injected states; a message that
    /// encoded to null is present as a `Null` value.
    #[serde(default, with = "nullable", skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    /// The state after this transition.
    pub state: Value,
    pub commands: Value,
}

/// Display view of an [`OriginalSnapshot`] under the current filter. Never
/// mutates the original; fields that pruned away entirely are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSnapshot {
    pub meta: SnapshotMeta,
    pub message: Option<Value>,
    pub state: Option<Value>,
    pub commands: Option<Value>,
}

impl OriginalSnapshot {
    fn to_filtered(&self, compiled: Option<&CompiledFilter>) -> Option<FilteredSnapshot> {
        let Some(compiled) = compiled else {
            // Empty filter: the view is the snapshot itself.
            return Some(FilteredSnapshot {
                meta: self.meta.clone(),
                message: self.message.clone(),
                state: Some(self.state.clone()),
                commands: Some(self.commands.clone()),
            });
        };

        let message = self.message.as_ref().and_then(|m| compiled.apply(m));
        let state = compiled.apply(&self.state);
        let commands = compiled.apply(&self.commands);

        if message.is_none() && state.is_none() && commands.is_none() {
            return None;
        }
        Some(FilteredSnapshot {
            meta: self.meta.clone(),
            message,
            state,
            commands,
        })
    }
}

/// Debug-session record for one attached component: its current state, its
/// snapshot history, and the filtered view the debugger displays.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDebugState {
    pub id: ComponentId,
    pub state: Value,
    filter: Filter,
    snapshots: Vec<OriginalSnapshot>,
    filtered: Vec<FilteredSnapshot>,
}

impl ComponentDebugState {
    pub fn new(id: ComponentId, state: Value) -> Self {
        Self {
            id,
            state,
            filter: Filter::empty(),
            snapshots: Vec::new(),
            filtered: Vec::new(),
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn snapshots(&self) -> &[OriginalSnapshot] {
        &self.snapshots
    }

    pub fn filtered_snapshots(&self) -> &[FilteredSnapshot] {
        &self.filtered
    }

    /// Append a snapshot, advancing the current state to the snapshot's
    /// resulting state.
    pub fn append(&mut self, snapshot: OriginalSnapshot) {
        self.state = snapshot.state.clone();
        self.snapshots.push(snapshot);
        self.recompute_filtered();
    }

    /// Install a new filter and recompute the filtered view. An invalid
    /// filter is rejected as a value and leaves the previous filter in place.
    pub fn update_filter(&mut self, filter: Filter) -> Result<(), FilterError> {
        filter.compile()?;
        self.filter = filter;
        self.recompute_filtered();
        Ok(())
    }

    /// Remove the snapshots whose ids appear in `ids`.
    pub fn remove_snapshots(&mut self, ids: &HashSet<Uuid>) {
        self.snapshots.retain(|s| !ids.contains(&s.meta.id));
        self.recompute_filtered();
    }

    /// Drop the whole history, keeping only the current state.
    pub fn clear_snapshots(&mut self) {
        self.snapshots.clear();
        self.recompute_filtered();
    }

    /// The filtered view is always recomputed wholesale from the filter and
    /// the full snapshot list, never patched incrementally.
    fn recompute_filtered(&mut self) {
        let compiled = match self.filter.compile() {
            Ok(compiled) => compiled,
            // The installed filter was validated on the way in; treat a
            // failure here as the empty filter rather than corrupting state.
            Err(_) => None,
        };
        self.filtered = self
            .snapshots
            .iter()
            .filter_map(|s| s.to_filtered(compiled.as_ref()))
            .collect();
        assert!(
            self.filtered.len() <= self.snapshots.len(),
            "filtered snapshot count exceeds history for component {}",
            self.id
        );
    }

    /// Serialize into a self-contained export document.
    pub fn export(&self) -> ExportedComponent {
        ExportedComponent {
            id: self.id.clone(),
            state: self.state.clone(),
            snapshots: self.snapshots.clone(),
        }
    }

    /// Rebuild from an export document. Imported sessions always start
    /// unfiltered.
    pub fn import(doc: ExportedComponent) -> Self {
        let mut imported = Self {
            id: doc.id,
            state: doc.state,
            filter: Filter::empty(),
            snapshots: doc.snapshots,
            filtered: Vec::new(),
        };
        imported.recompute_filtered();
        imported
    }
}

/// Self-contained export document for one component's debug history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedComponent {
    pub id: ComponentId,
    pub state: Value,
    pub snapshots: Vec<OriginalSnapshot>,
}
