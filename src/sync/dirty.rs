//! Bottom-up dirty-layer propagation.
//!
//! After all mutations, the sync engine records what each enrichment layer
//! needs to revisit: changed definitions feed metadata and relationships
//! directly, their containing modules feed the module/contract layers,
//! interactions touching those modules feed the interaction layer, and so
//! on up through flows and features. Module IDs for removed definitions
//! are snapshotted before cascade-delete, since their membership rows are
//! gone by the time propagation runs.

use crate::error::StoreResult;
use crate::storage::StoreHandle;
use crate::{DefinitionId, DirtyLayer, DirtyReason, ModuleId};
use std::collections::BTreeSet;
use tracing::debug;

/// The definition-level outcome of a sync, as input to propagation.
#[derive(Debug, Default)]
pub struct DirtySets {
    pub added: Vec<DefinitionId>,
    pub modified: Vec<DefinitionId>,
    /// Removed definitions with the module they belonged to, snapshotted
    /// before the cascade.
    pub removed: Vec<(DefinitionId, Option<ModuleId>)>,
}

impl DirtySets {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Populate the sync_dirty table from the definition-level change sets.
/// Runs inside the sync transaction, after all data mutations.
pub fn propagate<H: StoreHandle>(handle: &H, sets: &DirtySets) -> StoreResult<()> {
    if sets.is_empty() {
        return Ok(());
    }
    let dirty = handle.sync_dirty();

    // Direct layers: every changed definition.
    for (defs, reason) in [
        (&sets.added, DirtyReason::Added),
        (&sets.modified, DirtyReason::Modified),
    ] {
        for &def in defs.iter() {
            dirty.mark(DirtyLayer::Metadata, def.value(), reason)?;
            dirty.mark(DirtyLayer::Relationships, def.value(), reason)?;
        }
    }
    for &(def, _) in &sets.removed {
        dirty.mark(DirtyLayer::Metadata, def.value(), DirtyReason::Removed)?;
        dirty.mark(DirtyLayer::Relationships, def.value(), DirtyReason::Removed)?;
    }

    // Containing modules: live membership for surviving definitions,
    // snapshot for removed ones.
    let surviving: Vec<DefinitionId> = sets
        .added
        .iter()
        .chain(sets.modified.iter())
        .copied()
        .collect();
    let membership = handle.modules().modules_of(&surviving)?;

    let mut module_ids: BTreeSet<ModuleId> = membership.values().copied().collect();
    module_ids.extend(sets.removed.iter().filter_map(|(_, module)| *module));

    if module_ids.is_empty() {
        debug!("dirty propagation stops at definitions (no module assignments)");
        return Ok(());
    }

    for &module in &module_ids {
        dirty.mark(DirtyLayer::Modules, module.value(), DirtyReason::ParentDirty)?;
        dirty.mark(DirtyLayer::Contracts, module.value(), DirtyReason::ParentDirty)?;
    }

    // Interactions touching a dirty module.
    let modules: Vec<ModuleId> = module_ids.into_iter().collect();
    let interactions = handle.interactions().touching_modules(&modules)?;
    for &interaction in &interactions {
        dirty.mark(
            DirtyLayer::Interactions,
            interaction.value(),
            DirtyReason::ParentDirty,
        )?;
    }
    if interactions.is_empty() {
        return Ok(());
    }

    // Flows with a step on a dirty interaction, then their features.
    let flows = handle.flows().with_step_on(&interactions)?;
    for &flow in &flows {
        dirty.mark(DirtyLayer::Flows, flow.value(), DirtyReason::ParentDirty)?;
    }
    if flows.is_empty() {
        return Ok(());
    }

    let features = handle.features().containing(&flows)?;
    for &feature in &features {
        dirty.mark(DirtyLayer::Features, feature.value(), DirtyReason::ParentDirty)?;
    }

    debug!(
        modules = modules.len(),
        interactions = interactions.len(),
        flows = flows.len(),
        features = features.len(),
        "dirty propagation complete"
    );
    Ok(())
}
