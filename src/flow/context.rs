//! The tracer's input context, built once per run.
//!
//! A pure snapshot of everything the traversal needs: call-graph
//! adjacency, definition-to-module lookup, interactions indexed by module
//! pair, bridgeable interactions indexed by source module, definition-
//! level bridge links, the entry-point boundary set, and the atomic flows
//! used for subflow accounting. The tracer never re-enters the store
//! mid-computation.

use crate::error::StoreResult;
use crate::storage::StoreHandle;
use crate::{DefinitionId, InteractionId, InteractionSource, ModuleId};
use std::collections::{HashMap, HashSet};

/// A bridgeable interaction leaving some module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeInteraction {
    pub interaction_id: InteractionId,
    pub to_module: ModuleId,
    pub source: InteractionSource,
}

/// Everything the flow tracer reads.
#[derive(Debug, Default)]
pub struct TraceContext {
    /// Call-graph successors, ordered by first call site.
    pub adjacency: HashMap<DefinitionId, Vec<DefinitionId>>,
    /// Definition -> (module, module full path).
    pub def_modules: HashMap<DefinitionId, (ModuleId, String)>,
    /// Definition names, for trace-from matching and flow naming.
    pub def_names: HashMap<DefinitionId, String>,
    /// Interaction id per ordered module pair.
    pub interaction_by_pair: HashMap<(ModuleId, ModuleId), InteractionId>,
    /// Bridgeable interactions by source module, in id order.
    pub bridgeable_by_source: HashMap<ModuleId, Vec<BridgeInteraction>>,
    /// Definition-level bridge links from a definition, keyed inside by
    /// target module.
    pub bridge_links: HashMap<DefinitionId, HashMap<ModuleId, DefinitionId>>,
    /// The traversal boundary: modules hosting entry members.
    pub entry_modules: HashSet<ModuleId>,
    /// Modules reached by at least one bridgeable interaction.
    pub bridge_target_modules: HashSet<ModuleId>,
    /// Atomic (tier-0) flow slug per interaction.
    pub atomic_flows: HashMap<InteractionId, String>,
    /// Members per module, for representative bridge targets; sorted.
    pub module_members: HashMap<ModuleId, Vec<DefinitionId>>,
}

impl TraceContext {
    /// Build the context from the store. `entry_modules` is the set of
    /// entry-point modules the caller is about to trace from.
    pub fn load<H: StoreHandle>(
        handle: &H,
        entry_modules: HashSet<ModuleId>,
    ) -> StoreResult<Self> {
        let mut ctx = Self {
            entry_modules,
            ..Self::default()
        };

        for edge in handle.graph().all_edges()? {
            ctx.adjacency
                .entry(edge.from_definition_id)
                .or_default()
                .push(edge.to_definition_id);
        }

        let module_paths: HashMap<ModuleId, String> = handle
            .modules()
            .all()?
            .into_iter()
            .map(|m| (m.id, m.full_path))
            .collect();
        for (def, module) in handle.modules().membership()? {
            if let Some(path) = module_paths.get(&module) {
                ctx.def_modules.insert(def, (module, path.clone()));
            }
            ctx.module_members.entry(module).or_default().push(def);
        }
        for members in ctx.module_members.values_mut() {
            members.sort();
        }

        // Names only for definitions the traversal can touch.
        for def in ctx
            .adjacency
            .keys()
            .chain(ctx.adjacency.values().flatten())
            .chain(ctx.def_modules.keys())
            .copied()
            .collect::<HashSet<_>>()
        {
            if let Some(record) = handle.definitions().get(def)? {
                ctx.def_names.insert(def, record.name);
            }
        }

        let mut bridgeable_targets: HashMap<InteractionId, ModuleId> = HashMap::new();
        for interaction in handle.interactions().all()? {
            ctx.interaction_by_pair.insert(
                (interaction.from_module_id, interaction.to_module_id),
                interaction.id,
            );
            if matches!(
                interaction.source,
                InteractionSource::LlmInferred | InteractionSource::ContractMatched
            ) {
                ctx.bridgeable_by_source
                    .entry(interaction.from_module_id)
                    .or_default()
                    .push(BridgeInteraction {
                        interaction_id: interaction.id,
                        to_module: interaction.to_module_id,
                        source: interaction.source,
                    });
                ctx.bridge_target_modules.insert(interaction.to_module_id);
                bridgeable_targets.insert(interaction.id, interaction.to_module_id);
            }
        }

        // Only links on bridgeable interactions matter to the tracer.
        for link in handle.interactions().links()? {
            if let Some(&target_module) = bridgeable_targets.get(&link.interaction_id) {
                ctx.bridge_links
                    .entry(link.from_definition_id)
                    .or_default()
                    .insert(target_module, link.to_definition_id);
            }
        }

        for (_, slug, interaction) in handle.flows().atomic_flows()? {
            ctx.atomic_flows.insert(interaction, slug);
        }

        Ok(ctx)
    }

    /// Module of a definition, if assigned.
    pub fn module_of(&self, def: DefinitionId) -> Option<ModuleId> {
        self.def_modules.get(&def).map(|(module, _)| *module)
    }

    /// A definition is a boundary target when its module is an entry-point
    /// module that is also reached by a bridgeable interaction.
    pub fn is_boundary_module(&self, module: ModuleId) -> bool {
        self.entry_modules.contains(&module) && self.bridge_target_modules.contains(&module)
    }
}
