//! Project - Pages, their component trees, flows and variable definitions.
//!
//! A project is the authoring-side document: one [`ComponentTree`] per page
//! (the trees are disjoint), a flat flow library and a flat list of variable
//! definitions. Nothing here runs; the flow runtime takes its inputs from
//! [`Project::flows`], [`Project::variables`] and a page's tree.
//!
//! Archiving is a flag everywhere. An archived page keeps its tree untouched
//! and is only hidden from [`Project::pages`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ProjectError;
use crate::types::{
    Action, ActionId, ActionKind, Block, BlockId, Flow, FlowId, Page, PageId, Value, Variable,
    VariableId, VariableType,
};

use super::tree::ComponentTree;

/// Snapshot format version written by [`Project::snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// Snapshot
// =============================================================================

/// One page and every block on it, archived ones included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub page: Page,
    pub blocks: Vec<Block>,
}

/// Everything needed to rebuild a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub pages: Vec<PageSnapshot>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

// =============================================================================
// Project
// =============================================================================

#[derive(Debug, Default)]
pub struct Project {
    config: Config,
    /// Creation order, archived pages included.
    pages: Vec<Page>,
    trees: HashMap<PageId, ComponentTree>,
    flows: Vec<Flow>,
    variables: Vec<Variable>,
}

impl Project {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Pages
    // =========================================================================

    /// Add a page with an empty tree.
    pub fn create_page(&mut self, name: impl Into<String>, path: impl Into<String>) -> Page {
        let page = Page {
            id: PageId::new(),
            name: name.into(),
            path: path.into(),
            archived: false,
        };
        self.trees.insert(
            page.id.clone(),
            ComponentTree::with_config(self.config.tree.clone()),
        );
        self.pages.push(page.clone());
        tracing::debug!(page = %page.id, path = %page.path, "project.create_page");
        page
    }

    pub fn rename_page(
        &mut self,
        id: &PageId,
        name: impl Into<String>,
    ) -> Result<(), ProjectError> {
        self.page_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_page_path(
        &mut self,
        id: &PageId,
        path: impl Into<String>,
    ) -> Result<(), ProjectError> {
        self.page_mut(id)?.path = path.into();
        Ok(())
    }

    pub fn archive_page(&mut self, id: &PageId) -> Result<(), ProjectError> {
        self.page_mut(id)?.archived = true;
        tracing::debug!(page = %id, "project.archive_page");
        Ok(())
    }

    pub fn restore_page(&mut self, id: &PageId) -> Result<(), ProjectError> {
        self.page_mut(id)?.archived = false;
        Ok(())
    }

    /// Active pages in creation order.
    pub fn pages(&self) -> Vec<&Page> {
        self.pages.iter().filter(|p| !p.archived).collect()
    }

    pub fn page(&self, id: &PageId) -> Option<&Page> {
        self.pages.iter().find(|p| &p.id == id)
    }

    /// First active page routed at `path`.
    pub fn page_by_path(&self, path: &str) -> Option<&Page> {
        self.pages.iter().find(|p| !p.archived && p.path == path)
    }

    pub fn tree(&self, id: &PageId) -> Result<&ComponentTree, ProjectError> {
        self.trees
            .get(id)
            .ok_or_else(|| ProjectError::PageNotFound(id.clone()))
    }

    pub fn tree_mut(&mut self, id: &PageId) -> Result<&mut ComponentTree, ProjectError> {
        self.trees
            .get_mut(id)
            .ok_or_else(|| ProjectError::PageNotFound(id.clone()))
    }

    fn page_mut(&mut self, id: &PageId) -> Result<&mut Page, ProjectError> {
        self.pages
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ProjectError::PageNotFound(id.clone()))
    }

    // =========================================================================
    // Flows
    // =========================================================================

    pub fn create_flow(
        &mut self,
        name: impl Into<String>,
        component_id: Option<BlockId>,
        event: impl Into<String>,
    ) -> Flow {
        let mut flow = Flow::new(name, event);
        flow.component_id = component_id;
        self.flows.push(flow.clone());
        tracing::debug!(flow = %flow.id, "project.create_flow");
        flow
    }

    /// Replace a stored flow by id.
    pub fn update_flow(&mut self, flow: Flow) -> Result<(), ProjectError> {
        let slot = self.flow_mut(&flow.id)?;
        *slot = flow;
        Ok(())
    }

    /// Remove a flow. Events still pointing at it become dangling.
    pub fn remove_flow(&mut self, id: &FlowId) -> Result<Flow, ProjectError> {
        let position = self
            .flows
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| ProjectError::FlowNotFound(id.clone()))?;
        Ok(self.flows.remove(position))
    }

    pub fn flow(&self, id: &FlowId) -> Option<&Flow> {
        self.flows.iter().find(|f| &f.id == id)
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn push_action(
        &mut self,
        flow: &FlowId,
        kind: ActionKind,
    ) -> Result<ActionId, ProjectError> {
        let flow = self.flow_mut(flow)?;
        let action = Action::new(kind);
        let id = action.id.clone();
        flow.actions.push(action);
        Ok(id)
    }

    /// Insert at `index` (`index == len` appends).
    pub fn insert_action(
        &mut self,
        flow: &FlowId,
        index: usize,
        kind: ActionKind,
    ) -> Result<ActionId, ProjectError> {
        let flow = self.flow_mut(flow)?;
        check_index(flow, index, flow.actions.len() + 1)?;
        let action = Action::new(kind);
        let id = action.id.clone();
        flow.actions.insert(index, action);
        Ok(id)
    }

    pub fn remove_action(&mut self, flow: &FlowId, index: usize) -> Result<Action, ProjectError> {
        let flow = self.flow_mut(flow)?;
        check_index(flow, index, flow.actions.len())?;
        Ok(flow.actions.remove(index))
    }

    /// Move the action at `from` so it ends up at `to`.
    pub fn move_action(
        &mut self,
        flow: &FlowId,
        from: usize,
        to: usize,
    ) -> Result<(), ProjectError> {
        let flow = self.flow_mut(flow)?;
        let len = flow.actions.len();
        check_index(flow, from, len)?;
        check_index(flow, to, len)?;
        let action = flow.actions.remove(from);
        flow.actions.insert(to, action);
        Ok(())
    }

    /// Point `event` on a block of `page` at `flow`.
    pub fn bind_event(
        &mut self,
        page: &PageId,
        block: &BlockId,
        event: impl Into<String>,
        flow: &FlowId,
    ) -> Result<(), ProjectError> {
        if self.flow(flow).is_none() {
            return Err(ProjectError::FlowNotFound(flow.clone()));
        }
        self.tree_mut(page)?
            .update_event(block, event, Some(flow.clone()))?;
        Ok(())
    }

    fn flow_mut(&mut self, id: &FlowId) -> Result<&mut Flow, ProjectError> {
        self.flows
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| ProjectError::FlowNotFound(id.clone()))
    }

    // =========================================================================
    // Variables
    // =========================================================================

    pub fn create_variable(
        &mut self,
        name: impl Into<String>,
        var_type: VariableType,
        default_value: Value,
    ) -> Variable {
        let variable = Variable::new(name, var_type, default_value);
        self.variables.push(variable.clone());
        tracing::debug!(variable = %variable.id, "project.create_variable");
        variable
    }

    pub fn update_variable_default(
        &mut self,
        id: &VariableId,
        default_value: Value,
    ) -> Result<(), ProjectError> {
        self.variable_mut(id)?.default_value = default_value;
        Ok(())
    }

    /// Hide a variable from the next preview start or hot reload.
    pub fn archive_variable(&mut self, id: &VariableId) -> Result<(), ProjectError> {
        self.variable_mut(id)?.archived = true;
        Ok(())
    }

    pub fn restore_variable(&mut self, id: &VariableId) -> Result<(), ProjectError> {
        self.variable_mut(id)?.archived = false;
        Ok(())
    }

    /// Every definition, archived ones included. The variable store skips
    /// archived definitions itself.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| !v.archived && v.name == name)
    }

    fn variable_mut(&mut self, id: &VariableId) -> Result<&mut Variable, ProjectError> {
        self.variables
            .iter_mut()
            .find(|v| &v.id == id)
            .ok_or_else(|| ProjectError::VariableNotFound(id.clone()))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn snapshot(&self) -> Snapshot {
        let pages = self
            .pages
            .iter()
            .map(|page| {
                let mut blocks: Vec<Block> = self
                    .trees
                    .get(&page.id)
                    .map(|tree| tree.blocks().cloned().collect())
                    .unwrap_or_default();
                blocks.sort_by(|a, b| {
                    (&a.parent_id, a.order_index).cmp(&(&b.parent_id, b.order_index))
                });
                PageSnapshot {
                    page: page.clone(),
                    blocks,
                }
            })
            .collect();

        Snapshot {
            version: SNAPSHOT_VERSION,
            pages,
            flows: self.flows.clone(),
            variables: self.variables.clone(),
        }
    }

    /// Rebuild a project, validating every page's tree.
    pub fn from_snapshot(snapshot: Snapshot, config: Config) -> Result<Self, ProjectError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ProjectError::SnapshotVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let mut project = Self::with_config(config);
        for PageSnapshot { page, blocks } in snapshot.pages {
            let tree = ComponentTree::from_blocks(blocks, project.config.tree.clone())?;
            project.trees.insert(page.id.clone(), tree);
            project.pages.push(page);
        }
        project.flows = snapshot.flows;
        project.variables = snapshot.variables;
        tracing::debug!(pages = project.pages.len(), flows = project.flows.len(), "project.load");
        Ok(project)
    }
}

fn check_index(flow: &Flow, index: usize, len: usize) -> Result<(), ProjectError> {
    if index < len {
        Ok(())
    } else {
        Err(ProjectError::ActionIndex {
            flow: flow.id.clone(),
            index,
            len: flow.actions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;
    use crate::types::{BlockType, Operand};
    use std::collections::BTreeMap;

    #[test]
    fn test_pages_own_disjoint_trees() {
        let mut project = Project::new();
        let home = project.create_page("Home", "/");
        let about = project.create_page("About", "/about");

        let block = project
            .tree_mut(&home.id)
            .unwrap()
            .create(None, BlockType::Heading, BTreeMap::new())
            .unwrap();

        assert!(project.tree(&home.id).unwrap().contains(&block.id));
        assert!(!project.tree(&about.id).unwrap().contains(&block.id));
        assert_eq!(project.page_by_path("/about").map(|p| &p.id), Some(&about.id));
    }

    #[test]
    fn test_archive_page_hides_it() {
        let mut project = Project::new();
        let home = project.create_page("Home", "/");
        project
            .tree_mut(&home.id)
            .unwrap()
            .create(None, BlockType::Text, BTreeMap::new())
            .unwrap();

        project.archive_page(&home.id).unwrap();
        assert!(project.pages().is_empty());
        assert!(project.page_by_path("/").is_none());
        assert_eq!(project.tree(&home.id).unwrap().len(), 1);

        project.restore_page(&home.id).unwrap();
        assert_eq!(project.pages().len(), 1);

        let ghost = PageId::from("ghost");
        assert_eq!(project.rename_page(&ghost, "x"), Err(ProjectError::PageNotFound(ghost)));
    }

    #[test]
    fn test_action_editing_preserves_order() {
        let mut project = Project::new();
        let flow = project.create_flow("f", None, "onClick").id;
        project.push_action(&flow, ActionKind::alert("a")).unwrap();
        project.push_action(&flow, ActionKind::alert("c")).unwrap();
        project.insert_action(&flow, 1, ActionKind::alert("b")).unwrap();

        let messages = |project: &Project| -> Vec<String> {
            project.flow(&flow).unwrap().actions.iter().map(|a| match &a.kind {
                ActionKind::Alert { message } => message.clone(),
                other => other.type_name().to_string(),
            }).collect()
        };
        assert_eq!(messages(&project), vec!["a", "b", "c"]);

        project.move_action(&flow, 0, 2).unwrap();
        assert_eq!(messages(&project), vec!["b", "c", "a"]);

        project.remove_action(&flow, 1).unwrap();
        assert_eq!(messages(&project), vec!["b", "a"]);

        assert!(matches!(
            project.remove_action(&flow, 5),
            Err(ProjectError::ActionIndex { index: 5, len: 2, .. })
        ));
    }

    #[test]
    fn test_bind_event_checks_flow_and_block() {
        let mut project = Project::new();
        let page = project.create_page("Home", "/").id;
        let button = project
            .tree_mut(&page)
            .unwrap()
            .create(None, BlockType::Button, BTreeMap::new())
            .unwrap()
            .id;
        let flow = project.create_flow("click", Some(button.clone()), "onClick").id;

        project.bind_event(&page, &button, "onClick", &flow).unwrap();
        assert_eq!(
            project.tree(&page).unwrap().get(&button).unwrap().events["onClick"],
            flow
        );

        let missing = BlockId::from("missing");
        assert_eq!(
            project.bind_event(&page, &missing, "onClick", &flow),
            Err(ProjectError::Tree(TreeError::NotFound(missing)))
        );
        assert!(matches!(
            project.bind_event(&page, &button, "onClick", &FlowId::from("nope")),
            Err(ProjectError::FlowNotFound(_))
        ));
    }

    #[test]
    fn test_variables() {
        let mut project = Project::new();
        let count = project.create_variable("count", VariableType::Number, Value::from(0));
        project.update_variable_default(&count.id, Value::from(10)).unwrap();
        assert_eq!(
            project.variable_by_name("count").map(|v| v.default_value.clone()),
            Some(Value::from(10))
        );

        project.archive_variable(&count.id).unwrap();
        assert!(project.variable_by_name("count").is_none());
        assert_eq!(project.variables().len(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_through_json() {
        let mut project = Project::new();
        let page = project.create_page("Home", "/").id;
        let count = project.create_variable("count", VariableType::Number, Value::from(0));
        let flow = project.create_flow("inc", None, "onClick").id;
        project
            .push_action(
                &flow,
                ActionKind::set_variable(
                    count.id.clone(),
                    Operand::add(Operand::variable(&count.id), Operand::literal(1)),
                ),
            )
            .unwrap();
        let root = {
            let tree = project.tree_mut(&page).unwrap();
            let root = tree.create(None, BlockType::Container, BTreeMap::new()).unwrap().id;
            let child = tree.create(Some(&root), BlockType::Button, BTreeMap::new()).unwrap().id;
            tree.archive(&child).unwrap();
            root
        };
        project.bind_event(&page, &root, "onClick", &flow).unwrap();

        let json = serde_json::to_string(&project.snapshot()).unwrap();
        let snapshot: Snapshot = serde_json::from_str(&json).unwrap();
        let restored = Project::from_snapshot(snapshot, Config::default()).unwrap();

        assert_eq!(restored.snapshot(), project.snapshot());
        assert!(restored.tree(&page).unwrap().check_invariants().is_ok());
    }

    #[test]
    fn test_from_snapshot_rejects_cycles() {
        let mut project = Project::new();
        let page = project.create_page("Home", "/").id;
        let tree = project.tree_mut(&page).unwrap();
        let a = tree.create(None, BlockType::Container, BTreeMap::new()).unwrap().id;
        tree.create(Some(&a), BlockType::Container, BTreeMap::new()).unwrap();

        let mut snapshot = project.snapshot();
        let blocks = &mut snapshot.pages[0].blocks;
        let child = blocks.iter().find(|b| b.id != a).unwrap().id.clone();
        blocks.iter_mut().find(|b| b.id == a).unwrap().parent_id = Some(child);

        assert!(matches!(
            Project::from_snapshot(snapshot, Config::default()),
            Err(ProjectError::Snapshot(_))
        ));
    }

    #[test]
    fn test_from_snapshot_rejects_unknown_version() {
        let mut project = Project::new();
        project.create_page("Home", "/");
        let mut snapshot = project.snapshot();
        snapshot.version = SNAPSHOT_VERSION + 1;

        assert_eq!(
            Project::from_snapshot(snapshot, Config::default()).err(),
            Some(ProjectError::SnapshotVersion {
                found: SNAPSHOT_VERSION + 1,
                supported: SNAPSHOT_VERSION,
            })
        );
    }
}
