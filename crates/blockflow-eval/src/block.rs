//! The block graph: a flowchart stored as an arena of blocks addressed by id.
//!
//! Every edge is a [`BlockId`], never a reference, so loops formed by
//! `While` blocks need no shared ownership. A [`Diagram`] is built once and
//! only read afterwards; the runtime and the explorer borrow it.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::DataType;

/// Identifier of a block within its diagram.
pub type BlockId = u32;

/// A declared diagram variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Variable {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// One node of a flowchart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// `<var> = <expr>`
    Assign {
        id: BlockId,
        next: BlockId,
        expression: String,
    },
    /// A template whose bare identifiers are replaced by variable values.
    Print {
        id: BlockId,
        next: BlockId,
        expression: String,
    },
    /// Reads one line of input into `variable`.
    Input {
        id: BlockId,
        next: BlockId,
        variable: String,
    },
    /// Two-way branch.
    Condition {
        id: BlockId,
        expression: String,
        #[serde(rename = "trueBranch")]
        true_next: BlockId,
        #[serde(rename = "falseBranch")]
        false_next: BlockId,
    },
    /// Loop head, re-evaluated on every visit.
    While {
        id: BlockId,
        expression: String,
        body: BlockId,
        next: BlockId,
    },
    /// Closes a structural block. Without `next` the thread terminates.
    End {
        id: BlockId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<BlockId>,
    },
}

impl Block {
    pub fn id(&self) -> BlockId {
        match self {
            Block::Assign { id, .. }
            | Block::Print { id, .. }
            | Block::Input { id, .. }
            | Block::Condition { id, .. }
            | Block::While { id, .. }
            | Block::End { id, .. } => *id,
        }
    }

    /// Every block id this block can hand control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Block::Assign { next, .. } | Block::Print { next, .. } | Block::Input { next, .. } => {
                vec![*next]
            }
            Block::Condition {
                true_next,
                false_next,
                ..
            } => vec![*true_next, *false_next],
            Block::While { body, next, .. } => vec![*body, *next],
            Block::End { next, .. } => next.iter().copied().collect(),
        }
    }

    /// Short name of the block kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Assign { .. } => "assign",
            Block::Print { .. } => "print",
            Block::Input { .. } => "input",
            Block::Condition { .. } => "condition",
            Block::While { .. } => "while",
            Block::End { .. } => "end",
        }
    }
}

/// On-disk shape of a diagram.
#[derive(Debug, Deserialize, Serialize)]
struct DiagramDocument {
    #[serde(default)]
    variables: Vec<Variable>,
    #[serde(default)]
    blocks: Vec<Block>,
    #[serde(default)]
    threads: Vec<BlockId>,
}

/// A complete flowchart: declared variables, the block arena and the entry
/// block of every concurrently running thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagram {
    variables: Vec<Variable>,
    blocks: HashMap<BlockId, Block>,
    threads: Vec<BlockId>,
}

impl Diagram {
    /// Index `blocks` by id. Rejects duplicate variable names and duplicate
    /// block ids; successor links are checked separately by [`validate`].
    ///
    /// [`validate`]: Diagram::validate
    pub fn new(
        variables: Vec<Variable>,
        blocks: Vec<Block>,
        threads: Vec<BlockId>,
    ) -> Result<Self, Error> {
        let mut names = HashSet::new();
        for variable in &variables {
            if !names.insert(variable.name.as_str()) {
                return Err(Error::InvalidDiagram(format!(
                    "variable '{}' declared twice",
                    variable.name
                )));
            }
        }

        let mut index = HashMap::with_capacity(blocks.len());
        for block in blocks {
            let id = block.id();
            if index.insert(id, block).is_some() {
                return Err(Error::InvalidDiagram(format!("block id {} used twice", id)));
            }
        }

        Ok(Self {
            variables,
            blocks: index,
            threads,
        })
    }

    /// Decode a diagram document and check that every link resolves.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let doc: DiagramDocument = serde_json::from_str(text)?;
        let diagram = Self::new(doc.variables, doc.blocks, doc.threads)?;
        diagram.validate()?;
        Ok(diagram)
    }

    /// Encode the diagram in the same shape [`from_json`](Diagram::from_json) reads.
    pub fn to_json(&self) -> Result<String, Error> {
        let mut blocks: Vec<Block> = self.blocks.values().cloned().collect();
        blocks.sort_by_key(Block::id);
        let doc = DiagramDocument {
            variables: self.variables.clone(),
            blocks,
            threads: self.threads.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Report every thread entry or successor link that names a missing block.
    pub fn validate(&self) -> Result<(), Error> {
        let mut dangling = BTreeSet::new();
        for entry in &self.threads {
            if !self.blocks.contains_key(entry) {
                dangling.insert(format!("thread entry {}", entry));
            }
        }
        for block in self.blocks.values() {
            for target in block.successors() {
                if !self.blocks.contains_key(&target) {
                    dangling.insert(format!("{} -> {}", block.id(), target));
                }
            }
        }

        if dangling.is_empty() {
            Ok(())
        } else {
            let list: Vec<String> = dangling.into_iter().collect();
            Err(Error::InvalidDiagram(format!(
                "unresolved links: {}",
                list.join(", ")
            )))
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Entry block of each thread, in declaration order.
    pub fn threads(&self) -> &[BlockId] {
        &self.threads
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Look up a block, failing with [`Error::UnknownBlockId`] if absent.
    pub fn block(&self, id: BlockId) -> Result<&Block, Error> {
        self.blocks.get(&id).ok_or(Error::UnknownBlockId(id))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_json() -> &'static str {
        r#"{
            "variables": [{ "name": "i", "type": "int" }],
            "blocks": [
                { "type": "assign", "id": 1, "next": 2, "expression": "i = 0" },
                { "type": "while", "id": 2, "expression": "i < 3", "body": 3, "next": 5 },
                { "type": "assign", "id": 3, "next": 4, "expression": "i = i + 1" },
                { "type": "end", "id": 4, "next": 2 },
                { "type": "print", "id": 5, "next": 6, "expression": "i" },
                { "type": "end", "id": 6 }
            ],
            "threads": [1]
        }"#
    }

    #[test]
    fn test_from_json_builds_index() {
        let diagram = Diagram::from_json(counter_json()).unwrap();
        assert_eq!(diagram.block_count(), 6);
        assert_eq!(diagram.threads(), &[1]);
        assert_eq!(diagram.variable("i").unwrap().data_type, DataType::Int);

        match diagram.block(2).unwrap() {
            Block::While { body, next, .. } => {
                assert_eq!(*body, 3);
                assert_eq!(*next, 5);
            }
            other => panic!("Expected While block, got {:?}", other),
        }
        assert_eq!(diagram.block(6).unwrap(), &Block::End { id: 6, next: None });
    }

    #[test]
    fn test_condition_uses_branch_field_names() {
        let block: Block = serde_json::from_str(
            r#"{ "type": "condition", "id": 4, "expression": "x > 1", "trueBranch": 5, "falseBranch": 6 }"#,
        )
        .unwrap();
        assert_eq!(block.successors(), vec![5, 6]);
        assert_eq!(block.kind(), "condition");
    }

    #[test]
    fn test_unknown_block_lookup() {
        let diagram = Diagram::from_json(counter_json()).unwrap();
        assert_eq!(diagram.block(99), Err(Error::UnknownBlockId(99)));
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let result = Diagram::new(
            vec![
                Variable::new("x", DataType::Int),
                Variable::new("x", DataType::Double),
            ],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(Error::InvalidDiagram(_))));
    }

    #[test]
    fn test_duplicate_block_id_rejected() {
        let result = Diagram::new(
            vec![],
            vec![Block::End { id: 1, next: None }, Block::End { id: 1, next: None }],
            vec![1],
        );
        assert!(matches!(result, Err(Error::InvalidDiagram(_))));
    }

    #[test]
    fn test_validate_reports_dangling_links() {
        let diagram = Diagram::new(
            vec![],
            vec![Block::Print {
                id: 1,
                next: 9,
                expression: "\"hi\"".into(),
            }],
            vec![1, 4],
        )
        .unwrap();
        let err = diagram.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("1 -> 9"), "{}", msg);
        assert!(msg.contains("thread entry 4"), "{}", msg);
    }

    #[test]
    fn test_json_round_trip_preserves_diagram() {
        let diagram = Diagram::from_json(counter_json()).unwrap();
        let again = Diagram::from_json(&diagram.to_json().unwrap()).unwrap();
        assert_eq!(diagram, again);
    }
}
