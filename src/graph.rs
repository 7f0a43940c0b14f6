use bimap::BiMap;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

pub type NodeId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum EdgeKind {
    Next,
    Alt,
}

///What an instruction matches or controls, one variant per opcode kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    End,
    LineStart,
    LineEnd,
    AnyChar,
    CharClass { negated: bool },
    Branch,
    BackEdge,
    Literal,
    Empty,
    Star,
    Plus,
    GroupOpen(u8),
    GroupClose(u8),
}

impl NodeKind {
    pub fn has_alt(&self) -> bool {
        matches!(self, NodeKind::Branch | NodeKind::Star | NodeKind::Plus)
    }
}

///A linked instruction. Edges are arena indices into the owning Graph,
///written at most once during the linking scan and frozen afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub location: u16,
    pub kind: NodeKind,
    pub operand: Option<String>,
    pub next: Option<NodeId>,
    pub alt: Option<NodeId>,
}

///The linked program: an arena of nodes plus a location↔index table.
///Read-only once handed over by the linker.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    nodes: Vec<Node>,
    index: BiMap<u16, NodeId>,
    entry: NodeId,
}

impl Graph {
    pub(crate) fn from_parts(nodes: Vec<Node>, index: BiMap<u16, NodeId>, entry: NodeId) -> Self {
        Self {
            nodes,
            index,
            entry,
        }
    }

    ///The node at the scan's starting location.
    pub fn entry(&self) -> &Node {
        &self.nodes[self.entry]
    }

    pub fn get(&self, location: u16) -> Option<&Node> {
        let id = self.index.get_by_left(&location)?;
        self.nodes.get(*id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn location_of(&self, id: NodeId) -> Option<u16> {
        self.index.get_by_right(&id).copied()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    ///Depth-first walk over the edges reachable from the entry node. Each
    ///call starts over with a fresh visited set, so repetition cycles are
    ///walked once and then cut off.
    pub fn traverse(&self) -> Dfs {
        Dfs {
            graph: self,
            stack: vec![self.entry],
            visited: HashSet::new(),
            ready: VecDeque::new(),
        }
    }
}

///Lazy iterator of `(from, edge kind, to)` triples. Every outgoing edge of
///every reachable node is produced exactly once; an edge into an
///already-visited node is still produced, but not expanded further.
pub struct Dfs<'a> {
    graph: &'a Graph,
    stack: Vec<NodeId>,
    visited: HashSet<NodeId>,
    ready: VecDeque<(NodeId, EdgeKind, NodeId)>,
}

impl<'a> Iterator for Dfs<'a> {
    type Item = (&'a Node, EdgeKind, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((from, kind, to)) = self.ready.pop_front() {
                return Option::Some((&self.graph.nodes[from], kind, &self.graph.nodes[to]));
            }

            let id = self.stack.pop()?;

            if !self.visited.insert(id) {
                continue;
            }

            let node = &self.graph.nodes[id];

            //Alt queued behind next, so the sequential edge is walked first
            if let Some(alt) = node.alt {
                self.ready.push_back((id, EdgeKind::Alt, alt));
                self.stack.push(alt);
            }

            if let Some(next) = node.next {
                self.ready.push_front((id, EdgeKind::Next, next));
                self.stack.push(next);
            }
        }
    }
}
