use bimap::BiMap;
use std::collections::{HashMap, VecDeque};

use crate::bytecode::{Instruction, Opcode};
use crate::graph::{EdgeKind, Graph, Node, NodeId, NodeKind};
use crate::{LinkError, MalformedProgram};

///A capability that decodes one instruction out of a raw buffer. It is up to
///the caller to supply one; the default is `bytecode::BytecodeReader`.
pub trait ProgramSource {
    fn decode(&self, buffer: &[u8], location: u16) -> Result<(Instruction, u16), LinkError>;
}

///A deferred edge assignment, parked until the node at the target location
///exists.
struct EdgeTask {
    from: NodeId,
    kind: EdgeKind,
}

pub struct Linker {
    pub source: Box<dyn ProgramSource>,
}

impl Linker {
    pub fn new(source: Box<dyn ProgramSource>) -> Self {
        Self { source }
    }

    ///Scan the buffer once, in storage order, from `start` to the End
    ///instruction, creating one node per instruction and translating every
    ///raw offset into a direct node reference. A reference to a location the
    ///scan never reaches fails the whole link; no partial graph is returned.
    pub fn link(&self, buffer: &[u8], start: u16) -> Result<Graph, LinkError> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut index: BiMap<u16, NodeId> = BiMap::new();
        let mut pending: HashMap<u16, Vec<EdgeTask>> = HashMap::new();

        let mut location = start;

        loop {
            let (instruction, after) = self.source.decode(buffer, location)?;

            if index.contains_left(&instruction.location) {
                return Result::Err(
                    MalformedProgram::LocationCollision(instruction.location).into(),
                );
            }

            let id = nodes.len();
            nodes.push(node_from_instruction(&instruction, id));
            index.insert(instruction.location, id);

            //The node is registered before any of its own edges are wired,
            //so an instruction referring to its own location resolves
            //against the entry just inserted.
            let mut queue: VecDeque<EdgeTask> = pending
                .remove(&instruction.location)
                .map(VecDeque::from)
                .unwrap_or_default();

            while let Some(task) = queue.pop_front() {
                assign_edge(&mut nodes, task.from, task.kind, id);
            }

            if instruction.opcode == Opcode::End {
                break;
            }

            for (kind, target) in outgoing(&instruction) {
                match index.get_by_left(&target) {
                    Some(resolved) => assign_edge(&mut nodes, id, kind, *resolved),
                    None => pending
                        .entry(target)
                        .or_insert_with(Vec::new)
                        .push(EdgeTask { from: id, kind }),
                }
            }

            location = after;
        }

        //Whatever is still pending points at a location the scan never
        //decoded
        if let Some(target) = pending.keys().min().copied() {
            return Result::Err(MalformedProgram::DanglingReference(target).into());
        }

        //The entry node is the first one created, at the scan's start
        Result::Ok(Graph::from_parts(nodes, index, 0))
    }
}

fn outgoing(instruction: &Instruction) -> Vec<(EdgeKind, u16)> {
    let mut edges = vec![(EdgeKind::Next, instruction.next_target)];

    if let Some(alt) = instruction.alt_target {
        edges.push((EdgeKind::Alt, alt));
    }

    edges
}

fn assign_edge(nodes: &mut [Node], from: NodeId, kind: EdgeKind, to: NodeId) {
    let node = &mut nodes[from];

    match kind {
        EdgeKind::Next => node.next = Option::Some(to),
        EdgeKind::Alt => node.alt = Option::Some(to),
    }
}

fn node_from_instruction(instruction: &Instruction, id: NodeId) -> Node {
    let kind = match instruction.opcode {
        Opcode::End => NodeKind::End,
        Opcode::Bol => NodeKind::LineStart,
        Opcode::Eol => NodeKind::LineEnd,
        Opcode::Any => NodeKind::AnyChar,
        Opcode::AnyOf => NodeKind::CharClass { negated: false },
        Opcode::AnyBut => NodeKind::CharClass { negated: true },
        Opcode::Branch => NodeKind::Branch,
        Opcode::Back => NodeKind::BackEdge,
        Opcode::Exactly => NodeKind::Literal,
        Opcode::Nothing => NodeKind::Empty,
        Opcode::Star => NodeKind::Star,
        Opcode::Plus => NodeKind::Plus,
        Opcode::Open => NodeKind::GroupOpen(instruction.raw_opcode - u8::from(Opcode::Open)),
        Opcode::Close => NodeKind::GroupClose(instruction.raw_opcode - u8::from(Opcode::Close)),
    };

    Node {
        id,
        location: instruction.location,
        kind,
        operand: instruction.operand.clone(),
        next: Option::None,
        alt: Option::None,
    }
}
