//! The node stream: the doubly-linked list that *is* the program.
//!
//! Clients build a function as a linear sequence of nodes (labels,
//! instructions, directives) terminated by an end-of-function sentinel. Nodes
//! are stored in a dense table and linked by [`NodeId`]; removing a node
//! unlinks it without disturbing the ids of its neighbors, which keeps
//! node-indexed side tables valid across unreachable-code elimination.

use smallvec::SmallVec;

use super::vreg::{RegKind, VirtId};

/// Index of a node in the backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a label within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

impl LabelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Raw opcode identifier; interpreted by the architecture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u16);

/// Node flag bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeFlags(u16);

impl NodeFlags {
    /// Node does not affect emitted machine code (comments, hints).
    pub const INFORMATIVE: NodeFlags = NodeFlags(0x01);
    /// Node may be removed by dead-code passes.
    pub const REMOVABLE: NodeFlags = NodeFlags(0x02);
    /// Node emits nothing by itself.
    pub const NO_EFFECT: NodeFlags = NodeFlags(0x04);
    /// Node carries operands and is processed like an instruction.
    pub const ACTS_AS_INST: NodeFlags = NodeFlags(0x08);

    pub const fn empty() -> NodeFlags {
        NodeFlags(0)
    }

    pub const fn union(self, other: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Memory operand: `[base + index*scale + disp]` with virtual base/index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemOperand {
    pub base: Option<VirtId>,
    pub index: Option<VirtId>,
    pub shift: u8,
    pub disp: i32,
}

impl MemOperand {
    pub fn base(base: VirtId, disp: i32) -> Self {
        Self {
            base: Some(base),
            index: None,
            shift: 0,
            disp,
        }
    }

    pub fn base_index(base: VirtId, index: VirtId, shift: u8, disp: i32) -> Self {
        Self {
            base: Some(base),
            index: Some(index),
            shift,
            disp,
        }
    }
}

/// Instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A virtual register.
    Reg(VirtId),
    /// A memory reference.
    Mem(MemOperand),
    /// An immediate.
    Imm(i64),
    /// A label, used by jumps.
    Label(LabelId),
}

impl Operand {
    pub fn as_label(&self) -> Option<LabelId> {
        match self {
            Operand::Label(label) => Some(*label),
            _ => None,
        }
    }

    pub fn as_reg(&self) -> Option<VirtId> {
        match self {
            Operand::Reg(id) => Some(*id),
            _ => None,
        }
    }
}

/// Payload of an instruction node.
#[derive(Debug, Clone)]
pub struct InstData {
    pub inst: InstId,
    /// Option bits (prefixes, overrides); opaque to the middle-end.
    pub options: u32,
    /// Extra register: REP count or an AVX-512 {k} selector.
    pub extra_reg: Option<VirtId>,
    pub ops: SmallVec<[Operand; 4]>,
}

/// Payload of a function-return node.
#[derive(Debug, Clone)]
pub struct RetData {
    pub ops: SmallVec<[Operand; 2]>,
}

/// Payload of a function-call node.
#[derive(Debug, Clone)]
pub struct CallData {
    pub target: Operand,
    pub args: SmallVec<[Operand; 6]>,
    pub rets: [Option<VirtId>; 2],
}

/// Function signature as the middle-end needs it: the register kind of each
/// argument and return value.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub args: Vec<RegKind>,
    pub rets: Vec<RegKind>,
}

/// Frame configuration relevant to register availability.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    /// Frame pointer is preserved and unavailable for allocation.
    pub preserved_fp: bool,
}

/// Payload of a function-entry node.
#[derive(Debug, Clone)]
pub struct FuncData {
    pub signature: Signature,
    pub frame: FrameInfo,
    /// Argument bindings to virtual registers.
    pub args: Vec<Option<VirtId>>,
    /// Label jumped to by returns lowered later; reserved, bound on demand.
    pub exit_label: LabelId,
    /// End-of-function sentinel, set by `FuncBuilder::end_func`.
    pub end: Option<NodeId>,
    pub finished: bool,
}

/// Sentinel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelKind {
    /// Marks the end of a function body.
    FuncEnd,
    /// Structural marker with no meaning to the middle-end.
    Generic,
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Label { label: LabelId },
    Inst(InstData),
    FuncEntry(FuncData),
    FuncRet(RetData),
    FuncCall(CallData),
    Sentinel(SentinelKind),
    Align { alignment: u32 },
    Comment { text: String },
    ConstPool { size: u32 },
    Data { bytes: Vec<u8> },
}

/// One node of the stream.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    flags: NodeFlags,
    /// Monotonic position within the function, assigned by the CFG walk.
    pub position: u32,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl Node {
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// Instructions, calls and returns all carry operands and are processed
    /// uniformly by the CFG builder.
    pub fn acts_as_inst(&self) -> bool {
        self.flags.contains(NodeFlags::ACTS_AS_INST)
    }

    pub fn is_informative(&self) -> bool {
        self.flags.contains(NodeFlags::INFORMATIVE)
    }

    pub fn has_no_effect(&self) -> bool {
        self.flags.contains(NodeFlags::NO_EFFECT)
    }

    pub fn label(&self) -> Option<LabelId> {
        match &self.kind {
            NodeKind::Label { label } => Some(*label),
            _ => None,
        }
    }
}

fn default_flags(kind: &NodeKind) -> NodeFlags {
    match kind {
        NodeKind::Inst(_) | NodeKind::FuncRet(_) => NodeFlags::ACTS_AS_INST,
        NodeKind::FuncCall(_) => NodeFlags::ACTS_AS_INST.union(NodeFlags::REMOVABLE),
        NodeKind::Comment { .. } => NodeFlags::INFORMATIVE.union(NodeFlags::NO_EFFECT),
        NodeKind::Align { .. } => NodeFlags::INFORMATIVE,
        _ => NodeFlags::empty(),
    }
}

/// The node stream of one function, plus the label table.
#[derive(Debug, Default)]
pub struct NodeList {
    nodes: Vec<Node>,
    first: Option<NodeId>,
    last: Option<NodeId>,
    /// Label id -> label node, filled when labels are bound.
    labels: Vec<Option<NodeId>>,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.first
    }

    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// Size of the backing table; valid upper bound for node-indexed side
    /// tables. Removed nodes keep their slot.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Append a node at the end of the stream.
    pub fn append(&mut self, kind: NodeKind) -> NodeId {
        let flags = default_flags(&kind);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            flags,
            position: 0,
            prev: self.last,
            next: None,
        });
        match self.last {
            Some(last) => self.nodes[last.index()].next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        id
    }

    /// Unlink a node from the stream. Its slot (and id) stays allocated.
    pub fn remove(&mut self, id: NodeId) {
        let (prev, next) = {
            let node = &mut self.nodes[id.index()];
            let links = (node.prev, node.next);
            node.prev = None;
            node.next = None;
            links
        };
        match prev {
            Some(p) => self.nodes[p.index()].next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => self.nodes[n.index()].prev = prev,
            None => self.last = prev,
        }
    }

    /// Reserve a new label id.
    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(None);
        id
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Node a label is bound to, if it has been bound.
    pub fn label_node(&self, label: LabelId) -> Option<NodeId> {
        self.labels.get(label.index()).copied().flatten()
    }

    /// Bind `label` by appending its label node.
    pub fn bind_label(&mut self, label: LabelId) -> NodeId {
        debug_assert!(self.labels[label.index()].is_none(), "label bound twice");
        let node = self.append(NodeKind::Label { label });
        self.labels[label.index()] = Some(node);
        node
    }

    /// Iterate linked nodes front to back.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter {
            list: self,
            cursor: self.first,
        }
    }

    pub fn func_data(&self, id: NodeId) -> Option<&FuncData> {
        match &self.node(id).kind {
            NodeKind::FuncEntry(data) => Some(data),
            _ => None,
        }
    }

    pub fn func_data_mut(&mut self, id: NodeId) -> Option<&mut FuncData> {
        match &mut self.node_mut(id).kind {
            NodeKind::FuncEntry(data) => Some(data),
            _ => None,
        }
    }
}

/// Iterator over linked nodes.
pub struct NodeIter<'a> {
    list: &'a NodeList,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cursor?;
        self.cursor = self.list.node(id).next();
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_links() {
        let mut list = NodeList::new();
        let a = list.append(NodeKind::Align { alignment: 16 });
        let b = list.append(NodeKind::Comment {
            text: "hi".into(),
        });
        let c = list.append(NodeKind::Sentinel(SentinelKind::Generic));

        assert_eq!(list.first(), Some(a));
        assert_eq!(list.last(), Some(c));
        assert_eq!(list.node(a).next(), Some(b));
        assert_eq!(list.node(b).prev(), Some(a));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn test_remove_middle_and_ends() {
        let mut list = NodeList::new();
        let a = list.append(NodeKind::Align { alignment: 4 });
        let b = list.append(NodeKind::Align { alignment: 8 });
        let c = list.append(NodeKind::Align { alignment: 16 });

        list.remove(b);
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(list.node(a).next(), Some(c));
        assert_eq!(list.node(c).prev(), Some(a));

        list.remove(a);
        assert_eq!(list.first(), Some(c));
        list.remove(c);
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
        // Slots survive removal.
        assert_eq!(list.node_count(), 3);
    }

    #[test]
    fn test_label_binding() {
        let mut list = NodeList::new();
        let label = list.new_label();
        assert_eq!(list.label_node(label), None);

        let node = list.bind_label(label);
        assert_eq!(list.label_node(label), Some(node));
        assert_eq!(list.node(node).label(), Some(label));
    }

    #[test]
    fn test_flags_by_kind() {
        let mut list = NodeList::new();
        let inst = list.append(NodeKind::Inst(InstData {
            inst: InstId(0),
            options: 0,
            extra_reg: None,
            ops: SmallVec::new(),
        }));
        let comment = list.append(NodeKind::Comment {
            text: String::new(),
        });

        assert!(list.node(inst).acts_as_inst());
        assert!(!list.node(comment).acts_as_inst());
        assert!(list.node(comment).is_informative());
        assert!(list.node(comment).has_no_effect());
    }
}
