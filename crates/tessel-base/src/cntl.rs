//! Control nodes and the arena that owns them.
//!
//! A control node describes the execution strategy of one operation: which
//! algorithmic variant to run, which cache tile to partition with, and which
//! sub-operations (packing, unpacking, lower-level kernels) it delegates to.
//! All nodes of one registry build live in a single `CntlArena` and reference
//! each other by handle, so teardown is one arena drop and a shared sub-node
//! can never be freed twice.

/// Floating-point representation a blocking factor or kernel is keyed by.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Precision {
    F32,
    F64,
    C32,
    C64,
}

/// Cache tile sizes for the partitioned dimension, one per precision.
#[derive(Copy, Clone, Debug)]
pub struct BlockSizes {
    s: usize,
    d: usize,
    c: usize,
    z: usize,
}

impl BlockSizes {
    /// Callers supply architecture-tuned values; the only requirement is
    /// that every tile is positive.
    pub fn new(s: usize, d: usize, c: usize, z: usize) -> Self {
        assert!(s > 0 && d > 0 && c > 0 && z > 0, "tile sizes must be positive");
        Self { s, d, c, z }
    }

    pub fn get(&self, dt: Precision) -> usize {
        match dt {
            Precision::F32 => self.s,
            Precision::F64 => self.d,
            Precision::C32 => self.c,
            Precision::C64 => self.z,
        }
    }
}

/// Handle to a control node inside its owning arena.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct NodeId(u32);

/// Handle to a blocking factor inside its owning arena.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BlkszId(u32);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ImplKind {
    UnbFused,
    Blocked,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Variant {
    Var1,
    Var2,
    Var3,
    Var4,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OpKind {
    Rank1,
    Rank2,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PackKind {
    Vector,
    MatrixNoScale,
}

/// Recursion leaf: bottoms out directly in a fused numeric kernel bound to
/// `(op, variant)`. Terminal, so it carries no blocking factor and no
/// sub-node references.
#[derive(Copy, Clone, Debug)]
pub struct LeafNode {
    pub op: OpKind,
    pub variant: Variant,
}

/// Blocked node: partitions with `blksz` and delegates per block.
///
/// The three pack slots and the unpack slot are optional; `None` means the
/// executing variant operates on that operand in its native layout. The two
/// rank-1 slots are the delegate trees for the two conjugate terms of the
/// rank-2 update, one tuned for row-preferential and one for
/// column-preferential storage.
#[derive(Copy, Clone, Debug)]
pub struct BlockedNode {
    pub op: OpKind,
    pub variant: Variant,
    pub blksz: BlkszId,
    pub pack_x: Option<NodeId>,
    pub pack_y: Option<NodeId>,
    pub pack_c: Option<NodeId>,
    pub rank1_rp: NodeId,
    pub rank1_cp: NodeId,
    pub leaf: NodeId,
    pub unpack_c: Option<NodeId>,
}

#[derive(Copy, Clone, Debug)]
pub struct PackNode {
    pub kind: PackKind,
}

#[derive(Copy, Clone, Debug)]
pub struct UnpackNode {
    pub kind: PackKind,
}

#[derive(Copy, Clone, Debug)]
pub enum CntlNode {
    Leaf(LeafNode),
    Blocked(BlockedNode),
    Pack(PackNode),
    Unpack(UnpackNode),
}

/// Owns every control node and blocking factor of one registry build.
///
/// Append-only: a node can only reference handles that already exist, so any
/// tree built through the factory is a DAG by construction. Nodes are never
/// mutated after the build except through `init_update_in_place`, which
/// rebuilds a slot wholesale while preserving its handle.
pub struct CntlArena {
    nodes: Vec<CntlNode>,
    blkszs: Vec<BlockSizes>,
}

impl CntlArena {
    pub fn new() -> Self {
        Self { nodes: vec![], blkszs: vec![] }
    }

    pub fn create_blksz(&mut self, sizes: BlockSizes) -> BlkszId {
        self.blkszs.push(sizes);
        BlkszId(self.blkszs.len() as u32 - 1)
    }

    pub fn block_size(&self, id: BlkszId, dt: Precision) -> usize {
        self.blkszs[id.0 as usize].get(dt)
    }

    /// Build an update node (leaf or blocked) from the ten strategy
    /// parameters. Parameters are stored verbatim; the only checks are the
    /// structural ones that cannot be expressed in the node types:
    /// a terminal node must not carry sub-references, and an unpack node is
    /// only meaningful for a packed output.
    fn build_update(
        &self,
        op: OpKind,
        impl_kind: ImplKind,
        variant: Variant,
        blksz: Option<BlkszId>,
        pack_x: Option<NodeId>,
        pack_y: Option<NodeId>,
        pack_c: Option<NodeId>,
        rank1_rp: Option<NodeId>,
        rank1_cp: Option<NodeId>,
        sub_leaf: Option<NodeId>,
        unpack_c: Option<NodeId>,
    ) -> CntlNode {
        match impl_kind {
            ImplKind::UnbFused => {
                assert!(
                    blksz.is_none()
                        && pack_x.is_none()
                        && pack_y.is_none()
                        && pack_c.is_none()
                        && rank1_rp.is_none()
                        && rank1_cp.is_none()
                        && sub_leaf.is_none()
                        && unpack_c.is_none(),
                    "unblocked-fused node is terminal"
                );
                CntlNode::Leaf(LeafNode { op, variant })
            }
            ImplKind::Blocked => {
                let blksz = match blksz {
                    Some(b) => b,
                    None => panic!("blocked node requires a blocking factor"),
                };
                let leaf = match sub_leaf {
                    Some(l) => l,
                    None => panic!("blocked node requires a leaf delegate"),
                };
                let rank1_rp = match rank1_rp {
                    Some(g) => g,
                    None => panic!("blocked node requires a row-preferential rank-1 delegate"),
                };
                let rank1_cp = match rank1_cp {
                    Some(g) => g,
                    None => panic!("blocked node requires a column-preferential rank-1 delegate"),
                };
                // a packed output is the only thing there is to unpack
                assert!(unpack_c.is_none() || pack_c.is_some(), "unpack node requires a packed output operand");
                CntlNode::Blocked(BlockedNode {
                    op,
                    variant,
                    blksz,
                    pack_x,
                    pack_y,
                    pack_c,
                    rank1_rp,
                    rank1_cp,
                    leaf,
                    unpack_c,
                })
            }
        }
    }

    pub fn create_update(
        &mut self,
        op: OpKind,
        impl_kind: ImplKind,
        variant: Variant,
        blksz: Option<BlkszId>,
        pack_x: Option<NodeId>,
        pack_y: Option<NodeId>,
        pack_c: Option<NodeId>,
        rank1_rp: Option<NodeId>,
        rank1_cp: Option<NodeId>,
        sub_leaf: Option<NodeId>,
        unpack_c: Option<NodeId>,
    ) -> NodeId {
        let node =
            self.build_update(op, impl_kind, variant, blksz, pack_x, pack_y, pack_c, rank1_rp, rank1_cp, sub_leaf, unpack_c);
        self.nodes.push(node);
        NodeId(self.nodes.len() as u32 - 1)
    }

    /// Rebuild an existing node's strategy wholesale. The handle (and hence
    /// every reference other nodes hold to it) stays valid and observes the
    /// new fields.
    pub fn init_update_in_place(
        &mut self,
        node: NodeId,
        op: OpKind,
        impl_kind: ImplKind,
        variant: Variant,
        blksz: Option<BlkszId>,
        pack_x: Option<NodeId>,
        pack_y: Option<NodeId>,
        pack_c: Option<NodeId>,
        rank1_rp: Option<NodeId>,
        rank1_cp: Option<NodeId>,
        sub_leaf: Option<NodeId>,
        unpack_c: Option<NodeId>,
    ) {
        let rebuilt =
            self.build_update(op, impl_kind, variant, blksz, pack_x, pack_y, pack_c, rank1_rp, rank1_cp, sub_leaf, unpack_c);
        self.nodes[node.0 as usize] = rebuilt;
    }

    pub fn create_pack(&mut self, kind: PackKind) -> NodeId {
        self.nodes.push(CntlNode::Pack(PackNode { kind }));
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn create_unpack(&mut self, kind: PackKind) -> NodeId {
        self.nodes.push(CntlNode::Unpack(UnpackNode { kind }));
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn node(&self, id: NodeId) -> &CntlNode {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(arena: &mut CntlArena, op: OpKind, variant: Variant) -> NodeId {
        arena.create_update(op, ImplKind::UnbFused, variant, None, None, None, None, None, None, None, None)
    }

    #[test]
    fn test_arena_accounting() {
        let mut arena = CntlArena::new();
        let mc = arena.create_blksz(BlockSizes::new(8, 8, 8, 8));
        let l = leaf(&mut arena, OpKind::Rank2, Variant::Var1);
        let g = leaf(&mut arena, OpKind::Rank1, Variant::Var2);
        let b = arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            Variant::Var1,
            Some(mc),
            None,
            None,
            None,
            Some(g),
            Some(g),
            Some(l),
            None,
        );
        assert_eq!(arena.len(), 3);
        assert_ne!(l, g);
        assert_ne!(g, b);
        assert_eq!(arena.block_size(mc, Precision::C64), 8);
    }

    #[test]
    #[should_panic(expected = "terminal")]
    fn test_leaf_rejects_blocking_factor() {
        let mut arena = CntlArena::new();
        let mc = arena.create_blksz(BlockSizes::new(8, 8, 8, 8));
        arena.create_update(OpKind::Rank2, ImplKind::UnbFused, Variant::Var1, Some(mc), None, None, None, None, None, None, None);
    }

    #[test]
    #[should_panic(expected = "leaf delegate")]
    fn test_blocked_requires_leaf_delegate() {
        let mut arena = CntlArena::new();
        let mc = arena.create_blksz(BlockSizes::new(8, 8, 8, 8));
        let g = leaf(&mut arena, OpKind::Rank1, Variant::Var2);
        arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            Variant::Var1,
            Some(mc),
            None,
            None,
            None,
            Some(g),
            Some(g),
            None,
            None,
        );
    }

    #[test]
    #[should_panic(expected = "blocking factor")]
    fn test_blocked_requires_blocking_factor() {
        let mut arena = CntlArena::new();
        let l = leaf(&mut arena, OpKind::Rank2, Variant::Var1);
        let g = leaf(&mut arena, OpKind::Rank1, Variant::Var2);
        arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            Variant::Var1,
            None,
            None,
            None,
            None,
            Some(g),
            Some(g),
            Some(l),
            None,
        );
    }

    #[test]
    #[should_panic(expected = "packed output")]
    fn test_unpack_requires_packed_output() {
        let mut arena = CntlArena::new();
        let mc = arena.create_blksz(BlockSizes::new(8, 8, 8, 8));
        let l = leaf(&mut arena, OpKind::Rank2, Variant::Var1);
        let g = leaf(&mut arena, OpKind::Rank1, Variant::Var2);
        let unpack = arena.create_unpack(PackKind::MatrixNoScale);
        // all pack slots absent, unpack present
        arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            Variant::Var1,
            Some(mc),
            None,
            None,
            None,
            Some(g),
            Some(g),
            Some(l),
            Some(unpack),
        );
    }

    #[test]
    #[should_panic(expected = "positive")]
    fn test_zero_tile_rejected() {
        BlockSizes::new(4, 0, 4, 4);
    }

    #[test]
    fn test_init_in_place_preserves_identity() {
        let mut arena = CntlArena::new();
        let mc = arena.create_blksz(BlockSizes::new(8, 8, 8, 8));
        let l = leaf(&mut arena, OpKind::Rank2, Variant::Var1);
        let g = leaf(&mut arena, OpKind::Rank1, Variant::Var2);
        let b = arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            Variant::Var1,
            Some(mc),
            None,
            None,
            None,
            Some(g),
            Some(g),
            Some(l),
            None,
        );
        // rebuild the leaf with a different variant; the blocked node's
        // reference must keep pointing at it and see the new variant
        arena.init_update_in_place(l, OpKind::Rank2, ImplKind::UnbFused, Variant::Var4, None, None, None, None, None, None, None, None);
        let leaf_ref = match arena.node(b) {
            CntlNode::Blocked(node) => node.leaf,
            _ => panic!("expected blocked node"),
        };
        assert_eq!(leaf_ref, l);
        match arena.node(leaf_ref) {
            CntlNode::Leaf(node) => assert_eq!(node.variant, Variant::Var4),
            _ => panic!("expected leaf node"),
        }
        // the sibling delegate was not touched
        match arena.node(g) {
            CntlNode::Leaf(node) => assert_eq!(node.variant, Variant::Var2),
            _ => panic!("expected leaf node"),
        }
    }
}
