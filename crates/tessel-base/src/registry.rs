//! Operation registry: the named control trees, built once and read-only
//! afterwards.
//!
//! The build sequence follows the rank-2 update composition: blocking factor
//! first, then the unblocked-fused base-case trees, then the rank-1 delegate
//! trees and the packing/unpacking nodes, and finally the two blocked trees
//! that reference all of the above. The registry owns the arena, so dropping
//! it releases every node exactly once.

use crate::cntl::{BlkszId, BlockSizes, CntlArena, CntlNode, ImplKind, NodeId, OpKind, PackKind, Precision, Variant};

/// The two recognized storage-order preferences. Any operand layout that is
/// neither row- nor column-preferential must be normalized to one of the two
/// by the dispatcher before tree selection.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StorageOrder {
    RowPref,
    ColPref,
}

/// One row of the variant-selection table.
pub struct VariantRule {
    pub op: OpKind,
    pub order: StorageOrder,
    pub variant: Variant,
    pub rank1_order: StorageOrder,
}

/// Storage-order-to-variant mapping, total over {op} x {storage order}.
/// Rank-2 pairs Var1 with row storage and Var4 with column storage; the
/// rank-1 trees get Var2/Var3 so the two blocked trees share no variant id.
pub const VARIANT_RULES: [VariantRule; 4] = [
    VariantRule { op: OpKind::Rank2, order: StorageOrder::RowPref, variant: Variant::Var1, rank1_order: StorageOrder::RowPref },
    VariantRule { op: OpKind::Rank2, order: StorageOrder::ColPref, variant: Variant::Var4, rank1_order: StorageOrder::ColPref },
    VariantRule { op: OpKind::Rank1, order: StorageOrder::RowPref, variant: Variant::Var2, rank1_order: StorageOrder::RowPref },
    VariantRule { op: OpKind::Rank1, order: StorageOrder::ColPref, variant: Variant::Var3, rank1_order: StorageOrder::ColPref },
];

pub fn variant_rule(op: OpKind, order: StorageOrder) -> &'static VariantRule {
    for rule in VARIANT_RULES.iter() {
        if rule.op == op && rule.order == order {
            return rule;
        }
    }
    unreachable!("variant table is total over op and storage order")
}

pub struct OperationRegistry {
    arena: CntlArena,
    rank2_mc: BlkszId,
    rank2_base_row: NodeId,
    rank2_base_col: NodeId,
    rank1_row: NodeId,
    rank1_col: NodeId,
    rank2_ge_row: NodeId,
    rank2_ge_col: NodeId,
}

impl OperationRegistry {
    /// Build every control tree from one set of tile sizes. Runs once per
    /// registry; numeric calls only ever read the result.
    pub fn build(sizes: BlockSizes) -> Self {
        let mut arena = CntlArena::new();
        let rank2_mc = arena.create_blksz(sizes);

        // base-case trees for cache-block-sized subproblems
        let row_rule = variant_rule(OpKind::Rank2, StorageOrder::RowPref);
        let col_rule = variant_rule(OpKind::Rank2, StorageOrder::ColPref);
        let rank2_base_row = arena.create_update(
            OpKind::Rank2,
            ImplKind::UnbFused,
            row_rule.variant,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        );
        let rank2_base_col = arena.create_update(
            OpKind::Rank2,
            ImplKind::UnbFused,
            col_rule.variant,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        );

        // rank-1 delegate trees, invoked once per conjugate term of each block
        let rank1_row = arena.create_update(
            OpKind::Rank1,
            ImplKind::UnbFused,
            variant_rule(OpKind::Rank1, StorageOrder::RowPref).variant,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        );
        let rank1_col = arena.create_update(
            OpKind::Rank1,
            ImplKind::UnbFused,
            variant_rule(OpKind::Rank1, StorageOrder::ColPref).variant,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        );

        // packing nodes, shared by both blocked trees; attaching them makes
        // packing available, the executing variant invokes it only when the
        // operand's native layout is unsuitable for the kernel
        let pack_x = arena.create_pack(PackKind::Vector);
        let pack_y = arena.create_pack(PackKind::Vector);
        let pack_c = arena.create_pack(PackKind::MatrixNoScale);
        let unpack_c = arena.create_unpack(PackKind::MatrixNoScale);

        // blocked trees for generally large problems, partitioning for the
        // rank-1 subproblems in the same direction as the assumed storage
        let rank1_for = |order: StorageOrder| match order {
            StorageOrder::RowPref => rank1_row,
            StorageOrder::ColPref => rank1_col,
        };
        let rank2_ge_row = arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            row_rule.variant,
            Some(rank2_mc),
            Some(pack_x),
            Some(pack_y),
            Some(pack_c),
            Some(rank1_for(row_rule.rank1_order)),
            Some(rank1_for(row_rule.rank1_order)),
            Some(rank2_base_row),
            Some(unpack_c),
        );
        let rank2_ge_col = arena.create_update(
            OpKind::Rank2,
            ImplKind::Blocked,
            col_rule.variant,
            Some(rank2_mc),
            Some(pack_x),
            Some(pack_y),
            Some(pack_c),
            Some(rank1_for(col_rule.rank1_order)),
            Some(rank1_for(col_rule.rank1_order)),
            Some(rank2_base_col),
            Some(unpack_c),
        );

        Self { arena, rank2_mc, rank2_base_row, rank2_base_col, rank1_row, rank1_col, rank2_ge_row, rank2_ge_col }
    }

    pub fn rank2_blocked(&self, order: StorageOrder) -> NodeId {
        match order {
            StorageOrder::RowPref => self.rank2_ge_row,
            StorageOrder::ColPref => self.rank2_ge_col,
        }
    }

    pub fn rank2_base(&self, order: StorageOrder) -> NodeId {
        match order {
            StorageOrder::RowPref => self.rank2_base_row,
            StorageOrder::ColPref => self.rank2_base_col,
        }
    }

    pub fn rank1(&self, order: StorageOrder) -> NodeId {
        match order {
            StorageOrder::RowPref => self.rank1_row,
            StorageOrder::ColPref => self.rank1_col,
        }
    }

    pub fn rank2_mc(&self) -> BlkszId {
        self.rank2_mc
    }

    pub fn node(&self, id: NodeId) -> &CntlNode {
        self.arena.node(id)
    }

    pub fn block_size(&self, id: BlkszId, dt: Precision) -> usize {
        self.arena.block_size(id, dt)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}
