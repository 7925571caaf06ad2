//! Tree-walking executor and the pack/unpack adapters.
//!
//! A blocked node partitions the matrix dimension by its cache tile. Per
//! block, the diagonal subproblem goes through the leaf delegate (the fused
//! base-case kernel) and the trailing panel gets one rank-1 update per
//! conjugate term through the rank-1 delegate trees. Packing runs only when
//! the tree carries a pack node for the operand and its native layout is
//! strided; a `None` slot means the kernel works in place.

use crate::Her2Num;
use aligned_vec::avec;
use tessel_base::{CntlNode, NodeId, OpKind, OperationRegistry, Variant, PANEL_ALIGN};

#[derive(Copy, Clone)]
pub struct VecView<T> {
    ptr: *const T,
    inc: usize,
}

impl<T: Copy> VecView<T> {
    pub fn strided(ptr: *const T, inc: usize) -> Self {
        Self { ptr, inc }
    }

    pub fn inc(&self) -> usize {
        self.inc
    }

    #[inline(always)]
    pub(crate) unsafe fn at(&self, i: usize) -> T {
        *self.ptr.add(i * self.inc)
    }

    #[inline(always)]
    pub(crate) unsafe fn shift(&self, i: usize) -> Self {
        Self { ptr: self.ptr.add(i * self.inc), inc: self.inc }
    }
}

#[derive(Copy, Clone)]
pub struct MatViewMut<T> {
    ptr: *mut T,
    rs: usize,
    cs: usize,
}

impl<T: Copy> MatViewMut<T> {
    pub fn strided(ptr: *mut T, rs: usize, cs: usize) -> Self {
        Self { ptr, rs, cs }
    }

    pub fn rs(&self) -> usize {
        self.rs
    }

    pub fn cs(&self) -> usize {
        self.cs
    }

    #[inline(always)]
    pub(crate) unsafe fn elem(&self, i: usize, j: usize) -> *mut T {
        self.ptr.add(i * self.rs + j * self.cs)
    }

    #[inline(always)]
    pub(crate) unsafe fn shift(&self, i: usize, j: usize) -> Self {
        Self { ptr: self.ptr.add(i * self.rs + j * self.cs), rs: self.rs, cs: self.cs }
    }
}

// contiguous copy of a strided subvector
pub(crate) unsafe fn pack_vector<T: Copy>(src: VecView<T>, n: usize, dst: &mut [T]) {
    for i in 0..n {
        dst[i] = src.at(i);
    }
}

// lower triangle of an n x n block into a column-major panel with leading
// dimension n
pub(crate) unsafe fn pack_matrix_lower<T: Copy>(src: MatViewMut<T>, n: usize, dst: &mut [T]) {
    for j in 0..n {
        for i in j..n {
            dst[i + j * n] = *src.elem(i, j);
        }
    }
}

pub(crate) unsafe fn unpack_matrix_lower<T: Copy>(src: &[T], n: usize, dst: MatViewMut<T>) {
    for j in 0..n {
        for i in j..n {
            *dst.elem(i, j) = src[i + j * n];
        }
    }
}

/// Unblocked fused kernel: both conjugate terms of the rank-2 update applied
/// to the lower triangle in one sweep. Var1 sweeps row-outer for
/// row-preferential storage, Var4 column-outer for column-preferential.
unsafe fn kernel_rank2_fused<T: Her2Num>(variant: Variant, n: usize, alpha: T, x: VecView<T>, y: VecView<T>, c: MatViewMut<T>) {
    let alpha_c = alpha.conj();
    match variant {
        Variant::Var3 | Variant::Var4 => {
            for j in 0..n {
                let yj = y.at(j).conj();
                let xj = x.at(j).conj();
                for i in j..n {
                    *c.elem(i, j) += alpha * x.at(i) * yj + alpha_c * y.at(i) * xj;
                }
            }
        }
        _ => {
            for i in 0..n {
                let xi = x.at(i);
                let yi = y.at(i);
                for j in 0..=i {
                    *c.elem(i, j) += alpha * xi * y.at(j).conj() + alpha_c * yi * x.at(j).conj();
                }
            }
        }
    }
    if T::IS_COMPLEX {
        // the hermitian result has a real diagonal
        for i in 0..n {
            let p = c.elem(i, i);
            *p = (*p).zero_imag();
        }
    }
}

/// Rank-1 kernel on the off-diagonal panel: a += alpha * x * conj(y)^T.
/// Var2 sweeps row-outer, Var3 column-outer.
unsafe fn kernel_rank1<T: Her2Num>(variant: Variant, m: usize, n: usize, alpha: T, x: VecView<T>, y: VecView<T>, a: MatViewMut<T>) {
    match variant {
        Variant::Var3 | Variant::Var4 => {
            for j in 0..n {
                let w = alpha * y.at(j).conj();
                for i in 0..m {
                    *a.elem(i, j) += x.at(i) * w;
                }
            }
        }
        _ => {
            for i in 0..m {
                let xi = alpha * x.at(i);
                for j in 0..n {
                    *a.elem(i, j) += xi * y.at(j).conj();
                }
            }
        }
    }
}

pub(crate) unsafe fn run_rank1<T: Her2Num>(
    reg: &OperationRegistry,
    id: NodeId,
    m: usize,
    n: usize,
    alpha: T,
    x: VecView<T>,
    y: VecView<T>,
    a: MatViewMut<T>,
) {
    match *reg.node(id) {
        CntlNode::Leaf(l) => {
            debug_assert_eq!(l.op, OpKind::Rank1);
            kernel_rank1(l.variant, m, n, alpha, x, y, a);
        }
        _ => unreachable!("rank-1 delegate trees bottom out in a fused kernel"),
    }
}

pub(crate) unsafe fn run_rank2<T: Her2Num>(
    reg: &OperationRegistry,
    id: NodeId,
    m: usize,
    alpha: T,
    x: VecView<T>,
    y: VecView<T>,
    c: MatViewMut<T>,
) {
    match *reg.node(id) {
        CntlNode::Leaf(l) => {
            debug_assert_eq!(l.op, OpKind::Rank2);
            kernel_rank2_fused(l.variant, m, alpha, x, y, c);
        }
        CntlNode::Blocked(b) => {
            debug_assert_eq!(b.op, OpKind::Rank2);
            let mc = reg.block_size(b.blksz, T::PRECISION);
            let alpha_c = alpha.conj();
            // packing is available when the tree carries a node for the
            // operand; it pays off only when the native layout is strided
            let pack_x1 = b.pack_x.is_some() && x.inc() != 1;
            let pack_y1 = b.pack_y.is_some() && y.inc() != 1;
            let pack_c11 = b.pack_c.is_some() && c.rs() != 1 && c.cs() != 1;
            let mut xbuf = avec![[PANEL_ALIGN]| T::zero(); if pack_x1 { mc } else { 0 }];
            let mut ybuf = avec![[PANEL_ALIGN]| T::zero(); if pack_y1 { mc } else { 0 }];
            let mut cbuf = avec![[PANEL_ALIGN]| T::zero(); if pack_c11 { mc * mc } else { 0 }];
            let mut i = 0;
            while i < m {
                let bs = core::cmp::min(mc, m - i);
                let mut x1 = x.shift(i);
                if pack_x1 {
                    pack_vector(x1, bs, &mut xbuf);
                    x1 = VecView::strided(xbuf.as_ptr(), 1);
                }
                let mut y1 = y.shift(i);
                if pack_y1 {
                    pack_vector(y1, bs, &mut ybuf);
                    y1 = VecView::strided(ybuf.as_ptr(), 1);
                }
                // diagonal block through the base-case tree
                let c11 = c.shift(i, i);
                if pack_c11 {
                    pack_matrix_lower(c11, bs, &mut cbuf);
                    let c11p = MatViewMut::strided(cbuf.as_mut_ptr(), 1, bs);
                    run_rank2(reg, b.leaf, bs, alpha, x1, y1, c11p);
                    if b.unpack_c.is_some() {
                        unpack_matrix_lower(&cbuf, bs, c11);
                    }
                } else {
                    run_rank2(reg, b.leaf, bs, alpha, x1, y1, c11);
                }
                // trailing panel, one rank-1 update per conjugate term
                let m2 = m - i - bs;
                if m2 > 0 {
                    let x2 = x.shift(i + bs);
                    let y2 = y.shift(i + bs);
                    let c21 = c.shift(i + bs, i);
                    run_rank1(reg, b.rank1_rp, m2, bs, alpha, x2, y1, c21);
                    run_rank1(reg, b.rank1_cp, m2, bs, alpha_c, y2, x1, c21);
                }
                i += bs;
            }
        }
        _ => unreachable!("rank-2 trees are built from leaf and blocked nodes"),
    }
}
