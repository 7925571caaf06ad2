//! Symmetric/Hermitian rank-2 update, c += alpha*x*y^H + conj(alpha)*y*x^H
//! on the lower triangle, executed through pre-built control trees.
//!
//! The trees live in an [`OperationRegistry`]; the `_in` entry points take
//! one by reference, the plain entry points use a process-wide default built
//! from the detected hardware's tile sizes.

pub(crate) mod exec;

use exec::run_rank2;
pub use exec::{MatViewMut, VecView};
use num_complex::{Complex32, Complex64};
use once_cell::sync::Lazy;
use paste::paste;
use tessel_base::{default_block_sizes, OperationRegistry, Precision, StorageOrder};

pub trait Her2Num:
    Copy + Send + Sync + core::ops::Add<Output = Self> + core::ops::Mul<Output = Self> + core::ops::AddAssign + 'static
{
    const PRECISION: Precision;
    const IS_COMPLEX: bool;
    fn conj(self) -> Self;
    fn zero_imag(self) -> Self;
    fn zero() -> Self;
}

impl Her2Num for f32 {
    const PRECISION: Precision = Precision::F32;
    const IS_COMPLEX: bool = false;
    fn conj(self) -> Self {
        self
    }
    fn zero_imag(self) -> Self {
        self
    }
    fn zero() -> Self {
        0.0
    }
}

impl Her2Num for f64 {
    const PRECISION: Precision = Precision::F64;
    const IS_COMPLEX: bool = false;
    fn conj(self) -> Self {
        self
    }
    fn zero_imag(self) -> Self {
        self
    }
    fn zero() -> Self {
        0.0
    }
}

impl Her2Num for Complex32 {
    const PRECISION: Precision = Precision::C32;
    const IS_COMPLEX: bool = true;
    fn conj(self) -> Self {
        Complex32::new(self.re, -self.im)
    }
    fn zero_imag(self) -> Self {
        Complex32::new(self.re, 0.0)
    }
    fn zero() -> Self {
        Complex32::new(0.0, 0.0)
    }
}

impl Her2Num for Complex64 {
    const PRECISION: Precision = Precision::C64;
    const IS_COMPLEX: bool = true;
    fn conj(self) -> Self {
        Complex64::new(self.re, -self.im)
    }
    fn zero_imag(self) -> Self {
        Complex64::new(self.re, 0.0)
    }
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
}

static DEFAULT_REGISTRY: Lazy<OperationRegistry> = Lazy::new(|| OperationRegistry::build(default_block_sizes()));

/// Run the rank-2 update through the tree matching the output's storage
/// order. A layout with neither unit stride is normalized to the
/// column-preferential tree; the two preferences are the only cases.
pub unsafe fn her2_fused<T: Her2Num>(
    reg: &OperationRegistry,
    m: usize,
    alpha: T,
    x: VecView<T>,
    y: VecView<T>,
    c: MatViewMut<T>,
) {
    if m == 0 {
        return;
    }
    let order = if c.rs() == 1 {
        StorageOrder::ColPref
    } else if c.cs() == 1 {
        StorageOrder::RowPref
    } else {
        StorageOrder::ColPref
    };
    run_rank2(reg, reg.rank2_blocked(order), m, alpha, x, y, c);
}

macro_rules! def_her2_api {
    ($name:ident, $t:ty) => {
        paste! {
            pub unsafe fn [<tessel_ $name _in>](
                reg: &OperationRegistry,
                m: usize,
                alpha: $t,
                x: *const $t,
                incx: usize,
                y: *const $t,
                incy: usize,
                c: *mut $t,
                c_rs: usize,
                c_cs: usize,
            ) {
                let x = VecView::strided(x, incx);
                let y = VecView::strided(y, incy);
                let c = MatViewMut::strided(c, c_rs, c_cs);
                her2_fused(reg, m, alpha, x, y, c);
            }

            pub unsafe fn [<tessel_ $name>](
                m: usize,
                alpha: $t,
                x: *const $t,
                incx: usize,
                y: *const $t,
                incy: usize,
                c: *mut $t,
                c_rs: usize,
                c_cs: usize,
            ) {
                [<tessel_ $name _in>](&DEFAULT_REGISTRY, m, alpha, x, incx, y, incy, c, c_rs, c_cs);
            }
        }
    };
}

def_her2_api!(ssyr2, f32);
def_her2_api!(dsyr2, f64);
def_her2_api!(cher2, Complex32);
def_her2_api!(zher2, Complex64);

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_base::BlockSizes;
    use tessel_dev::{
        check_her2_c32, check_her2_c64, check_her2_f32, check_her2_f64, generate_m_dims, random_matrix_uniform,
    };

    enum CLayout {
        Col,
        Row,
        Gen,
    }

    impl CLayout {
        fn strides(&self, m: usize) -> (usize, usize) {
            match self {
                CLayout::Col => (1, m),
                CLayout::Row => (m, 1),
                // neither stride is unit, forces the matrix pack/unpack path
                CLayout::Gen => (2, 2 * m),
            }
        }

        fn buf_len(&self, m: usize) -> usize {
            match self {
                CLayout::Gen => 2 * m * m,
                _ => m * m,
            }
        }
    }

    const MC: usize = 24;

    macro_rules! def_her2_tests {
        ($t:ty, $suffix:ident, $api:ident, $alpha:expr, $eps:expr) => {
            paste! {
                fn [<run_ $suffix>](layout: CLayout, incx: usize, incy: usize) {
                    let reg = OperationRegistry::build(BlockSizes::new(MC, MC, MC, MC));
                    let alpha: $t = $alpha;
                    for &m in &generate_m_dims(MC) {
                        let (c_rs, c_cs) = layout.strides(m);
                        let mut xy = vec![<$t>::default(); m * incx + m * incy];
                        random_matrix_uniform(&mut xy);
                        let (x, y) = xy.split_at(m * incx);
                        let mut c = vec![<$t>::default(); layout.buf_len(m)];
                        random_matrix_uniform(&mut c);
                        let mut c_ref = c.clone();
                        unsafe {
                            [<$api _in>](&reg, m, alpha, x.as_ptr(), incx, y.as_ptr(), incy, c.as_mut_ptr(), c_rs, c_cs);
                        }
                        let diff = unsafe {
                            [<check_her2_ $suffix>](m, alpha, x.as_ptr(), incx, y.as_ptr(), incy, &c, c_rs, c_cs, &mut c_ref)
                        };
                        assert!(diff < $eps, "diff: {}, m: {}, incx: {}, incy: {}", diff, m, incx, incy);
                    }
                }

                #[test]
                fn [<test_ $suffix _col>]() {
                    [<run_ $suffix>](CLayout::Col, 1, 1);
                }

                #[test]
                fn [<test_ $suffix _row>]() {
                    [<run_ $suffix>](CLayout::Row, 1, 1);
                }

                #[test]
                fn [<test_ $suffix _col_xp_yp>]() {
                    [<run_ $suffix>](CLayout::Col, 2, 3);
                }

                #[test]
                fn [<test_ $suffix _row_xp_yp>]() {
                    [<run_ $suffix>](CLayout::Row, 3, 2);
                }

                #[test]
                fn [<test_ $suffix _gen_cp>]() {
                    [<run_ $suffix>](CLayout::Gen, 2, 1);
                }
            }
        };
    }

    def_her2_tests!(f32, f32, tessel_ssyr2, 1.79, 1e-3);
    def_her2_tests!(f64, f64, tessel_dsyr2, 1.79, 1e-9);
    def_her2_tests!(Complex32, c32, tessel_cher2, Complex32::new(1.2, -0.7), 1e-3);
    def_her2_tests!(Complex64, c64, tessel_zher2, Complex64::new(1.2, -0.7), 1e-9);

    // the default registry carries hardware-tuned tiles, so these dims stay
    // mostly inside a single block
    #[test]
    fn test_f64_default_registry() {
        for &m in &[1usize, 67, 137] {
            let mut xy = vec![0f64; 2 * m];
            random_matrix_uniform(&mut xy);
            let (x, y) = xy.split_at(m);
            let mut c = vec![0f64; m * m];
            random_matrix_uniform(&mut c);
            let mut c_ref = c.clone();
            unsafe {
                tessel_dsyr2(m, 1.79, x.as_ptr(), 1, y.as_ptr(), 1, c.as_mut_ptr(), 1, m);
            }
            let diff = unsafe { check_her2_f64(m, 1.79, x.as_ptr(), 1, y.as_ptr(), 1, &c, 1, m, &mut c_ref) };
            assert!(diff < 1e-9, "diff: {}, m: {}", diff, m);
        }
    }

    #[test]
    fn test_zero_dim_is_noop() {
        let reg = OperationRegistry::build(BlockSizes::new(MC, MC, MC, MC));
        let x = [1.0f64];
        let y = [1.0f64];
        let mut c = [7.0f64];
        unsafe {
            tessel_dsyr2_in(&reg, 0, 1.0, x.as_ptr(), 1, y.as_ptr(), 1, c.as_mut_ptr(), 1, 1);
        }
        assert_eq!(c[0], 7.0);
    }

    // hermitian output has a real diagonal even when the input diagonal does
    // not
    #[test]
    fn test_c64_diagonal_realified() {
        let reg = OperationRegistry::build(BlockSizes::new(4, 4, 4, 4));
        let m = 11;
        let mut xy = vec![Complex64::default(); 2 * m];
        random_matrix_uniform(&mut xy);
        let (x, y) = xy.split_at(m);
        let mut c = vec![Complex64::new(0.5, 0.25); m * m];
        unsafe {
            tessel_zher2_in(&reg, m, Complex64::new(1.2, -0.7), x.as_ptr(), 1, y.as_ptr(), 1, c.as_mut_ptr(), 1, m);
        }
        for i in 0..m {
            assert_eq!(c[i + i * m].im, 0.0);
        }
    }
}
