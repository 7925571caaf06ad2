//! # This crate is only for internal use in the tessel project
//! Randomized operand generation and residual checks for the operation
//! crates' tests. No semver guarantees

use num_complex::{Complex, Complex32, Complex64};
use paste::paste;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub trait Bound {
    type X: rand::distributions::uniform::SampleUniform;
    fn min_value() -> Self::X;
    fn max_value() -> Self::X;
    fn my_sample(dist: &Uniform<Self::X>, rng: &mut StdRng) -> Self;
}

impl Bound for f32 {
    type X = f32;
    fn min_value() -> Self {
        -2.0
    }
    fn max_value() -> Self {
        2.0
    }
    fn my_sample(dist: &Uniform<Self>, rng: &mut StdRng) -> Self {
        dist.sample(rng)
    }
}

impl Bound for f64 {
    type X = f64;
    fn min_value() -> Self {
        -2.0
    }
    fn max_value() -> Self {
        2.0
    }
    fn my_sample(dist: &Uniform<Self>, rng: &mut StdRng) -> Self {
        dist.sample(rng)
    }
}

impl Bound for Complex<f32> {
    type X = f32;
    fn min_value() -> f32 {
        -1.0
    }
    fn max_value() -> f32 {
        1.0
    }
    fn my_sample(dist: &Uniform<f32>, rng: &mut StdRng) -> Self {
        let x = dist.sample(rng);
        let y = dist.sample(rng);
        Complex::new(x, y)
    }
}

impl Bound for Complex<f64> {
    type X = f64;
    fn min_value() -> f64 {
        -1.0
    }
    fn max_value() -> f64 {
        1.0
    }
    fn my_sample(dist: &Uniform<f64>, rng: &mut StdRng) -> Self {
        let x = dist.sample(rng);
        let y = dist.sample(rng);
        Complex::new(x, y)
    }
}

pub fn random_matrix_uniform<T>(arr: &mut [T])
where
    T: Bound,
    T::X: rand::distributions::uniform::SampleUniform,
{
    let t0 = T::min_value();
    let t1 = T::max_value();
    let mut x = StdRng::seed_from_u64(43);
    let un_dist = Uniform::new(t0, t1);
    arr.iter_mut().for_each(|p| *p = T::my_sample(&un_dist, &mut x));
}

pub trait Diff {
    fn diff(&self, other: &Self) -> f64;
}

impl Diff for f32 {
    fn diff(&self, other: &Self) -> f64 {
        let diff_abs = (self - other).abs();
        let diff_rel = diff_abs / self.abs();
        diff_abs.min(diff_rel) as f64
    }
}

impl Diff for f64 {
    fn diff(&self, other: &Self) -> f64 {
        let diff_abs = (self - other).abs();
        let diff_rel = diff_abs / self.abs();
        diff_abs.min(diff_rel)
    }
}

impl Diff for Complex<f32> {
    fn diff(&self, other: &Self) -> f64 {
        let diff_re = self.re.diff(&other.re);
        let diff_im = self.im.diff(&other.im);
        diff_re.max(diff_im)
    }
}

impl Diff for Complex<f64> {
    fn diff(&self, other: &Self) -> f64 {
        let diff_re = self.re.diff(&other.re);
        let diff_im = self.im.diff(&other.im);
        diff_re.max(diff_im)
    }
}

pub fn max_abs_diff<T: Copy + Diff>(ap: &[T], bp: &[T]) -> f64 {
    let mut diff = 0_f64;
    for i in 0..ap.len() {
        let cur_diff = ap[i].diff(&bp[i]);
        if cur_diff > diff {
            diff = cur_diff;
        }
    }
    diff
}

/// Dimensions straddling the cache-block boundary: sub-block, exact
/// multiples, and off-by-one around them.
pub fn generate_m_dims(mc: usize) -> Vec<usize> {
    vec![1, 2, 3, mc - 1, mc, mc + 1, 2 * mc, 2 * mc + 3, 3 * mc - 1]
}

fn conj_f32(x: f32) -> f32 {
    x
}
fn conj_f64(x: f64) -> f64 {
    x
}
fn conj_c32(x: Complex32) -> Complex32 {
    Complex::new(x.re, -x.im)
}
fn conj_c64(x: Complex64) -> Complex64 {
    Complex::new(x.re, -x.im)
}

fn realify_f32(x: f32) -> f32 {
    x
}
fn realify_f64(x: f64) -> f64 {
    x
}
fn realify_c32(x: Complex32) -> Complex32 {
    Complex::new(x.re, 0.0)
}
fn realify_c64(x: Complex64) -> Complex64 {
    Complex::new(x.re, 0.0)
}

macro_rules! def_her2_check {
    ($t:ty, $suffix:ident, $conj:path, $realify:path) => {
        paste! {
            /// Naive lower-triangular rank-2 update,
            /// c += alpha*x*y^H + conj(alpha)*y*x^H, imaginary diagonal
            /// forced to zero for the complex precisions.
            pub unsafe fn [<her2_fallback_ $suffix>](
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
                for j in 0..m {
                    let yj = $conj(*y.add(j * incy));
                    let xj = $conj(*x.add(j * incx));
                    for i in j..m {
                        let t1 = alpha * *x.add(i * incx) * yj;
                        let t2 = $conj(alpha) * *y.add(i * incy) * xj;
                        *c.add(i * c_rs + j * c_cs) += t1 + t2;
                    }
                }
                for i in 0..m {
                    let p = c.add(i * c_rs + i * c_cs);
                    *p = $realify(*p);
                }
            }

            /// Run the fallback on c_ref and report the largest elementwise
            /// residual against c.
            pub unsafe fn [<check_her2_ $suffix>](
                m: usize,
                alpha: $t,
                x: *const $t,
                incx: usize,
                y: *const $t,
                incy: usize,
                c: &[$t],
                c_rs: usize,
                c_cs: usize,
                c_ref: &mut [$t],
            ) -> f64 {
                [<her2_fallback_ $suffix>](m, alpha, x, incx, y, incy, c_ref.as_mut_ptr(), c_rs, c_cs);
                max_abs_diff(c, c_ref)
            }
        }
    };
}

def_her2_check!(f32, f32, conj_f32, realify_f32);
def_her2_check!(f64, f64, conj_f64, realify_f64);
def_her2_check!(Complex32, c32, conj_c32, realify_c32);
def_her2_check!(Complex64, c64, conj_c64, realify_c64);
