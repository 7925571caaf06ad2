//! # This crate is only for internal use in the tessel project
//! Control-tree engine shared by the operation crates.
//! No semver guarantees

use once_cell::sync::Lazy;

pub mod cntl;
pub mod registry;

pub use cntl::{BlkszId, BlockSizes, BlockedNode, CntlArena, CntlNode, ImplKind, LeafNode, NodeId, OpKind, PackKind, PackNode, Precision, UnpackNode, Variant};
pub use registry::{variant_rule, OperationRegistry, StorageOrder, VariantRule, VARIANT_RULES};

pub const PANEL_ALIGN: usize = 1024;

#[cfg(target_arch = "x86_64")]
#[derive(Copy, Clone)]
pub struct CpuFeatures {
    pub avx: bool,
    pub fma: bool,
    pub avx512f: bool,
}

#[cfg(target_arch = "aarch64")]
#[derive(Copy, Clone)]
pub struct CpuFeatures {
    pub neon: bool,
    pub sve: bool,
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[derive(Copy, Clone)]
pub struct CpuFeatures {
    pub dummy: bool,
}

pub struct HWConfig {
    pub cpu_ft: CpuFeatures,
    pub hw_model: HWModel,
}

impl HWConfig {
    pub fn hw_model(&self) -> HWModel {
        self.hw_model
    }

    pub fn cpu_ft(&self) -> CpuFeatures {
        self.cpu_ft
    }
}

#[derive(Copy, Clone)]
pub enum HWModel {
    Reference,
    Haswell,
    Skylake,
}

const SKYLAKE: [u8; 13] = [78, 85, 94, 126, 140, 141, 167, 151, 154, 183, 186, 143, 207];

const HASWELL: [u8; 10] = [69, 70, 63, 42, 58, 165, 79, 86, 61, 71];

impl HWModel {
    pub fn from_hw(family_id: u8, model_id: u8, _cpu_ft: CpuFeatures) -> Self {
        if family_id == 6 {
            if SKYLAKE.contains(&model_id) {
                return HWModel::Skylake;
            }
            if HASWELL.contains(&model_id) {
                return HWModel::Haswell;
            }
        }
        // if model id is not in the list, default by looking at cpu features
        #[cfg(target_arch = "x86_64")]
        {
            if _cpu_ft.avx512f {
                return HWModel::Skylake;
            }
            if _cpu_ft.avx {
                return HWModel::Haswell;
            }
        }
        return HWModel::Reference;
    }
}

// Use family and model id instead of cache size parameters
// since the relation between optimal blocking and cache size can be non-trivial
// and cpu model dependent

#[inline]
fn detect_hw_config() -> HWConfig {
    #[cfg(target_arch = "x86_64")]
    {
        let cpuid = raw_cpuid::CpuId::new();
        let feature_info = cpuid.get_feature_info().unwrap();
        let extended_feature_info = cpuid.get_extended_feature_info().unwrap();
        let avx = feature_info.has_avx();
        let fma = feature_info.has_fma();
        let avx512f = extended_feature_info.has_avx512f();
        let cpu_ft = CpuFeatures { avx, fma, avx512f };
        let family_id = feature_info.family_id();
        let model_id = feature_info.model_id();
        let hw_model = HWModel::from_hw(family_id, model_id, cpu_ft);
        return HWConfig { cpu_ft, hw_model };
    }
    #[cfg(target_arch = "aarch64")]
    {
        use std::arch::is_aarch64_feature_detected;
        let neon = is_aarch64_feature_detected!("neon");
        let sve = is_aarch64_feature_detected!("sve");
        return HWConfig { cpu_ft: CpuFeatures { neon, sve }, hw_model: HWModel::Reference };
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        HWConfig { cpu_ft: CpuFeatures { dummy: true }, hw_model: HWModel::Reference }
    }
}

pub static RUNTIME_HW_CONFIG: Lazy<HWConfig> = Lazy::new(|| detect_hw_config());

// TESSEL_MC overrides the matrix-dimension tile for all four precisions
static TESSEL_MC: Lazy<Option<usize>> = Lazy::new(|| {
    let x = std::env::var("TESSEL_MC").ok();
    x.map(|x| x.parse::<usize>().unwrap())
});

pub fn hw_model() -> HWModel {
    RUNTIME_HW_CONFIG.hw_model
}

// mc tiles for the blocked rank-2 update, per precision, tuned per cpu model
pub fn default_block_sizes() -> BlockSizes {
    if let Some(mc) = *TESSEL_MC {
        return BlockSizes::new(mc, mc, mc, mc);
    }
    let (s, d, c, z) = match hw_model() {
        HWModel::Skylake => (256, 128, 128, 64),
        HWModel::Haswell => (192, 96, 96, 48),
        HWModel::Reference => (128, 64, 64, 32),
    };
    BlockSizes::new(s, d, c, z)
}
