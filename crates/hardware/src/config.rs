//! Configuration system for the LSU model.
//!
//! This module defines all configuration structures used to parameterize the
//! model. It provides:
//! 1. **Defaults:** Baseline hardware constants (queue depths, lane widths, HBT layout).
//! 2. **Structures:** Hierarchical config for general, pipeline, queue, bounds-engine,
//!    and collaborator-model parameters.
//! 3. **Validation:** Cross-field checks the queue bit-masks depend on.
//!
//! Configuration is supplied via JSON (`serde_json`) or `LsuConfig::default()`.

use serde::Deserialize;

/// Default configuration constants for the model.
///
/// These values define the baseline configuration when not explicitly
/// overridden in a JSON configuration payload.
mod defaults {
    /// Dispatch/commit lanes per cycle.
    pub const CORE_WIDTH: usize = 2;

    /// Memory issue lanes per cycle.
    pub const MEM_WIDTH: usize = 1;

    /// ROB capacity; only used to compare indices by wrapped age.
    pub const ROB_ENTRIES: usize = 64;

    /// Load queue depth.
    pub const LDQ_ENTRIES: usize = 16;

    /// Store queue depth.
    pub const STQ_ENTRIES: usize = 16;

    /// Memory-check queue depth.
    pub const MCQ_ENTRIES: usize = 16;

    /// Bounds-descriptor queue depth.
    pub const BDQ_ENTRIES: usize = 8;

    /// Cycles an LR reservation blocks bounds traffic.
    pub const LRSC_CYCLES: u32 = 80;

    /// Base physical address of the hash bounds table.
    pub const HBT_BASE_ADDR: u64 = 0x10000;

    /// Probe ways per HBT row.
    pub const HBT_NUM_WAY: u32 = 4;

    /// D-cache model response latency in cycles.
    pub const DCACHE_LATENCY: u64 = 2;

    /// Cache block size in bytes (release-search granularity).
    pub const CACHE_BLOCK_BYTES: u64 = 64;

    /// Page size of the DTLB model in bytes.
    pub const PAGE_BYTES: u64 = 4096;
}

/// Root configuration structure containing all model settings.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use lsu_core::config::LsuConfig;
///
/// let config = LsuConfig::default();
/// assert_eq!(config.pipeline.mem_width, 1);
/// assert_eq!(config.wyfy.hbt_num_way, 4);
/// config.validate().unwrap();
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use lsu_core::config::LsuConfig;
///
/// let json = r#"{
///     "general": { "trace": true },
///     "pipeline": { "core_width": 2, "mem_width": 2 },
///     "queues": { "ldq_entries": 24, "stq_entries": 24 },
///     "wyfy": { "enable": true, "hbt_base_addr": 131072, "hbt_num_way": 8 }
/// }"#;
///
/// let config: LsuConfig = serde_json::from_str(json).unwrap();
/// assert!(config.general.trace);
/// assert_eq!(config.queues.ldq_entries, 24);
/// assert_eq!(config.wyfy.hbt_base_addr, 0x20000);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LsuConfig {
    /// General model settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Lane widths and speculation parameters.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Queue depths.
    #[serde(default)]
    pub queues: QueueConfig,
    /// Bounds-check co-engine configuration.
    #[serde(default)]
    pub wyfy: WyfyConfig,
    /// Behavioral D-cache model parameters.
    #[serde(default)]
    pub dcache: DCacheModelConfig,
    /// Behavioral DTLB model parameters.
    #[serde(default)]
    pub dtlb: DTlbModelConfig,
}

impl Default for LsuConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            pipeline: PipelineConfig::default(),
            queues: QueueConfig::default(),
            wyfy: WyfyConfig::default(),
            dcache: DCacheModelConfig::default(),
            dtlb: DTlbModelConfig::default(),
        }
    }
}

impl LsuConfig {
    /// Checks cross-field constraints the implementation relies on.
    ///
    /// Queue depths are capped at 64 because dependence sets
    /// (`st_dep_mask`, `live_store_mask`, the LCAM scratch vectors) are
    /// 64-bit masks.
    pub fn validate(&self) -> Result<(), String> {
        if self.pipeline.mem_width == 0 || self.pipeline.mem_width > 2 {
            return Err(format!(
                "mem_width must be 1 or 2, got {}",
                self.pipeline.mem_width
            ));
        }
        if self.pipeline.core_width == 0 {
            return Err("core_width must be at least 1".into());
        }
        for (name, n) in [
            ("ldq_entries", self.queues.ldq_entries),
            ("stq_entries", self.queues.stq_entries),
            ("mcq_entries", self.queues.mcq_entries),
            ("bdq_entries", self.queues.bdq_entries),
        ] {
            if n < 2 || n > 64 {
                return Err(format!("{} must be in 2..=64, got {}", name, n));
            }
        }
        if self.wyfy.hbt_num_way == 0 {
            return Err("hbt_num_way must be at least 1".into());
        }
        if !self.dcache.block_bytes.is_power_of_two() {
            return Err(format!(
                "block_bytes must be a power of two, got {}",
                self.dcache.block_bytes
            ));
        }
        if !self.dtlb.page_bytes.is_power_of_two() {
            return Err(format!(
                "page_bytes must be a power of two, got {}",
                self.dtlb.page_bytes
            ));
        }
        Ok(())
    }
}

/// General model settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeneralConfig {
    /// Enable per-cycle stage tracing to stderr.
    #[serde(default)]
    pub trace: bool,
}

/// Lane widths and speculation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Dispatch/commit lanes per cycle.
    #[serde(default = "PipelineConfig::default_core_width")]
    pub core_width: usize,

    /// Memory issue lanes per cycle.
    #[serde(default = "PipelineConfig::default_mem_width")]
    pub mem_width: usize,

    /// ROB capacity, for wrapped index-age comparison.
    #[serde(default = "PipelineConfig::default_rob_entries")]
    pub rob_entries: usize,

    /// Cycles an LR reservation blocks bounds traffic.
    #[serde(default = "PipelineConfig::default_lrsc_cycles")]
    pub lrsc_cycles: u32,
}

impl PipelineConfig {
    /// Returns the default dispatch/commit width.
    fn default_core_width() -> usize {
        defaults::CORE_WIDTH
    }

    /// Returns the default memory issue width.
    fn default_mem_width() -> usize {
        defaults::MEM_WIDTH
    }

    /// Returns the default ROB capacity.
    fn default_rob_entries() -> usize {
        defaults::ROB_ENTRIES
    }

    /// Returns the default LR/SC reservation window.
    fn default_lrsc_cycles() -> u32 {
        defaults::LRSC_CYCLES
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            core_width: defaults::CORE_WIDTH,
            mem_width: defaults::MEM_WIDTH,
            rob_entries: defaults::ROB_ENTRIES,
            lrsc_cycles: defaults::LRSC_CYCLES,
        }
    }
}

/// Queue depths.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Load queue depth.
    #[serde(default = "QueueConfig::default_ldq")]
    pub ldq_entries: usize,

    /// Store queue depth.
    #[serde(default = "QueueConfig::default_stq")]
    pub stq_entries: usize,

    /// Memory-check queue depth.
    #[serde(default = "QueueConfig::default_mcq")]
    pub mcq_entries: usize,

    /// Bounds-descriptor queue depth.
    #[serde(default = "QueueConfig::default_bdq")]
    pub bdq_entries: usize,
}

impl QueueConfig {
    /// Returns the default load queue depth.
    fn default_ldq() -> usize {
        defaults::LDQ_ENTRIES
    }

    /// Returns the default store queue depth.
    fn default_stq() -> usize {
        defaults::STQ_ENTRIES
    }

    /// Returns the default memory-check queue depth.
    fn default_mcq() -> usize {
        defaults::MCQ_ENTRIES
    }

    /// Returns the default bounds-descriptor queue depth.
    fn default_bdq() -> usize {
        defaults::BDQ_ENTRIES
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ldq_entries: defaults::LDQ_ENTRIES,
            stq_entries: defaults::STQ_ENTRIES,
            mcq_entries: defaults::MCQ_ENTRIES,
            bdq_entries: defaults::BDQ_ENTRIES,
        }
    }
}

/// Bounds-check co-engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WyfyConfig {
    /// Enable the MCQ/BDQ co-engine. Disabled, memory ops allocate no
    /// MCQ slots and bounds ops are rejected at dispatch.
    #[serde(default = "WyfyConfig::default_enable")]
    pub enable: bool,

    /// Base physical address of the hash bounds table.
    #[serde(default = "WyfyConfig::default_hbt_base")]
    pub hbt_base_addr: u64,

    /// Probe ways per HBT row.
    #[serde(default = "WyfyConfig::default_hbt_ways")]
    pub hbt_num_way: u32,
}

impl WyfyConfig {
    /// Returns the default engine-enable setting.
    fn default_enable() -> bool {
        true
    }

    /// Returns the default HBT base address.
    fn default_hbt_base() -> u64 {
        defaults::HBT_BASE_ADDR
    }

    /// Returns the default HBT way count.
    fn default_hbt_ways() -> u32 {
        defaults::HBT_NUM_WAY
    }
}

impl Default for WyfyConfig {
    fn default() -> Self {
        Self {
            enable: true,
            hbt_base_addr: defaults::HBT_BASE_ADDR,
            hbt_num_way: defaults::HBT_NUM_WAY,
        }
    }
}

/// Behavioral D-cache model parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DCacheModelConfig {
    /// Response latency in cycles (minimum 1).
    #[serde(default = "DCacheModelConfig::default_latency")]
    pub latency: u64,

    /// Cache block size in bytes.
    #[serde(default = "DCacheModelConfig::default_block")]
    pub block_bytes: u64,
}

impl DCacheModelConfig {
    /// Returns the default response latency.
    fn default_latency() -> u64 {
        defaults::DCACHE_LATENCY
    }

    /// Returns the default cache block size.
    fn default_block() -> u64 {
        defaults::CACHE_BLOCK_BYTES
    }
}

impl Default for DCacheModelConfig {
    fn default() -> Self {
        Self {
            latency: defaults::DCACHE_LATENCY,
            block_bytes: defaults::CACHE_BLOCK_BYTES,
        }
    }
}

/// Behavioral DTLB model parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct DTlbModelConfig {
    /// Page size in bytes.
    #[serde(default = "DTlbModelConfig::default_page")]
    pub page_bytes: u64,
}

impl DTlbModelConfig {
    /// Returns the default page size.
    fn default_page() -> u64 {
        defaults::PAGE_BYTES
    }
}

impl Default for DTlbModelConfig {
    fn default() -> Self {
        Self {
            page_bytes: defaults::PAGE_BYTES,
        }
    }
}
