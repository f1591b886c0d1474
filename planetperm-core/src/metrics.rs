//! Prometheus metrics for the permission engine
//!
//! All metrics live in a crate-local registry; the embedding service decides
//! how to expose [`gather_metrics`] output.

use prometheus::{CounterVec, Encoder, Registry, TextEncoder, register_counter_vec_with_registry};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Cache operations, labelled by cache surface
/// (`chat`, `category`, `voice`, `authority`, `planet`, `access`)
pub mod cache {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    /// Cache hit counter
    pub static CACHE_HITS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "permission_cache_hits_total",
            "Total number of permission cache hits",
            &["surface"],
            REGISTRY.clone()
        ).expect("Failed to register CACHE_HITS")
    });

    /// Cache miss counter
    pub static CACHE_MISSES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "permission_cache_misses_total",
            "Total number of permission cache misses",
            &["surface"],
            REGISTRY.clone()
        ).expect("Failed to register CACHE_MISSES")
    });

    /// Entries removed by targeted or bulk invalidation
    pub static CACHE_EVICTIONS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "permission_cache_evictions_total",
            "Total number of permission cache evictions",
            &["surface"],
            REGISTRY.clone()
        ).expect("Failed to register CACHE_EVICTIONS")
    });

    /// Write-backs dropped because the generation moved mid-computation
    pub static CACHE_DISCARDS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "permission_cache_discards_total",
            "Total number of permission results discarded due to concurrent invalidation",
            &["surface"],
            REGISTRY.clone()
        ).expect("Failed to register CACHE_DISCARDS")
    });
}

/// Invalidation entry points
pub mod invalidation {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    /// Invalidation counter, labelled by kind
    /// (`combo`, `role`, `role_channel`, `channel`, `combo_channel`, `access`, `all`)
    pub static INVALIDATIONS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "permission_invalidations_total",
            "Total number of permission cache invalidations",
            &["kind"],
            REGISTRY.clone()
        ).expect("Failed to register INVALIDATIONS")
    });
}

/// Invalidation messages applied by the service, labelled by message kind
/// (`role_changed`, `node_changed`, `planet_changed`, `all`, ...)
pub mod messages {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    pub static INVALIDATION_MESSAGES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "permission_invalidation_messages_total",
            "Total number of invalidation messages applied",
            &["kind"],
            REGISTRY.clone()
        ).expect("Failed to register INVALIDATION_MESSAGES")
    });
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}
