//! Compile-time defaults for the runtime
//!
//! Every value here can be overridden per manager through
//! [`RuntimeSettings`](super::RuntimeSettings) except the fault bookkeeping sizes.

// ===== COUPLING =====

/// Queue bound of an async coupler
pub const DEFAULT_ASYNC_QUEUE_CAPACITY: usize = 1024;

// ===== FLOW BOOKKEEPING =====

/// Finished flows kept for introspection
pub const DEFAULT_MAX_FLOW_HISTORY: usize = 32;

/// Faults kept per flow for `data_flow_info`
pub const MAX_RECENT_FAULTS: usize = 16;

/// Faults buffered on a flow's error channel before new ones are only kept in the recent list
pub const FAULT_CHANNEL_CAPACITY: usize = 256;

// ===== NAMING =====

/// Instance name minted for singleton modules
pub const SINGLETON_INSTANCE: &str = "single";

/// Prefix of instance names minted for non-singleton modules
pub const INSTANCE_PREFIX: &str = "instance-";

/// Provider of the built-in system sink
pub const SINK_PROVIDER: &str = "modflow";
pub const SINK_TYPE: &str = "sink";

// ===== MANAGEMENT SERVER =====

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9464";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        assert!(DEFAULT_ASYNC_QUEUE_CAPACITY > 0);
        assert!(MAX_RECENT_FAULTS <= FAULT_CHANNEL_CAPACITY);
        assert!(DEFAULT_LISTEN_ADDR.parse::<std::net::SocketAddr>().is_ok());
    }
}
