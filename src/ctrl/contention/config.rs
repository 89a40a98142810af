#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// The maximum number of indexes tracked at once.
    pub max_indexes: usize,
    /// The maximum number of keys tracked per index.
    pub max_keys_per_index: usize,
    /// The maximum number of transactions tracked per key, separately for blocking and waiting
    /// transactions.
    pub max_txns_per_key: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_indexes: 50,
            max_keys_per_index: 50,
            max_txns_per_key: 10,
        }
    }
}

impl RegistryConfig {
    #[cfg(test)]
    pub(crate) fn for_testing() -> Self {
        Self {
            max_indexes: 3,
            max_keys_per_index: 3,
            max_txns_per_key: 2,
        }
    }
}
