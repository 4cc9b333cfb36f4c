//! Encoding-threshold configuration (SPEC_FULL §A.3): the knobs
//! `OBJECT ENCODING` consults and `CONFIG GET`/`CONFIG SET` expose.
//! These are thresholds only, not a dual-representation switch — see
//! DESIGN.md for why.

/// Names recognized by `CONFIG GET`/`CONFIG SET`, matched
/// case-insensitively the way the rest of the command surface is.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConfigKey {
    HashMaxListpackEntries,
    HashMaxListpackValue,
    SetMaxIntsetEntries,
    SetMaxListpackEntries,
    SetMaxListpackValue,
    ZsetMaxListpackEntries,
    ZsetMaxListpackValue,
    ListMaxListpackSize,
}

impl ConfigKey {
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::HashMaxListpackEntries => "hash-max-listpack-entries",
            ConfigKey::HashMaxListpackValue => "hash-max-listpack-value",
            ConfigKey::SetMaxIntsetEntries => "set-max-intset-entries",
            ConfigKey::SetMaxListpackEntries => "set-max-listpack-entries",
            ConfigKey::SetMaxListpackValue => "set-max-listpack-value",
            ConfigKey::ZsetMaxListpackEntries => "zset-max-listpack-entries",
            ConfigKey::ZsetMaxListpackValue => "zset-max-listpack-value",
            ConfigKey::ListMaxListpackSize => "list-max-listpack-size",
        }
    }

    pub fn from_name(name: &[u8]) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_slice() {
            b"hash-max-listpack-entries" => Some(ConfigKey::HashMaxListpackEntries),
            b"hash-max-listpack-value" => Some(ConfigKey::HashMaxListpackValue),
            b"set-max-intset-entries" => Some(ConfigKey::SetMaxIntsetEntries),
            b"set-max-listpack-entries" => Some(ConfigKey::SetMaxListpackEntries),
            b"set-max-listpack-value" => Some(ConfigKey::SetMaxListpackValue),
            b"zset-max-listpack-entries" => Some(ConfigKey::ZsetMaxListpackEntries),
            b"zset-max-listpack-value" => Some(ConfigKey::ZsetMaxListpackValue),
            b"list-max-listpack-size" => Some(ConfigKey::ListMaxListpackSize),
            _ => None,
        }
    }

    pub const ALL: [ConfigKey; 8] = [
        ConfigKey::HashMaxListpackEntries,
        ConfigKey::HashMaxListpackValue,
        ConfigKey::SetMaxIntsetEntries,
        ConfigKey::SetMaxListpackEntries,
        ConfigKey::SetMaxListpackValue,
        ConfigKey::ZsetMaxListpackEntries,
        ConfigKey::ZsetMaxListpackValue,
        ConfigKey::ListMaxListpackSize,
    ];
}

/// The subset of server-wide configuration this engine actually
/// consults: the size/count thresholds behind `OBJECT ENCODING`.
#[derive(Clone, Debug)]
pub struct Config {
    pub hash_max_listpack_entries: usize,
    pub hash_max_listpack_value: usize,
    pub set_max_intset_entries: usize,
    pub set_max_listpack_entries: usize,
    pub set_max_listpack_value: usize,
    pub zset_max_listpack_entries: usize,
    pub zset_max_listpack_value: usize,
    pub list_max_listpack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hash_max_listpack_entries: 128,
            hash_max_listpack_value: 64,
            set_max_intset_entries: 512,
            set_max_listpack_entries: 128,
            set_max_listpack_value: 64,
            zset_max_listpack_entries: 128,
            zset_max_listpack_value: 64,
            list_max_listpack_size: 128,
        }
    }
}

impl Config {
    pub fn get(&self, key: ConfigKey) -> String {
        let value = match key {
            ConfigKey::HashMaxListpackEntries => self.hash_max_listpack_entries,
            ConfigKey::HashMaxListpackValue => self.hash_max_listpack_value,
            ConfigKey::SetMaxIntsetEntries => self.set_max_intset_entries,
            ConfigKey::SetMaxListpackEntries => self.set_max_listpack_entries,
            ConfigKey::SetMaxListpackValue => self.set_max_listpack_value,
            ConfigKey::ZsetMaxListpackEntries => self.zset_max_listpack_entries,
            ConfigKey::ZsetMaxListpackValue => self.zset_max_listpack_value,
            ConfigKey::ListMaxListpackSize => self.list_max_listpack_size,
        };
        value.to_string()
    }

    pub fn set(&mut self, key: ConfigKey, value: usize) {
        match key {
            ConfigKey::HashMaxListpackEntries => self.hash_max_listpack_entries = value,
            ConfigKey::HashMaxListpackValue => self.hash_max_listpack_value = value,
            ConfigKey::SetMaxIntsetEntries => self.set_max_intset_entries = value,
            ConfigKey::SetMaxListpackEntries => self.set_max_listpack_entries = value,
            ConfigKey::SetMaxListpackValue => self.set_max_listpack_value = value,
            ConfigKey::ZsetMaxListpackEntries => self.zset_max_listpack_entries = value,
            ConfigKey::ZsetMaxListpackValue => self.zset_max_listpack_value = value,
            ConfigKey::ListMaxListpackSize => self.list_max_listpack_size = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_by_name() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::from_name(key.name().as_bytes()), Some(key));
        }
    }

    #[test]
    fn defaults_are_queryable() {
        let config = Config::default();
        assert_eq!(config.get(ConfigKey::HashMaxListpackEntries), "128");
    }
}
