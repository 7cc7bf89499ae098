use std::collections::HashMap;

use thiserror::Error;

use crate::message::Reading;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid name field {entry:?}, expected id=name")]
    InvalidNameField { entry: String },
    #[error("invalid name field {entry:?}, id must be an integer")]
    InvalidDeviceId { entry: String },
    #[error("named-only would filter every sensor, no name fields configured")]
    NamedOnlyWithoutNames,
}

/// Device id to display name overrides, built once at startup and read-only
/// for the process lifetime.
#[derive(Debug, Default)]
pub struct NameTable {
    names: HashMap<i64, String>,
}

impl NameTable {
    /// Parse a comma-separated `id=name` list, e.g. `1251=kitchen,903=porch`.
    /// Any malformed entry is a startup error; a partially valid table never
    /// comes into existence.
    pub fn from_entries(entries: &str) -> Result<Self, ConfigError> {
        let mut names = HashMap::new();
        for entry in entries.split(',').filter(|e| !e.is_empty()) {
            let (id, name) = match entry.split('=').collect::<Vec<_>>()[..] {
                [id, name] if !name.is_empty() => (id, name),
                _ => {
                    return Err(ConfigError::InvalidNameField {
                        entry: entry.to_owned(),
                    })
                }
            };
            let id: i64 = id.parse().map_err(|_| ConfigError::InvalidDeviceId {
                entry: entry.to_owned(),
            })?;
            names.insert(id, name.to_owned());
        }
        Ok(NameTable { names })
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Skipped,
}

/// Naming and admission policy applied to every parsed reading before it
/// reaches any sink.
#[derive(Debug)]
pub struct Policy {
    table: NameTable,
    named_only: bool,
}

impl Policy {
    pub fn new(table: NameTable, named_only: bool) -> Result<Self, ConfigError> {
        if named_only && table.is_empty() {
            return Err(ConfigError::NamedOnlyWithoutNames);
        }
        Ok(Policy { table, named_only })
    }

    /// A configured override always wins over anything the decoder sent.
    /// Without an override, named-only drops the reading; otherwise the
    /// parsed name stands.
    pub fn resolve(&self, reading: &mut Reading) -> Admission {
        match self.table.get(reading.id) {
            Some(name) => {
                reading.name = name.to_owned();
                Admission::Admitted
            }
            None if self.named_only => Admission::Skipped,
            None => Admission::Admitted,
        }
    }
}
