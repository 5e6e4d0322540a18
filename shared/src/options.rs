//! Game options descriptor: `key=value` pairs separated by commas

use std::collections::BTreeMap;

/// Parsed options with typed accessors for the keys the engine understands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameOptions {
    /// Spawn credits granted to every player
    pub spawns: u32,
    /// Every assignment as written, including keys the engine ignores
    raw: BTreeMap<String, String>,
}

impl GameOptions {
    /// Parses an options descriptor on top of the defaults
    ///
    /// Returns the options together with any warnings raised along the way.
    /// Malformed entries are skipped; empty entries are ignored silently.
    pub fn parse(code: &str) -> (Self, Vec<String>) {
        let mut opts = GameOptions::default();
        let mut warnings = Vec::new();

        for assignment in code.split(',') {
            if assignment.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = assignment.split_once('=') else {
                warnings.push(format!("Malformed option \"{}\"", assignment.trim()));
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "spawns" => match value.parse() {
                    Ok(spawns) => opts.spawns = spawns,
                    Err(_) => warnings.push(format!("Invalid spawns value \"{}\"", value)),
                },
                _ => warnings.push(format!("Unknown option \"{}\"", key)),
            }
            opts.raw.insert(key.to_string(), value.to_string());
        }

        (opts, warnings)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }
}
