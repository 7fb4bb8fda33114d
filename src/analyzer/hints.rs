//! Parses the analyzer hint sidecar described in spec.md §6: a TOML or JSON document (picked by
//! file extension) that lets a caller override or supplement what straight-line discovery would
//! find on its own.
use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// One user-declared function range (`functions[addr]` in the hint schema).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct FunctionHint {
    /// Explicit byte length. Wins over inferred length when present.
    pub size: Option<u32>,
    /// Explicit end address (exclusive), an alternative to `size`.
    pub end: Option<u32>,
    /// A display name carried through to the emitted symbol.
    pub name: Option<String>,
    /// Non-zero parent address for a discontinuous chunk belonging to another function's CFG.
    pub parent: Option<u32>,
}

/// A declared jump table (`switch_tables[addr]`): a `bctr` preceded by an indexed load from a
/// contiguous run of code pointers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SwitchTableHint {
    pub base: u32,
    pub count: u32,
    pub stride: u32,
}

/// A host-side patch point (`mid_asm_hooks[addr]`): the emitter inserts a call to a
/// host-registered hook function immediately around the named instruction.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MidAsmHookHint {
    pub name: String,
    #[serde(default)]
    pub registers: Vec<String>,
    /// When present, the hook may overwrite `ctx.lr` to this value before the instruction runs.
    #[serde(rename = "ret")]
    pub ret: Option<u32>,
    /// When present, the hook may overwrite the instruction's own branch target.
    pub jump: Option<u32>,
}

/// The full hint document, mirroring spec.md §6's schema one field at a time.
///
/// Addresses are table/object keys, which both TOML and JSON represent as strings (`"0x82000000"`
/// or plain decimal); [`parse_addr`] normalizes either spelling once the document is parsed,
/// rather than fighting each format's map-key deserialization rules.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AnalyzerHints {
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionHint>,
    #[serde(default)]
    pub switch_tables: BTreeMap<String, SwitchTableHint>,
    #[serde(default)]
    pub mid_asm_hooks: BTreeMap<String, MidAsmHookHint>,
    #[serde(default)]
    pub invalid_instruction_hints: BTreeMap<String, u32>,
    #[serde(default)]
    pub known_indirect_call_hints: Vec<u32>,
    #[serde(default)]
    pub exception_handler_func_hints: Vec<u32>,
    pub long_jmp_address: Option<u32>,
    pub set_jmp_address: Option<u32>,
}

/// Parses a hint-file address key, accepting `0x`-prefixed hex or plain decimal.
pub fn parse_addr(key: &str) -> Result<u32, Error> {
    let key = key.trim();
    let parsed = if let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        key.parse::<u32>()
    };
    parsed.map_err(|e| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid hint address {key:?}: {e}"),
        ))
    })
}

impl AnalyzerHints {
    /// Loads hints from `path`, choosing a TOML or JSON parser by extension. Any other extension
    /// (or none) is rejected rather than guessed at.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))),
            Some("json") => serde_json::from_str(&text)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))),
            other => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported hints file extension: {other:?}"),
            ))),
        }
    }

    /// Resolves the `functions` table's string keys to addresses.
    pub fn resolved_functions(&self) -> Result<BTreeMap<u32, FunctionHint>, Error> {
        self.functions
            .iter()
            .map(|(k, v)| parse_addr(k).map(|addr| (addr, v.clone())))
            .collect()
    }

    /// Resolves the `switch_tables` table's string keys to addresses.
    pub fn resolved_switch_tables(&self) -> Result<BTreeMap<u32, SwitchTableHint>, Error> {
        self.switch_tables
            .iter()
            .map(|(k, v)| parse_addr(k).map(|addr| (addr, v.clone())))
            .collect()
    }

    /// Resolves the `mid_asm_hooks` table's string keys to addresses.
    pub fn resolved_mid_asm_hooks(&self) -> Result<BTreeMap<u32, MidAsmHookHint>, Error> {
        self.mid_asm_hooks
            .iter()
            .map(|(k, v)| parse_addr(k).map(|addr| (addr, v.clone())))
            .collect()
    }

    /// Resolves the `invalid_instruction_hints` table's string keys to addresses.
    pub fn resolved_invalid_instruction_hints(&self) -> Result<BTreeMap<u32, u32>, Error> {
        self.invalid_instruction_hints
            .iter()
            .map(|(k, v)| parse_addr(k).map(|addr| (addr, *v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_hints() {
        let doc = r#"
            long_jmp_address = 0x82001000
            set_jmp_address = 0x82001100
            known_indirect_call_hints = [0x82002000]

            [functions."0x82000000"]
            size = 0x100
            name = "EntryPoint"

            [switch_tables."0x82000500"]
            base = 0x82010000
            count = 4
            stride = 4

            [mid_asm_hooks."0x82000200"]
            name = "patch_health_check"
            registers = ["r3", "r4"]
        "#;
        let hints: AnalyzerHints = toml::from_str(doc).unwrap();
        assert_eq!(hints.long_jmp_address, Some(0x82001000));
        let functions = hints.resolved_functions().unwrap();
        assert_eq!(functions[&0x82000000].size, Some(0x100));
        let switch_tables = hints.resolved_switch_tables().unwrap();
        assert_eq!(switch_tables[&0x82000500].count, 4);
        let hooks = hints.resolved_mid_asm_hooks().unwrap();
        assert_eq!(hooks[&0x82000200].name, "patch_health_check");
        assert_eq!(hints.known_indirect_call_hints, vec![0x82002000]);
    }

    #[test]
    fn parses_json_hints() {
        let doc = r#"{
            "functions": { "2181038080": { "size": 64 } },
            "known_indirect_call_hints": [2181042176]
        }"#;
        let hints: AnalyzerHints = serde_json::from_str(doc).unwrap();
        let functions = hints.resolved_functions().unwrap();
        assert_eq!(functions[&2181038080].size, Some(64));
    }
}
