//! Deterministic collector implementations for tests.
//!
//! Real language frontends live outside this repository; tests drive the
//! pipeline with collectors whose output is a pure function of the source
//! text. The scripted syntax is one directive per line:
//!
//! ```text
//! def NAME     # definition of NAME
//! decl NAME    # declaration of NAME
//! ref NAME     # reference to NAME
//! !error MSG   # the whole file fails to parse
//! ```
//!
//! Anything else is ignored, mirroring how a real collector skips tokens it
//! does not understand.

use lode_core::{
    CollectedSymbols, FilePathId, LocationKind, ProjectPart, SymbolKind, SymbolLocation,
    SymbolRecord,
};

use crate::{symbol_id, CollectError, SymbolCollector};

/// Line-oriented scripted collector, see the module docs for the syntax.
#[derive(Debug, Default)]
pub struct ScriptCollector {
    files_collected: usize,
}

impl ScriptCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files this instance has collected since construction.
    pub fn files_collected(&self) -> usize {
        self.files_collected
    }
}

/// The unified signature for a scripted symbol name.
pub fn script_signature(name: &str) -> String {
    format!("script:{name}")
}

impl SymbolCollector for ScriptCollector {
    fn collect(
        &mut self,
        file: FilePathId,
        source: &str,
        _part: &ProjectPart,
    ) -> Result<CollectedSymbols, CollectError> {
        self.files_collected += 1;

        let mut out = CollectedSymbols::default();
        for (line_idx, line) in source.lines().enumerate() {
            let line_no = line_idx as u32 + 1;
            let trimmed = line.trim();

            if let Some(message) = trimmed.strip_prefix("!error") {
                return Err(CollectError::Parse(message.trim().to_string()));
            }

            let Some((directive, name)) = trimmed.split_once(' ') else {
                continue;
            };
            let kind = match directive {
                "def" => LocationKind::Definition,
                "decl" => LocationKind::Declaration,
                "ref" => LocationKind::Reference,
                _ => continue,
            };

            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let signature = script_signature(name);
            let id = symbol_id(&signature);
            out.symbols.push(SymbolRecord {
                id,
                name: name.to_string(),
                kind: SymbolKind::Function,
                signature,
            });
            let column = line.find(name).unwrap_or(0) as u32 + 1;
            out.locations.push(SymbolLocation {
                symbol: id,
                file,
                line: line_no,
                column,
                kind,
            });
        }

        Ok(out)
    }
}

/// Collector that blocks inside `collect` until the gate channel yields.
///
/// Used to pin tasks in flight so tests can observe mid-flight scheduler
/// state (concurrency bounds, disable semantics) deterministically.
pub struct GatedCollector {
    gate: crossbeam_channel::Receiver<()>,
    inner: ScriptCollector,
}

impl GatedCollector {
    pub fn new(gate: crossbeam_channel::Receiver<()>) -> Self {
        Self {
            gate,
            inner: ScriptCollector::new(),
        }
    }
}

impl SymbolCollector for GatedCollector {
    fn collect(
        &mut self,
        file: FilePathId,
        source: &str,
        part: &ProjectPart,
    ) -> Result<CollectedSymbols, CollectError> {
        // A disconnected gate means the test no longer cares about pacing.
        let _ = self.gate.recv();
        self.inner.collect(file, source, part)
    }
}
