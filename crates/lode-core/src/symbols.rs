use crate::{FilePathId, FileStatus, SymbolId};

/// What kind of language entity a symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Function,
    Class,
    Struct,
    Enum,
    Variable,
    Macro,
    Other,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
            SymbolKind::Macro => "macro",
            SymbolKind::Other => "other",
        }
    }

    pub fn from_str(kind: &str) -> Self {
        match kind {
            "function" => SymbolKind::Function,
            "class" => SymbolKind::Class,
            "struct" => SymbolKind::Struct,
            "enum" => SymbolKind::Enum,
            "variable" => SymbolKind::Variable,
            "macro" => SymbolKind::Macro,
            _ => SymbolKind::Other,
        }
    }
}

/// The role a source location plays for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationKind {
    Declaration,
    Definition,
    Reference,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Declaration => "declaration",
            LocationKind::Definition => "definition",
            LocationKind::Reference => "reference",
        }
    }

    pub fn from_str(kind: &str) -> Self {
        match kind {
            "declaration" => LocationKind::Declaration,
            "definition" => LocationKind::Definition,
            _ => LocationKind::Reference,
        }
    }
}

/// One symbol row: unique per [`SymbolId`] within the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub signature: String,
}

/// One location row: where a symbol is declared, defined or referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolLocation {
    pub symbol: SymbolId,
    pub file: FilePathId,
    pub line: u32,
    pub column: u32,
    pub kind: LocationKind,
}

/// The raw output of one collection pass over one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedSymbols {
    pub symbols: Vec<SymbolRecord>,
    pub locations: Vec<SymbolLocation>,
}

impl CollectedSymbols {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.locations.is_empty()
    }
}

/// Everything needed to commit one file's symbols.
///
/// Owned exclusively by the worker that produced it until it is handed to the
/// storage writer, then discarded. `status` is the snapshot the collection was
/// based on; commits against a snapshot the file has since outrun are
/// discarded, never written.
#[derive(Debug, Clone)]
pub struct IndexingResult {
    pub file: FilePathId,
    pub status: FileStatus,
    pub collected: CollectedSymbols,
}
