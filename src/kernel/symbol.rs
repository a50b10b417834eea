use std::fmt;
use std::hash::Hash;
use std::sync::RwLock;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Identifies a function symbol. Only the low 31 bits are usable, because the
/// packed symbol format stores the index in a 31-bit field.
pub type FunctionId = u32;

/// Identifies a variable. Variables are just nonnegative integers; terms with
/// canonical variable numbering start at 0.
pub type VariableId = u32;

/// The largest index a packed symbol can carry.
pub const MAX_INDEX: u32 = (1 << 31) - 1;

/// A symbol is a tagged 64-bit word.
///
/// Layout: bit 63 is the function flag, bits 62..32 are the index, and
/// bits 31..0 are the size of the subterm rooted here, in symbols.
/// A variable always has size 1. Packing and unpacking are bijective:
/// every `u64` decodes to fields that re-encode to the same word.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Symbol(u64);

const FUN_BIT: u64 = 1 << 63;

impl Symbol {
    /// A variable symbol. Its size field is always 1.
    pub fn variable(v: VariableId) -> Symbol {
        debug_assert!(v <= MAX_INDEX, "variable id {} out of range", v);
        Symbol(((v as u64 & MAX_INDEX as u64) << 32) | 1)
    }

    /// A function symbol with an explicit subterm size.
    /// The builder writes these with a placeholder size and patches them later.
    pub fn function(f: FunctionId, size: u32) -> Symbol {
        debug_assert!(f <= MAX_INDEX, "function id {} out of range", f);
        Symbol(FUN_BIT | ((f as u64 & MAX_INDEX as u64) << 32) | size as u64)
    }

    /// Reinterprets a raw 64-bit word as a symbol, without validation.
    pub fn from_raw(raw: u64) -> Symbol {
        Symbol(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }

    pub fn is_function(self) -> bool {
        self.0 & FUN_BIT != 0
    }

    pub fn is_variable(self) -> bool {
        !self.is_function()
    }

    /// The function or variable index, depending on the flag.
    pub fn index(self) -> u32 {
        ((self.0 >> 32) & MAX_INDEX as u64) as u32
    }

    /// The number of symbols in the subterm rooted at this symbol.
    pub fn size(self) -> u32 {
        self.0 as u32
    }

    /// The same symbol with a different size field.
    pub fn with_size(self, size: u32) -> Symbol {
        Symbol(self.0 & !0xffff_ffff | size as u64)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_function() {
            write!(f, "f{}/{}", self.index(), self.size())
        } else {
            write!(f, "x{}", self.index())
        }
    }
}

/// Everything the engine needs to know about a function symbol.
/// Equality covers all fields, so labelling the same data twice is idempotent.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct FunctionData {
    pub name: String,
    pub arity: u32,

    /// KBO weight. Must be positive.
    pub weight: i64,

    /// Position in the total precedence on function symbols. Higher is bigger.
    pub precedence: u32,

    /// Whether this is the distinguished least constant.
    pub minimal: bool,

    /// Whether this symbol was introduced by skolemisation.
    pub skolem: bool,
}

impl FunctionData {
    pub fn new(name: &str, arity: u32, weight: i64, precedence: u32) -> FunctionData {
        FunctionData {
            name: name.to_string(),
            arity,
            weight,
            precedence,
            minimal: false,
            skolem: false,
        }
    }

    pub fn minimal_constant(name: &str) -> FunctionData {
        FunctionData {
            name: name.to_string(),
            arity: 0,
            weight: 1,
            precedence: 0,
            minimal: true,
            skolem: false,
        }
    }
}

/// An interning service mapping values to dense integer labels.
///
/// `label` is idempotent and `find` is total on labels it has handed out.
/// Reads take no global lock, so the table can be shared across threads if
/// the embedder wants to; the engine itself only needs one thread.
pub struct Labeller<T> {
    ids: DashMap<T, u32>,
    values: RwLock<Vec<T>>,
}

impl<T: Clone + Eq + Hash> Labeller<T> {
    pub fn new() -> Labeller<T> {
        Labeller {
            ids: DashMap::new(),
            values: RwLock::new(vec![]),
        }
    }

    /// Returns the label for `x`, allocating one if this is the first time
    /// we have seen it.
    pub fn label(&self, x: T) -> u32 {
        if let Some(id) = self.ids.get(&x) {
            return *id;
        }
        let mut values = self.values.write().unwrap();
        // Another caller may have raced us here; check again under the lock.
        if let Some(id) = self.ids.get(&x) {
            return *id;
        }
        let id = values.len() as u32;
        values.push(x.clone());
        self.ids.insert(x, id);
        id
    }

    /// Looks up a previously-allocated label.
    /// Panics on a label this table never handed out.
    pub fn find(&self, id: u32) -> T {
        let values = self.values.read().unwrap();
        match values.get(id as usize) {
            Some(x) => x.clone(),
            None => panic!("label {} was never allocated", id),
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }
}

impl<T: Clone + Eq + Hash> Default for Labeller<T> {
    fn default() -> Self {
        Labeller::new()
    }
}

/// The signature of the problem: a labeller for function symbols plus
/// accessors for the fields the ordering reads on its hot path.
pub struct Signature {
    labeller: Labeller<FunctionData>,
}

impl Signature {
    pub fn new() -> Signature {
        Signature {
            labeller: Labeller::new(),
        }
    }

    /// Registers a function symbol and returns its id.
    pub fn add(&self, data: FunctionData) -> FunctionId {
        assert!(data.weight > 0, "function weight must be positive");
        if data.minimal {
            assert_eq!(data.arity, 0, "the minimal constant must have arity 0");
        }
        self.labeller.label(data)
    }

    pub fn data(&self, f: FunctionId) -> FunctionData {
        self.labeller.find(f)
    }

    pub fn name(&self, f: FunctionId) -> String {
        self.labeller.find(f).name
    }

    pub fn arity(&self, f: FunctionId) -> u32 {
        self.labeller.find(f).arity
    }

    pub fn weight(&self, f: FunctionId) -> i64 {
        self.labeller.find(f).weight
    }

    pub fn precedence(&self, f: FunctionId) -> u32 {
        self.labeller.find(f).precedence
    }

    pub fn is_minimal(&self, f: FunctionId) -> bool {
        self.labeller.find(f).minimal
    }

    /// The distinguished least constant, if one has been registered.
    pub fn minimal(&self) -> Option<FunctionId> {
        for id in 0..self.labeller.len() as u32 {
            if self.labeller.find(id).minimal {
                return Some(id);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.labeller.len()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trip() {
        let v = Symbol::variable(17);
        assert!(v.is_variable());
        assert_eq!(v.index(), 17);
        assert_eq!(v.size(), 1);

        let f = Symbol::function(3, 9);
        assert!(f.is_function());
        assert_eq!(f.index(), 3);
        assert_eq!(f.size(), 9);
        assert_eq!(Symbol::from_raw(f.to_raw()), f);
    }

    #[test]
    fn raw_round_trip_is_identity() {
        for raw in [0u64, 1, u64::MAX, 0x8000_0001_0000_0005, 0xdead_beef_cafe_f00d] {
            let s = Symbol::from_raw(raw);
            let repacked = if s.is_function() {
                Symbol::function(s.index(), s.size())
            } else {
                Symbol::variable(s.index()).with_size(s.size())
            };
            assert_eq!(repacked.to_raw(), raw);
        }
    }

    #[test]
    fn labeller_is_idempotent() {
        let labeller = Labeller::new();
        let a = labeller.label("times".to_string());
        let b = labeller.label("plus".to_string());
        assert_ne!(a, b);
        assert_eq!(labeller.label("times".to_string()), a);
        assert_eq!(labeller.find(b), "plus");
    }

    #[test]
    fn signature_finds_minimal() {
        let sig = Signature::new();
        let one = sig.add(FunctionData::new("*", 2, 1, 1));
        let zero = sig.add(FunctionData::minimal_constant("0"));
        assert_eq!(sig.minimal(), Some(zero));
        assert_eq!(sig.arity(one), 2);
    }
}
