// TermIndex: a discrimination tree keyed on the pre-order symbol sequence
// of stored patterns, with a wildcard edge at variable positions.
//
// Keys are byte-serialized. All variables share one wildcard byte, so
// retrieval over-approximates on nonlinear patterns; callers that need the
// exact answer filter with match_terms, which `matches` does.

use qp_trie::{Entry, SubTrie, Trie};

use crate::kernel::term::{Term, TermRef};
use crate::kernel::unify::match_terms;
use crate::kernel::Subst;

const WILDCARD: u8 = 0;
const FUNCTION: u8 = 1;

/// The full key for a pattern: one edge per symbol, in pre-order.
fn key_of(pattern: TermRef) -> Vec<u8> {
    let mut key = vec![];
    for &s in pattern.as_slice() {
        if s.is_variable() {
            key.push(WILDCARD);
        } else {
            key.push(FUNCTION);
            key.extend_from_slice(&s.index().to_be_bytes());
        }
    }
    key
}

struct IndexEntry<V> {
    pattern: Term,
    value: V,
}

/// A term index supporting approximate-match retrieval.
///
/// Iteration order of retrieval is unspecified but stable for a fixed index
/// state: the traversal always tries the wildcard edge before the function
/// edge.
pub struct TermIndex<V> {
    trie: Trie<Vec<u8>, usize>,
    slots: Vec<Vec<IndexEntry<V>>>,
    len: usize,
}

impl<V: Clone + PartialEq> TermIndex<V> {
    pub fn new() -> TermIndex<V> {
        TermIndex {
            trie: Trie::new(),
            slots: vec![],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, pattern: TermRef, value: V) {
        let key = key_of(pattern);
        let slot = match self.trie.entry(key) {
            Entry::Occupied(occupied) => *occupied.get(),
            Entry::Vacant(vacant) => {
                let slot = self.slots.len();
                self.slots.push(vec![]);
                vacant.insert(slot);
                slot
            }
        };
        self.slots[slot].push(IndexEntry {
            pattern: pattern.to_owned(),
            value,
        });
        self.len += 1;
    }

    /// Removes one stored (pattern, value) entry, if present.
    pub fn remove(&mut self, pattern: TermRef, value: &V) {
        let key = key_of(pattern);
        if let Some(&slot) = self.trie.get(key.as_slice()) {
            let entries = &mut self.slots[slot];
            if let Some(i) = entries
                .iter()
                .position(|e| e.value == *value && e.pattern.as_ref() == pattern)
            {
                entries.remove(i);
                self.len -= 1;
            }
        }
    }

    /// All stored entries whose key skeleton is consistent with `t`.
    /// May over-approximate on patterns with repeated variables.
    pub fn approx_matches(&self, t: TermRef) -> Vec<(&Term, &V)> {
        let mut out = vec![];
        let mut key: Vec<u8> = vec![];
        let root = self.trie.subtrie(key.as_slice());
        self.collect(&root, &mut key, &[t], &mut out);
        out
    }

    fn collect<'a>(
        &'a self,
        subtrie: &SubTrie<Vec<u8>, usize>,
        key: &mut Vec<u8>,
        terms: &[TermRef],
        out: &mut Vec<(&'a Term, &'a V)>,
    ) {
        if subtrie.is_empty() {
            return;
        }
        if terms.is_empty() {
            if let Some(&slot) = subtrie.get(key.as_slice()) {
                for entry in &self.slots[slot] {
                    out.push((&entry.pattern, &entry.value));
                }
            }
            return;
        }
        let first = terms[0];
        let rest = &terms[1..];
        let initial_key_len = key.len();

        // A pattern variable consumes the whole first subterm of the query.
        key.push(WILDCARD);
        let wild = subtrie.subtrie(key.as_slice());
        self.collect(&wild, key, rest, out);
        key.truncate(initial_key_len);

        // A pattern function symbol must match the query head exactly and
        // then match the arguments in sequence.
        if first.root().is_function() {
            key.push(FUNCTION);
            key.extend_from_slice(&first.root().index().to_be_bytes());
            let exact = subtrie.subtrie(key.as_slice());
            if !exact.is_empty() {
                let mut args_and_rest: Vec<TermRef> =
                    Vec::with_capacity(first.len() - 1 + rest.len());
                args_and_rest.extend(first.args().iter());
                args_and_rest.extend_from_slice(rest);
                self.collect(&exact, key, &args_and_rest, out);
            }
            key.truncate(initial_key_len);
        }
    }

    /// The exact matches: every stored pattern that generalises `t`, paired
    /// with the witnessing substitution.
    pub fn matches(&self, t: TermRef) -> Vec<(Subst, &Term, &V)> {
        let mut out = vec![];
        for (pattern, value) in self.approx_matches(t) {
            if let Some(subst) = match_terms(pattern.as_ref(), t) {
                out.push((subst, pattern, value));
            }
        }
        out
    }
}

impl<V: Clone + PartialEq> Default for TermIndex<V> {
    fn default() -> Self {
        TermIndex::new()
    }
}
