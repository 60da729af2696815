use crate::errors::SymbolError;
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;

dp_model::create_ref_type!(TypeId);

/// Name of the root type, that every other type specializes.
pub const OBJECT_TYPE: &str = "object";

/// A directed acyclic graph of types rooted in `object`.
///
/// The ancestors of each type (including itself) are computed once at construction,
/// so subtype queries are a single bit lookup.
#[derive(Clone, Debug)]
pub struct TypeHierarchy {
    names: Vec<String>,
    ids: HashMap<String, TypeId>,
    ancestors: Vec<FixedBitSet>,
}

impl TypeHierarchy {
    /// Builds the hierarchy from a set of `(type, parents)` declarations.
    ///
    /// A type with no parent is a direct subtype of `object`, as is any parent that is used but never declared.
    pub fn new(decls: Vec<(String, Vec<String>)>) -> Result<Self, SymbolError> {
        let mut names = vec![OBJECT_TYPE.to_string()];
        let mut ids = HashMap::new();
        ids.insert(OBJECT_TYPE.to_string(), TypeId::from(0usize));
        let mut declared_parents: Vec<Vec<String>> = vec![Vec::new()];

        for (name, parents) in &decls {
            if name == OBJECT_TYPE {
                if parents.iter().all(|p| p == OBJECT_TYPE) {
                    continue;
                }
                return Err(SymbolError::CyclicTypeHierarchy(name.clone()));
            }
            if ids.contains_key(name) {
                return Err(SymbolError::DuplicateType(name.clone()));
            }
            ids.insert(name.clone(), TypeId::from(names.len()));
            names.push(name.clone());
            declared_parents.push(parents.clone());
        }
        // parents that are never declared become children of the root type
        for (_, parents) in &decls {
            for p in parents {
                if !ids.contains_key(p) {
                    ids.insert(p.clone(), TypeId::from(names.len()));
                    names.push(p.clone());
                    declared_parents.push(Vec::new());
                }
            }
        }

        let parents: Vec<Vec<TypeId>> = declared_parents
            .iter()
            .enumerate()
            .map(|(i, ps)| {
                if i == 0 {
                    Vec::new()
                } else if ps.is_empty() {
                    vec![TypeId::from(0usize)]
                } else {
                    ps.iter().map(|p| ids[p]).collect()
                }
            })
            .collect();

        let ancestors = Self::closure(&names, &parents)?;
        Ok(TypeHierarchy { names, ids, ancestors })
    }

    /// Reflexive-transitive closure of the parent relation, detecting cycles.
    fn closure(names: &[String], parents: &[Vec<TypeId>]) -> Result<Vec<FixedBitSet>, SymbolError> {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            Fresh,
            Open,
            Done,
        }
        let n = names.len();
        let mut ancestors = vec![FixedBitSet::with_capacity(n); n];
        let mut marks = vec![Mark::Fresh; n];

        for root in 0..n {
            if marks[root] == Mark::Done {
                continue;
            }
            // iterative post-order traversal: (type, index of the next parent to visit)
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Open;
            while let Some(top) = stack.last_mut() {
                let (t, next) = *top;
                if let Some(&p) = parents[t].get(next) {
                    top.1 += 1;
                    let p = usize::from(p);
                    match marks[p] {
                        Mark::Open => return Err(SymbolError::CyclicTypeHierarchy(names[p].clone())),
                        Mark::Fresh => {
                            marks[p] = Mark::Open;
                            stack.push((p, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    let mut set = FixedBitSet::with_capacity(n);
                    set.insert(t);
                    for &p in &parents[t] {
                        set.union_with(&ancestors[usize::from(p)]);
                    }
                    ancestors[t] = set;
                    marks[t] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(ancestors)
    }

    pub fn root(&self) -> TypeId {
        TypeId::from(0usize)
    }

    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, tpe: TypeId) -> &str {
        &self.names[tpe]
    }

    /// Returns true if `possible_subtype` is `tpe` or one of its descendants.
    pub fn is_subtype(&self, tpe: TypeId, possible_subtype: TypeId) -> bool {
        self.ancestors[possible_subtype].contains(usize::from(tpe))
    }

    /// All types that `tpe` specializes, including itself.
    pub fn ancestors(&self, tpe: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        self.ancestors[tpe].ones().map(TypeId::from)
    }

    pub fn num_types(&self) -> usize {
        self.names.len()
    }

    pub fn types(&self) -> impl Iterator<Item = TypeId> {
        (0..self.names.len()).map(TypeId::from)
    }
}
