use std::collections::HashMap;

use crate::error::ConvertError;
use crate::ir::ValueId;

/// Handle to a scope. Stale handles (of destroyed scopes) resolve nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId {
    index: usize,
    serial: u64,
}

#[derive(Debug)]
struct ScopeRecord {
    serial: u64,
    parent: Option<usize>,
    bindings: HashMap<String, ValueId>,
}

/// Arena of scopes linked to their parent by index. A child sees every outer
/// binding and may shadow it; its own bindings go away with it.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Option<ScopeRecord>>,
    next_serial: u64,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// Tree holding only the root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Some(ScopeRecord {
                serial: 0,
                parent: None,
                bindings: HashMap::new(),
            })],
            next_serial: 1,
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId {
            index: 0,
            serial: 0,
        }
    }

    fn record(&self, scope: ScopeId) -> Option<&ScopeRecord> {
        self.scopes
            .get(scope.index)?
            .as_ref()
            .filter(|r| r.serial == scope.serial)
    }

    fn record_mut(&mut self, scope: ScopeId) -> Option<&mut ScopeRecord> {
        self.scopes
            .get_mut(scope.index)?
            .as_mut()
            .filter(|r| r.serial == scope.serial)
    }

    pub fn is_live(&self, scope: ScopeId) -> bool {
        self.record(scope).is_some()
    }

    /// True if `name` resolves in `scope` or any ancestor.
    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        self.find(scope, name).is_ok()
    }

    /// Looks `name` up in `scope`, then outward through its ancestors.
    pub fn find(&self, scope: ScopeId, name: &str) -> Result<ValueId, ConvertError> {
        let mut current = self.record(scope);
        while let Some(record) = current {
            if let Some(value) = record.bindings.get(name) {
                return Ok(*value);
            }
            current = record
                .parent
                .and_then(|parent| self.scopes.get(parent))
                .and_then(Option::as_ref);
        }
        Err(ConvertError::NameNotFound {
            name: name.to_string(),
        })
    }

    /// Binds `name` in `scope` itself. Shadowing an ancestor's binding is fine,
    /// rebinding within the same scope is not.
    pub fn insert(&mut self, scope: ScopeId, name: &str, value: ValueId) -> Result<(), ConvertError> {
        let record = self
            .record_mut(scope)
            .ok_or_else(|| ConvertError::NameNotFound {
                name: name.to_string(),
            })?;
        if record.bindings.contains_key(name) {
            return Err(ConvertError::DuplicateBinding {
                name: name.to_string(),
            });
        }
        record.bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// Allocates a scope whose parent is `parent`.
    pub fn create_child(&mut self, parent: ScopeId) -> ScopeId {
        debug_assert!(self.is_live(parent), "child of a destroyed scope");
        let serial = self.next_serial;
        self.next_serial += 1;
        let record = ScopeRecord {
            serial,
            parent: self.is_live(parent).then_some(parent.index),
            bindings: HashMap::new(),
        };
        let index = match self.scopes.iter().position(Option::is_none) {
            Some(free) => {
                self.scopes[free] = Some(record);
                free
            }
            None => {
                self.scopes.push(Some(record));
                self.scopes.len() - 1
            }
        };
        ScopeId { index, serial }
    }

    /// Drops `scope` and every scope below it. The root cannot be destroyed.
    pub fn destroy(&mut self, scope: ScopeId) {
        if scope.index == 0 || !self.is_live(scope) {
            return;
        }
        let doomed: Vec<usize> = (0..self.scopes.len())
            .filter(|&index| self.descends_from(index, scope.index))
            .collect();
        for index in doomed {
            self.scopes[index] = None;
        }
        while matches!(self.scopes.last(), Some(None)) {
            self.scopes.pop();
        }
    }

    fn descends_from(&self, mut index: usize, ancestor: usize) -> bool {
        loop {
            if index == ancestor {
                return true;
            }
            match self.scopes.get(index).and_then(Option::as_ref).and_then(|r| r.parent) {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    /// Names bound directly in `scope`, sorted.
    pub fn local_names(&self, scope: ScopeId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .record(scope)
            .map(|r| r.bindings.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn depth(&self, scope: ScopeId) -> usize {
        let mut depth = 0;
        let mut parent = self.record(scope).and_then(|r| r.parent);
        while let Some(index) = parent {
            depth += 1;
            parent = self.scopes.get(index).and_then(Option::as_ref).and_then(|r| r.parent);
        }
        depth
    }
}
