//! Variable tables and scopes.
//!
//! Globals live in an insertion-ordered [`GlobalTable`]; locals live in the
//! per-function [`Scope`] tree. Both store [`VarInfo`] records that later
//! phases annotate (initializers after lowering, stack placement flags).

use crate::ast::Initializer;
use crate::types::Type;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use xcc_common::Span;

/// Storage-class and qualifier flags for a declared variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarFlags {
    pub is_const: bool,
    pub is_static: bool,
    pub is_extern: bool,
}

/// A declared variable, global or local.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
    pub flags: VarFlags,
    pub span: Span,
    /// Local whose address is taken, or of aggregate type; it must live in a
    /// stack slot rather than a register.
    pub force_stack: bool,
    /// Normalised initializer (globals and statics only).
    pub init: Option<Initializer>,
    /// Emission label (globals and statics only).
    pub label: Option<String>,
    /// For functions: a body has been seen, not just a prototype.
    pub is_defined: bool,
}

impl VarInfo {
    pub fn new(name: impl Into<String>, ty: Type, flags: VarFlags, span: Span) -> Self {
        Self {
            name: name.into(),
            ty,
            flags,
            span,
            force_stack: false,
            init: None,
            label: None,
            is_defined: false,
        }
    }
}

/// Identifier of a scope within a function's scope list.
pub type ScopeId = usize;

/// One lexical scope: a parent link and the variables declared in it,
/// in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub vars: Vec<VarInfo>,
}

impl Scope {
    pub fn with_parent(parent: Option<ScopeId>) -> Self {
        Self { parent, vars: Vec::new() }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v.name == name)
    }
}

/// Insertion-ordered table of file-scope variables and functions.
#[derive(Debug, Clone, Default)]
pub struct GlobalTable {
    vars: Vec<VarInfo>,
    by_name: HashMap<String, usize>,
}

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a global; returns its slot index. A name may be registered
    /// only once, the caller handles redeclaration rules.
    pub fn define(&mut self, var: VarInfo) -> usize {
        debug_assert!(!self.by_name.contains_key(&var.name));
        let index = self.vars.len();
        self.by_name.insert(var.name.clone(), index);
        self.vars.push(var);
        index
    }

    pub fn find(&self, name: &str) -> Option<&VarInfo> {
        self.by_name.get(name).map(|&i| &self.vars[i])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut VarInfo> {
        let index = *self.by_name.get(name)?;
        Some(&mut self.vars[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All globals in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &VarInfo> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
