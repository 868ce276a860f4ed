//! C type representation for the xcc compiler.
//!
//! Types are plain values compared structurally. Struct and union types refer
//! to a shared [`StructInfo`] through a [`StructId`] into the per-compilation
//! [`StructTable`], so recursive types never form ownership cycles.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const WORD_SIZE: usize = 8;

/// Width class of an integer type. Enums are represented as `int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumKind {
    Char,
    Short,
    Int,
    Long,
}

impl NumKind {
    pub fn size(self) -> usize {
        match self {
            NumKind::Char => 1,
            NumKind::Short => 2,
            NumKind::Int => 4,
            NumKind::Long => 8,
        }
    }
}

/// Handle to a struct or union in the [`StructTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructId(pub u32);

/// A C type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Num { kind: NumKind, unsigned: bool },
    Ptr(Box<Type>),
    /// `len` is `None` until fixed by an initializer.
    Array { elem: Box<Type>, len: Option<usize> },
    Struct(StructId),
    Func(Box<FuncType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncType {
    pub ret: Type,
    pub params: Vec<Type>,
    pub variadic: bool,
}

impl Type {
    pub fn char_type() -> Type {
        Type::Num { kind: NumKind::Char, unsigned: false }
    }

    pub fn int_type() -> Type {
        Type::Num { kind: NumKind::Int, unsigned: false }
    }

    pub fn long_type() -> Type {
        Type::Num { kind: NumKind::Long, unsigned: false }
    }

    pub fn ptr_to(self) -> Type {
        Type::Ptr(Box::new(self))
    }

    pub fn array_of(self, len: Option<usize>) -> Type {
        Type::Array { elem: Box::new(self), len }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_num(&self) -> bool {
        matches!(self, Type::Num { .. })
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Type::Num { kind: NumKind::Char, .. })
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::Num { unsigned: true, .. })
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Type::Func(_))
    }

    /// Element type behind a pointer or array.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Ptr(inner) => Some(inner),
            Type::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn func_type(&self) -> Option<&FuncType> {
        match self {
            Type::Func(f) => Some(f),
            Type::Ptr(inner) => match inner.as_ref() {
                Type::Func(f) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    /// Byte size. Unsized arrays report 0; sema fixes their length before
    /// any size is consumed.
    pub fn size(&self, structs: &StructTable) -> usize {
        match self {
            Type::Void => 1,
            Type::Num { kind, .. } => kind.size(),
            Type::Ptr(_) | Type::Func(_) => WORD_SIZE,
            Type::Array { elem, len } => elem.size(structs) * len.unwrap_or(0),
            Type::Struct(id) => structs.info(*id).size,
        }
    }

    pub fn align(&self, structs: &StructTable) -> usize {
        match self {
            Type::Void => 1,
            Type::Num { kind, .. } => kind.size(),
            Type::Ptr(_) | Type::Func(_) => WORD_SIZE,
            Type::Array { elem, .. } => elem.align(structs),
            Type::Struct(id) => structs.info(*id).align,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Num { kind, unsigned } => {
                if *unsigned {
                    write!(f, "unsigned ")?;
                }
                match kind {
                    NumKind::Char => write!(f, "char"),
                    NumKind::Short => write!(f, "short"),
                    NumKind::Int => write!(f, "int"),
                    NumKind::Long => write!(f, "long"),
                }
            }
            Type::Ptr(inner) => write!(f, "{}*", inner),
            Type::Array { elem, len: Some(n) } => write!(f, "{}[{}]", elem, n),
            Type::Array { elem, len: None } => write!(f, "{}[]", elem),
            Type::Struct(id) => write!(f, "struct#{}", id.0),
            Type::Func(func) => {
                write!(f, "{}(", func.ret)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if func.variadic {
                    if !func.params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A struct or union member with its finalised byte offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
}

/// Layout of a struct or union, shared by every type that names its tag.
///
/// Once `defined` is set the member offsets and total size never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructInfo {
    pub tag: String,
    pub is_union: bool,
    pub members: Vec<Member>,
    pub size: usize,
    pub align: usize,
    pub defined: bool,
}

impl StructInfo {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Insertion-ordered registry of struct and union layouts, keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    infos: Vec<StructInfo>,
    by_tag: HashMap<String, StructId>,
    anon_count: u32,
}

impl StructTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `tag`, creating a forward declaration if it is new.
    pub fn declare(&mut self, tag: &str, is_union: bool) -> StructId {
        if let Some(&id) = self.by_tag.get(tag) {
            return id;
        }
        let id = StructId(self.infos.len() as u32);
        self.infos.push(StructInfo {
            tag: tag.to_string(),
            is_union,
            members: Vec::new(),
            size: 0,
            align: 1,
            defined: false,
        });
        self.by_tag.insert(tag.to_string(), id);
        id
    }

    /// Mint a tag for an anonymous struct or union.
    pub fn anon_tag(&mut self) -> String {
        let tag = format!(".anon.{}", self.anon_count);
        self.anon_count += 1;
        tag
    }

    pub fn lookup(&self, tag: &str) -> Option<StructId> {
        self.by_tag.get(tag).copied()
    }

    pub fn info(&self, id: StructId) -> &StructInfo {
        &self.infos[id.0 as usize]
    }

    pub fn is_defined(&self, id: StructId) -> bool {
        self.infos[id.0 as usize].defined
    }

    /// Install the member list and compute offsets, alignment and size.
    /// Union members all sit at offset 0.
    pub fn define(&mut self, id: StructId, members: Vec<(String, Type)>) {
        let is_union = self.infos[id.0 as usize].is_union;
        let mut laid_out = Vec::with_capacity(members.len());
        let mut size = 0usize;
        let mut align = 1usize;
        for (name, ty) in members {
            let member_size = ty.size(self);
            let member_align = ty.align(self).max(1);
            align = align.max(member_align);
            let offset = if is_union {
                size = size.max(member_size);
                0
            } else {
                let offset = round_up(size, member_align);
                size = offset + member_size;
                offset
            };
            laid_out.push(Member { name, ty, offset });
        }
        let info = &mut self.infos[id.0 as usize];
        info.members = laid_out;
        info.align = align;
        info.size = round_up(size, align);
        info.defined = true;
    }
}

pub fn round_up(value: usize, align: usize) -> usize {
    debug_assert!(align > 0);
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_aligns_members() {
        let mut table = StructTable::new();
        let id = table.declare("p", false);
        table.define(
            id,
            vec![
                ("c".into(), Type::char_type()),
                ("x".into(), Type::int_type()),
                ("l".into(), Type::long_type()),
            ],
        );
        let info = table.info(id);
        assert_eq!(info.members[0].offset, 0);
        assert_eq!(info.members[1].offset, 4);
        assert_eq!(info.members[2].offset, 8);
        assert_eq!(info.size, 16);
        assert_eq!(info.align, 8);
    }

    #[test]
    fn union_layout_overlaps_members() {
        let mut table = StructTable::new();
        let id = table.declare("u", true);
        table.define(
            id,
            vec![
                ("x".into(), Type::int_type()),
                ("l".into(), Type::long_type()),
            ],
        );
        let info = table.info(id);
        assert!(info.members.iter().all(|m| m.offset == 0));
        assert_eq!(info.size, 8);
    }

    #[test]
    fn declarator_types_are_structural() {
        let a = Type::int_type().ptr_to().array_of(Some(3));
        let b = Type::int_type().ptr_to().array_of(Some(3));
        assert_eq!(a, b);
        assert_ne!(a, Type::int_type().array_of(Some(3)));
    }
}
