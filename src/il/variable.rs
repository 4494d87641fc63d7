//! Reconstructed variables and their use-site lists.
//!
//! Every [`ILVariable`] keeps three lists of the instructions that reference it: loads,
//! stores and address-of uses. The lists contain exactly the referencing instructions that
//! are connected to the function body; [`crate::il::ILFunction`] keeps them in sync when
//! subtrees are attached or detached.
//!
//! Each referencing instruction remembers its position in the list it lives in, so
//! unregistering is a swap-remove plus a single index fix-up, O(1) regardless of how
//! many uses a variable has.

use std::fmt;

use crate::il::{
    types::{IlType, StackType},
    InstrId,
};

/// Identifier of a variable inside one [`crate::il::ILFunction`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    /// Creates a new variable identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.0)
    }
}

/// Where a variable comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum VariableKind {
    /// A method parameter, including `this`
    Parameter,
    /// A declared local
    Local,
    /// A temporary introduced for an evaluation-stack slot
    StackSlot,
    /// The local of a `fixed` statement
    PinnedRegionLocal,
    /// The variable bound by a catch clause
    ExceptionLocal,
    /// The iteration variable of a foreach loop
    ForeachLocal,
    /// The resource variable of a using statement
    UsingLocal,
}

/// How an instruction references a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableUse {
    /// `ldloc`
    Load,
    /// `stloc` and other definitions
    Store,
    /// `ldloca`
    Address,
}

/// A local, parameter or stack slot of a function body.
#[derive(Debug, Clone)]
pub struct ILVariable {
    /// Origin of the variable
    pub kind: VariableKind,
    /// Declared type
    pub ty: IlType,
    /// Display name
    pub name: String,
    /// Parameter or local slot index, when the variable has one
    pub index: Option<u32>,
    pub(crate) loads: Vec<InstrId>,
    pub(crate) stores: Vec<InstrId>,
    pub(crate) address_uses: Vec<InstrId>,
}

impl ILVariable {
    /// Creates a variable with empty use lists.
    #[must_use]
    pub fn new(kind: VariableKind, ty: IlType, name: &str) -> Self {
        Self {
            kind,
            ty,
            name: name.to_string(),
            index: None,
            loads: Vec::new(),
            stores: Vec::new(),
            address_uses: Vec::new(),
        }
    }

    /// Evaluation-stack category of the variable's values.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        self.ty.stack_type()
    }

    /// Connected `ldloc` instructions.
    #[must_use]
    pub fn loads(&self) -> &[InstrId] {
        &self.loads
    }

    /// Connected store instructions.
    #[must_use]
    pub fn stores(&self) -> &[InstrId] {
        &self.stores
    }

    /// Connected `ldloca` instructions.
    #[must_use]
    pub fn address_uses(&self) -> &[InstrId] {
        &self.address_uses
    }

    /// Number of connected loads.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.len()
    }

    /// Number of connected stores.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Number of connected address-of uses.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.address_uses.len()
    }

    /// Returns true once no connected instruction references the variable.
    #[must_use]
    pub fn is_unused(&self) -> bool {
        self.loads.is_empty() && self.stores.is_empty() && self.address_uses.is_empty()
    }

    pub(crate) fn uses_mut(&mut self, usage: VariableUse) -> &mut Vec<InstrId> {
        match usage {
            VariableUse::Load => &mut self.loads,
            VariableUse::Store => &mut self.stores,
            VariableUse::Address => &mut self.address_uses,
        }
    }

    pub(crate) fn uses(&self, usage: VariableUse) -> &[InstrId] {
        match usage {
            VariableUse::Load => &self.loads,
            VariableUse::Store => &self.stores,
            VariableUse::Address => &self.address_uses,
        }
    }
}

impl fmt::Display for ILVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} : {}", self.kind, self.name, self.ty)
    }
}
