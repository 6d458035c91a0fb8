//! Built-once schema descriptors.
//!
//! Definitions describe the shape of a document: which flags a node carries, which
//! named model children it may contain and with what cardinality, and the datatype
//! of flag and field values. The node tree reads these tables directly when it
//! materializes children. Constraint sets hang off each definition and are filled
//! in later by constraint composition.

use core::fmt;
use std::sync::Arc;

use crate::constraint::{AssemblyConstraintSet, ValueConstraintSet};
use crate::xdm::AtomicType;

/// Identity of the schema module that declares a definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
    pub name: String,
    pub short_name: String,
    pub version: String,
    pub namespace: String,
    pub location: Option<String>,
}

impl ModuleInfo {
    pub fn new(short_name: impl Into<String>, namespace: impl Into<String>) -> Arc<Self> {
        let short_name = short_name.into();
        Arc::new(Self {
            name: short_name.clone(),
            short_name,
            version: "1.0".to_string(),
            namespace: namespace.into(),
            location: None,
        })
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} {} ({loc})", self.short_name, self.version),
            None => write!(f, "{} {}", self.short_name, self.version),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Flag,
    Field,
    Assembly,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefinitionKind::Flag => "flag",
            DefinitionKind::Field => "field",
            DefinitionKind::Assembly => "assembly",
        })
    }
}

#[derive(Debug)]
pub struct FlagDefinition {
    pub name: String,
    pub formal_name: Option<String>,
    pub datatype: AtomicType,
    pub module: Arc<ModuleInfo>,
    pub constraints: ValueConstraintSet,
}

impl FlagDefinition {
    pub fn new(name: impl Into<String>, datatype: AtomicType, module: &Arc<ModuleInfo>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            formal_name: None,
            datatype,
            module: Arc::clone(module),
            constraints: ValueConstraintSet::default(),
        })
    }
}

/// A flag as used on a field or assembly.
#[derive(Debug, Clone)]
pub struct FlagInstance {
    pub definition: Arc<FlagDefinition>,
    pub use_name: Option<String>,
    pub required: bool,
}

impl FlagInstance {
    pub fn new(definition: &Arc<FlagDefinition>) -> Self {
        Self {
            definition: Arc::clone(definition),
            use_name: None,
            required: false,
        }
    }

    pub fn use_name(mut self, name: impl Into<String>) -> Self {
        self.use_name = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn effective_name(&self) -> &str {
        self.use_name.as_deref().unwrap_or(&self.definition.name)
    }
}

#[derive(Debug)]
pub struct FieldDefinition {
    pub name: String,
    pub formal_name: Option<String>,
    pub datatype: AtomicType,
    pub flags: Vec<FlagInstance>,
    pub module: Arc<ModuleInfo>,
    pub constraints: ValueConstraintSet,
}

impl FieldDefinition {
    pub fn builder(name: impl Into<String>, module: &Arc<ModuleInfo>) -> FieldDefinitionBuilder {
        FieldDefinitionBuilder {
            name: name.into(),
            formal_name: None,
            datatype: AtomicType::String,
            flags: Vec::new(),
            module: Arc::clone(module),
        }
    }
}

pub struct FieldDefinitionBuilder {
    name: String,
    formal_name: Option<String>,
    datatype: AtomicType,
    flags: Vec<FlagInstance>,
    module: Arc<ModuleInfo>,
}

impl FieldDefinitionBuilder {
    pub fn formal_name(mut self, name: impl Into<String>) -> Self {
        self.formal_name = Some(name.into());
        self
    }

    pub fn datatype(mut self, datatype: AtomicType) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn flag(mut self, flag: FlagInstance) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn build(self) -> Arc<FieldDefinition> {
        Arc::new(FieldDefinition {
            name: self.name,
            formal_name: self.formal_name,
            datatype: self.datatype,
            flags: self.flags,
            module: self.module,
            constraints: ValueConstraintSet::default(),
        })
    }
}

#[derive(Debug)]
pub struct AssemblyDefinition {
    pub name: String,
    pub formal_name: Option<String>,
    /// Name used when the assembly is the root of a document.
    pub root_name: Option<String>,
    pub flags: Vec<FlagInstance>,
    pub model: Vec<ModelInstance>,
    pub module: Arc<ModuleInfo>,
    pub constraints: AssemblyConstraintSet,
}

impl AssemblyDefinition {
    pub fn builder(name: impl Into<String>, module: &Arc<ModuleInfo>) -> AssemblyDefinitionBuilder {
        AssemblyDefinitionBuilder {
            name: name.into(),
            formal_name: None,
            root_name: None,
            flags: Vec::new(),
            model: Vec::new(),
            module: Arc::clone(module),
        }
    }

    pub fn root_name(&self) -> &str {
        self.root_name.as_deref().unwrap_or(&self.name)
    }
}

pub struct AssemblyDefinitionBuilder {
    name: String,
    formal_name: Option<String>,
    root_name: Option<String>,
    flags: Vec<FlagInstance>,
    model: Vec<ModelInstance>,
    module: Arc<ModuleInfo>,
}

impl AssemblyDefinitionBuilder {
    pub fn formal_name(mut self, name: impl Into<String>) -> Self {
        self.formal_name = Some(name.into());
        self
    }

    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = Some(name.into());
        self
    }

    pub fn flag(mut self, flag: FlagInstance) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn model(mut self, instance: ModelInstance) -> Self {
        self.model.push(instance);
        self
    }

    pub fn build(self) -> Arc<AssemblyDefinition> {
        Arc::new(AssemblyDefinition {
            name: self.name,
            formal_name: self.formal_name,
            root_name: self.root_name,
            flags: self.flags,
            model: self.model,
            module: self.module,
            constraints: AssemblyConstraintSet::default(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum ModelDefinition {
    Field(Arc<FieldDefinition>),
    Assembly(Arc<AssemblyDefinition>),
}

/// A field or assembly as used in an assembly's model.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub definition: ModelDefinition,
    pub use_name: Option<String>,
    pub min_occurs: usize,
    /// `None` means unbounded.
    pub max_occurs: Option<usize>,
    pub group_as: Option<String>,
}

impl ModelInstance {
    pub fn field(definition: &Arc<FieldDefinition>) -> Self {
        Self::new(ModelDefinition::Field(Arc::clone(definition)))
    }

    pub fn assembly(definition: &Arc<AssemblyDefinition>) -> Self {
        Self::new(ModelDefinition::Assembly(Arc::clone(definition)))
    }

    fn new(definition: ModelDefinition) -> Self {
        Self {
            definition,
            use_name: None,
            min_occurs: 0,
            max_occurs: Some(1),
            group_as: None,
        }
    }

    pub fn use_name(mut self, name: impl Into<String>) -> Self {
        self.use_name = Some(name.into());
        self
    }

    pub fn occurs(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    pub fn group_as(mut self, name: impl Into<String>) -> Self {
        self.group_as = Some(name.into());
        self
    }

    pub fn definition_name(&self) -> &str {
        match &self.definition {
            ModelDefinition::Field(f) => &f.name,
            ModelDefinition::Assembly(a) => &a.name,
        }
    }

    pub fn effective_name(&self) -> &str {
        self.use_name.as_deref().unwrap_or_else(|| self.definition_name())
    }
}

/// Any definition, used where flags, fields and assemblies are handled alike.
#[derive(Debug, Clone)]
pub enum Definition {
    Flag(Arc<FlagDefinition>),
    Field(Arc<FieldDefinition>),
    Assembly(Arc<AssemblyDefinition>),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Flag(d) => &d.name,
            Definition::Field(d) => &d.name,
            Definition::Assembly(d) => &d.name,
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            Definition::Flag(_) => DefinitionKind::Flag,
            Definition::Field(_) => DefinitionKind::Field,
            Definition::Assembly(_) => DefinitionKind::Assembly,
        }
    }

    pub fn module(&self) -> &Arc<ModuleInfo> {
        match self {
            Definition::Flag(d) => &d.module,
            Definition::Field(d) => &d.module,
            Definition::Assembly(d) => &d.module,
        }
    }

    /// Constraints every definition kind supports.
    pub fn value_constraints(&self) -> &ValueConstraintSet {
        match self {
            Definition::Flag(d) => &d.constraints,
            Definition::Field(d) => &d.constraints,
            Definition::Assembly(d) => &d.constraints.values,
        }
    }

    pub fn assembly_constraints(&self) -> Option<&AssemblyConstraintSet> {
        match self {
            Definition::Assembly(d) => Some(&d.constraints),
            _ => None,
        }
    }

    /// Identity comparison; two handles to the same definition are equal.
    pub fn ptr_eq(&self, other: &Definition) -> bool {
        match (self, other) {
            (Definition::Flag(a), Definition::Flag(b)) => Arc::ptr_eq(a, b),
            (Definition::Field(a), Definition::Field(b)) => Arc::ptr_eq(a, b),
            (Definition::Assembly(a), Definition::Assembly(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}

/// A loaded schema module with its root assemblies.
#[derive(Debug, Clone)]
pub struct Module {
    pub info: Arc<ModuleInfo>,
    pub roots: Vec<Arc<AssemblyDefinition>>,
}

impl Module {
    pub fn new(info: &Arc<ModuleInfo>) -> Self {
        Self {
            info: Arc::clone(info),
            roots: Vec::new(),
        }
    }

    pub fn with_root(mut self, root: &Arc<AssemblyDefinition>) -> Self {
        self.roots.push(Arc::clone(root));
        self
    }
}
