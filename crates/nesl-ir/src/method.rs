//! Methods, generic instantiation and partial instantiations.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::OnceMap;
use crate::error::IrError;
use crate::instr::Instruction;
use crate::types::{Attribute, GenericParam, Substitution, Ty, substitute_attributes};

/// Builder for a method before it is attached to its owning type.
#[derive(Clone, Debug, Default)]
pub struct MethodDecl {
    name: String,
    return_type: Option<Ty>,
    parameter_types: Vec<Ty>,
    attributes: Vec<Attribute>,
    generic_parameters: Vec<GenericParam>,
    body: Vec<Instruction>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn returns(mut self, ty: Ty) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn parameter(mut self, ty: Ty) -> Self {
        self.parameter_types.push(ty);
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn generic_parameter(mut self, param: GenericParam) -> Self {
        self.generic_parameters.push(param);
        self
    }

    pub fn body(mut self, body: Vec<Instruction>) -> Self {
        self.body = body;
        self
    }
}

/// A method of a declared or constructed type.
#[derive(Debug)]
pub struct Method {
    owner: Ty,
    name: String,
    return_type: Option<Ty>,
    parameter_types: Vec<Ty>,
    attributes: Vec<Attribute>,
    generic_parameters: Vec<GenericParam>,
    body: Arc<[Instruction]>,
    /// Bindings inherited from the constructed owner, applied at instantiation.
    outer: Substitution,
    /// The declared method every specialization of this one derives from.
    definition: Weak<Method>,
    instantiations: OnceMap<Vec<Ty>, MethodInstance>,
    specializations: AtomicUsize,
}

impl Method {
    pub(crate) fn from_decl(owner: Ty, decl: MethodDecl, definition: Weak<Method>) -> Self {
        Self {
            owner,
            name: decl.name,
            return_type: decl.return_type,
            parameter_types: decl.parameter_types,
            attributes: decl.attributes,
            generic_parameters: decl.generic_parameters,
            body: decl.body.into(),
            outer: Substitution::new(),
            definition,
            instantiations: OnceMap::new(),
            specializations: AtomicUsize::new(0),
        }
    }

    /// Re-creates a declared method for a new owner, dropping every cached
    /// instantiation.
    pub(crate) fn redeclare(&self, owner: Ty) -> Arc<Method> {
        Arc::new_cyclic(|definition| Method {
            owner,
            name: self.name.clone(),
            return_type: self.return_type.clone(),
            parameter_types: self.parameter_types.clone(),
            attributes: self.attributes.clone(),
            generic_parameters: self.generic_parameters.clone(),
            body: Arc::clone(&self.body),
            outer: Substitution::new(),
            definition: definition.clone(),
            instantiations: OnceMap::new(),
            specializations: AtomicUsize::new(0),
        })
    }

    pub fn owner(&self) -> &Ty {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Owner::Name`, used in diagnostics and debug dumps.
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.owner, self.name)
    }

    pub fn return_type(&self) -> Option<&Ty> {
        self.return_type.as_ref()
    }

    pub fn parameter_types(&self) -> &[Ty] {
        &self.parameter_types
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn generic_parameters(&self) -> &[GenericParam] {
        &self.generic_parameters
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.body
    }

    /// The declared method this one was specialized from, or itself for a
    /// declared method. `None` once the declaring type is dropped.
    pub fn definition(&self) -> Option<Arc<Method>> {
        self.definition.upgrade()
    }

    /// Identity shared by a declared method and all of its specializations.
    pub(crate) fn definition_key(&self) -> *const Method {
        self.definition.as_ptr()
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_parameters.is_empty()
    }

    pub fn is_static(&self) -> bool {
        self.attributes.contains(&Attribute::Static)
    }

    /// Workgroup size if the method is a compute entry point.
    pub fn kernel_local_size(&self) -> Option<[u32; 3]> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Kernel { local_size } => Some(*local_size),
            _ => None,
        })
    }

    /// Number of full specializations this generic method has built.
    pub fn specializations_built(&self) -> usize {
        self.specializations.load(Ordering::Relaxed)
    }

    /// Instantiates this generic method with `type_arguments`.
    ///
    /// Requests with element-wise equal argument lists return the same
    /// instance. A failed request leaves nothing in the cache.
    pub fn make_generic(self: &Arc<Self>, type_arguments: &[Ty]) -> Result<MethodInstance, IrError> {
        if self.owner.is_generic() {
            return Err(IrError::UnconstructedOwner {
                method: self.full_name(),
                owner: self.owner.to_string(),
            });
        }
        if !self.is_generic() {
            return Err(IrError::NotGeneric {
                method: self.full_name(),
            });
        }
        if type_arguments.len() != self.generic_parameters.len() {
            return Err(IrError::ArityMismatch {
                item: self.full_name(),
                expected: self.generic_parameters.len(),
                found: type_arguments.len(),
            });
        }
        self.instantiations
            .get_or_try_init(&type_arguments.to_vec(), || self.instantiate(type_arguments))
    }

    fn instantiate(self: &Arc<Self>, type_arguments: &[Ty]) -> Result<MethodInstance, IrError> {
        let mut substitution = Substitution::new();
        let mut partial = false;
        for (param, argument) in self.generic_parameters.iter().zip(type_arguments) {
            param.check(argument)?;
            substitution.bind(param.name(), argument.clone());
            partial |= argument.is_generic();
        }

        if partial {
            return Ok(MethodInstance::Partial(Arc::new(PartialMethod {
                generic: Arc::clone(self),
                type_arguments: type_arguments.to_vec(),
            })));
        }

        substitution.merge_outer(&self.outer);
        self.specializations.fetch_add(1, Ordering::Relaxed);
        let method = self.substituted(self.owner.clone(), &substitution);
        log::debug!(
            "specialized {} with [{}]",
            self.full_name(),
            join(type_arguments)
        );
        Ok(MethodInstance::Concrete(Arc::new(method)))
    }

    /// Rebinds this method to a constructed owner.
    ///
    /// Non-generic methods are specialized right away. Generic methods keep
    /// their body and record the owner's bindings (minus the names their own
    /// parameters shadow) for [`make_generic`](Self::make_generic).
    pub(crate) fn specialize_for_owner(&self, owner: Ty, substitution: &Substitution) -> Method {
        if self.is_generic() {
            return Method {
                owner,
                name: self.name.clone(),
                return_type: self.return_type.clone(),
                parameter_types: self.parameter_types.clone(),
                attributes: self.attributes.clone(),
                generic_parameters: self.generic_parameters.clone(),
                body: Arc::clone(&self.body),
                outer: substitution.without(&self.generic_parameters),
                definition: self.definition.clone(),
                instantiations: OnceMap::new(),
                specializations: AtomicUsize::new(0),
            };
        }
        self.substituted(owner, substitution)
    }

    fn substituted(&self, owner: Ty, substitution: &Substitution) -> Method {
        Method {
            owner,
            name: self.name.clone(),
            return_type: self
                .return_type
                .as_ref()
                .map(|ty| ty.substitute(substitution)),
            parameter_types: self
                .parameter_types
                .iter()
                .map(|ty| ty.substitute(substitution))
                .collect(),
            attributes: substitute_attributes(&self.attributes, substitution),
            generic_parameters: Vec::new(),
            body: self
                .body
                .iter()
                .map(|instr| instr.substitute(substitution))
                .collect(),
            outer: Substitution::new(),
            definition: self.definition.clone(),
            instantiations: OnceMap::new(),
            specializations: AtomicUsize::new(0),
        }
    }
}

fn join(types: &[Ty]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// An instantiation whose arguments still mention generic parameters.
///
/// It records the generic method and its arguments and defers
/// specialization until the remaining parameters are bound.
#[derive(Debug)]
pub struct PartialMethod {
    generic: Arc<Method>,
    type_arguments: Vec<Ty>,
}

impl PartialMethod {
    pub fn generic_method(&self) -> &Arc<Method> {
        &self.generic
    }

    pub fn type_arguments(&self) -> &[Ty] {
        &self.type_arguments
    }

    pub fn full_name(&self) -> String {
        format!("{}<{}>", self.generic.full_name(), join(&self.type_arguments))
    }

    /// Binds the remaining parameters and instantiates the generic method.
    pub fn bind(&self, substitution: &Substitution) -> Result<MethodInstance, IrError> {
        let arguments: Vec<Ty> = self
            .type_arguments
            .iter()
            .map(|ty| ty.substitute(substitution))
            .collect();
        self.generic.make_generic(&arguments)
    }
}

/// The result of resolving or instantiating a method.
#[derive(Clone, Debug)]
pub enum MethodInstance {
    /// A method; concrete unless it is itself a generic definition.
    Concrete(Arc<Method>),
    /// A partial instantiation; never eligible for code generation.
    Partial(Arc<PartialMethod>),
}

impl MethodInstance {
    pub fn is_generic(&self) -> bool {
        match self {
            Self::Concrete(method) => still_generic(method),
            Self::Partial(_) => true,
        }
    }

    pub fn full_name(&self) -> String {
        match self {
            Self::Concrete(method) => method.full_name(),
            Self::Partial(partial) => partial.full_name(),
        }
    }

    /// Returns the concrete method, or [`IrError::StillGeneric`].
    pub fn into_concrete(self) -> Result<Arc<Method>, IrError> {
        match self {
            Self::Concrete(method) if !still_generic(&method) => Ok(method),
            other => Err(IrError::StillGeneric(other.full_name())),
        }
    }
}

fn still_generic(method: &Method) -> bool {
    method.is_generic() || method.owner().is_generic()
}

impl PartialEq for MethodInstance {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Concrete(a), Self::Concrete(b)) => Arc::ptr_eq(a, b),
            (Self::Partial(a), Self::Partial(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
