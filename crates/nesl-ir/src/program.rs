//! The declaration graph handed to the backends.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::IrError;
use crate::instr::MethodRef;
use crate::method::{Method, MethodInstance};
use crate::types::{Ty, TypeDecl, TypeInstance};

/// Which declaration wins when a program and one of its dependencies
/// declare the same full type name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LookupOrder {
    /// The program's own declarations shadow its dependencies.
    #[default]
    LocalFirst,
    /// Dependencies (e.g. a core library of built-ins) shadow local ones.
    DependenciesFirst,
}

/// A set of type declarations plus the programs it depends on.
///
/// The graph is read-only once compilation starts; every cache it holds
/// (constructed types, generic instantiations) is append-only.
#[derive(Debug, Default)]
pub struct Program {
    name: String,
    types: Vec<Arc<TypeDecl>>,
    index: HashMap<Arc<str>, usize>,
    dependencies: Vec<Arc<Program>>,
    lookup_order: LookupOrder,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a declaration and returns the type as seen from inside it.
    pub fn add_type(&mut self, decl: TypeDecl) -> Result<Ty, IrError> {
        if self.index.contains_key(decl.full_name()) {
            return Err(IrError::DuplicateType(decl.full_name().to_string()));
        }
        let ty = decl.self_ty();
        self.index
            .insert(Arc::from(decl.full_name()), self.types.len());
        self.types.push(Arc::new(decl));
        Ok(ty)
    }

    pub fn add_dependency(&mut self, dependency: Arc<Program>) {
        self.dependencies.push(dependency);
    }

    pub fn set_lookup_order(&mut self, order: LookupOrder) {
        self.lookup_order = order;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[Arc<TypeDecl>] {
        &self.types
    }

    pub fn dependencies(&self) -> &[Arc<Program>] {
        &self.dependencies
    }

    pub fn lookup_order(&self) -> LookupOrder {
        self.lookup_order
    }

    /// Methods declared directly by this program's types, in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<Method>> {
        self.types.iter().flat_map(|decl| decl.methods())
    }

    fn local_type(&self, full_name: &str) -> Option<&Arc<TypeDecl>> {
        self.index.get(full_name).map(|&i| &self.types[i])
    }

    fn dependency_type(&self, full_name: &str) -> Option<&Arc<TypeDecl>> {
        self.dependencies
            .iter()
            .find_map(|dep| dep.find_type(full_name))
    }

    /// Finds a visible declaration by full name, honoring the lookup order.
    pub fn find_type(&self, full_name: &str) -> Option<&Arc<TypeDecl>> {
        match self.lookup_order {
            LookupOrder::LocalFirst => self
                .local_type(full_name)
                .or_else(|| self.dependency_type(full_name)),
            LookupOrder::DependenciesFirst => self
                .dependency_type(full_name)
                .or_else(|| self.local_type(full_name)),
        }
    }

    /// Returns the (cached) instance of the referenced type.
    pub fn construct(&self, ty: &Ty) -> Result<Arc<TypeInstance>, IrError> {
        match ty {
            Ty::Named { name, arguments } => self
                .find_type(name)
                .ok_or_else(|| IrError::UnknownType(name.to_string()))?
                .instance(arguments),
            Ty::Param(param) => Err(IrError::StillGeneric(param.name().to_string())),
        }
    }

    /// Resolves a symbolic method reference.
    ///
    /// The owner is constructed first; the method is then instantiated when
    /// the reference carries type arguments.
    pub fn resolve_method(&self, method: &MethodRef) -> Result<MethodInstance, IrError> {
        let owner = self.construct(&method.owner)?;
        let target = owner
            .methods()
            .get(method.index)
            .filter(|m| m.name() == &*method.name)
            .ok_or_else(|| IrError::UnknownMethod {
                owner: method.owner.to_string(),
                name: method.name.to_string(),
                index: method.index,
            })?;
        if method.type_arguments.is_empty() {
            Ok(MethodInstance::Concrete(Arc::clone(target)))
        } else {
            target.make_generic(&method.type_arguments)
        }
    }
}
