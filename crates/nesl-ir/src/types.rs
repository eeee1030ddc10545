//! Type references, generic parameters and type declarations.

use std::sync::Arc;

use crate::cache::OnceMap;
use crate::error::IrError;
use crate::method::{Method, MethodDecl};

/// A reference to a type.
///
/// Type references compare and hash by value: two references are equal when
/// they name the same declaration with element-wise equal type arguments, or
/// the same generic parameter.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Ty {
    /// A declared type, identified by its full name and type arguments.
    Named { name: Arc<str>, arguments: Arc<[Ty]> },
    /// A generic parameter placeholder.
    Param(GenericParam),
}

impl Ty {
    /// A reference to a non-generic declared type.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named {
            name: name.into(),
            arguments: Arc::from([]),
        }
    }

    /// A reference to a generic declared type constructed with `arguments`.
    pub fn generic(name: impl Into<Arc<str>>, arguments: impl Into<Arc<[Ty]>>) -> Self {
        Self::Named {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// A reference to a generic parameter.
    pub fn param(param: GenericParam) -> Self {
        Self::Param(param)
    }

    /// The full name of the referenced declaration, or the parameter name.
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::Param(param) => param.name(),
        }
    }

    /// Type arguments of a constructed type; empty for parameters.
    pub fn arguments(&self) -> &[Ty] {
        match self {
            Self::Named { arguments, .. } => arguments,
            Self::Param(_) => &[],
        }
    }

    /// Returns `true` if a generic parameter occurs anywhere in this reference.
    pub fn is_generic(&self) -> bool {
        match self {
            Self::Named { arguments, .. } => arguments.iter().any(Ty::is_generic),
            Self::Param(_) => true,
        }
    }

    /// Replaces every bound generic parameter, recursing into type arguments.
    pub fn substitute(&self, substitution: &Substitution) -> Ty {
        match self {
            Self::Named { name, arguments } => {
                if !self.is_generic() {
                    return self.clone();
                }
                Self::Named {
                    name: Arc::clone(name),
                    arguments: arguments
                        .iter()
                        .map(|arg| arg.substitute(substitution))
                        .collect(),
                }
            }
            Self::Param(param) => substitution
                .get(param.name())
                .cloned()
                .unwrap_or_else(|| self.clone()),
        }
    }
}

/// A constraint on the arguments accepted by a generic parameter.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Constraint {
    /// The argument must be one of the listed types.
    OneOf(Vec<Ty>),
}

impl Constraint {
    fn admits(&self, argument: &Ty) -> bool {
        match (self, argument) {
            (Self::OneOf(allowed), Ty::Param(param)) => {
                // A parameter argument qualifies when its own set is narrower.
                param.constraints().iter().any(|own| match own {
                    Self::OneOf(narrower) => narrower.iter().all(|t| allowed.contains(t)),
                })
            }
            (Self::OneOf(allowed), named) => allowed.contains(named),
        }
    }
}

/// A generic type parameter with its constraint set.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GenericParam {
    name: Arc<str>,
    constraints: Arc<[Constraint]>,
}

impl GenericParam {
    /// An unconstrained parameter.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            constraints: Arc::from([]),
        }
    }

    /// Adds a constraint to the parameter.
    pub fn with_constraint(self, constraint: Constraint) -> Self {
        let mut constraints = self.constraints.to_vec();
        constraints.push(constraint);
        Self {
            name: self.name,
            constraints: constraints.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Checks `argument` against every constraint, failing on the first miss.
    pub fn check(&self, argument: &Ty) -> Result<(), IrError> {
        match self.constraints.iter().find(|c| !c.admits(argument)) {
            Some(constraint) => Err(IrError::ConstraintViolation {
                parameter: self.name.to_string(),
                argument: argument.to_string(),
                constraint: constraint.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// An ordered mapping from generic parameter names to their replacements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Substitution {
    bindings: Vec<(Arc<str>, Ty)>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `ty`, replacing an earlier binding of the same name.
    pub fn bind(&mut self, name: impl Into<Arc<str>>, ty: Ty) {
        let name = name.into();
        match self.bindings.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = ty,
            None => self.bindings.push((name, ty)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Ty> {
        self.bindings
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, ty)| ty)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Ty)> {
        self.bindings.iter().map(|(n, ty)| (&**n, ty))
    }

    /// Adds the bindings of `outer` whose names are not bound here.
    pub fn merge_outer(&mut self, outer: &Substitution) {
        for (name, ty) in &outer.bindings {
            if self.get(name).is_none() {
                self.bindings.push((Arc::clone(name), ty.clone()));
            }
        }
    }

    /// Returns a copy without the bindings shadowed by `params`.
    pub fn without(&self, params: &[GenericParam]) -> Substitution {
        Substitution {
            bindings: self
                .bindings
                .iter()
                .filter(|(n, _)| params.iter().all(|p| p.name() != &**n))
                .cloned()
                .collect(),
        }
    }
}

/// Target-specific representation of a built-in type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct PlatformRepresentation {
    /// SPIR-V type name, e.g. `OpTypeFloat 32` or `OpTypeVector {T} 4`.
    pub spirv: Option<String>,
}

/// An attribute attached to a type or method.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Attribute {
    /// The method has no implicit receiver.
    Static,
    /// The method is a compute entry point.
    Kernel { local_size: [u32; 3] },
    /// The type maps onto a platform built-in.
    PlatformRepresentation(PlatformRepresentation),
    /// Any other attribute; its type references take part in substitution.
    Custom { name: String, types: Vec<Ty> },
}

impl Attribute {
    /// Substitutes generic parameters inside the attribute's type references.
    pub fn substitute(&self, substitution: &Substitution) -> Attribute {
        match self {
            Self::Custom { name, types } => Self::Custom {
                name: name.clone(),
                types: types.iter().map(|t| t.substitute(substitution)).collect(),
            },
            other => other.clone(),
        }
    }
}

pub(crate) fn substitute_attributes(
    attributes: &[Attribute],
    substitution: &Substitution,
) -> Vec<Attribute> {
    attributes
        .iter()
        .map(|a| a.substitute(substitution))
        .collect()
}

/// A named field of a structured type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Ty,
}

/// A type declaration.
///
/// The generic parameter list is fixed when the declaration is built; once
/// the declaration is added to a [`Program`](crate::Program) it is immutable.
#[derive(Debug)]
pub struct TypeDecl {
    full_name: Arc<str>,
    generic_parameters: Vec<GenericParam>,
    attributes: Vec<Attribute>,
    fields: Vec<Field>,
    methods: Vec<Arc<Method>>,
    constructions: OnceMap<Vec<Ty>, Arc<TypeInstance>>,
}

impl TypeDecl {
    /// Starts a declaration with the given `Namespace.Name`.
    pub fn new(full_name: impl Into<Arc<str>>) -> Self {
        Self {
            full_name: full_name.into(),
            generic_parameters: Vec::new(),
            attributes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructions: OnceMap::new(),
        }
    }

    /// A built-in type with the given SPIR-V representation.
    pub fn builtin(full_name: impl Into<Arc<str>>, spirv: impl Into<String>) -> Self {
        Self::new(full_name).with_attribute(Attribute::PlatformRepresentation(
            PlatformRepresentation {
                spirv: Some(spirv.into()),
            },
        ))
    }

    /// Adds a generic parameter. Methods declared earlier are rebound to the
    /// widened owner type.
    pub fn with_generic_parameter(mut self, param: GenericParam) -> Self {
        self.generic_parameters.push(param);
        if !self.methods.is_empty() {
            let owner = self.self_ty();
            self.methods = self
                .methods
                .iter()
                .map(|m| m.redeclare(owner.clone()))
                .collect();
        }
        self.constructions = OnceMap::new();
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
        });
        self
    }

    /// Declares a method and returns its index within this type.
    pub fn add_method(&mut self, decl: MethodDecl) -> usize {
        let owner = self.self_ty();
        self.methods.push(Arc::new_cyclic(|definition| {
            Method::from_decl(owner, decl, definition.clone())
        }));
        self.methods.len() - 1
    }

    /// The type as seen from inside its own declaration.
    pub fn self_ty(&self) -> Ty {
        Ty::generic(
            Arc::clone(&self.full_name),
            self.generic_parameters
                .iter()
                .cloned()
                .map(Ty::Param)
                .collect::<Vec<_>>(),
        )
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The part of the full name after the last `.`.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit_once('.')
            .map_or(&*self.full_name, |(_, name)| name)
    }

    /// The part of the full name before the last `.`.
    pub fn namespace(&self) -> &str {
        self.full_name.rsplit_once('.').map_or("", |(ns, _)| ns)
    }

    pub fn generic_parameters(&self) -> &[GenericParam] {
        &self.generic_parameters
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_parameters.is_empty()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    /// Returns the instance of this declaration for `arguments`.
    ///
    /// Generic declarations are specialized once per value-equal argument
    /// list; non-generic declarations only accept an empty list.
    pub fn instance(&self, arguments: &[Ty]) -> Result<Arc<TypeInstance>, IrError> {
        if !self.is_generic() && !arguments.is_empty() {
            return Err(IrError::TypeNotGeneric {
                ty: self.full_name.to_string(),
            });
        }
        if arguments.len() != self.generic_parameters.len() {
            return Err(IrError::ArityMismatch {
                item: self.full_name.to_string(),
                expected: self.generic_parameters.len(),
                found: arguments.len(),
            });
        }
        self.constructions
            .get_or_try_init(&arguments.to_vec(), || self.construct(arguments))
    }

    fn construct(&self, arguments: &[Ty]) -> Result<Arc<TypeInstance>, IrError> {
        let mut substitution = Substitution::new();
        for (param, argument) in self.generic_parameters.iter().zip(arguments) {
            param.check(argument)?;
            substitution.bind(param.name(), argument.clone());
        }

        let ty = Ty::generic(Arc::clone(&self.full_name), arguments.to_vec());
        if substitution.is_empty() {
            return Ok(Arc::new(TypeInstance {
                ty,
                attributes: self.attributes.clone(),
                fields: self.fields.clone(),
                methods: self.methods.clone(),
                substitution,
            }));
        }

        log::debug!("constructing type {ty}");
        Ok(Arc::new(TypeInstance {
            attributes: substitute_attributes(&self.attributes, &substitution),
            fields: self
                .fields
                .iter()
                .map(|f| Field {
                    name: f.name.clone(),
                    ty: f.ty.substitute(&substitution),
                })
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|m| Arc::new(m.specialize_for_owner(ty.clone(), &substitution)))
                .collect(),
            ty,
            substitution,
        }))
    }
}

/// A declaration specialized with concrete (or still generic) arguments.
#[derive(Debug)]
pub struct TypeInstance {
    ty: Ty,
    attributes: Vec<Attribute>,
    fields: Vec<Field>,
    methods: Vec<Arc<Method>>,
    substitution: Substitution,
}

impl TypeInstance {
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    /// The parameter-to-argument map this instance was built with.
    pub fn substitution(&self) -> &Substitution {
        &self.substitution
    }

    pub fn platform_representation(&self) -> Option<&PlatformRepresentation> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::PlatformRepresentation(repr) => Some(repr),
            _ => None,
        })
    }
}
