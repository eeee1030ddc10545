//! JSON program manifests.
//!
//! A manifest lists the type declarations of one program. Every manifest
//! program depends on the core library returned by [`core_library`].

use std::collections::HashMap;
use std::sync::Arc;

use nesl_ir::{
    Attribute, Constraint, GenericParam, Instruction, IrError, LookupOrder, MethodDecl, MethodRef,
    Program, Ty, TypeDecl, VarId,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed type expression `{expr}`: {reason}")]
    TypeSyntax { expr: String, reason: &'static str },

    #[error("call to {owner}::{name}: no such method is declared")]
    UnknownMethod { owner: String, name: String },

    #[error("call to {owner}::{name} matches {candidates} overloads; list its `parameters`")]
    AmbiguousCall {
        owner: String,
        name: String,
        candidates: usize,
    },

    #[error(transparent)]
    Ir(#[from] IrError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    program: String,
    #[serde(default)]
    lookup_order: ManifestLookupOrder,
    #[serde(default)]
    types: Vec<TypeEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ManifestLookupOrder {
    #[default]
    LocalFirst,
    DependenciesFirst,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeEntry {
    name: String,
    #[serde(default)]
    generic_parameters: Vec<GenericParamEntry>,
    #[serde(default)]
    spirv: Option<String>,
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default)]
    methods: Vec<MethodEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenericParamEntry {
    name: String,
    #[serde(default)]
    one_of: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodEntry {
    name: String,
    #[serde(default, rename = "static")]
    is_static: bool,
    #[serde(default)]
    kernel: Option<[u32; 3]>,
    #[serde(default)]
    returns: Option<String>,
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default)]
    generic_parameters: Vec<GenericParamEntry>,
    #[serde(default)]
    body: Vec<InstructionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
enum InstructionEntry {
    Negate {
        dst: VarId,
        src: VarId,
    },
    Add {
        dst: VarId,
        lhs: VarId,
        rhs: VarId,
    },
    Subtract {
        dst: VarId,
        lhs: VarId,
        rhs: VarId,
    },
    Multiply {
        dst: VarId,
        lhs: VarId,
        rhs: VarId,
    },
    Divide {
        dst: VarId,
        lhs: VarId,
        rhs: VarId,
    },
    Modulo {
        dst: VarId,
        lhs: VarId,
        rhs: VarId,
    },
    Remainder {
        dst: VarId,
        lhs: VarId,
        rhs: VarId,
    },
    Call {
        owner: String,
        method: String,
        #[serde(default)]
        type_arguments: Vec<String>,
        /// Parameter types of the target, written as in its declaration.
        #[serde(default)]
        parameters: Option<Vec<String>>,
        #[serde(default)]
        result: Option<VarId>,
        #[serde(default)]
        arguments: Vec<VarId>,
    },
    Return,
    ReturnValue {
        value: VarId,
    },
    DefVariable {
        #[serde(rename = "type")]
        ty: String,
    },
    Load {
        dst: VarId,
        src: VarId,
    },
    LoadUInt32 {
        dst: VarId,
        value: u32,
    },
    LoadFloat32 {
        dst: VarId,
        value: f32,
    },
    LoadElement {
        dst: VarId,
        src: VarId,
        index: VarId,
    },
    SetElement {
        dst: VarId,
        index: VarId,
        value: VarId,
    },
    LoadField {
        dst: VarId,
        src: VarId,
        field: u32,
    },
    SetField {
        dst: VarId,
        field: u32,
        value: VarId,
    },
}

/// The built-in types available to every manifest.
pub fn core_library() -> Result<Arc<Program>, IrError> {
    let mut core = Program::new("System");
    core.add_type(TypeDecl::builtin("System.Void", "OpTypeVoid"))?;
    let mut components = Vec::new();
    for (name, spirv) in [
        ("System.Bool", "OpTypeBool"),
        ("System.Int32", "OpTypeInt 32 1"),
        ("System.UInt32", "OpTypeInt 32 0"),
        ("System.Float32", "OpTypeFloat 32"),
    ] {
        components.push(core.add_type(TypeDecl::builtin(name, spirv))?);
    }
    for count in 2..=4 {
        let component =
            GenericParam::new("T").with_constraint(Constraint::OneOf(components.clone()));
        core.add_type(
            TypeDecl::builtin(
                format!("System.Vector{count}"),
                format!("OpTypeVector {{T}} {count}"),
            )
            .with_generic_parameter(component),
        )?;
    }
    Ok(Arc::new(core))
}

/// Parses a manifest into a program depending on the core library.
pub fn load(source: &str) -> Result<Program, ManifestError> {
    let manifest: Manifest = serde_json::from_str(source)?;

    let mut program = Program::new(manifest.program);
    program.add_dependency(core_library()?);
    program.set_lookup_order(match manifest.lookup_order {
        ManifestLookupOrder::LocalFirst => LookupOrder::LocalFirst,
        ManifestLookupOrder::DependenciesFirst => LookupOrder::DependenciesFirst,
    });

    let types = manifest
        .types
        .iter()
        .map(ResolvedType::new)
        .collect::<Result<Vec<_>, _>>()?;
    let by_name: HashMap<&str, &ResolvedType<'_>> =
        types.iter().map(|t| (t.entry.name.as_str(), t)).collect();

    for ty in &types {
        let decl = build_type(ty, &by_name)?;
        program.add_type(decl)?;
    }
    log::debug!(
        "loaded manifest {} with {} type(s)",
        program.name(),
        program.types().len()
    );
    Ok(program)
}

/// A type entry with its generic parameters and method signatures parsed.
struct ResolvedType<'a> {
    entry: &'a TypeEntry,
    params: Vec<GenericParam>,
    methods: Vec<ResolvedMethod<'a>>,
}

struct ResolvedMethod<'a> {
    entry: &'a MethodEntry,
    own: Vec<GenericParam>,
    /// Method parameters first, so they shadow the owner's.
    scope: Vec<GenericParam>,
    parameters: Vec<Ty>,
}

impl<'a> ResolvedType<'a> {
    fn new(entry: &'a TypeEntry) -> Result<Self, ManifestError> {
        let params = generic_parameters(&entry.generic_parameters, &[])?;
        let methods = entry
            .methods
            .iter()
            .map(|method| {
                let own = generic_parameters(&method.generic_parameters, &params)?;
                let scope: Vec<GenericParam> = own.iter().chain(&params).cloned().collect();
                let parameters = method
                    .parameters
                    .iter()
                    .map(|expr| parse_type(expr, &scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ResolvedMethod {
                    entry: method,
                    own,
                    scope,
                    parameters,
                })
            })
            .collect::<Result<Vec<_>, ManifestError>>()?;
        Ok(Self {
            entry,
            params,
            methods,
        })
    }

    /// Index of the method a call names. `parameters`, when given, picks
    /// among overloads sharing the name.
    fn resolve(&self, name: &str, parameters: Option<&[String]>) -> Result<usize, ManifestError> {
        let mut candidates = Vec::new();
        for (index, method) in self.methods.iter().enumerate() {
            if method.entry.name != name {
                continue;
            }
            if let Some(exprs) = parameters {
                let wanted = exprs
                    .iter()
                    .map(|expr| parse_type(expr, &method.scope))
                    .collect::<Result<Vec<_>, _>>()?;
                if wanted != method.parameters {
                    continue;
                }
            }
            candidates.push(index);
        }
        match candidates[..] {
            [index] => Ok(index),
            [] => Err(ManifestError::UnknownMethod {
                owner: self.entry.name.clone(),
                name: name.to_string(),
            }),
            _ => Err(ManifestError::AmbiguousCall {
                owner: self.entry.name.clone(),
                name: name.to_string(),
                candidates: candidates.len(),
            }),
        }
    }
}

fn build_type(
    ty: &ResolvedType<'_>,
    types: &HashMap<&str, &ResolvedType<'_>>,
) -> Result<TypeDecl, ManifestError> {
    let entry = ty.entry;
    let mut decl = match &entry.spirv {
        Some(spirv) => TypeDecl::builtin(entry.name.as_str(), spirv.as_str()),
        None => TypeDecl::new(entry.name.as_str()),
    };
    for param in &ty.params {
        decl = decl.with_generic_parameter(param.clone());
    }
    for field in &entry.fields {
        decl = decl.with_field(field.name.as_str(), parse_type(&field.ty, &ty.params)?);
    }

    for method in &ty.methods {
        let scope = &method.scope;
        let mut m = MethodDecl::new(method.entry.name.as_str());
        for param in &method.own {
            m = m.generic_parameter(param.clone());
        }
        if method.entry.is_static {
            m = m.attribute(Attribute::Static);
        }
        if let Some(local_size) = method.entry.kernel {
            m = m.attribute(Attribute::Kernel { local_size });
        }
        if let Some(ret) = &method.entry.returns {
            m = m.returns(parse_type(ret, scope)?);
        }
        for param in &method.parameters {
            m = m.parameter(param.clone());
        }
        let body = method
            .entry
            .body
            .iter()
            .map(|instr| build_instruction(instr, scope, types))
            .collect::<Result<Vec<_>, _>>()?;
        decl.add_method(m.body(body));
    }
    Ok(decl)
}

fn generic_parameters(
    entries: &[GenericParamEntry],
    scope: &[GenericParam],
) -> Result<Vec<GenericParam>, ManifestError> {
    entries
        .iter()
        .map(|entry| {
            let param = GenericParam::new(entry.name.as_str());
            if entry.one_of.is_empty() {
                return Ok(param);
            }
            let set = entry
                .one_of
                .iter()
                .map(|expr| parse_type(expr, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(param.with_constraint(Constraint::OneOf(set)))
        })
        .collect()
}

fn build_instruction(
    entry: &InstructionEntry,
    scope: &[GenericParam],
    types: &HashMap<&str, &ResolvedType<'_>>,
) -> Result<Instruction, ManifestError> {
    use InstructionEntry as I;

    let instr = match *entry {
        I::Negate { dst, src } => Instruction::negate(dst, src),
        I::Add { dst, lhs, rhs } => Instruction::add(dst, lhs, rhs),
        I::Subtract { dst, lhs, rhs } => Instruction::subtract(dst, lhs, rhs),
        I::Multiply { dst, lhs, rhs } => Instruction::multiply(dst, lhs, rhs),
        I::Divide { dst, lhs, rhs } => Instruction::divide(dst, lhs, rhs),
        I::Modulo { dst, lhs, rhs } => Instruction::modulo(dst, lhs, rhs),
        I::Remainder { dst, lhs, rhs } => Instruction::remainder(dst, lhs, rhs),
        I::Call {
            ref owner,
            ref method,
            ref type_arguments,
            ref parameters,
            result,
            ref arguments,
        } => {
            let owner_ty = parse_type(owner, scope)?;
            let index = match types.get(owner_ty.name()) {
                Some(target) => target.resolve(method, parameters.as_deref())?,
                None => {
                    return Err(ManifestError::UnknownMethod {
                        owner: owner.clone(),
                        name: method.clone(),
                    });
                }
            };
            let type_arguments = type_arguments
                .iter()
                .map(|expr| parse_type(expr, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let target = MethodRef::new(owner_ty, index, method.as_str())
                .with_type_arguments(type_arguments);
            Instruction::call(target, result, arguments)
        }
        I::Return => Instruction::ret(),
        I::ReturnValue { value } => Instruction::return_value(value),
        I::DefVariable { ref ty } => Instruction::def_variable(parse_type(ty, scope)?),
        I::Load { dst, src } => Instruction::load(dst, src),
        I::LoadUInt32 { dst, value } => Instruction::load_u32(dst, value),
        I::LoadFloat32 { dst, value } => Instruction::load_f32(dst, value),
        I::LoadElement { dst, src, index } => Instruction::load_element(dst, src, index),
        I::SetElement { dst, index, value } => Instruction::set_element(dst, index, value),
        I::LoadField { dst, src, field } => Instruction::load_field(dst, src, field),
        I::SetField { dst, field, value } => Instruction::set_field(dst, field, value),
    };
    Ok(instr)
}

/// Parses `Name` or `Name<Arg, ...>`. A bare name matching a parameter in
/// `scope` denotes that parameter; earlier entries shadow later ones.
pub fn parse_type(expr: &str, scope: &[GenericParam]) -> Result<Ty, ManifestError> {
    let mut parser = TypeParser {
        expr,
        rest: expr,
        scope,
    };
    let ty = parser.ty()?;
    if !parser.rest.trim().is_empty() {
        return Err(parser.error("trailing input"));
    }
    Ok(ty)
}

struct TypeParser<'a> {
    expr: &'a str,
    rest: &'a str,
    scope: &'a [GenericParam],
}

impl TypeParser<'_> {
    fn ty(&mut self) -> Result<Ty, ManifestError> {
        self.rest = self.rest.trim_start();
        let end = self
            .rest
            .find(|c: char| matches!(c, '<' | '>' | ',') || c.is_whitespace())
            .unwrap_or(self.rest.len());
        let (name, rest) = self.rest.split_at(end);
        if name.is_empty() {
            return Err(self.error("expected a type name"));
        }
        self.rest = rest.trim_start();

        if !self.eat('<') {
            if let Some(param) = self.scope.iter().find(|p| p.name() == name) {
                return Ok(Ty::param(param.clone()));
            }
            return Ok(Ty::named(name));
        }

        let mut arguments = vec![self.ty()?];
        while self.eat(',') {
            arguments.push(self.ty()?);
        }
        if !self.eat('>') {
            return Err(self.error("expected `,` or `>`"));
        }
        Ok(Ty::generic(name, arguments))
    }

    fn eat(&mut self, c: char) -> bool {
        match self.rest.trim_start().strip_prefix(c) {
            Some(rest) => {
                self.rest = rest.trim_start();
                true
            }
            None => false,
        }
    }

    fn error(&self, reason: &'static str) -> ManifestError {
        ManifestError::TypeSyntax {
            expr: self.expr.to_string(),
            reason,
        }
    }
}
