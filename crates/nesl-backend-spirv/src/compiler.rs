//! Module assembly and the parallel compilation pass.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use nesl_backend_core::BackendError;
use nesl_ir::{Method, MethodInstance, OnceMap, Program, Ty, validate_program};
use spirv::{AddressingModel, Capability, ExecutionMode, ExecutionModel, MemoryModel, Op};

use crate::builtin::TypeSection;
use crate::function::SpirvFunction;
use crate::generator::{SpirvGenerator, string_words};
use crate::id::{IdAllocator, SpirvId};
use crate::types::{Shape, SpirvType};

/// Header constants written into every module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpirvOptions {
    /// SPIR-V version word (`0x00MMmm00`).
    pub version: u32,
    /// Generator magic number identifying the producing tool.
    pub generator: u32,
}

impl Default for SpirvOptions {
    fn default() -> Self {
        Self {
            version: 0x0001_0200,
            generator: 0x1ec5_712d,
        }
    }
}

/// A finished module.
#[derive(Clone, Debug)]
pub struct CompiledModule {
    pub bytes: Vec<u8>,
    pub bound: u32,
    /// Number of function bodies in the module.
    pub functions: usize,
    /// Declared methods left out because they are still generic.
    pub skipped: Vec<String>,
}

/// Functions are cached per method object; instantiation caches guarantee
/// one object per concrete method.
#[derive(Clone)]
struct MethodKey(Arc<Method>);

impl PartialEq for MethodKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for MethodKey {}

impl Hash for MethodKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

#[derive(Debug, Default)]
struct EntryPoints {
    entries: SpirvGenerator,
    modes: SpirvGenerator,
}

/// One compilation pass over a program.
///
/// All tables live for the pass only; compiling again means building a new
/// compiler.
pub struct SpirvCompiler<'p> {
    program: &'p Program,
    options: SpirvOptions,
    ids: IdAllocator,
    types: TypeSection,
    entry_points: Mutex<EntryPoints>,
    lowered: OnceMap<Ty, SpirvType>,
    functions: OnceMap<MethodKey, Arc<SpirvFunction>>,
    order: Mutex<Vec<Arc<SpirvFunction>>>,
}

impl<'p> SpirvCompiler<'p> {
    pub fn new(program: &'p Program, options: SpirvOptions) -> Self {
        Self {
            program,
            options,
            ids: IdAllocator::new(),
            types: TypeSection::new(),
            entry_points: Mutex::new(EntryPoints::default()),
            lowered: OnceMap::new(),
            functions: OnceMap::new(),
            order: Mutex::new(Vec::new()),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn types(&self) -> &TypeSection {
        &self.types
    }

    /// Lowers a type reference; `None` is void.
    pub fn spirv_type(&self, ty: Option<&Ty>) -> Result<SpirvType, BackendError> {
        let Some(ty) = ty else {
            return Ok(self.types.void(&self.ids));
        };
        if ty.is_generic() {
            return Err(BackendError::StillGeneric(ty.to_string()));
        }
        self.lowered.get_or_try_init(ty, || self.lower_type(ty))
    }

    fn lower_type(&self, ty: &Ty) -> Result<SpirvType, BackendError> {
        let instance = self.program.construct(ty)?;
        let lowered = match instance.platform_representation() {
            Some(repr) => {
                let name = repr.spirv.as_deref().ok_or_else(|| {
                    BackendError::Unsupported(format!("type {ty} has no SPIR-V representation"))
                })?;
                self.types.by_name(&self.ids, name, |param| {
                    let argument = instance.substitution().get(param).ok_or_else(|| {
                        BackendError::Unsupported(format!(
                            "placeholder {{{param}}} in the representation of {ty}"
                        ))
                    })?;
                    self.spirv_type(Some(argument))
                })?
            }
            None => {
                let mut fields = Vec::with_capacity(instance.fields().len());
                for field in instance.fields() {
                    let lowered = self.spirv_type(Some(&field.ty))?;
                    if lowered.is_void() {
                        return Err(BackendError::Unsupported(format!(
                            "void field {} in {ty}",
                            field.name
                        )));
                    }
                    fields.push(lowered);
                }
                let members: Vec<u32> = fields.iter().map(|f| f.id.raw()).collect();
                SpirvType {
                    id: self.types.declare(&self.ids, Op::TypeStruct, &members),
                    name: "".into(),
                    shape: Shape::Struct {
                        fields: fields.into(),
                    },
                }
            }
        };
        log::debug!("lowered type {ty} as {}", lowered.id);
        Ok(SpirvType {
            name: ty.to_string().into(),
            ..lowered
        })
    }

    /// Returns the compiled function for a method instance, compiling it on
    /// first use.
    pub fn compile_method(
        &self,
        method: &MethodInstance,
    ) -> Result<Arc<SpirvFunction>, BackendError> {
        match method {
            MethodInstance::Concrete(concrete) if !method.is_generic() => self.function(concrete),
            other => Err(BackendError::StillGeneric(other.full_name())),
        }
    }

    pub(crate) fn function(&self, method: &Arc<Method>) -> Result<Arc<SpirvFunction>, BackendError> {
        self.functions
            .get_or_try_init(&MethodKey(Arc::clone(method)), || {
                let function = Arc::new(SpirvFunction::build(self, method)?);
                self.order
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Arc::clone(&function));
                Ok(function)
            })
    }

    pub(crate) fn declare_entry_point(&self, name: &str, function: SpirvId, local_size: [u32; 3]) {
        let mut entry_points = self
            .entry_points
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut operands = vec![ExecutionModel::GLCompute as u32, function.raw()];
        operands.extend(string_words(name));
        entry_points.entries.emit(Op::EntryPoint, &operands);

        let [x, y, z] = local_size;
        entry_points.modes.emit(
            Op::ExecutionMode,
            &[function.raw(), ExecutionMode::LocalSize as u32, x, y, z],
        );
    }

    /// Compiles every concrete method the program declares and assembles
    /// the module.
    ///
    /// `jobs` worker threads share the pass; any failure aborts the whole
    /// module.
    pub fn compile(self, jobs: usize) -> Result<CompiledModule, BackendError> {
        validate_program(self.program)?;

        let mut header = SpirvGenerator::new();
        header.emit(Op::Capability, &[Capability::Shader as u32]);
        header.emit(
            Op::MemoryModel,
            &[AddressingModel::Logical as u32, MemoryModel::GLSL450 as u32],
        );

        let mut methods = Vec::new();
        let mut skipped = Vec::new();
        for method in self.program.methods() {
            if method.is_generic() || method.owner().is_generic() {
                log::warn!("skipping {}: method is still generic", method.full_name());
                skipped.push(method.full_name());
            } else {
                methods.push(Arc::clone(method));
            }
        }

        self.run(&methods, jobs)?;
        self.assemble(header, skipped)
    }

    fn run(&self, methods: &[Arc<Method>], jobs: usize) -> Result<(), BackendError> {
        if jobs <= 1 || methods.len() <= 1 {
            for method in methods {
                self.function(method)?;
            }
            return Ok(());
        }

        let next = AtomicUsize::new(0);
        let failure: Mutex<Option<(usize, BackendError)>> = Mutex::new(None);
        thread::scope(|s| {
            for _ in 0..jobs.min(methods.len()) {
                s.spawn(|| {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(method) = methods.get(i) else {
                            break;
                        };
                        if let Err(err) = self.function(method) {
                            let mut failure = failure.lock().unwrap_or_else(PoisonError::into_inner);
                            // Report the failure of the first method in declaration order.
                            if failure.as_ref().is_none_or(|(first, _)| i < *first) {
                                *failure = Some((i, err));
                            }
                            next.store(methods.len(), Ordering::Relaxed);
                            break;
                        }
                    }
                });
            }
        });

        match failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn assemble(
        self,
        header: SpirvGenerator,
        skipped: Vec<String>,
    ) -> Result<CompiledModule, BackendError> {
        let mut module = SpirvGenerator::new();
        module.word(spirv::MAGIC_NUMBER);
        module.word(self.options.version);
        module.word(self.options.generator);
        module.word(0); // bound
        module.word(0);

        module.extend(&header);
        let entry_points = self
            .entry_points
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        module.extend(&entry_points.entries);
        module.extend(&entry_points.modes);
        module.extend(&self.types.snapshot());

        let functions = self.order.into_inner().unwrap_or_else(PoisonError::into_inner);
        for function in &functions {
            module.extend(function.body());
        }

        module.check()?;

        let mut bytes = module.to_bytes();
        let bound = self.ids.bound();
        bytes[12..16].copy_from_slice(&bound.to_be_bytes());

        log::info!(
            "{}: {} function(s), bound {bound}, {} bytes",
            self.program.name(),
            functions.len(),
            bytes.len()
        );
        Ok(CompiledModule {
            bytes,
            bound,
            functions: functions.len(),
            skipped,
        })
    }
}
