//! Program fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nesl_backend_core::BackendError;
use nesl_backend_spirv::{CompiledModule, ParsedModule, SpirvCompiler, SpirvOptions};
use nesl_ir::*;

/// The built-in types every fixture depends on.
pub fn core_library() -> Arc<Program> {
    let mut core = Program::new("System");
    for (name, spirv) in [
        ("System.Bool", "OpTypeBool"),
        ("System.Int32", "OpTypeInt 32 1"),
        ("System.UInt32", "OpTypeInt 32 0"),
        ("System.Float32", "OpTypeFloat 32"),
        ("System.Image", "OpTypeImage"),
    ] {
        core.add_type(TypeDecl::builtin(name, spirv)).unwrap();
    }
    core.add_type(
        TypeDecl::builtin("System.Vector4", "OpTypeVector {T} 4")
            .with_generic_parameter(GenericParam::new("T")),
    )
    .unwrap();
    Arc::new(core)
}

pub fn program(types: Vec<TypeDecl>) -> Program {
    let mut program = Program::new("Demo");
    program.add_dependency(core_library());
    for decl in types {
        program.add_type(decl).unwrap();
    }
    program
}

pub fn float32() -> Ty {
    Ty::named("System.Float32")
}

pub fn int32() -> Ty {
    Ty::named("System.Int32")
}

pub fn uint32() -> Ty {
    Ty::named("System.UInt32")
}

pub fn vector4(component: Ty) -> Ty {
    Ty::generic("System.Vector4", vec![component])
}

pub fn static_method(name: &str) -> MethodDecl {
    MethodDecl::new(name).attribute(Attribute::Static)
}

pub fn compile(program: &Program, jobs: usize) -> Result<CompiledModule, BackendError> {
    SpirvCompiler::new(program, SpirvOptions::default()).compile(jobs)
}

pub fn parse(module: &CompiledModule) -> ParsedModule {
    ParsedModule::parse(&module.bytes).unwrap()
}

/// A kernel exercising every operation group, a struct with an instance
/// method, and a helper call.
pub fn showcase() -> Program {
    let particle = TypeDecl::new("Demo.Particle")
        .with_field("position", vector4(float32()))
        .with_field("mass", float32());

    let mut counter = TypeDecl::new("Demo.Counter").with_field("value", uint32());
    counter.add_method(MethodDecl::new("Get").returns(uint32()).body(vec![
        Instruction::def_variable(uint32()),
        Instruction::load_field(1, 0, 0),
        Instruction::return_value(1),
    ]));
    counter.add_method(MethodDecl::new("Bump").parameter(uint32()).body(vec![
        Instruction::def_variable(uint32()),
        Instruction::load_field(2, 0, 0),
        Instruction::add(2, 2, 1),
        Instruction::set_field(0, 0, 2),
    ]));

    let mut shader = TypeDecl::new("Demo.Shader");
    let owner = shader.self_ty();
    let scale = shader.add_method(
        static_method("Scale")
            .returns(float32())
            .parameter(float32())
            .parameter(float32())
            .body(vec![
                Instruction::def_variable(float32()),
                Instruction::multiply(2, 0, 1),
                Instruction::return_value(2),
            ]),
    );
    shader.add_method(
        static_method("Main")
            .attribute(Attribute::Kernel {
                local_size: [64, 1, 1],
            })
            .body(vec![
                Instruction::def_variable(Ty::named("Demo.Particle")),
                Instruction::def_variable(float32()),
                Instruction::def_variable(float32()),
                Instruction::def_variable(uint32()),
                Instruction::def_variable(vector4(float32())),
                Instruction::load_field(1, 0, 1),
                Instruction::load_f32(2, 2.0),
                Instruction::call(MethodRef::new(owner, scale, "Scale"), Some(1), &[1, 2]),
                Instruction::negate(2, 1),
                Instruction::load_u32(3, 2),
                Instruction::load_field(4, 0, 0),
                Instruction::set_element(4, 3, 2),
                Instruction::load_element(1, 4, 3),
                Instruction::set_field(0, 0, 4),
                Instruction::set_field(0, 1, 1),
                Instruction::ret(),
            ]),
    );

    program(vec![particle, counter, shader])
}
