//! Integration tests: compile fixture programs and inspect the emitted module.

mod common;

use std::collections::BTreeSet;

use nesl_backend_core::{Backend, BackendError, BackendOptions, OutputContent};
use nesl_backend_spirv::reader::referenced_ids;
use nesl_backend_spirv::{SpirvBackend, SpirvCompiler, SpirvOptions};
use nesl_ir::*;
use rspirv::binary::Assemble;
use rspirv::dr::{self, Operand};
use spirv::Op;

use common::*;

fn find<'a>(
    mut instrs: impl Iterator<Item = &'a dr::Instruction>,
    op: Op,
) -> &'a dr::Instruction {
    instrs
        .find(|i| i.class.opcode == op)
        .unwrap_or_else(|| panic!("no Op{op:?} in module"))
}

#[test]
fn constant_load_scenario() {
    let mut shader = TypeDecl::new("Demo.Shader");
    shader.add_method(static_method("Main").body(vec![
        Instruction::def_variable(float32()),
        Instruction::load_f32(0, 1.5),
        Instruction::ret(),
    ]));
    let program = program(vec![shader]);

    let module = compile(&program, 1).unwrap();
    let parsed = parse(&module);
    let count = |op| parsed.function_section().filter(|i| i.class.opcode == op).count();

    assert_eq!(count(Op::Variable), 1);
    assert_eq!(count(Op::Store), 1);
    assert_eq!(count(Op::Return), 1);
    for op in [Op::FunctionCall, Op::FAdd, Op::FMul, Op::FNegate, Op::Load] {
        assert_eq!(count(op), 0, "{op:?}");
    }

    let constant = find(parsed.instructions(), Op::Constant);
    assert_eq!(constant.operands, vec![Operand::LiteralBit32(0x3fc0_0000)]);
    // The store writes exactly that constant.
    let store = find(parsed.function_section(), Op::Store);
    assert_eq!(store.operands[1], Operand::IdRef(constant.result_id.unwrap()));
}

#[test]
fn header_and_layout() {
    let program = showcase();
    let module = compile(&program, 1).unwrap();
    let parsed = parse(&module);

    assert_eq!(&module.bytes[..4], &[0x07, 0x23, 0x02, 0x03]);
    assert_eq!(parsed.header.version(), (1, 2));
    assert_eq!(parsed.header.generator, 0x1ec5_712d);
    assert_eq!(parsed.header.bound, module.bound);
    assert_eq!(parsed.header.reserved_word, 0);

    let ops: Vec<Op> = parsed.instructions().map(|i| i.class.opcode).collect();
    assert_eq!(ops[..4], [Op::Capability, Op::MemoryModel, Op::EntryPoint, Op::ExecutionMode]);

    // Re-assembling in canonical section order reproduces the emitted words.
    let words: Vec<u32> = module
        .bytes
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(parsed.module.assemble(), words);
}

fn assert_dense_ids(jobs: usize) {
    let module = compile(&showcase(), jobs).unwrap();
    let parsed = parse(&module);

    let results: Vec<u32> = parsed.instructions().filter_map(|i| i.result_id).collect();
    let unique: BTreeSet<u32> = results.iter().copied().collect();
    assert_eq!(unique.len(), results.len(), "an id was defined twice");
    assert_eq!(unique, (1..module.bound).collect());

    for instr in parsed.instructions() {
        for id in referenced_ids(instr) {
            assert!(id < module.bound, "{instr:?} references {id}");
            assert!(unique.contains(&id), "{instr:?} references undefined {id}");
        }
    }
}

#[test]
fn bound_is_one_past_every_id() {
    assert_dense_ids(1);
}

#[test]
fn parallel_ids_stay_dense() {
    assert_dense_ids(8);
}

#[test]
fn arithmetic_lowers_per_operand_type() {
    const ARITHMETIC: [Op; 16] = [
        Op::SNegate,
        Op::FNegate,
        Op::IAdd,
        Op::FAdd,
        Op::ISub,
        Op::FSub,
        Op::IMul,
        Op::FMul,
        Op::SDiv,
        Op::UDiv,
        Op::FDiv,
        Op::SMod,
        Op::UMod,
        Op::FMod,
        Op::SRem,
        Op::FRem,
    ];
    let float = [Op::FNegate, Op::FAdd, Op::FSub, Op::FMul, Op::FDiv, Op::FMod, Op::FRem];
    let cases = [
        (
            uint32(),
            [Op::SNegate, Op::IAdd, Op::ISub, Op::IMul, Op::UDiv, Op::UMod, Op::UMod],
        ),
        (
            int32(),
            [Op::SNegate, Op::IAdd, Op::ISub, Op::IMul, Op::SDiv, Op::SMod, Op::SRem],
        ),
        (float32(), float),
        (vector4(float32()), float),
    ];

    for (ty, expected) in cases {
        let mut shader = TypeDecl::new("Demo.Shader");
        shader.add_method(static_method("Main").body(vec![
            Instruction::def_variable(ty.clone()),
            Instruction::def_variable(ty.clone()),
            Instruction::def_variable(ty.clone()),
            Instruction::negate(2, 0),
            Instruction::add(2, 0, 1),
            Instruction::subtract(2, 0, 1),
            Instruction::multiply(2, 0, 1),
            Instruction::divide(2, 0, 1),
            Instruction::modulo(2, 0, 1),
            Instruction::remainder(2, 0, 1),
            Instruction::ret(),
        ]));
        let module = compile(&program(vec![shader]), 1).unwrap();
        let parsed = parse(&module);

        let lowered: Vec<&dr::Instruction> = parsed
            .function_section()
            .filter(|i| ARITHMETIC.contains(&i.class.opcode))
            .collect();
        let ops: Vec<Op> = lowered.iter().map(|i| i.class.opcode).collect();
        assert_eq!(ops, expected, "{ty}");

        // Every result has the operand type itself, vectors included.
        let variable = find(parsed.function_section(), Op::Variable);
        let pointer = parsed
            .instructions()
            .find(|i| i.result_id == variable.result_type)
            .unwrap();
        let Operand::IdRef(value_type) = pointer.operands[1] else {
            panic!("{pointer:?} is not a pointer type");
        };
        assert!(lowered.iter().all(|i| i.result_type == Some(value_type)), "{ty}");
    }
}

#[test]
fn every_operation_group_is_lowered() {
    let module = compile(&showcase(), 1).unwrap();
    let parsed = parse(&module);

    assert_eq!(module.functions, 4);
    assert_eq!(parsed.module.functions.len(), 4);
    assert_eq!(parsed.count(Op::FunctionEnd), 4);
    assert_eq!(parsed.count(Op::FMul), 1);
    assert_eq!(parsed.count(Op::FNegate), 1);
    assert_eq!(parsed.count(Op::IAdd), 1);
    assert_eq!(parsed.count(Op::FunctionCall), 1);
    assert_eq!(parsed.count(Op::AccessChain), 9);
    assert_eq!(parsed.count(Op::ReturnValue), 2);
    // `Main` returns explicitly, `Bump` implicitly.
    assert_eq!(parsed.count(Op::Return), 2);
    assert_eq!(parsed.count(Op::TypeStruct), 2);
    assert_eq!(parsed.count(Op::TypeVector), 1);
    // f32 and u32 are each declared once despite many uses.
    assert_eq!(parsed.count(Op::TypeFloat), 1);
    assert_eq!(parsed.count(Op::TypeInt), 1);
}

#[test]
fn kernel_becomes_entry_point() {
    let module = compile(&showcase(), 1).unwrap();
    let parsed = parse(&module);

    let entry = &parsed.module.entry_points[0];
    assert_eq!(
        entry.operands[0],
        Operand::ExecutionModel(spirv::ExecutionModel::GLCompute)
    );
    assert_eq!(
        entry.operands[2],
        Operand::LiteralString("Demo.Shader::Main".to_string())
    );
    assert_eq!(
        parsed.module.execution_modes[0].operands,
        vec![
            entry.operands[1].clone(),
            Operand::ExecutionMode(spirv::ExecutionMode::LocalSize),
            Operand::LiteralBit32(64),
            Operand::LiteralBit32(1),
            Operand::LiteralBit32(1),
        ]
    );
    assert!(nesl_backend_spirv::disassemble(&module.bytes)
        .unwrap()
        .contains("\"Demo.Shader::Main\""));
}

#[test]
fn oversized_entry_point_name_is_unsupported() {
    let mut shader = TypeDecl::new("Demo.Shader");
    let name = "K".repeat(4 * usize::from(u16::MAX));
    shader.add_method(
        static_method(&name)
            .attribute(Attribute::Kernel { local_size: [1, 1, 1] })
            .body(vec![Instruction::ret()]),
    );
    let err = compile(&program(vec![shader]), 1).unwrap_err();
    assert!(matches!(err, BackendError::Unsupported(ref m) if m.contains("OpEntryPoint")), "{err}");
}

#[test]
fn callee_is_constructed_before_caller() {
    let module = compile(&showcase(), 1).unwrap();
    let parsed = parse(&module);
    let functions: Vec<u32> = parsed
        .module
        .functions
        .iter()
        .filter_map(|f| f.def.as_ref()?.result_id)
        .collect();
    let call = find(parsed.function_section(), Op::FunctionCall);
    let Operand::IdRef(callee) = call.operands[0] else {
        panic!("{call:?} has no callee");
    };
    let Operand::IdRef(main) = parsed.module.entry_points[0].operands[1] else {
        panic!("entry point names no function");
    };
    let position = |id| functions.iter().position(|&f| f == id).unwrap();
    assert!(position(callee) < position(main));
}

#[test]
fn compiles_are_deterministic() {
    let first = compile(&showcase(), 1).unwrap();
    let second = compile(&showcase(), 1).unwrap();
    assert_eq!(first.bytes, second.bytes);

    // Parallel workers may assign ids in another order, but never more of them.
    for jobs in [2, 4, 8] {
        let parallel = compile(&showcase(), jobs).unwrap();
        assert_eq!(parallel.bound, first.bound);
        assert_eq!(parallel.bytes.len(), first.bytes.len());
        assert_eq!(parallel.functions, first.functions);
    }
}

#[test]
fn generic_methods_compile_through_their_instances() {
    let t = GenericParam::new("T");
    let mut util = TypeDecl::new("Demo.Util");
    let identity = util.add_method(
        static_method("Identity")
            .generic_parameter(t.clone())
            .returns(Ty::param(t.clone()))
            .parameter(Ty::param(t.clone()))
            .body(vec![
                Instruction::def_variable(Ty::param(t)),
                Instruction::load(1, 0),
                Instruction::return_value(1),
            ]),
    );
    let owner = util.self_ty();
    let target = MethodRef::new(owner, identity, "Identity").with_type_arguments(vec![float32()]);
    util.add_method(static_method("Main").body(vec![
        Instruction::def_variable(float32()),
        Instruction::load_f32(0, 3.0),
        Instruction::call(target.clone(), Some(0), &[0]),
        Instruction::call(target, Some(0), &[0]),
    ]));
    let program = program(vec![util]);

    let module = compile(&program, 1).unwrap();
    assert_eq!(module.skipped, vec!["Demo.Util::Identity".to_string()]);
    assert_eq!(module.functions, 2);
    assert_eq!(parse(&module).count(Op::FunctionCall), 2);
}

#[test]
fn partial_instance_is_still_generic() {
    let t = GenericParam::new("T");
    let mut util = TypeDecl::new("Demo.Util");
    util.add_method(
        static_method("Identity")
            .generic_parameter(t.clone())
            .returns(Ty::param(t.clone()))
            .parameter(Ty::param(t))
            .body(vec![Instruction::return_value(0)]),
    );
    let program = program(vec![util]);
    let generic = &program.types()[0].methods()[0];
    let partial = generic
        .make_generic(&[Ty::param(GenericParam::new("U"))])
        .unwrap();
    assert!(partial.is_generic());

    let compiler = SpirvCompiler::new(&program, SpirvOptions::default());
    let err = compiler.compile_method(&partial).unwrap_err();
    assert!(matches!(err, BackendError::StillGeneric(_)), "{err}");

    let full = generic.make_generic(&[float32()]).unwrap();
    let function = compiler.compile_method(&full).unwrap();
    assert_eq!(function.parameters().len(), 1);
}

#[test]
fn call_to_partial_instance_fails() {
    let t = GenericParam::new("T");
    let u = GenericParam::new("U");
    let mut util = TypeDecl::new("Demo.Util");
    let owner = util.self_ty();
    util.add_method(
        static_method("Identity")
            .generic_parameter(t.clone())
            .returns(Ty::param(t.clone()))
            .parameter(Ty::param(t)),
    );
    util.add_method(static_method("Main").body(vec![Instruction::call(
        MethodRef::new(owner, 0, "Identity").with_type_arguments(vec![Ty::param(u)]),
        None,
        &[],
    )]));
    let program = program(vec![util]);

    let err = compile(&program, 1).unwrap_err();
    assert!(matches!(err, BackendError::StillGeneric(_)), "{err}");
}

#[test]
fn mismatched_operands_are_rejected() {
    let mut shader = TypeDecl::new("Demo.Shader");
    shader.add_method(static_method("Main").body(vec![
        Instruction::def_variable(float32()),
        Instruction::def_variable(int32()),
        Instruction::def_variable(float32()),
        Instruction::add(2, 0, 1),
        Instruction::ret(),
    ]));
    let program = program(vec![shader]);

    let err = compile(&program, 1).unwrap_err();
    match err {
        BackendError::TypeMismatch {
            method,
            index,
            expected,
            found,
        } => {
            assert_eq!(method, "Demo.Shader::Main");
            assert_eq!(index, 3);
            assert_eq!(expected, "System.Float32");
            assert_eq!(found, "System.Int32");
        }
        other => panic!("expected type mismatch, got {other}"),
    }
}

#[test]
fn immediate_loads_check_their_destination() {
    let mut shader = TypeDecl::new("Demo.Shader");
    shader.add_method(static_method("Main").body(vec![
        Instruction::def_variable(int32()),
        Instruction::load_u32(0, 1),
    ]));
    let program = program(vec![shader]);
    let err = compile(&program, 1).unwrap_err();
    assert!(matches!(err, BackendError::TypeMismatch { index: 1, .. }), "{err}");
}

#[test]
fn unknown_builtin_is_unsupported() {
    let mut shader = TypeDecl::new("Demo.Shader");
    shader.add_method(static_method("Main").body(vec![
        Instruction::def_variable(Ty::named("System.Image")),
        Instruction::ret(),
    ]));
    let program = program(vec![shader]);
    let err = compile(&program, 1).unwrap_err();
    assert!(matches!(err, BackendError::Unsupported(ref what) if what.contains("OpTypeImage")), "{err}");
}

#[test]
fn malformed_bodies_are_internal_errors() {
    let bodies = [
        // Use before definition.
        vec![Instruction::load(0, 1), Instruction::def_variable(float32())],
        // Instruction after return.
        vec![Instruction::ret(), Instruction::def_variable(float32())],
    ];
    for body in bodies {
        let mut shader = TypeDecl::new("Demo.Shader");
        shader.add_method(static_method("Main").body(body));
        let program = program(vec![shader]);
        let err = compile(&program, 1).unwrap_err();
        assert!(matches!(err, BackendError::Internal(_)), "{err}");
    }

    let mut shader = TypeDecl::new("Demo.Shader");
    shader.add_method(
        static_method("Value")
            .returns(float32())
            .body(vec![Instruction::def_variable(float32())]),
    );
    let err = compile(&program(vec![shader]), 1).unwrap_err();
    assert!(matches!(err, BackendError::Internal(ref m) if m.contains("missing return")), "{err}");
}

#[test]
fn recursion_is_rejected_before_codegen() {
    let mut shader = TypeDecl::new("Demo.Shader");
    let owner = shader.self_ty();
    shader.add_method(static_method("Loop").body(vec![Instruction::call(
        MethodRef::new(owner, 0, "Loop"),
        None,
        &[],
    )]));
    let program = program(vec![shader]);
    let err = compile(&program, 4).unwrap_err();
    assert!(matches!(err, BackendError::Ir(IrError::RecursiveCall(_))), "{err}");
}

#[test]
fn parallel_failure_aborts_the_module() {
    let mut shader = TypeDecl::new("Demo.Shader");
    for i in 0..8 {
        shader.add_method(static_method(&format!("Good{i}")).body(vec![
            Instruction::def_variable(float32()),
            Instruction::load_f32(0, i as f32),
        ]));
    }
    shader.add_method(static_method("Bad").body(vec![
        Instruction::def_variable(float32()),
        Instruction::def_variable(uint32()),
        Instruction::load(0, 1),
    ]));
    let program = program(vec![shader]);

    let err = compile(&program, 4).unwrap_err();
    assert!(matches!(err, BackendError::TypeMismatch { ref method, .. } if method == "Demo.Shader::Bad"), "{err}");
}

#[test]
fn backend_reports_skipped_methods() {
    let t = GenericParam::new("T");
    let mut util = TypeDecl::new("Demo.Util");
    util.add_method(static_method("Identity").generic_parameter(t));
    util.add_method(static_method("Main"));
    let program = program(vec![util]);

    let backend = SpirvBackend::default();
    assert!(backend.targets().contains(&"spirv"));
    let output = backend
        .compile(&program, &BackendOptions { jobs: 2 })
        .unwrap();
    assert_eq!(output.files[0].name, "Demo.spv");
    assert!(matches!(output.files[0].content, OutputContent::Binary(ref b) if b.len() % 4 == 0));
    assert!(output.diagnostics[0].message.contains("Demo.Util::Identity"));
}
