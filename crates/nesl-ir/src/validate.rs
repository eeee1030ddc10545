//! Whole-program checks run before code generation.
//!
//! Recursive call chains and structs that contain themselves by value have
//! no encoding in the target formats, and would make construct-once cells
//! on different worker threads wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::IrError;
use crate::instr::{OpCode, Operand};
use crate::method::{Method, MethodInstance};
use crate::program::Program;
use crate::types::Ty;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Checks the call graph and struct layouts reachable from the program's
/// concrete methods and types.
pub fn validate_program(program: &Program) -> Result<(), IrError> {
    let mut calls = CallGraph {
        program,
        state: HashMap::new(),
        stack: Vec::new(),
        types: Vec::new(),
    };
    for method in program.methods() {
        if method.is_generic() || method.owner().is_generic() {
            continue;
        }
        calls.visit(method)?;
    }

    let mut layouts = Layouts {
        program,
        state: HashMap::new(),
        stack: Vec::new(),
    };
    for decl in program.types() {
        if !decl.is_generic() {
            layouts.visit(&decl.self_ty())?;
        }
    }
    for ty in &calls.types {
        layouts.visit(ty)?;
    }
    Ok(())
}

struct CallGraph<'a> {
    program: &'a Program,
    state: HashMap<*const Method, Visit>,
    /// Methods being visited: instance identity, definition identity, name.
    stack: Vec<(*const Method, *const Method, String)>,
    /// Types mentioned by visited methods, checked for layout cycles later.
    types: Vec<Ty>,
}

impl CallGraph<'_> {
    fn visit(&mut self, method: &Arc<Method>) -> Result<(), IrError> {
        let key = Arc::as_ptr(method);
        if self.state.get(&key) == Some(&Visit::Done) {
            return Ok(());
        }
        // Bodies have no branches, so reaching a definition again from one of
        // its own instances recurses forever, whatever the type arguments.
        // Matching on definitions also stops chains like `F<T>` -> `F<Box<T>>`
        // that never revisit an instance.
        let definition = method.definition_key();
        if let Some(start) = self
            .stack
            .iter()
            .position(|&(k, d, _)| k == key || d == definition)
        {
            let mut chain: Vec<String> =
                self.stack[start..].iter().map(|(_, _, n)| n.clone()).collect();
            chain.push(method.full_name());
            return Err(IrError::RecursiveCall(chain));
        }

        self.state.insert(key, Visit::InProgress);
        self.stack.push((key, definition, method.full_name()));
        self.types.extend(method.parameter_types().iter().cloned());
        self.types.extend(method.return_type().cloned());

        for instr in method.instructions() {
            match (instr.opcode(), instr.operands().first()) {
                (OpCode::Call, Some(Operand::Method(callee))) => {
                    if let MethodInstance::Concrete(callee) = self.program.resolve_method(callee)? {
                        if !callee.is_generic() && !callee.owner().is_generic() {
                            self.visit(&callee)?;
                        }
                    }
                }
                (OpCode::DefVariable, Some(Operand::Type(ty))) => self.types.push(ty.clone()),
                _ => {}
            }
        }

        self.stack.pop();
        self.state.insert(key, Visit::Done);
        Ok(())
    }
}

struct Layouts<'a> {
    program: &'a Program,
    state: HashMap<Ty, Visit>,
    stack: Vec<Ty>,
}

impl Layouts<'_> {
    fn visit(&mut self, ty: &Ty) -> Result<(), IrError> {
        if ty.is_generic() {
            return Ok(());
        }
        match self.state.get(ty) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let start = self.stack.iter().position(|t| t == ty).unwrap_or(0);
                let mut chain: Vec<String> =
                    self.stack[start..].iter().map(ToString::to_string).collect();
                chain.push(ty.to_string());
                return Err(IrError::RecursiveLayout(chain));
            }
            None => {}
        }

        self.state.insert(ty.clone(), Visit::InProgress);
        self.stack.push(ty.clone());

        let instance = self.program.construct(ty)?;
        let mut members: Vec<Ty> = instance.fields().iter().map(|f| f.ty.clone()).collect();
        if instance.platform_representation().is_some() {
            members.extend(ty.arguments().iter().cloned());
        }
        for member in &members {
            self.visit(member)?;
        }

        self.stack.pop();
        self.state.insert(ty.clone(), Visit::Done);
        Ok(())
    }
}
