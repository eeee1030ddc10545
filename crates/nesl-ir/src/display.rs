//! Display implementations and text dump for debugging.

use std::fmt;

use crate::Program;
use crate::instr::{Instruction, MethodRef, OpCode, Operand};
use crate::method::Method;
use crate::types::{Attribute, Constraint, GenericParam, Ty, TypeDecl};

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, arguments } => {
                write!(f, "{name}")?;
                if !arguments.is_empty() {
                    write!(f, "<")?;
                    write_list(f, arguments)?;
                    write!(f, ">")?;
                }
                Ok(())
            }
            Self::Param(param) => write!(f, "{}", param.name()),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneOf(types) => {
                write!(f, "one of {{")?;
                write_list(f, types)?;
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for GenericParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        for constraint in self.constraints() {
            write!(f, ": {constraint}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "@static"),
            Self::Kernel {
                local_size: [x, y, z],
            } => write!(f, "@kernel({x}, {y}, {z})"),
            Self::PlatformRepresentation(repr) => match &repr.spirv {
                Some(spirv) => write!(f, "@repr(spirv = \"{spirv}\")"),
                None => write!(f, "@repr"),
            },
            Self::Custom { name, types } => {
                write!(f, "@{name}")?;
                if !types.is_empty() {
                    write!(f, "(")?;
                    write_list(f, types)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}#{}", self.owner, self.name, self.index)?;
        if !self.type_arguments.is_empty() {
            write!(f, "<")?;
            write_list(f, &self.type_arguments)?;
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(v) => write!(f, "%{v}"),
            Self::Type(ty) => write!(f, "{ty}"),
            Self::Method(m) => write!(f, "{m}"),
            Self::UInt32(v) => write!(f, "{v}u"),
            Self::Float32(v) => write!(f, "{v}f"),
            Self::Field(i) => write!(f, ".{i}"),
            Self::Void => write!(f, "_"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode())?;
        if !self.operands().is_empty() {
            write!(f, " ")?;
            write_list(f, self.operands())?;
        }
        Ok(())
    }
}

/// Produces a human-readable text dump of a [`Program`] for debugging.
pub fn dump_program(program: &Program) -> String {
    let mut out = format!("Program {}:\n", program.name());

    if !program.dependencies().is_empty() {
        let names: Vec<_> = program.dependencies().iter().map(|d| d.name()).collect();
        out.push_str(&format!("  depends on {}\n", names.join(", ")));
    }

    for decl in program.types() {
        dump_type(&mut out, decl);
    }
    out
}

fn dump_type(out: &mut String, decl: &TypeDecl) {
    out.push('\n');
    for attribute in decl.attributes() {
        out.push_str(&format!("  {attribute}\n"));
    }
    let params = if decl.is_generic() {
        let params: Vec<_> = decl
            .generic_parameters()
            .iter()
            .map(ToString::to_string)
            .collect();
        format!("<{}>", params.join(", "))
    } else {
        String::new()
    };
    out.push_str(&format!("  type {}{params} {{\n", decl.full_name()));

    for (i, field) in decl.fields().iter().enumerate() {
        out.push_str(&format!("    field .{i} {}: {}\n", field.name, field.ty));
    }
    for (i, method) in decl.methods().iter().enumerate() {
        dump_method(out, i, method);
    }
    out.push_str("  }\n");
}

fn dump_method(out: &mut String, index: usize, method: &Method) {
    for attribute in method.attributes() {
        out.push_str(&format!("    {attribute}\n"));
    }
    let generics = if method.is_generic() {
        let params: Vec<_> = method
            .generic_parameters()
            .iter()
            .map(ToString::to_string)
            .collect();
        format!("<{}>", params.join(", "))
    } else {
        String::new()
    };
    let params: Vec<_> = method
        .parameter_types()
        .iter()
        .map(ToString::to_string)
        .collect();
    let ret = match method.return_type() {
        Some(ty) => format!(" -> {ty}"),
        None => String::new(),
    };
    out.push_str(&format!(
        "    fn {}{generics}({})  [#{index}]{ret} {{\n",
        method.name(),
        params.join(", ")
    ));
    for instr in method.instructions() {
        out.push_str(&format!("      {instr}\n"));
    }
    out.push_str("    }\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDecl;

    #[test]
    fn display_ty() {
        let t = GenericParam::new("T");
        let ty = Ty::generic(
            "System.Vector4",
            vec![Ty::named("System.Float32"), Ty::param(t)],
        );
        assert_eq!(ty.to_string(), "System.Vector4<System.Float32, T>");
    }

    #[test]
    fn display_constraint() {
        let c = Constraint::OneOf(vec![Ty::named("System.Float32"), Ty::named("System.Int32")]);
        assert_eq!(c.to_string(), "one of {System.Float32, System.Int32}");
        let p = GenericParam::new("T").with_constraint(c);
        assert_eq!(p.to_string(), "T: one of {System.Float32, System.Int32}");
    }

    #[test]
    fn display_instruction() {
        assert_eq!(Instruction::add(2, 0, 1).to_string(), "add %2, %0, %1");
        assert_eq!(Instruction::load_f32(0, 1.5).to_string(), "load.f32 %0, 1.5f");
        assert_eq!(Instruction::load_field(1, 0, 3).to_string(), "load.field %1, %0, .3");
        assert_eq!(Instruction::ret().to_string(), "ret");

        let callee = MethodRef::new(Ty::named("Demo.Math"), 0, "Max")
            .with_type_arguments(vec![Ty::named("System.Float32")]);
        assert_eq!(
            Instruction::call(callee, None, &[4]).to_string(),
            "call Demo.Math::Max#0<System.Float32>, _, %4"
        );
    }

    #[test]
    fn display_attribute() {
        let kernel = Attribute::Kernel {
            local_size: [64, 1, 1],
        };
        assert_eq!(kernel.to_string(), "@kernel(64, 1, 1)");
    }

    #[test]
    fn dump_contains_methods() {
        let mut decl = TypeDecl::new("Demo.Shader");
        decl.add_method(
            MethodDecl::new("Main")
                .attribute(Attribute::Static)
                .body(vec![Instruction::ret()]),
        );
        let mut program = Program::new("Demo");
        program.add_type(decl).unwrap();

        let dump = dump_program(&program);
        assert!(dump.starts_with("Program Demo:"));
        assert!(dump.contains("type Demo.Shader {"));
        assert!(dump.contains("@static"));
        assert!(dump.contains("fn Main()  [#0] {"));
        assert!(dump.contains("      ret\n"));
    }
}
