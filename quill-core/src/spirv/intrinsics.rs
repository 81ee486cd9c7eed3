//! Built-in functions, resolved by name when a call targets a function the
//! program declares but never defines.

use super::expr::{number_kind, ByNumberKind};
use super::SpirvCodeGenerator;
use crate::error::Result;
use quill_ir::{Dim, Expression, FuncId, ScalarKind, Type};
use rspirv::dr::Operand;
use rspirv::spirv::{GLOp, ImageOperands, Op, Word};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialIntrinsic {
    /// `Atan` or `Atan2` depending on the argument count
    Atan,
    Texture,
    SubpassLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicImpl {
    /// An instruction of the `GLSL.std.450` extended set
    GlslExt(ByNumberKind<GLOp>),
    /// A core SPIR-V instruction
    SpirvOp(ByNumberKind<Op>),
    Special(SpecialIntrinsic),
}

/// Intrinsics whose scalar arguments are broadcast to the vector result.
const COMPONENT_WISE: &[&str] = &["min", "max", "clamp", "mix", "step", "smoothstep", "mod"];

#[derive(Debug)]
pub struct IntrinsicRegistry {
    intrinsics: HashMap<&'static str, IntrinsicImpl>,
}

impl Default for IntrinsicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrinsicRegistry {
    pub fn new() -> Self {
        use IntrinsicImpl::{GlslExt, Special, SpirvOp};

        let mut intrinsics = HashMap::new();
        let mut glsl = |name: &'static str, ops: ByNumberKind<GLOp>| {
            intrinsics.insert(name, GlslExt(ops));
        };
        let all = ByNumberKind::all;
        glsl("round", all(GLOp::Round));
        glsl("roundEven", all(GLOp::RoundEven));
        glsl("trunc", all(GLOp::Trunc));
        glsl("abs", ByNumberKind::numeric(GLOp::FAbs, GLOp::SAbs, GLOp::SAbs));
        glsl("sign", ByNumberKind::numeric(GLOp::FSign, GLOp::SSign, GLOp::SSign));
        glsl("floor", all(GLOp::Floor));
        glsl("ceil", all(GLOp::Ceil));
        glsl("fract", all(GLOp::Fract));
        glsl("radians", all(GLOp::Radians));
        glsl("degrees", all(GLOp::Degrees));
        glsl("sin", all(GLOp::Sin));
        glsl("cos", all(GLOp::Cos));
        glsl("tan", all(GLOp::Tan));
        glsl("asin", all(GLOp::Asin));
        glsl("acos", all(GLOp::Acos));
        glsl("sinh", all(GLOp::Sinh));
        glsl("cosh", all(GLOp::Cosh));
        glsl("tanh", all(GLOp::Tanh));
        glsl("asinh", all(GLOp::Asinh));
        glsl("acosh", all(GLOp::Acosh));
        glsl("atanh", all(GLOp::Atanh));
        glsl("pow", all(GLOp::Pow));
        glsl("exp", all(GLOp::Exp));
        glsl("log", all(GLOp::Log));
        glsl("exp2", all(GLOp::Exp2));
        glsl("log2", all(GLOp::Log2));
        glsl("sqrt", all(GLOp::Sqrt));
        glsl("inversesqrt", all(GLOp::InverseSqrt));
        glsl("determinant", all(GLOp::Determinant));
        glsl("matrixInverse", all(GLOp::MatrixInverse));
        glsl("min", ByNumberKind::numeric(GLOp::FMin, GLOp::SMin, GLOp::UMin));
        glsl("max", ByNumberKind::numeric(GLOp::FMax, GLOp::SMax, GLOp::UMax));
        glsl("clamp", ByNumberKind::numeric(GLOp::FClamp, GLOp::SClamp, GLOp::UClamp));
        glsl("mix", all(GLOp::FMix));
        glsl("step", all(GLOp::Step));
        glsl("smoothstep", all(GLOp::SmoothStep));
        glsl("fma", all(GLOp::Fma));
        glsl("frexp", all(GLOp::Frexp));
        glsl("ldexp", all(GLOp::Ldexp));
        glsl("packSnorm4x8", all(GLOp::PackSnorm4x8));
        glsl("packUnorm4x8", all(GLOp::PackUnorm4x8));
        glsl("packSnorm2x16", all(GLOp::PackSnorm2x16));
        glsl("packUnorm2x16", all(GLOp::PackUnorm2x16));
        glsl("packHalf2x16", all(GLOp::PackHalf2x16));
        glsl("packDouble2x32", all(GLOp::PackDouble2x32));
        glsl("unpackSnorm4x8", all(GLOp::UnpackSnorm4x8));
        glsl("unpackUnorm4x8", all(GLOp::UnpackUnorm4x8));
        glsl("unpackSnorm2x16", all(GLOp::UnpackSnorm2x16));
        glsl("unpackUnorm2x16", all(GLOp::UnpackUnorm2x16));
        glsl("unpackHalf2x16", all(GLOp::UnpackHalf2x16));
        glsl("unpackDouble2x32", all(GLOp::UnpackDouble2x32));
        glsl("length", all(GLOp::Length));
        glsl("distance", all(GLOp::Distance));
        glsl("cross", all(GLOp::Cross));
        glsl("normalize", all(GLOp::Normalize));
        glsl("faceForward", all(GLOp::FaceForward));
        glsl("reflect", all(GLOp::Reflect));
        glsl("refract", all(GLOp::Refract));
        glsl("findLSB", all(GLOp::FindILsb));
        glsl("findMSB", ByNumberKind::numeric(GLOp::FindSMsb, GLOp::FindSMsb, GLOp::FindUMsb));

        let mut spirv = |name: &'static str, ops: ByNumberKind<Op>| {
            intrinsics.insert(name, SpirvOp(ops));
        };
        spirv("mod", ByNumberKind::numeric(Op::FMod, Op::SMod, Op::UMod));
        spirv("dot", ByNumberKind::float_only(Op::Dot));
        spirv("dFdx", ByNumberKind::float_only(Op::DPdx));
        spirv("dFdy", ByNumberKind::float_only(Op::DPdy));
        spirv("any", ByNumberKind::bool_only(Op::Any));
        spirv("all", ByNumberKind::bool_only(Op::All));
        spirv(
            "equal",
            ByNumberKind::new(
                Some(Op::FOrdEqual),
                Some(Op::IEqual),
                Some(Op::IEqual),
                Some(Op::LogicalEqual),
            ),
        );
        spirv(
            "notEqual",
            ByNumberKind::new(
                Some(Op::FOrdNotEqual),
                Some(Op::INotEqual),
                Some(Op::INotEqual),
                Some(Op::LogicalNotEqual),
            ),
        );
        spirv(
            "lessThan",
            ByNumberKind::numeric(Op::FOrdLessThan, Op::SLessThan, Op::ULessThan),
        );
        spirv(
            "lessThanEqual",
            ByNumberKind::numeric(Op::FOrdLessThanEqual, Op::SLessThanEqual, Op::ULessThanEqual),
        );
        spirv(
            "greaterThan",
            ByNumberKind::numeric(Op::FOrdGreaterThan, Op::SGreaterThan, Op::UGreaterThan),
        );
        spirv(
            "greaterThanEqual",
            ByNumberKind::numeric(
                Op::FOrdGreaterThanEqual,
                Op::SGreaterThanEqual,
                Op::UGreaterThanEqual,
            ),
        );

        intrinsics.insert("atan", Special(SpecialIntrinsic::Atan));
        intrinsics.insert("texture", Special(SpecialIntrinsic::Texture));
        intrinsics.insert("subpassLoad", Special(SpecialIntrinsic::SubpassLoad));

        IntrinsicRegistry { intrinsics }
    }

    pub fn get(&self, name: &str) -> Option<IntrinsicImpl> {
        self.intrinsics.get(name).copied()
    }
}

impl SpirvCodeGenerator<'_> {
    pub(crate) fn lower_intrinsic_call(
        &mut self,
        expr: &Expression,
        function: FuncId,
        args: &[Expression],
    ) -> Result<Word> {
        let program = self.program;
        let declaration = program.function(function);
        let name = declaration.name.as_str();
        let Some(intrinsic) = self.intrinsics.get(name) else {
            panic!("call to undefined function '{}'", name);
        };
        let result_type = self.get_type(&expr.ty);

        // Out parameters (frexp's exponent) need a pointer
        let mut arguments = Vec::new();
        let mut write_backs = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let is_out = declaration
                .parameters
                .get(i)
                .is_some_and(|&param| program.variable(param).modifiers.is_out);
            if is_out {
                let (pointer, write_back) = self.out_argument(arg, false)?;
                arguments.push(pointer);
                write_backs.extend(write_back);
            } else {
                arguments.push(self.lower_expression(arg)?);
            }
        }
        if COMPONENT_WISE.contains(&name) && expr.ty.is_vector() {
            for (arg, value) in args.iter().zip(arguments.iter_mut()) {
                if let Some(kind) = arg.ty.component_kind().filter(|_| arg.ty.is_scalar()) {
                    *value = self.broadcast(&Type::vector(kind, expr.ty.columns()), *value)?;
                }
            }
        }

        let id = match intrinsic {
            IntrinsicImpl::GlslExt(ops) => {
                let op = select(&ops, args, name);
                self.write_ext_inst(result_type, op, &arguments)?
            }
            IntrinsicImpl::SpirvOp(ops) => {
                let op = select(&ops, args, name);
                self.emit_value(op, result_type, &arguments)?
            }
            IntrinsicImpl::Special(SpecialIntrinsic::Atan) => {
                let op = match arguments.len() {
                    1 => GLOp::Atan,
                    2 => GLOp::Atan2,
                    n => panic!("atan takes one or two arguments, got {}", n),
                };
                self.write_ext_inst(result_type, op, &arguments)?
            }
            IntrinsicImpl::Special(SpecialIntrinsic::Texture) => {
                self.write_texture(result_type, args, &arguments)?
            }
            IntrinsicImpl::Special(SpecialIntrinsic::SubpassLoad) => {
                self.write_subpass_load(result_type, &arguments)?
            }
        };
        self.finish_write_backs(write_backs)?;
        Ok(id)
    }

    fn write_ext_inst(&mut self, result_type: Word, op: GLOp, arguments: &[Word]) -> Result<Word> {
        let operands = arguments.iter().map(|&argument| Operand::IdRef(argument));
        let id = self.encoder.builder.ext_inst(
            result_type,
            None,
            self.glsl_ext_inst,
            op as Word,
            operands,
        )?;
        Ok(id)
    }

    /// Implicit-LOD sampling, projective when the coordinate carries one
    /// more component than the sampler's dimensionality.
    fn write_texture(
        &mut self,
        result_type: Word,
        args: &[Expression],
        arguments: &[Word],
    ) -> Result<Word> {
        let sampler = args[0]
            .ty
            .sampler_type()
            .unwrap_or_else(|| panic!("texture() of non-sampler '{}'", args[0].ty));
        let coordinate_size = args[1].ty.columns();
        let projective = match sampler.dim {
            Dim::D1 => coordinate_size == 2,
            Dim::D2 => coordinate_size == 3,
            Dim::D3 => coordinate_size == 4,
            Dim::Cube | Dim::Rect | Dim::Buffer | Dim::SubpassData => false,
        };
        let (image_operands, bias) = match arguments {
            [_, _] => (None, None),
            [_, _, bias] => (Some(ImageOperands::BIAS), Some(Operand::IdRef(*bias))),
            _ => panic!("texture takes two or three arguments, got {}", arguments.len()),
        };
        let builder = &mut self.encoder.builder;
        let (sampled_image, coordinate) = (arguments[0], arguments[1]);
        let id = if projective {
            builder.image_sample_proj_implicit_lod(
                result_type,
                None,
                sampled_image,
                coordinate,
                image_operands,
                bias,
            )?
        } else {
            builder.image_sample_implicit_lod(
                result_type,
                None,
                sampled_image,
                coordinate,
                image_operands,
                bias,
            )?
        };
        Ok(id)
    }

    /// Subpass inputs are read at the current fragment, addressed by a zero
    /// integer coordinate.
    fn write_subpass_load(&mut self, result_type: Word, arguments: &[Word]) -> Result<Word> {
        let zero = self.int_constant(0);
        let coordinate = self.constant_composite(&Type::vector(ScalarKind::Int, 2), &[zero, zero]);
        let (image_operands, sample) = match arguments {
            [_] => (None, None),
            [_, sample] => (Some(ImageOperands::SAMPLE), Some(Operand::IdRef(*sample))),
            _ => panic!("subpassLoad takes one or two arguments, got {}", arguments.len()),
        };
        let id = self.encoder.builder.image_read(
            result_type,
            None,
            arguments[0],
            coordinate,
            image_operands,
            sample,
        )?;
        Ok(id)
    }
}

/// The variant for the class of the first argument.
fn select<T: Copy>(ops: &ByNumberKind<T>, args: &[Expression], name: &str) -> T {
    let Some(first) = args.first() else {
        panic!("intrinsic '{}' called without arguments", name);
    };
    let kind = number_kind(&first.ty);
    ops.select(kind)
        .unwrap_or_else(|| panic!("intrinsic '{}' is not defined for '{}'", name, first.ty))
}
