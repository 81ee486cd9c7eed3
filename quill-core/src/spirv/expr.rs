//! Expression lowering. Every `lower_*` function returns the id of a value;
//! callers that need an address go through `get_lvalue`.

use super::globals::storage_class;
use super::lvalue::LValue;
use super::SpirvCodeGenerator;
use crate::error::Result;
use quill_ir::{
    BinaryOp, Builtin, ExprKind, Expression, FuncId, PostfixOp, PrefixOp, ScalarKind, Type,
    TypeKind, VarId,
};
use rspirv::spirv::{BuiltIn, Op, SelectionControl, StorageClass, Word};

/// Operand class used to pick between the float, signed, unsigned and
/// boolean forms of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Float,
    Signed,
    Unsigned,
    Bool,
}

pub fn number_kind(ty: &Type) -> NumberKind {
    let kind = match &ty.kind {
        TypeKind::Array { element, .. } => return number_kind(element),
        _ => ty.component_kind(),
    };
    match kind {
        Some(ScalarKind::Float | ScalarKind::Double) => NumberKind::Float,
        Some(ScalarKind::Int) => NumberKind::Signed,
        Some(ScalarKind::UInt) => NumberKind::Unsigned,
        Some(ScalarKind::Bool) => NumberKind::Bool,
        None => panic!("type '{}' has no number kind", ty),
    }
}

/// One optional variant per operand class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByNumberKind<T> {
    pub float: Option<T>,
    pub signed: Option<T>,
    pub unsigned: Option<T>,
    pub boolean: Option<T>,
}

impl<T: Copy> ByNumberKind<T> {
    pub const fn new(
        float: Option<T>,
        signed: Option<T>,
        unsigned: Option<T>,
        boolean: Option<T>,
    ) -> Self {
        ByNumberKind {
            float,
            signed,
            unsigned,
            boolean,
        }
    }

    /// The same variant for every class.
    pub const fn all(value: T) -> Self {
        Self::new(Some(value), Some(value), Some(value), Some(value))
    }

    /// Numeric variants only.
    pub const fn numeric(float: T, signed: T, unsigned: T) -> Self {
        Self::new(Some(float), Some(signed), Some(unsigned), None)
    }

    pub const fn float_only(float: T) -> Self {
        Self::new(Some(float), None, None, None)
    }

    pub const fn integer_only(signed: T, unsigned: T) -> Self {
        Self::new(None, Some(signed), Some(unsigned), None)
    }

    pub const fn bool_only(boolean: T) -> Self {
        Self::new(None, None, None, Some(boolean))
    }

    pub fn select(&self, kind: NumberKind) -> Option<T> {
        match kind {
            NumberKind::Float => self.float,
            NumberKind::Signed => self.signed,
            NumberKind::Unsigned => self.unsigned,
            NumberKind::Bool => self.boolean,
        }
    }
}

fn binary_ops(op: BinaryOp) -> ByNumberKind<Op> {
    match op {
        BinaryOp::Add => ByNumberKind::numeric(Op::FAdd, Op::IAdd, Op::IAdd),
        BinaryOp::Sub => ByNumberKind::numeric(Op::FSub, Op::ISub, Op::ISub),
        BinaryOp::Mul => ByNumberKind::numeric(Op::FMul, Op::IMul, Op::IMul),
        BinaryOp::Div => ByNumberKind::numeric(Op::FDiv, Op::SDiv, Op::UDiv),
        BinaryOp::Mod => ByNumberKind::numeric(Op::FMod, Op::SMod, Op::UMod),
        BinaryOp::Shl => ByNumberKind::integer_only(Op::ShiftLeftLogical, Op::ShiftLeftLogical),
        BinaryOp::Shr => {
            ByNumberKind::integer_only(Op::ShiftRightArithmetic, Op::ShiftRightLogical)
        }
        BinaryOp::BitAnd => ByNumberKind::integer_only(Op::BitwiseAnd, Op::BitwiseAnd),
        BinaryOp::BitOr => ByNumberKind::integer_only(Op::BitwiseOr, Op::BitwiseOr),
        BinaryOp::BitXor => ByNumberKind::integer_only(Op::BitwiseXor, Op::BitwiseXor),
        BinaryOp::LogicalAnd => ByNumberKind::bool_only(Op::LogicalAnd),
        BinaryOp::LogicalOr => ByNumberKind::bool_only(Op::LogicalOr),
        BinaryOp::LogicalXor => ByNumberKind::bool_only(Op::LogicalNotEqual),
        BinaryOp::Eq => ByNumberKind::new(
            Some(Op::FOrdEqual),
            Some(Op::IEqual),
            Some(Op::IEqual),
            Some(Op::LogicalEqual),
        ),
        BinaryOp::Ne => ByNumberKind::new(
            Some(Op::FOrdNotEqual),
            Some(Op::INotEqual),
            Some(Op::INotEqual),
            Some(Op::LogicalNotEqual),
        ),
        BinaryOp::Lt => ByNumberKind::numeric(Op::FOrdLessThan, Op::SLessThan, Op::ULessThan),
        BinaryOp::Le => {
            ByNumberKind::numeric(Op::FOrdLessThanEqual, Op::SLessThanEqual, Op::ULessThanEqual)
        }
        BinaryOp::Gt => {
            ByNumberKind::numeric(Op::FOrdGreaterThan, Op::SGreaterThan, Op::UGreaterThan)
        }
        BinaryOp::Ge => ByNumberKind::numeric(
            Op::FOrdGreaterThanEqual,
            Op::SGreaterThanEqual,
            Op::UGreaterThanEqual,
        ),
        _ => unreachable!("assignment operator '{}' has no opcode", op.symbol()),
    }
}

/// Instruction converting between two numeric scalar kinds.
fn conversion_op(from: ScalarKind, to: ScalarKind) -> Op {
    use ScalarKind::*;
    match (from, to) {
        (Int, Float | Double) => Op::ConvertSToF,
        (UInt, Float | Double) => Op::ConvertUToF,
        (Float, Double) | (Double, Float) => Op::FConvert,
        (Float | Double, Int) => Op::ConvertFToS,
        (Float | Double, UInt) => Op::ConvertFToU,
        (Int, UInt) | (UInt, Int) => Op::Bitcast,
        _ => unreachable!("no conversion from {} to {}", from.name(), to.name()),
    }
}

impl SpirvCodeGenerator<'_> {
    pub(crate) fn lower_expression(&mut self, expr: &Expression) -> Result<Word> {
        let id = match &expr.kind {
            ExprKind::BoolLiteral(value) => self.bool_constant(*value),
            ExprKind::IntLiteral(value) => match expr.ty.component_kind() {
                Some(ScalarKind::UInt) => self.uint_constant(*value as u32),
                Some(ScalarKind::Int) => self.int_constant(*value as i32),
                _ => panic!("integer literal of type '{}'", expr.ty),
            },
            ExprKind::FloatLiteral(value) => match expr.ty.component_kind() {
                Some(ScalarKind::Double) => self.double_constant(*value),
                Some(ScalarKind::Float) => self.float_constant(*value as f32),
                _ => panic!("float literal of type '{}'", expr.ty),
            },
            ExprKind::VariableRef(var) => self.lower_variable_ref(*var, &expr.ty)?,
            ExprKind::FieldAccess { .. } | ExprKind::Index { .. } => {
                let lvalue = self.get_lvalue(expr)?;
                self.load_lvalue(&lvalue)?
            }
            ExprKind::Swizzle { base, components } => {
                let base = self.lower_expression(base)?;
                let result_type = self.get_type(&expr.ty);
                let builder = &mut self.encoder.builder;
                if let [component] = components[..] {
                    builder.composite_extract(result_type, None, base, [component])?
                } else {
                    builder.vector_shuffle(result_type, None, base, base, components.iter().copied())?
                }
            }
            ExprKind::Binary { left, op, right } => self.lower_binary(expr, left, *op, right)?,
            ExprKind::Prefix { op, operand } => self.lower_prefix(*op, operand)?,
            ExprKind::Postfix { op, operand } => {
                let lvalue = self.get_lvalue(operand)?;
                let value = self.load_lvalue(&lvalue)?;
                let op = match op {
                    PostfixOp::Increment => BinaryOp::Add,
                    PostfixOp::Decrement => BinaryOp::Sub,
                };
                let one = self.splat_constant(&operand.ty, 1.0);
                let result =
                    self.write_arithmetic(&operand.ty, &operand.ty, op, &operand.ty, value, one)?;
                self.store_lvalue(&lvalue, result)?;
                value
            }
            ExprKind::Ternary {
                test,
                if_true,
                if_false,
            } => self.lower_ternary(&expr.ty, test, if_true, if_false)?,
            ExprKind::Constructor { args } => self.lower_constructor(&expr.ty, args)?,
            ExprKind::FunctionCall { function, args } => self.lower_call(expr, *function, args)?,
        };
        Ok(id)
    }

    fn lower_variable_ref(&mut self, var: VarId, ty: &Type) -> Result<Word> {
        let program = self.program;
        let variable = program.variable(var);
        let lvalue = LValue::Pointer {
            pointer: self.variable_pointer(var),
            ty: ty.clone(),
            storage: storage_class(variable),
        };
        let value = self.load_lvalue(&lvalue)?;
        let is_frag_coord =
            variable.modifiers.layout.builtin == Some(Builtin::Spirv(BuiltIn::FragCoord as u32));
        if is_frag_coord && program.settings.flip_y {
            self.flip_frag_coord(value)
        } else {
            Ok(value)
        }
    }

    /// `(x, height - y, 0, 1)`, with the height read from the render target
    /// uniform.
    fn flip_frag_coord(&mut self, coord: Word) -> Result<Word> {
        let rt_height = self.rt_height_uniform();
        let float = Type::float();
        let float_type = self.get_type(&float);
        let pointer_type = self.get_pointer_type(&float, rt_height.storage_class);
        let index = self.int_constant(rt_height.field_index as i32);
        let zero = self.float_constant(0.0);
        let one = self.float_constant(1.0);
        let vec4 = self.get_type(&Type::vec4());

        let builder = &mut self.encoder.builder;
        let field = builder.access_chain(pointer_type, None, rt_height.variable, [index])?;
        let height = builder.load(float_type, None, field, None, [])?;
        let x = builder.composite_extract(float_type, None, coord, [0])?;
        let y = builder.composite_extract(float_type, None, coord, [1])?;
        let flipped_y = builder.f_sub(float_type, None, height, y)?;
        let id = builder.composite_construct(vec4, None, [x, flipped_y, zero, one])?;
        Ok(id)
    }

    fn lower_binary(
        &mut self,
        expr: &Expression,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
    ) -> Result<Word> {
        match op {
            BinaryOp::Assign => {
                let lvalue = self.get_lvalue(left)?;
                let value = self.lower_expression(right)?;
                self.store_lvalue(&lvalue, value)?;
                Ok(value)
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
                self.lower_short_circuit(op == BinaryOp::LogicalAnd, left, right)
            }
            _ => match op.compound_base() {
                Some(base) => {
                    let lvalue = self.get_lvalue(left)?;
                    let lhs = self.load_lvalue(&lvalue)?;
                    let rhs = self.lower_expression(right)?;
                    let result =
                        self.write_arithmetic(&expr.ty, &left.ty, base, &right.ty, lhs, rhs)?;
                    self.store_lvalue(&lvalue, result)?;
                    Ok(result)
                }
                None => {
                    let lhs = self.lower_expression(left)?;
                    let rhs = self.lower_expression(right)?;
                    self.write_arithmetic(&expr.ty, &left.ty, op, &right.ty, lhs, rhs)
                }
            },
        }
    }

    /// `&&` and `||` only evaluate the right operand when it decides the
    /// result; the two paths meet in a phi.
    fn lower_short_circuit(
        &mut self,
        is_and: bool,
        left: &Expression,
        right: &Expression,
    ) -> Result<Word> {
        let lhs = self.lower_expression(left)?;
        let lhs_block = self.encoder.current_block()?;
        let rhs_label = self.next_id();
        let end = self.next_id();
        self.encoder
            .builder
            .selection_merge(end, SelectionControl::NONE)?;
        if is_and {
            self.encoder
                .builder
                .branch_conditional(lhs, rhs_label, end, [])?;
        } else {
            self.encoder
                .builder
                .branch_conditional(lhs, end, rhs_label, [])?;
        }
        self.write_label(rhs_label)?;
        let rhs = self.lower_expression(right)?;
        let rhs_block = self.encoder.current_block()?;
        self.encoder.builder.branch(end)?;
        self.write_label(end)?;

        let short_circuit = self.bool_constant(!is_and);
        let bool_type = self.get_type(&Type::bool());
        let id = self.encoder.builder.phi(
            bool_type,
            None,
            [(short_circuit, lhs_block), (rhs, rhs_block)],
        )?;
        Ok(id)
    }

    /// `op` applied to already evaluated operands, with scalar operands
    /// broadcast against vectors and matrix operands split as needed.
    pub(crate) fn write_arithmetic(
        &mut self,
        result_type: &Type,
        left_type: &Type,
        op: BinaryOp,
        right_type: &Type,
        lhs: Word,
        rhs: Word,
    ) -> Result<Word> {
        if op == BinaryOp::Mul && (left_type.is_matrix() || right_type.is_matrix()) {
            let (opcode, first, second) = match (&left_type.kind, &right_type.kind) {
                (TypeKind::Matrix { .. }, TypeKind::Matrix { .. }) => {
                    (Op::MatrixTimesMatrix, lhs, rhs)
                }
                (TypeKind::Matrix { .. }, TypeKind::Vector { .. }) => {
                    (Op::MatrixTimesVector, lhs, rhs)
                }
                (TypeKind::Vector { .. }, TypeKind::Matrix { .. }) => {
                    (Op::VectorTimesMatrix, lhs, rhs)
                }
                (TypeKind::Matrix { .. }, TypeKind::Scalar(_)) => (Op::MatrixTimesScalar, lhs, rhs),
                (TypeKind::Scalar(_), TypeKind::Matrix { .. }) => (Op::MatrixTimesScalar, rhs, lhs),
                _ => panic!("cannot multiply '{}' by '{}'", left_type, right_type),
            };
            let result = self.get_type(result_type);
            return self.emit_value(opcode, result, &[first, second]);
        }
        if left_type.is_matrix() || right_type.is_matrix() {
            return self.write_matrix_operation(result_type, left_type, op, right_type, lhs, rhs);
        }

        let (mut left_type, mut lhs, mut rhs) = (left_type.clone(), lhs, rhs);
        if left_type.is_vector() && right_type.is_scalar() {
            let target = Type::vector(component_of(right_type), left_type.columns());
            rhs = self.broadcast(&target, rhs)?;
        } else if left_type.is_scalar() && right_type.is_vector() {
            left_type = Type::vector(component_of(&left_type), right_type.columns());
            lhs = self.broadcast(&left_type, lhs)?;
        }

        if (op == BinaryOp::Eq || op == BinaryOp::Ne) && left_type.is_vector() && result_type.is_scalar() {
            return self.write_vector_comparison(op, &left_type, lhs, rhs);
        }
        self.write_binary_operation(result_type, &left_type, op, lhs, rhs)
    }

    /// Single instruction for `op`, chosen by the class of `operand_type`.
    pub(crate) fn write_binary_operation(
        &mut self,
        result_type: &Type,
        operand_type: &Type,
        op: BinaryOp,
        lhs: Word,
        rhs: Word,
    ) -> Result<Word> {
        let Some(opcode) = binary_ops(op).select(number_kind(operand_type)) else {
            panic!(
                "operator '{}' is not defined for '{}'",
                op.symbol(),
                operand_type
            );
        };
        let result = self.get_type(result_type);
        self.emit_value(opcode, result, &[lhs, rhs])
    }

    /// Whole-vector `==`/`!=` reduced to one bool.
    fn write_vector_comparison(
        &mut self,
        op: BinaryOp,
        operand_type: &Type,
        lhs: Word,
        rhs: Word,
    ) -> Result<Word> {
        let lanes = Type::vector(ScalarKind::Bool, operand_type.columns());
        let compare = self.write_binary_operation(&lanes, operand_type, op, lhs, rhs)?;
        let reduce = if op == BinaryOp::Eq { Op::All } else { Op::Any };
        let bool_type = self.get_type(&Type::bool());
        self.emit_value(reduce, bool_type, &[compare])
    }

    /// Column by column `+ - /` and comparisons involving a matrix. A scalar
    /// operand is broadcast to a column.
    fn write_matrix_operation(
        &mut self,
        result_type: &Type,
        left_type: &Type,
        op: BinaryOp,
        right_type: &Type,
        lhs: Word,
        rhs: Word,
    ) -> Result<Word> {
        let matrix_type = if left_type.is_matrix() { left_type } else { right_type };
        let column_type = matrix_type.column_type();
        let is_comparison = op == BinaryOp::Eq || op == BinaryOp::Ne;
        if !is_comparison && !matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Div) {
            panic!(
                "operator '{}' is not defined for '{}' and '{}'",
                op.symbol(),
                left_type,
                right_type
            );
        }
        let lhs_scalar = if left_type.is_matrix() {
            None
        } else {
            Some(self.broadcast(&column_type, lhs)?)
        };
        let rhs_scalar = if right_type.is_matrix() {
            None
        } else {
            Some(self.broadcast(&column_type, rhs)?)
        };

        let mut columns = Vec::new();
        for column in 0..matrix_type.columns() {
            let left_column = match lhs_scalar {
                Some(splat) => splat,
                None => self.extract(&column_type, lhs, &[column])?,
            };
            let right_column = match rhs_scalar {
                Some(splat) => splat,
                None => self.extract(&column_type, rhs, &[column])?,
            };
            columns.push(if is_comparison {
                self.write_vector_comparison(op, &column_type, left_column, right_column)?
            } else {
                self.write_binary_operation(&column_type, &column_type, op, left_column, right_column)?
            });
        }

        if is_comparison {
            let combine = if op == BinaryOp::Eq {
                BinaryOp::LogicalAnd
            } else {
                BinaryOp::LogicalOr
            };
            let bool_type = Type::bool();
            let mut result = columns[0];
            for &column in &columns[1..] {
                result = self.write_binary_operation(&bool_type, &bool_type, combine, result, column)?;
            }
            return Ok(result);
        }
        self.construct(result_type, &columns)
    }

    /// `value` repeated in every lane of the vector type `ty`.
    pub(crate) fn broadcast(&mut self, ty: &Type, value: Word) -> Result<Word> {
        self.construct(ty, &vec![value; ty.columns() as usize])
    }

    fn lower_prefix(&mut self, op: PrefixOp, operand: &Expression) -> Result<Word> {
        let ty = &operand.ty;
        match op {
            PrefixOp::Plus => self.lower_expression(operand),
            PrefixOp::Minus => {
                let value = self.lower_expression(operand)?;
                self.write_negate(ty, value)
            }
            PrefixOp::LogicalNot | PrefixOp::BitNot => {
                let value = self.lower_expression(operand)?;
                let opcode = if op == PrefixOp::LogicalNot {
                    Op::LogicalNot
                } else {
                    Op::Not
                };
                let result = self.get_type(ty);
                self.emit_value(opcode, result, &[value])
            }
            PrefixOp::Increment | PrefixOp::Decrement => {
                let lvalue = self.get_lvalue(operand)?;
                let value = self.load_lvalue(&lvalue)?;
                let op = if op == PrefixOp::Increment {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let one = self.splat_constant(ty, 1.0);
                let result = self.write_arithmetic(ty, ty, op, ty, value, one)?;
                self.store_lvalue(&lvalue, result)?;
                Ok(result)
            }
        }
    }

    fn write_negate(&mut self, ty: &Type, value: Word) -> Result<Word> {
        if ty.is_matrix() {
            let column_type = ty.column_type();
            let mut columns = Vec::new();
            for column in 0..ty.columns() {
                let extracted = self.extract(&column_type, value, &[column])?;
                columns.push(self.write_negate(&column_type, extracted)?);
            }
            return self.construct(ty, &columns);
        }
        let opcode = match number_kind(ty) {
            NumberKind::Float => Op::FNegate,
            NumberKind::Signed | NumberKind::Unsigned => Op::SNegate,
            NumberKind::Bool => panic!("cannot negate '{}'", ty),
        };
        let result = self.get_type(ty);
        self.emit_value(opcode, result, &[value])
    }

    fn lower_ternary(
        &mut self,
        ty: &Type,
        test: &Expression,
        if_true: &Expression,
        if_false: &Expression,
    ) -> Result<Word> {
        if if_true.is_constant() && if_false.is_constant() && ty.is_scalar() {
            let test = self.lower_expression(test)?;
            let if_true = self.lower_expression(if_true)?;
            let if_false = self.lower_expression(if_false)?;
            let result = self.get_type(ty);
            let id = self
                .encoder
                .builder
                .select(result, None, test, if_true, if_false)?;
            return Ok(id);
        }

        let var = self.temporary(ty)?;
        let test = self.lower_expression(test)?;
        let true_label = self.next_id();
        let false_label = self.next_id();
        let end = self.next_id();
        self.encoder
            .builder
            .selection_merge(end, SelectionControl::NONE)?;
        self.encoder
            .builder
            .branch_conditional(test, true_label, false_label, [])?;
        for (label, branch) in [(true_label, if_true), (false_label, if_false)] {
            self.write_label(label)?;
            let value = self.lower_expression(branch)?;
            self.encoder.builder.store(var, value, None, [])?;
            self.encoder.builder.branch(end)?;
        }
        self.write_label(end)?;
        let result = self.get_type(ty);
        let id = self.encoder.builder.load(result, None, var, None, [])?;
        Ok(id)
    }

    /// Converts a scalar or vector `value` of type `from` to the same shape
    /// with `to` components.
    pub(crate) fn convert(&mut self, value: Word, from: &Type, to: ScalarKind) -> Result<Word> {
        let from_kind = component_of(from);
        if from_kind == to {
            return Ok(value);
        }
        let target = from.with_component(to);
        let target_id = self.get_type(&target);
        if from_kind == ScalarKind::Bool {
            let one = self.splat_constant(&target, 1.0);
            let zero = self.splat_constant(&target, 0.0);
            let id = self
                .encoder
                .builder
                .select(target_id, None, value, one, zero)?;
            Ok(id)
        } else if to == ScalarKind::Bool {
            let zero = self.splat_constant(from, 0.0);
            let opcode = if from_kind.is_floating() {
                Op::FOrdNotEqual
            } else {
                Op::INotEqual
            };
            self.emit_value(opcode, target_id, &[value, zero])
        } else {
            self.emit_value(conversion_op(from_kind, to), target_id, &[value])
        }
    }

    fn lower_constructor(&mut self, ty: &Type, args: &[Expression]) -> Result<Word> {
        match &ty.kind {
            TypeKind::Scalar(kind) => self.lower_scalar_constructor(*kind, args),
            TypeKind::Vector { .. } => self.lower_vector_constructor(ty, args),
            TypeKind::Matrix { .. } => self.lower_matrix_constructor(ty, args),
            TypeKind::Array { .. } | TypeKind::Struct { .. } => {
                let parts = args
                    .iter()
                    .map(|arg| self.lower_expression(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.construct(ty, &parts)
            }
            _ => panic!("cannot construct '{}'", ty),
        }
    }

    fn lower_scalar_constructor(&mut self, kind: ScalarKind, args: &[Expression]) -> Result<Word> {
        let [arg] = args else {
            panic!("scalar constructor takes one argument, got {}", args.len());
        };
        let value = self.lower_expression(arg)?;
        let from = Type::scalar(component_of(&arg.ty));
        let value = match &arg.ty.kind {
            TypeKind::Scalar(_) => value,
            TypeKind::Vector { .. } => self.extract(&from, value, &[0])?,
            TypeKind::Matrix { .. } => self.extract(&from, value, &[0, 0])?,
            _ => panic!("cannot convert '{}' to {}", arg.ty, kind.name()),
        };
        self.convert(value, &from, kind)
    }

    fn extract(&mut self, ty: &Type, composite: Word, indices: &[u32]) -> Result<Word> {
        let result = self.get_type(ty);
        let id = self.encoder.builder.composite_extract(
            result,
            None,
            composite,
            indices.iter().copied(),
        )?;
        Ok(id)
    }

    fn lower_vector_constructor(&mut self, ty: &Type, args: &[Expression]) -> Result<Word> {
        let component = component_of(ty);
        let size = ty.columns();
        let component_type = Type::scalar(component);

        let all_literals = args.iter().all(|arg| {
            arg.ty == component_type
                && matches!(
                    arg.kind,
                    ExprKind::BoolLiteral(_) | ExprKind::IntLiteral(_) | ExprKind::FloatLiteral(_)
                )
        });
        if all_literals {
            let mut components = args
                .iter()
                .map(|arg| self.lower_expression(arg))
                .collect::<Result<Vec<_>>>()?;
            if components.len() == 1 {
                components = vec![components[0]; size as usize];
            }
            return Ok(self.constant_composite(ty, &components));
        }

        if let [arg] = args {
            let value = self.lower_expression(arg)?;
            match &arg.ty.kind {
                TypeKind::Scalar(_) => {
                    let value = self.convert(value, &arg.ty, component)?;
                    return self.broadcast(ty, value);
                }
                TypeKind::Vector { component: from, size: from_size } => {
                    let mut value = value;
                    let mut from_type = arg.ty.clone();
                    if *from_size > size {
                        from_type = Type::vector(*from, size);
                        let truncated = self.get_type(&from_type);
                        value = self
                            .encoder
                            .builder
                            .vector_shuffle(truncated, None, value, value, 0..size)?;
                    }
                    return self.convert(value, &from_type, component);
                }
                _ => {}
            }
        }

        let mut parts = Vec::new();
        for arg in args {
            let value = self.lower_expression(arg)?;
            match &arg.ty.kind {
                TypeKind::Scalar(_) | TypeKind::Vector { .. } => {
                    parts.push(self.convert(value, &arg.ty, component)?)
                }
                TypeKind::Matrix { columns, rows, .. } => {
                    let from = Type::scalar(component_of(&arg.ty));
                    for column in 0..*columns {
                        for row in 0..*rows {
                            let element = self.extract(&from, value, &[column, row])?;
                            parts.push(self.convert(element, &from, component)?);
                        }
                    }
                }
                _ => panic!("cannot build '{}' from '{}'", ty, arg.ty),
            }
        }
        self.construct(ty, &parts)
    }

    fn lower_matrix_constructor(&mut self, ty: &Type, args: &[Expression]) -> Result<Word> {
        let component = component_of(ty);
        let (columns, rows) = (ty.columns(), ty.rows());
        let column_type = ty.column_type();

        let column_ids = match args {
            [arg] if arg.ty.is_scalar() => {
                let value = self.lower_expression(arg)?;
                let value = self.convert(value, &arg.ty, component)?;
                let zero = self.scalar_constant(component, 0.0);
                let mut column_ids = Vec::new();
                for column in 0..columns {
                    let lanes: Vec<Word> = (0..rows)
                        .map(|row| if row == column { value } else { zero })
                        .collect();
                    column_ids.push(self.construct(&column_type, &lanes)?);
                }
                column_ids
            }
            [arg] if arg.ty.is_matrix() => {
                let value = self.lower_expression(arg)?;
                if arg.ty == *ty {
                    return Ok(value);
                }
                self.resize_matrix(ty, &arg.ty, value)?
            }
            _ => {
                let mut column_ids = Vec::new();
                let mut pending = Vec::new();
                for arg in args {
                    let value = self.lower_expression(arg)?;
                    if pending.is_empty() && arg.ty.is_vector() && arg.ty.columns() == rows {
                        column_ids.push(self.convert(value, &arg.ty, component)?);
                        continue;
                    }
                    match &arg.ty.kind {
                        TypeKind::Scalar(_) => pending.push(self.convert(value, &arg.ty, component)?),
                        TypeKind::Vector { component: from, size } => {
                            let from = Type::scalar(*from);
                            for lane in 0..*size {
                                let element = self.extract(&from, value, &[lane])?;
                                pending.push(self.convert(element, &from, component)?);
                                if pending.len() == rows as usize {
                                    column_ids.push(self.construct(&column_type, &pending)?);
                                    pending.clear();
                                }
                            }
                            continue;
                        }
                        _ => panic!("cannot build '{}' from '{}'", ty, arg.ty),
                    }
                    if pending.len() == rows as usize {
                        column_ids.push(self.construct(&column_type, &pending)?);
                        pending.clear();
                    }
                }
                assert!(
                    pending.is_empty() && column_ids.len() == columns as usize,
                    "wrong number of components for '{}'",
                    ty
                );
                column_ids
            }
        };
        self.construct(ty, &column_ids)
    }

    /// A matrix of another shape: overlapping elements are copied and the
    /// rest filled from the identity matrix.
    fn resize_matrix(&mut self, ty: &Type, source_type: &Type, source: Word) -> Result<Vec<Word>> {
        let component = component_of(ty);
        let column_type = ty.column_type();
        let source_column_type = source_type.column_type();
        let scalar = Type::scalar(component);
        let zero = self.scalar_constant(component, 0.0);
        let one = self.scalar_constant(component, 1.0);
        let mut column_ids = Vec::new();
        for column in 0..ty.columns() {
            if column >= source_type.columns() {
                let lanes: Vec<Word> = (0..ty.rows())
                    .map(|row| if row == column { one } else { zero })
                    .collect();
                column_ids.push(self.constant_composite(&column_type, &lanes));
                continue;
            }
            let source_column = self.extract(&source_column_type, source, &[column])?;
            let source_column = self.convert(source_column, &source_column_type, component)?;
            if source_type.rows() == ty.rows() {
                column_ids.push(source_column);
                continue;
            }
            let mut lanes = Vec::new();
            for row in 0..ty.rows() {
                lanes.push(if row < source_type.rows() {
                    self.extract(&scalar, source_column, &[row])?
                } else if row == column {
                    one
                } else {
                    zero
                });
            }
            column_ids.push(self.construct(&column_type, &lanes)?);
        }
        Ok(column_ids)
    }

    fn construct(&mut self, ty: &Type, parts: &[Word]) -> Result<Word> {
        let result = self.get_type(ty);
        let id = self
            .encoder
            .builder
            .composite_construct(result, None, parts.iter().copied())?;
        Ok(id)
    }

    fn lower_call(&mut self, expr: &Expression, function: FuncId, args: &[Expression]) -> Result<Word> {
        let Some(&function_id) = self.function_ids.get(&function) else {
            return self.lower_intrinsic_call(expr, function, args);
        };
        let program = self.program;
        let declaration = program.function(function);
        let mut arguments = Vec::new();
        let mut write_backs = Vec::new();
        for (&param, arg) in declaration.parameters.iter().zip(args) {
            if program.variable(param).modifiers.is_out {
                let (pointer, write_back) = self.out_argument(arg, true)?;
                arguments.push(pointer);
                write_backs.extend(write_back);
            } else {
                let value = self.lower_expression(arg)?;
                arguments.push(self.materialize(&arg.ty, value)?);
            }
        }
        let result = self.get_type(&expr.ty);
        let id = self
            .encoder
            .builder
            .function_call(result, None, function_id, arguments)?;
        self.finish_write_backs(write_backs)?;
        Ok(id)
    }

    /// Pointer to pass for an `out`/`inout` argument. When the argument has
    /// no usable pointer a temporary holding its current value is passed
    /// instead and returned for writing back after the call.
    pub(crate) fn out_argument(
        &mut self,
        arg: &Expression,
        needs_variable: bool,
    ) -> Result<(Word, Option<(Word, LValue)>)> {
        let lvalue = self.get_lvalue(arg)?;
        let direct = match &lvalue {
            LValue::Pointer {
                pointer,
                storage: StorageClass::Function,
                ..
            } => Some(*pointer),
            LValue::Pointer { pointer, .. } | LValue::AccessChain { pointer, .. }
                if !needs_variable =>
            {
                Some(*pointer)
            }
            _ => None,
        };
        match direct {
            Some(pointer) => Ok((pointer, None)),
            None => {
                let value = self.load_lvalue(&lvalue)?;
                let temporary = self.materialize(&arg.ty, value)?;
                Ok((temporary, Some((temporary, lvalue))))
            }
        }
    }

    pub(crate) fn finish_write_backs(&mut self, write_backs: Vec<(Word, LValue)>) -> Result<()> {
        for (temporary, lvalue) in write_backs {
            let ty = self.get_type(lvalue.ty());
            let value = self.encoder.builder.load(ty, None, temporary, None, [])?;
            self.store_lvalue(&lvalue, value)?;
        }
        Ok(())
    }
}

fn component_of(ty: &Type) -> ScalarKind {
    ty.component_kind()
        .unwrap_or_else(|| panic!("type '{}' has no components", ty))
}
