use crate::spirv::encoder::Section;
use crate::spirv::lvalue::swizzle_store_indices;
use crate::spirv::SpirvCodeGenerator;
use crate::spirv::layout::MemoryLayout;
use quill_ir::{
    BinaryOp, Builtin, Dim, Expression, Field, FunctionDeclaration, InterfaceBlock, Layout,
    Modifiers, PostfixOp, PrefixOp, Program, ProgramKind, SamplerType, Statement, Type,
    VarDeclaration, VarId, Variable,
};
use rspirv::spirv::{BuiltIn, Decoration, GLOp, ImageOperands, Op, StorageClass, Word};

fn instructions(words: &[Word]) -> Vec<(u32, Vec<Word>)> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let count = (words[i] >> 16) as usize;
        result.push((words[i] & 0xffff, words[i + 1..i + count].to_vec()));
        i += count;
    }
    result
}

fn body(generator: &SpirvCodeGenerator) -> Vec<(u32, Vec<Word>)> {
    instructions(&generator.encoder.section(Section::Body))
}

fn find(generator: &SpirvCodeGenerator, op: Op) -> Vec<Vec<Word>> {
    body(generator)
        .into_iter()
        .filter(|(opcode, _)| *opcode == op as u32)
        .map(|(_, operands)| operands)
        .collect()
}

fn opcodes(generator: &SpirvCodeGenerator) -> Vec<u32> {
    body(generator).into_iter().map(|(opcode, _)| opcode).collect()
}

/// Opens a function body and declares `locals` as function variables.
fn start(generator: &mut SpirvCodeGenerator, locals: &[VarId]) {
    let _ = env_logger::builder().is_test(true).try_init();
    let declaration = FunctionDeclaration::new("test", Type::void(), vec![]);
    let id = generator.next_id();
    generator.begin_function(&declaration, id).unwrap();
    for &local in locals {
        generator.lower_statement(&Statement::declare(local, None)).unwrap();
    }
}

#[test]
fn test_vector_of_literals_is_a_constant() {
    let program = Program::new(ProgramKind::Fragment);
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[]);

    let value = generator.lower_expression(&Expression::construct(
        Type::vec4(),
        vec![Expression::float(1.0)],
    )).unwrap();
    let one = generator.float_constant(1.0);
    assert_eq!(generator.constant_composite(&Type::vec4(), &[one; 4]), value);
    // Nothing but the label was written to the body
    assert_eq!(opcodes(&generator), vec![Op::Label as u32]);
}

#[test]
fn test_scalar_is_broadcast_into_vector() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[x]);

    let value = generator.lower_expression(&Expression::construct(
        Type::vec3(),
        vec![Expression::var(x, Type::float())],
    )).unwrap();
    let loaded = find(&generator, Op::Load)[0][1];
    let constructs = find(&generator, Op::CompositeConstruct);
    assert_eq!(constructs.len(), 1);
    assert_eq!(constructs[0][1], value);
    assert_eq!(&constructs[0][2..], &[loaded, loaded, loaded]);
}

#[test]
fn test_scalar_matrix_constructor_fills_the_diagonal() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[x]);

    generator.lower_expression(&Expression::construct(
        Type::mat(3, 3),
        vec![Expression::var(x, Type::float())],
    )).unwrap();
    let loaded = find(&generator, Op::Load)[0][1];
    let zero = generator.float_constant(0.0);
    let constructs = find(&generator, Op::CompositeConstruct);
    assert_eq!(constructs.len(), 4);
    for (column, construct) in constructs[..3].iter().enumerate() {
        let expected: Vec<Word> = (0..3)
            .map(|row| if row == column { loaded } else { zero })
            .collect();
        assert_eq!(&construct[2..], &expected[..]);
    }
    let columns: Vec<Word> = constructs[..3].iter().map(|c| c[1]).collect();
    assert_eq!(&constructs[3][2..], &columns[..]);
}

#[test]
fn test_matrix_from_misaligned_vectors() {
    let mut program = Program::new(ProgramKind::Fragment);
    let v = program.add_variable(Variable::local("v", Type::vec3()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[v]);

    // mat2(vec3, float): the vec3 straddles both columns
    generator.lower_expression(&Expression::construct(
        Type::mat(2, 2),
        vec![Expression::var(v, Type::vec3()), Expression::float(4.0)],
    )).unwrap();
    let extracts = find(&generator, Op::CompositeExtract);
    assert_eq!(extracts.len(), 3);
    let constructs = find(&generator, Op::CompositeConstruct);
    assert_eq!(constructs.len(), 3);
    assert_eq!(&constructs[0][2..], &[extracts[0][1], extracts[1][1]]);
    let four = generator.float_constant(4.0);
    assert_eq!(&constructs[1][2..], &[extracts[2][1], four]);
}

#[test]
fn test_int_to_float_conversion() {
    let mut program = Program::new(ProgramKind::Fragment);
    let i = program.add_variable(Variable::local("i", Type::int()));
    let u = program.add_variable(Variable::local("u", Type::uint()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[i, u]);

    generator.lower_expression(&Expression::construct(
        Type::float(),
        vec![Expression::var(i, Type::int())],
    )).unwrap();
    generator.lower_expression(&Expression::construct(
        Type::float(),
        vec![Expression::var(u, Type::uint())],
    )).unwrap();
    generator.lower_expression(&Expression::construct(
        Type::int(),
        vec![Expression::var(u, Type::uint())],
    )).unwrap();
    assert_eq!(find(&generator, Op::ConvertSToF).len(), 1);
    assert_eq!(find(&generator, Op::ConvertUToF).len(), 1);
    assert_eq!(find(&generator, Op::Bitcast).len(), 1);
}

#[test]
fn test_same_type_scalar_constructor_is_identity() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[x]);

    let value = generator.lower_expression(&Expression::construct(
        Type::float(),
        vec![Expression::var(x, Type::float())],
    )).unwrap();
    assert_eq!(find(&generator, Op::Load)[0][1], value);
}

fn declare_atan(program: &mut Program) -> (quill_ir::FuncId, quill_ir::FuncId) {
    let one = program.declare_intrinsic("atan", Type::float(), &[Type::float()]);
    let two = program.declare_intrinsic("atan", Type::float(), &[Type::float(), Type::float()]);
    (one, two)
}

#[test]
fn test_atan_dispatches_on_argument_count() {
    let mut program = Program::new(ProgramKind::Fragment);
    let (one, two) = declare_atan(&mut program);
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[]);

    generator.lower_expression(&Expression::call(
        one,
        Type::float(),
        vec![Expression::float(1.0)],
    )).unwrap();
    generator.lower_expression(&Expression::call(
        two,
        Type::float(),
        vec![Expression::float(1.0), Expression::float(2.0)],
    )).unwrap();
    let ext: Vec<Vec<Word>> = find(&generator, Op::ExtInst);
    assert_eq!(ext.len(), 2);
    assert_eq!(ext[0][2], generator.glsl_ext_inst);
    assert_eq!(ext[0][3], GLOp::Atan as u32);
    assert_eq!(ext[0].len(), 5);
    assert_eq!(ext[1][3], GLOp::Atan2 as u32);
    assert_eq!(ext[1].len(), 6);
}

#[test]
fn test_intrinsic_variant_follows_first_argument() {
    let mut program = Program::new(ProgramKind::Fragment);
    let max = program.declare_intrinsic("max", Type::uint(), &[Type::uint(), Type::uint()]);
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[]);

    generator.lower_expression(&Expression::call(
        max,
        Type::uint(),
        vec![Expression::uint(1), Expression::uint(2)],
    )).unwrap();
    assert_eq!(find(&generator, Op::ExtInst)[0][3], GLOp::UMax as u32);
}

#[test]
fn test_component_wise_intrinsic_broadcasts_scalars() {
    let mut program = Program::new(ProgramKind::Fragment);
    let v = program.add_variable(Variable::local("v", Type::vec3()));
    let clamp = program.declare_intrinsic(
        "clamp",
        Type::vec3(),
        &[Type::vec3(), Type::float(), Type::float()],
    );
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[v]);

    generator.lower_expression(&Expression::call(
        clamp,
        Type::vec3(),
        vec![
            Expression::var(v, Type::vec3()),
            Expression::float(0.0),
            Expression::float(1.0),
        ],
    )).unwrap();
    let constructs = find(&generator, Op::CompositeConstruct);
    assert_eq!(constructs.len(), 2);
    let ext = &find(&generator, Op::ExtInst)[0];
    assert_eq!(ext[3], GLOp::FClamp as u32);
    assert_eq!(&ext[5..], &[constructs[0][1], constructs[1][1]]);
}

#[test]
#[should_panic(expected = "intrinsic 'dot' is not defined for 'ivec2'")]
fn test_undefined_intrinsic_variant_aborts() {
    let mut program = Program::new(ProgramKind::Fragment);
    let ivec2 = Type::vector(quill_ir::ScalarKind::Int, 2);
    let v = program.add_variable(Variable::local("v", ivec2.clone()));
    let dot = program.declare_intrinsic("dot", Type::int(), &[ivec2.clone(), ivec2.clone()]);
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[v]);

    generator.lower_expression(&Expression::call(
        dot,
        Type::int(),
        vec![Expression::var(v, ivec2.clone()), Expression::var(v, ivec2)],
    )).unwrap();
}

fn logical(op: BinaryOp) -> (SpirvCodeGenerator<'static>, Word) {
    let mut program = Program::new(ProgramKind::Fragment);
    let a = program.add_variable(Variable::local("a", Type::bool()));
    let b = program.add_variable(Variable::local("b", Type::bool()));
    let program: &'static Program = Box::leak(Box::new(program));
    let mut generator = SpirvCodeGenerator::new(program);
    start(&mut generator, &[a, b]);
    let value = generator.lower_expression(&Expression::binary(
        Expression::var(a, Type::bool()),
        op,
        Expression::var(b, Type::bool()),
        Type::bool(),
    )).unwrap();
    (generator, value)
}

#[test]
fn test_logical_and_short_circuits() {
    let (mut generator, value) = logical(BinaryOp::LogicalAnd);
    let labels = find(&generator, Op::Label);
    let entry = labels[0][0];
    let loads = find(&generator, Op::Load);
    let (lhs, rhs) = (loads[0][1], loads[1][1]);

    let branch = &find(&generator, Op::BranchConditional)[0];
    let rhs_label = labels[1][0];
    let end = labels[2][0];
    assert_eq!(branch, &vec![lhs, rhs_label, end]);
    assert_eq!(find(&generator, Op::SelectionMerge)[0][0], end);

    let phi = &find(&generator, Op::Phi)[0];
    let false_constant = generator.bool_constant(false);
    assert_eq!(phi[1], value);
    assert_eq!(&phi[2..], &[false_constant, entry, rhs, rhs_label]);
    // The right operand is only loaded inside its own block
    let order = opcodes(&generator);
    let position_of = |op: Op, n: usize| {
        order
            .iter()
            .enumerate()
            .filter(|&(_, &opcode)| opcode == op as u32)
            .nth(n)
            .map(|(i, _)| i)
            .unwrap()
    };
    assert!(position_of(Op::Load, 1) > position_of(Op::Label, 1));
}

#[test]
fn test_logical_or_short_circuits_on_true() {
    let (mut generator, _) = logical(BinaryOp::LogicalOr);
    let labels = find(&generator, Op::Label);
    let lhs = find(&generator, Op::Load)[0][1];
    let branch = &find(&generator, Op::BranchConditional)[0];
    assert_eq!(branch, &vec![lhs, labels[2][0], labels[1][0]]);
    let phi = &find(&generator, Op::Phi)[0];
    assert_eq!(phi[2], generator.bool_constant(true));
}

#[test]
fn test_parameters_are_passed_through_temporaries() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let p = program.add_variable(Variable::parameter("p", Type::float()));
    let f = program.declare_function(FunctionDeclaration::new("f", Type::float(), vec![p]));
    let mut generator = SpirvCodeGenerator::new(&program);
    let f_id = generator.next_id();
    generator.function_ids.insert(f, f_id);
    start(&mut generator, &[x]);

    generator.lower_expression(&Expression::call(
        f,
        Type::float(),
        vec![Expression::var(x, Type::float())],
    )).unwrap();
    let variables = instructions(&generator.encoder.section(Section::Variables));
    assert_eq!(variables.len(), 2);
    let temporary = variables[1].1[1];
    let loaded = find(&generator, Op::Load)[0][1];
    assert!(find(&generator, Op::Store).contains(&vec![temporary, loaded]));
    let call = &find(&generator, Op::FunctionCall)[0];
    assert_eq!(&call[2..], &[f_id, temporary]);
}

#[test]
fn test_out_argument_passes_function_variable_directly() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let p = program.add_variable(Variable::parameter("p", Type::float()).out());
    let f = program.declare_function(FunctionDeclaration::new("f", Type::void(), vec![p]));
    let mut generator = SpirvCodeGenerator::new(&program);
    let f_id = generator.next_id();
    generator.function_ids.insert(f, f_id);
    start(&mut generator, &[x]);

    generator.lower_expression(&Expression::call(
        f,
        Type::void(),
        vec![Expression::var(x, Type::float())],
    )).unwrap();
    let x_pointer = generator.variables[&x];
    assert_eq!(&find(&generator, Op::FunctionCall)[0][2..], &[f_id, x_pointer]);
    assert!(find(&generator, Op::Store).is_empty());
}

#[test]
fn test_swizzled_out_argument_is_written_back() {
    let mut program = Program::new(ProgramKind::Fragment);
    let v = program.add_variable(Variable::local("v", Type::vec4()));
    let p = program.add_variable(Variable::parameter("p", Type::vec2()).out());
    let f = program.declare_function(FunctionDeclaration::new("f", Type::void(), vec![p]));
    let mut generator = SpirvCodeGenerator::new(&program);
    let f_id = generator.next_id();
    generator.function_ids.insert(f, f_id);
    start(&mut generator, &[v]);

    let target = Expression::swizzle(Expression::var(v, Type::vec4()), &[2, 0]);
    generator.lower_expression(&Expression::call(f, Type::void(), vec![target])).unwrap();

    let v_pointer = generator.variables[&v];
    let order = opcodes(&generator);
    let call = order
        .iter()
        .position(|&op| op == Op::FunctionCall as u32)
        .unwrap();
    let after: Vec<u32> = order[call + 1..].to_vec();
    assert_eq!(
        after,
        vec![
            Op::Load as u32,
            Op::Load as u32,
            Op::VectorShuffle as u32,
            Op::Store as u32
        ]
    );
    let shuffles = find(&generator, Op::VectorShuffle);
    let write_back = shuffles.last().unwrap();
    assert_eq!(&write_back[4..], &[5, 1, 4, 3]);
    assert_eq!(find(&generator, Op::Store).last().unwrap()[0], v_pointer);
}

#[test]
fn test_swizzle_store_index_map() {
    assert_eq!(swizzle_store_indices(4, &[2, 0]), vec![5, 1, 4, 3]);
    assert_eq!(swizzle_store_indices(3, &[0, 1]), vec![3, 4, 2]);
    assert_eq!(swizzle_store_indices(2, &[1, 0]), vec![3, 2]);
}

#[test]
fn test_compound_assignment_stores_result() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[x]);

    let result = generator.lower_expression(&Expression::binary(
        Expression::var(x, Type::float()),
        BinaryOp::AddAssign,
        Expression::float(1.0),
        Type::float(),
    )).unwrap();
    let x_pointer = generator.variables[&x];
    assert_eq!(find(&generator, Op::FAdd)[0][1], result);
    assert_eq!(find(&generator, Op::Store), vec![vec![x_pointer, result]]);
}

#[test]
fn test_postfix_increment_returns_old_value() {
    let mut program = Program::new(ProgramKind::Fragment);
    let i = program.add_variable(Variable::local("i", Type::int()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[i]);

    let value = generator.lower_expression(&Expression::postfix(
        PostfixOp::Increment,
        Expression::var(i, Type::int()),
    )).unwrap();
    let loaded = find(&generator, Op::Load)[0][1];
    assert_eq!(value, loaded);
    let add = &find(&generator, Op::IAdd)[0];
    assert_eq!(add[3], generator.int_constant(1));
    assert_eq!(find(&generator, Op::Store)[0][1], add[1]);
}

#[test]
fn test_vector_scalar_arithmetic_broadcasts() {
    let mut program = Program::new(ProgramKind::Fragment);
    let v = program.add_variable(Variable::local("v", Type::vec2()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[v]);

    generator.lower_expression(&Expression::binary(
        Expression::var(v, Type::vec2()),
        BinaryOp::Mul,
        Expression::float(2.0),
        Type::vec2(),
    )).unwrap();
    let two = generator.float_constant(2.0);
    let construct = &find(&generator, Op::CompositeConstruct)[0];
    assert_eq!(&construct[2..], &[two, two]);
    assert_eq!(find(&generator, Op::FMul)[0][3], construct[1]);
}

#[test]
fn test_matrix_multiplication_opcodes() {
    let mut program = Program::new(ProgramKind::Fragment);
    let m = program.add_variable(Variable::local("m", Type::mat(4, 4)));
    let v = program.add_variable(Variable::local("v", Type::vec4()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[m, v]);

    let m_expr = || Expression::var(m, Type::mat(4, 4));
    let v_expr = || Expression::var(v, Type::vec4());
    let cases = [
        (m_expr(), v_expr(), Type::vec4(), Op::MatrixTimesVector),
        (v_expr(), m_expr(), Type::vec4(), Op::VectorTimesMatrix),
        (m_expr(), m_expr(), Type::mat(4, 4), Op::MatrixTimesMatrix),
        (m_expr(), Expression::float(2.0), Type::mat(4, 4), Op::MatrixTimesScalar),
    ];
    for (left, right, ty, op) in cases {
        generator.lower_expression(&Expression::binary(left, BinaryOp::Mul, right, ty)).unwrap();
        assert_eq!(find(&generator, op).len(), 1, "{:?}", op);
    }
}

#[test]
fn test_vector_equality_reduces_to_bool() {
    let mut program = Program::new(ProgramKind::Fragment);
    let v = program.add_variable(Variable::local("v", Type::vec2()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[v]);

    let result = generator.lower_expression(&Expression::binary(
        Expression::var(v, Type::vec2()),
        BinaryOp::Eq,
        Expression::var(v, Type::vec2()),
        Type::bool(),
    )).unwrap();
    let compare = &find(&generator, Op::FOrdEqual)[0];
    let bvec2 = generator.get_type(&Type::vector(quill_ir::ScalarKind::Bool, 2));
    assert_eq!(compare[0], bvec2);
    assert_eq!(find(&generator, Op::All)[0][1..], [result, compare[1]]);
}

#[test]
#[should_panic(expected = "operator '+' is not defined for 'bool'")]
fn test_undefined_operator_aborts() {
    let mut program = Program::new(ProgramKind::Fragment);
    let b = program.add_variable(Variable::local("b", Type::bool()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[b]);

    generator.lower_expression(&Expression::binary(
        Expression::var(b, Type::bool()),
        BinaryOp::Add,
        Expression::var(b, Type::bool()),
        Type::bool(),
    )).unwrap();
}

#[test]
fn test_constant_ternary_uses_select() {
    let mut program = Program::new(ProgramKind::Fragment);
    let b = program.add_variable(Variable::local("b", Type::bool()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[b]);

    generator.lower_expression(&Expression::ternary(
        Expression::var(b, Type::bool()),
        Expression::float(1.0),
        Expression::float(0.0),
    )).unwrap();
    assert_eq!(find(&generator, Op::Select).len(), 1);
    assert!(find(&generator, Op::BranchConditional).is_empty());
}

#[test]
fn test_ternary_with_side_effects_branches() {
    let mut program = Program::new(ProgramKind::Fragment);
    let b = program.add_variable(Variable::local("b", Type::bool()));
    let x = program.add_variable(Variable::local("x", Type::float()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[b, x]);

    let result = generator.lower_expression(&Expression::ternary(
        Expression::var(b, Type::bool()),
        Expression::var(x, Type::float()),
        Expression::float(0.0),
    )).unwrap();
    assert!(find(&generator, Op::Select).is_empty());
    assert_eq!(find(&generator, Op::Label).len(), 4);
    assert_eq!(find(&generator, Op::Store).len(), 2);
    // Result is read back from the temporary after the merge
    let last = body(&generator).pop().unwrap();
    assert_eq!(last.0, Op::Load as u32);
    assert_eq!(last.1[1], result);
}

#[test]
fn test_frag_coord_flip_reads_synthetic_height() {
    let mut program = Program::new(ProgramKind::Fragment);
    program.settings.flip_y = true;
    program.settings.rt_height_set = Some(2);
    let layout = Layout {
        builtin: Some(Builtin::Spirv(BuiltIn::FragCoord as u32)),
        ..Default::default()
    };
    let coord = program.add_variable(
        Variable::global("gl_FragCoord", Type::vec4())
            .with_modifiers(Modifiers::input().with_layout(layout)),
    );
    let globals = [VarDeclaration::new(coord, None)];
    let mut generator = SpirvCodeGenerator::new(&program);
    generator.write_global_vars(&globals);
    start(&mut generator, &[]);

    let read = Expression::var(coord, Type::vec4());
    generator.lower_expression(&read).unwrap();
    let rt_height = generator.rt_height().unwrap();
    assert_eq!(rt_height.field_index, 0);
    generator.lower_expression(&read).unwrap();
    assert_eq!(generator.rt_height(), Some(rt_height));

    let chains = find(&generator, Op::AccessChain);
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0][2], rt_height.variable);
    assert_eq!(find(&generator, Op::FSub).len(), 2);
    let construct = &find(&generator, Op::CompositeConstruct)[0];
    assert_eq!(construct[4], generator.float_constant(0.0));
    assert_eq!(construct[5], generator.float_constant(1.0));

    let decorations = instructions(&generator.encoder.section(Section::Decorations));
    assert!(decorations.contains(&(
        Op::Decorate as u32,
        vec![rt_height.variable, rspirv::spirv::Decoration::Binding as u32, 1]
    )));
    assert!(decorations.contains(&(
        Op::Decorate as u32,
        vec![rt_height.variable, rspirv::spirv::Decoration::DescriptorSet as u32, 2]
    )));
}

#[test]
fn test_frag_coord_is_untouched_without_flip() {
    let mut program = Program::new(ProgramKind::Fragment);
    let layout = Layout {
        builtin: Some(Builtin::Spirv(BuiltIn::FragCoord as u32)),
        ..Default::default()
    };
    let coord = program.add_variable(
        Variable::global("gl_FragCoord", Type::vec4())
            .with_modifiers(Modifiers::input().with_layout(layout)),
    );
    let globals = [VarDeclaration::new(coord, None)];
    let mut generator = SpirvCodeGenerator::new(&program);
    generator.write_global_vars(&globals);
    start(&mut generator, &[]);

    generator.lower_expression(&Expression::var(coord, Type::vec4())).unwrap();
    assert_eq!(generator.rt_height(), None);
    assert_eq!(opcodes(&generator), vec![Op::Label as u32, Op::Load as u32]);
}

#[test]
fn test_prefix_increment_returns_new_value() {
    let mut program = Program::new(ProgramKind::Fragment);
    let i = program.add_variable(Variable::local("i", Type::int()));
    let x = program.add_variable(Variable::local("x", Type::float()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[i, x]);

    let incremented = generator.lower_expression(&Expression::prefix(
        PrefixOp::Increment,
        Expression::var(i, Type::int()),
    )).unwrap();
    let add = &find(&generator, Op::IAdd)[0];
    assert_eq!(add[1], incremented);
    assert_eq!(add[3], generator.int_constant(1));

    let decremented = generator.lower_expression(&Expression::prefix(
        PrefixOp::Decrement,
        Expression::var(x, Type::float()),
    )).unwrap();
    let sub = &find(&generator, Op::FSub)[0];
    assert_eq!(sub[1], decremented);
    assert_eq!(sub[3], generator.float_constant(1.0));

    let (i_pointer, x_pointer) = (generator.variables[&i], generator.variables[&x]);
    assert_eq!(
        find(&generator, Op::Store),
        vec![vec![i_pointer, incremented], vec![x_pointer, decremented]]
    );
}

#[test]
fn test_unary_operators() {
    let mut program = Program::new(ProgramKind::Fragment);
    let x = program.add_variable(Variable::local("x", Type::float()));
    let n = program.add_variable(Variable::local("n", Type::int()));
    let b = program.add_variable(Variable::local("b", Type::bool()));
    let mut generator = SpirvCodeGenerator::new(&program);
    start(&mut generator, &[x, n, b]);

    let unary = |op: PrefixOp, var: VarId, ty: Type| Expression::prefix(op, Expression::var(var, ty));
    let float_negated = generator.lower_expression(&unary(PrefixOp::Minus, x, Type::float())).unwrap();
    let int_negated = generator.lower_expression(&unary(PrefixOp::Minus, n, Type::int())).unwrap();
    let not = generator.lower_expression(&unary(PrefixOp::LogicalNot, b, Type::bool())).unwrap();
    let complement = generator.lower_expression(&unary(PrefixOp::BitNot, n, Type::int())).unwrap();
    let loads: Vec<Word> = find(&generator, Op::Load).iter().map(|load| load[1]).collect();

    assert_eq!(
        find(&generator, Op::FNegate),
        vec![vec![generator.get_type(&Type::float()), float_negated, loads[0]]]
    );
    assert_eq!(
        find(&generator, Op::SNegate),
        vec![vec![generator.get_type(&Type::int()), int_negated, loads[1]]]
    );
    assert_eq!(
        find(&generator, Op::LogicalNot),
        vec![vec![generator.get_type(&Type::bool()), not, loads[2]]]
    );
    assert_eq!(
        find(&generator, Op::Not),
        vec![vec![generator.get_type(&Type::int()), complement, loads[3]]]
    );

    // Unary plus is the operand itself
    let plus = generator.lower_expression(&unary(PrefixOp::Plus, x, Type::float())).unwrap();
    assert_eq!(find(&generator, Op::Load)[4][1], plus);
}

/// A program with one uniform global of type `sampler` and a `name`
/// intrinsic taking it plus `extra` arguments.
fn sampling_program(
    name: &str,
    sampler: SamplerType,
    extra: &[Type],
) -> (Program, VarId, quill_ir::FuncId) {
    let mut program = Program::new(ProgramKind::Fragment);
    let ty = Type::sampler(sampler);
    let var = program.add_variable(
        Variable::global("s", ty.clone()).with_modifiers(Modifiers::uniform()),
    );
    let mut parameters = vec![ty];
    parameters.extend_from_slice(extra);
    let function = program.declare_intrinsic(name, Type::vec4(), &parameters);
    (program, var, function)
}

#[test]
fn test_texture_is_projective_with_an_extra_coordinate() {
    let sampler2d = Type::sampler(SamplerType::new(Dim::D2));
    let (mut program, s, plain) = sampling_program("texture", SamplerType::new(Dim::D2), &[Type::vec2()]);
    let projective = program.declare_intrinsic("texture", Type::vec4(), &[sampler2d.clone(), Type::vec3()]);
    let biased = program.declare_intrinsic(
        "texture",
        Type::vec4(),
        &[sampler2d.clone(), Type::vec2(), Type::float()],
    );
    let globals = [VarDeclaration::new(s, None)];
    let mut generator = SpirvCodeGenerator::new(&program);
    generator.write_global_vars(&globals);
    start(&mut generator, &[]);

    let sampler = || Expression::var(s, sampler2d.clone());
    let coordinate = |ty: Type| Expression::construct(ty, vec![Expression::float(0.5)]);
    let sampled = generator.lower_expression(&Expression::call(
        plain,
        Type::vec4(),
        vec![sampler(), coordinate(Type::vec2())],
    )).unwrap();
    let projected = generator.lower_expression(&Expression::call(
        projective,
        Type::vec4(),
        vec![sampler(), coordinate(Type::vec3())],
    )).unwrap();
    let with_bias = generator.lower_expression(&Expression::call(
        biased,
        Type::vec4(),
        vec![sampler(), coordinate(Type::vec2()), Expression::float(2.0)],
    )).unwrap();

    let half = generator.float_constant(0.5);
    let vec2 = generator.constant_composite(&Type::vec2(), &[half; 2]);
    let vec3 = generator.constant_composite(&Type::vec3(), &[half; 3]);
    let loads: Vec<Word> = find(&generator, Op::Load).iter().map(|load| load[1]).collect();
    let vec4 = generator.get_type(&Type::vec4());

    assert_eq!(
        find(&generator, Op::ImageSampleImplicitLod),
        vec![
            vec![vec4, sampled, loads[0], vec2],
            vec![
                vec4,
                with_bias,
                loads[2],
                vec2,
                ImageOperands::BIAS.bits(),
                generator.float_constant(2.0),
            ],
        ]
    );
    assert_eq!(
        find(&generator, Op::ImageSampleProjImplicitLod),
        vec![vec![vec4, projected, loads[1], vec3]]
    );
}

#[test]
fn test_subpass_load_reads_at_the_origin() {
    let subpass = SamplerType::new(Dim::SubpassData);
    let multisampled = SamplerType {
        multisampled: true,
        ..subpass
    };
    let (mut program, input, load) = sampling_program("subpassLoad", subpass, &[]);
    let input_ms = program.add_variable(
        Variable::global("s_ms", Type::sampler(multisampled)).with_modifiers(Modifiers::uniform()),
    );
    let load_ms = program.declare_intrinsic(
        "subpassLoad",
        Type::vec4(),
        &[Type::sampler(multisampled), Type::int()],
    );
    let globals = [
        VarDeclaration::new(input, None),
        VarDeclaration::new(input_ms, None),
    ];
    let mut generator = SpirvCodeGenerator::new(&program);
    generator.write_global_vars(&globals);
    start(&mut generator, &[]);

    let single = generator.lower_expression(&Expression::call(
        load,
        Type::vec4(),
        vec![Expression::var(input, Type::sampler(subpass))],
    )).unwrap();
    let sampled = generator.lower_expression(&Expression::call(
        load_ms,
        Type::vec4(),
        vec![Expression::var(input_ms, Type::sampler(multisampled)), Expression::int(3)],
    )).unwrap();

    let zero = generator.int_constant(0);
    let origin = generator.constant_composite(&Type::vector(quill_ir::ScalarKind::Int, 2), &[zero, zero]);
    let loads: Vec<Word> = find(&generator, Op::Load).iter().map(|load| load[1]).collect();
    let vec4 = generator.get_type(&Type::vec4());
    assert_eq!(
        find(&generator, Op::ImageRead),
        vec![
            vec![vec4, single, loads[0], origin],
            vec![
                vec4,
                sampled,
                loads[1],
                origin,
                ImageOperands::SAMPLE.bits(),
                generator.int_constant(3),
            ],
        ]
    );
}

/// `struct Constants { float weights[4]; }` as a push-constant block, plus a
/// local of the same type.
fn push_constant_program() -> (Program, Type, VarId, VarId) {
    let mut program = Program::new(ProgramKind::Fragment);
    let ty = Type::structure(
        "Constants",
        vec![Field::new("weights", Type::array(Type::float(), Some(4)))],
    );
    let layout = Layout {
        push_constant: true,
        ..Default::default()
    };
    let block = program.add_variable(
        Variable::global("constants", ty.clone())
            .with_modifiers(Modifiers::uniform().with_layout(layout)),
    );
    program.add_interface_block(block);
    let copy = program.add_variable(Variable::local("copy", ty.clone()));
    (program, ty, block, copy)
}

fn write_block(generator: &mut SpirvCodeGenerator, program: &Program, block: VarId) {
    let position = program.variable(block).position;
    generator.write_interface_block(&InterfaceBlock {
        variable: block,
        position,
    });
}

#[test]
fn test_push_constant_block_uses_std430() {
    let (program, ty, block, _) = push_constant_program();
    let mut generator = SpirvCodeGenerator::new(&program);
    write_block(&mut generator, &program, block);

    let std430 = generator.get_type_with_layout(&ty, MemoryLayout::STD430);
    let array = Type::array(Type::float(), Some(4));
    let std430_array = generator.get_type_with_layout(&array, MemoryLayout::STD430);
    let pointer =
        generator.get_pointer_type_with_layout(&ty, MemoryLayout::STD430, StorageClass::PushConstant);
    let variable = generator.variables[&block];

    let constants = instructions(&generator.encoder.section(Section::Constants));
    assert!(constants.contains(&(
        Op::TypePointer as u32,
        vec![pointer, StorageClass::PushConstant as u32, std430]
    )));
    assert!(constants.contains(&(
        Op::Variable as u32,
        vec![pointer, variable, StorageClass::PushConstant as u32]
    )));
    let decorations = instructions(&generator.encoder.section(Section::Decorations));
    assert!(decorations.contains(&(
        Op::Decorate as u32,
        vec![std430_array, Decoration::ArrayStride as u32, 4]
    )));
    assert!(decorations.contains(&(
        Op::Decorate as u32,
        vec![std430, Decoration::Block as u32]
    )));
    // Nothing was declared under the default layout
    assert!(!decorations
        .iter()
        .any(|(_, operands)| operands[1..] == [Decoration::ArrayStride as u32, 16]));
}

#[test]
fn test_push_constant_global_uses_std430() {
    let mut program = Program::new(ProgramKind::Fragment);
    let array = Type::array(Type::float(), Some(4));
    let layout = Layout {
        push_constant: true,
        ..Default::default()
    };
    let weights = program.add_variable(
        Variable::global("weights", array.clone())
            .with_modifiers(Modifiers::uniform().with_layout(layout)),
    );
    let globals = [VarDeclaration::new(weights, None)];
    let mut generator = SpirvCodeGenerator::new(&program);
    generator.write_global_vars(&globals);

    let std430 = generator.get_type_with_layout(&array, MemoryLayout::STD430);
    let variable = generator.variables[&weights];
    let constants = instructions(&generator.encoder.section(Section::Constants));
    let pointer = constants
        .iter()
        .find(|(opcode, operands)| *opcode == Op::Variable as u32 && operands[1] == variable)
        .map(|(_, operands)| operands.clone())
        .unwrap();
    assert_eq!(pointer[2], StorageClass::PushConstant as u32);
    assert!(constants.contains(&(
        Op::TypePointer as u32,
        vec![pointer[0], StorageClass::PushConstant as u32, std430]
    )));
    let decorations = instructions(&generator.encoder.section(Section::Decorations));
    assert!(decorations.contains(&(
        Op::Decorate as u32,
        vec![std430, Decoration::ArrayStride as u32, 4]
    )));
}

#[test]
fn test_push_constant_aggregate_is_copied_into_default_layout() {
    let (program, ty, block, copy) = push_constant_program();
    let mut generator = SpirvCodeGenerator::new(&program);
    write_block(&mut generator, &program, block);
    start(&mut generator, &[copy]);

    let stored = generator.lower_expression(&Expression::assign(
        Expression::var(copy, ty.clone()),
        Expression::var(block, ty.clone()),
    )).unwrap();

    let array = Type::array(Type::float(), Some(4));
    let std430 = generator.get_type_with_layout(&ty, MemoryLayout::STD430);
    let std430_array = generator.get_type_with_layout(&array, MemoryLayout::STD430);
    let std140 = generator.get_type(&ty);
    let std140_array = generator.get_type(&array);
    assert_ne!(std430, std140);

    let load = &find(&generator, Op::Load)[0];
    assert_eq!(load[0], std430);
    let extracts = find(&generator, Op::CompositeExtract);
    assert_eq!(extracts[0], vec![std430_array, extracts[0][1], load[1], 0]);
    assert_eq!(extracts.len(), 5);
    let elements: Vec<Word> = extracts[1..].iter().map(|extract| extract[1]).collect();

    let constructs = find(&generator, Op::CompositeConstruct);
    assert_eq!(constructs.len(), 2);
    let mut array_construct = vec![std140_array, constructs[0][1]];
    array_construct.extend(elements);
    assert_eq!(constructs[0], array_construct);
    assert_eq!(constructs[1], vec![std140, stored, constructs[0][1]]);
    assert_eq!(
        find(&generator, Op::Store),
        vec![vec![generator.variables[&copy], stored]]
    );
}
