/// Expressions, statements and program structure of the shader IR.
///
/// Trees are produced by a front end that has already resolved every type;
/// back ends consume them read-only.
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    Global,
    Local,
    Parameter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub modifiers: Modifiers,
    pub storage: Storage,
    pub is_read_from: bool,
    pub is_written_to: bool,
    pub position: Position,
}

impl Variable {
    /// A variable the front end saw both read and written.
    pub fn new(name: impl Into<String>, ty: Type, storage: Storage) -> Self {
        Variable {
            name: name.into(),
            ty,
            modifiers: Modifiers::default(),
            storage,
            is_read_from: true,
            is_written_to: true,
            position: Position::default(),
        }
    }

    pub fn global(name: impl Into<String>, ty: Type) -> Self {
        Variable::new(name, ty, Storage::Global)
    }

    pub fn local(name: impl Into<String>, ty: Type) -> Self {
        Variable::new(name, ty, Storage::Local)
    }

    pub fn parameter(name: impl Into<String>, ty: Type) -> Self {
        Variable::new(name, ty, Storage::Parameter)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Marks an `out`/`inout` parameter.
    pub fn out(mut self) -> Self {
        self.modifiers.is_out = true;
        self
    }

    pub fn with_usage(mut self, is_read_from: bool, is_written_to: bool) -> Self {
        self.is_read_from = is_read_from;
        self.is_written_to = is_written_to;
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        self == BinaryOp::Assign || self.compound_base().is_some()
    }

    /// Underlying operator of a compound assignment (`+=` -> `+`).
    pub fn compound_base(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::AddAssign => BinaryOp::Add,
            BinaryOp::SubAssign => BinaryOp::Sub,
            BinaryOp::MulAssign => BinaryOp::Mul,
            BinaryOp::DivAssign => BinaryOp::Div,
            BinaryOp::ModAssign => BinaryOp::Mod,
            BinaryOp::ShlAssign => BinaryOp::Shl,
            BinaryOp::ShrAssign => BinaryOp::Shr,
            BinaryOp::BitAndAssign => BinaryOp::BitAnd,
            BinaryOp::BitOrAssign => BinaryOp::BitOr,
            BinaryOp::BitXorAssign => BinaryOp::BitXor,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Assign => "=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::LogicalXor => "^^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::AddAssign => "+=",
            BinaryOp::SubAssign => "-=",
            BinaryOp::MulAssign => "*=",
            BinaryOp::DivAssign => "/=",
            BinaryOp::ModAssign => "%=",
            BinaryOp::ShlAssign => "<<=",
            BinaryOp::ShrAssign => ">>=",
            BinaryOp::BitAndAssign => "&=",
            BinaryOp::BitOrAssign => "|=",
            BinaryOp::BitXorAssign => "^=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixOp {
    Plus,
    Minus,
    LogicalNot,
    BitNot,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    BoolLiteral(bool),
    /// Typed `int` or `uint` by the expression's type
    IntLiteral(i64),
    /// Typed `float` or `double` by the expression's type
    FloatLiteral(f64),
    VariableRef(VarId),
    FieldAccess {
        base: Box<Expression>,
        field: u32,
    },
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Swizzle {
        base: Box<Expression>,
        components: Vec<u32>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    Prefix {
        op: PrefixOp,
        operand: Box<Expression>,
    },
    Postfix {
        op: PostfixOp,
        operand: Box<Expression>,
    },
    Ternary {
        test: Box<Expression>,
        if_true: Box<Expression>,
        if_false: Box<Expression>,
    },
    Constructor {
        args: Vec<Expression>,
    },
    FunctionCall {
        function: FuncId,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub ty: Type,
    pub position: Position,
}

impl Expression {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Expression {
            kind,
            ty,
            position: Position::default(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn bool(value: bool) -> Self {
        Expression::new(ExprKind::BoolLiteral(value), Type::bool())
    }

    pub fn int(value: i32) -> Self {
        Expression::new(ExprKind::IntLiteral(value as i64), Type::int())
    }

    pub fn uint(value: u32) -> Self {
        Expression::new(ExprKind::IntLiteral(value as i64), Type::uint())
    }

    pub fn float(value: f32) -> Self {
        Expression::new(ExprKind::FloatLiteral(value as f64), Type::float())
    }

    pub fn double(value: f64) -> Self {
        Expression::new(ExprKind::FloatLiteral(value), Type::double())
    }

    pub fn var(id: VarId, ty: Type) -> Self {
        Expression::new(ExprKind::VariableRef(id), ty)
    }

    pub fn field(base: Expression, field: u32) -> Self {
        let ty = base.ty.fields()[field as usize].ty.clone();
        Expression::new(
            ExprKind::FieldAccess {
                base: Box::new(base),
                field,
            },
            ty,
        )
    }

    pub fn index(base: Expression, index: Expression) -> Self {
        let ty = base.ty.index_type();
        Expression::new(
            ExprKind::Index {
                base: Box::new(base),
                index: Box::new(index),
            },
            ty,
        )
    }

    pub fn swizzle(base: Expression, components: &[u32]) -> Self {
        let component = base
            .ty
            .component_kind()
            .unwrap_or_else(|| panic!("cannot swizzle '{}'", base.ty));
        let ty = match components.len() {
            1 => Type::scalar(component),
            n => Type::vector(component, n as u32),
        };
        Expression::new(
            ExprKind::Swizzle {
                base: Box::new(base),
                components: components.to_vec(),
            },
            ty,
        )
    }

    pub fn binary(left: Expression, op: BinaryOp, right: Expression, ty: Type) -> Self {
        Expression::new(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            ty,
        )
    }

    pub fn assign(target: Expression, value: Expression) -> Self {
        let ty = target.ty.clone();
        Expression::binary(target, BinaryOp::Assign, value, ty)
    }

    pub fn prefix(op: PrefixOp, operand: Expression) -> Self {
        let ty = operand.ty.clone();
        Expression::new(
            ExprKind::Prefix {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn postfix(op: PostfixOp, operand: Expression) -> Self {
        let ty = operand.ty.clone();
        Expression::new(
            ExprKind::Postfix {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn ternary(test: Expression, if_true: Expression, if_false: Expression) -> Self {
        let ty = if_true.ty.clone();
        Expression::new(
            ExprKind::Ternary {
                test: Box::new(test),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            },
            ty,
        )
    }

    pub fn construct(ty: Type, args: Vec<Expression>) -> Self {
        Expression::new(ExprKind::Constructor { args }, ty)
    }

    pub fn call(function: FuncId, return_type: Type, args: Vec<Expression>) -> Self {
        Expression::new(ExprKind::FunctionCall { function, args }, return_type)
    }

    /// Literals, and constructors whose arguments are all constant.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::BoolLiteral(_) | ExprKind::IntLiteral(_) | ExprKind::FloatLiteral(_) => true,
            ExprKind::Constructor { args } => args.iter().all(Expression::is_constant),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDeclaration {
    pub var: VarId,
    pub value: Option<Expression>,
}

impl VarDeclaration {
    pub fn new(var: VarId, value: Option<Expression>) -> Self {
        VarDeclaration { var, value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Vec<Statement>),
    Expression(Expression),
    VarDeclarations(Vec<VarDeclaration>),
    If {
        test: Expression,
        if_true: Box<Statement>,
        if_false: Option<Box<Statement>>,
    },
    For {
        initializer: Option<Box<Statement>>,
        test: Option<Expression>,
        next: Option<Expression>,
        body: Box<Statement>,
    },
    While {
        test: Expression,
        body: Box<Statement>,
    },
    Do {
        body: Box<Statement>,
        test: Expression,
    },
    Break,
    Continue,
    Discard,
    Return(Option<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub position: Position,
}

impl Statement {
    pub fn new(kind: StmtKind) -> Self {
        Statement {
            kind,
            position: Position::default(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn block(statements: Vec<Statement>) -> Self {
        Statement::new(StmtKind::Block(statements))
    }

    pub fn expr(expression: Expression) -> Self {
        Statement::new(StmtKind::Expression(expression))
    }

    pub fn declare(var: VarId, value: Option<Expression>) -> Self {
        Statement::new(StmtKind::VarDeclarations(vec![VarDeclaration::new(var, value)]))
    }

    pub fn if_else(test: Expression, if_true: Statement, if_false: Option<Statement>) -> Self {
        Statement::new(StmtKind::If {
            test,
            if_true: Box::new(if_true),
            if_false: if_false.map(Box::new),
        })
    }

    pub fn for_loop(
        initializer: Option<Statement>,
        test: Option<Expression>,
        next: Option<Expression>,
        body: Statement,
    ) -> Self {
        Statement::new(StmtKind::For {
            initializer: initializer.map(Box::new),
            test,
            next,
            body: Box::new(body),
        })
    }

    pub fn while_loop(test: Expression, body: Statement) -> Self {
        Statement::new(StmtKind::While {
            test,
            body: Box::new(body),
        })
    }

    pub fn do_while(body: Statement, test: Expression) -> Self {
        Statement::new(StmtKind::Do {
            body: Box::new(body),
            test,
        })
    }

    pub fn ret(value: Option<Expression>) -> Self {
        Statement::new(StmtKind::Return(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub return_type: Type,
    pub parameters: Vec<VarId>,
    pub position: Position,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, return_type: Type, parameters: Vec<VarId>) -> Self {
        FunctionDeclaration {
            name: name.into(),
            return_type,
            parameters,
            position: Position::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub declaration: FuncId,
    pub body: Statement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceBlock {
    /// Global variable whose type is the block's struct
    pub variable: VarId,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramElement {
    Function(FunctionDefinition),
    Var(Vec<VarDeclaration>),
    InterfaceBlock(InterfaceBlock),
    Extension(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Remap the built-in fragment coordinate to a top-left origin
    pub flip_y: bool,
    /// Binding of the synthetic uniform block holding the render target height
    pub rt_height_binding: u32,
    pub rt_height_set: Option<u32>,
    /// Lower `while` and `do` loops instead of reporting them as unsupported
    pub enable_while_loops: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            flip_y: false,
            rt_height_binding: 1,
            rt_height_set: None,
            enable_while_loops: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    /// The program's first interface block carries the render target height
    pub rt_height: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub kind: ProgramKind,
    pub settings: Settings,
    pub inputs: Inputs,
    pub elements: Vec<ProgramElement>,
    pub variables: Vec<Variable>,
    pub functions: Vec<FunctionDeclaration>,
}

impl Program {
    pub fn new(kind: ProgramKind) -> Self {
        Program {
            kind,
            settings: Settings::default(),
            inputs: Inputs::default(),
            elements: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_variable(&mut self, variable: Variable) -> VarId {
        self.variables.push(variable);
        VarId(self.variables.len() as u32 - 1)
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn declare_function(&mut self, declaration: FunctionDeclaration) -> FuncId {
        self.functions.push(declaration);
        FuncId(self.functions.len() as u32 - 1)
    }

    pub fn function(&self, id: FuncId) -> &FunctionDeclaration {
        &self.functions[id.0 as usize]
    }

    pub fn define_function(&mut self, declaration: FuncId, body: Statement) {
        self.elements
            .push(ProgramElement::Function(FunctionDefinition { declaration, body }));
    }

    /// Declares an intrinsic; calls to it resolve by name in the back end.
    pub fn declare_intrinsic(&mut self, name: &str, return_type: Type, parameters: &[Type]) -> FuncId {
        let parameters = parameters
            .iter()
            .enumerate()
            .map(|(i, ty)| self.add_variable(Variable::parameter(format!("p{}", i), ty.clone())))
            .collect();
        self.declare_function(FunctionDeclaration::new(name, return_type, parameters))
    }

    pub fn add_global_vars(&mut self, declarations: Vec<VarDeclaration>) {
        self.elements.push(ProgramElement::Var(declarations));
    }

    pub fn add_interface_block(&mut self, variable: VarId) {
        let position = self.variable(variable).position;
        self.elements
            .push(ProgramElement::InterfaceBlock(InterfaceBlock { variable, position }));
    }

    pub fn add_extension(&mut self, name: impl Into<String>) {
        self.elements.push(ProgramElement::Extension(name.into()));
    }
}
