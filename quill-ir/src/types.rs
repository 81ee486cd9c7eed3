/// Types, layout qualifiers and modifiers of the shader IR.
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    /// Prefix used by vector and matrix type names (`ivec3`, `dmat2`, ...)
    fn prefix(self) -> &'static str {
        match self {
            ScalarKind::Bool => "b",
            ScalarKind::Int => "i",
            ScalarKind::UInt => "u",
            ScalarKind::Float => "",
            ScalarKind::Double => "d",
        }
    }

    pub fn is_number(self) -> bool {
        !matches!(self, ScalarKind::Bool)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ScalarKind::Float | ScalarKind::Double)
    }
}

/// Image dimensionality of a sampler type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    D1,
    D2,
    D3,
    Cube,
    Rect,
    Buffer,
    SubpassData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerType {
    pub dim: Dim,
    pub depth: bool,
    pub arrayed: bool,
    pub multisampled: bool,
    /// `false` for storage images
    pub sampled: bool,
}

impl SamplerType {
    pub fn new(dim: Dim) -> Self {
        SamplerType {
            dim,
            depth: false,
            arrayed: false,
            multisampled: false,
            sampled: true,
        }
    }

    fn name(&self) -> String {
        if self.dim == Dim::SubpassData {
            return if self.multisampled { "subpassInputMS" } else { "subpassInput" }.to_string();
        }
        let dim = match self.dim {
            Dim::D1 => "1D",
            Dim::D2 => "2D",
            Dim::D3 => "3D",
            Dim::Cube => "Cube",
            Dim::Rect => "2DRect",
            Dim::Buffer => "Buffer",
            Dim::SubpassData => unreachable!(),
        };
        let mut name = format!("sampler{}", dim);
        if self.multisampled {
            name.push_str("MS");
        }
        if self.arrayed {
            name.push_str("Array");
        }
        if self.depth {
            name.push_str("Shadow");
        }
        name
    }
}

/// Builtin binding of a variable or struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// A SPIR-V `BuiltIn` enumerant value.
    Spirv(u32),
    /// Fragment colour output; bound by location, never decorated.
    FragColor,
    /// Declared by the front end but never emitted.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Layout {
    pub location: Option<u32>,
    pub offset: Option<u32>,
    pub binding: Option<u32>,
    pub index: Option<u32>,
    pub set: Option<u32>,
    pub input_attachment_index: Option<u32>,
    pub builtin: Option<Builtin>,
    pub push_constant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub layout: Layout,
    pub is_in: bool,
    pub is_out: bool,
    pub is_uniform: bool,
}

impl Modifiers {
    pub fn input() -> Self {
        Modifiers {
            is_in: true,
            ..Default::default()
        }
    }

    pub fn output() -> Self {
        Modifiers {
            is_out: true,
            ..Default::default()
        }
    }

    pub fn uniform() -> Self {
        Modifiers {
            is_uniform: true,
            ..Default::default()
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub modifiers: Modifiers,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Field {
            name: name.into(),
            ty,
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.modifiers.layout = layout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Scalar(ScalarKind),
    Vector { component: ScalarKind, size: u32 },
    Matrix { component: ScalarKind, columns: u32, rows: u32 },
    /// `len` is `None` for runtime-sized arrays
    Array { element: Box<Type>, len: Option<u32> },
    Struct { fields: Vec<Field> },
    Sampler(SamplerType),
}

/// A resolved IR type.
///
/// Two types compare equal when their names and shapes match; the source
/// position is carried along for diagnostics only.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub kind: TypeKind,
    pub position: Position,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Type {
    fn named(name: impl Into<String>, kind: TypeKind) -> Self {
        Type {
            name: name.into(),
            kind,
            position: Position::default(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn void() -> Self {
        Type::named("void", TypeKind::Void)
    }

    pub fn scalar(kind: ScalarKind) -> Self {
        Type::named(kind.name(), TypeKind::Scalar(kind))
    }

    pub fn bool() -> Self {
        Type::scalar(ScalarKind::Bool)
    }

    pub fn int() -> Self {
        Type::scalar(ScalarKind::Int)
    }

    pub fn uint() -> Self {
        Type::scalar(ScalarKind::UInt)
    }

    pub fn float() -> Self {
        Type::scalar(ScalarKind::Float)
    }

    pub fn double() -> Self {
        Type::scalar(ScalarKind::Double)
    }

    pub fn vector(component: ScalarKind, size: u32) -> Self {
        assert!((2..=4).contains(&size), "invalid vector size {}", size);
        Type::named(
            format!("{}vec{}", component.prefix(), size),
            TypeKind::Vector { component, size },
        )
    }

    pub fn vec2() -> Self {
        Type::vector(ScalarKind::Float, 2)
    }

    pub fn vec3() -> Self {
        Type::vector(ScalarKind::Float, 3)
    }

    pub fn vec4() -> Self {
        Type::vector(ScalarKind::Float, 4)
    }

    pub fn matrix(component: ScalarKind, columns: u32, rows: u32) -> Self {
        assert!(component.is_floating(), "matrices must have a floating point component");
        let name = if columns == rows {
            format!("{}mat{}", component.prefix(), columns)
        } else {
            format!("{}mat{}x{}", component.prefix(), columns, rows)
        };
        Type::named(name, TypeKind::Matrix { component, columns, rows })
    }

    pub fn mat(columns: u32, rows: u32) -> Self {
        Type::matrix(ScalarKind::Float, columns, rows)
    }

    pub fn array(element: Type, len: Option<u32>) -> Self {
        let name = match len {
            Some(len) => format!("{}[{}]", element.name, len),
            None => format!("{}[]", element.name),
        };
        Type::named(
            name,
            TypeKind::Array {
                element: Box::new(element),
                len,
            },
        )
    }

    pub fn structure(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Type::named(name, TypeKind::Struct { fields })
    }

    pub fn sampler(sampler: SamplerType) -> Self {
        Type::named(sampler.name(), TypeKind::Sampler(sampler))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.kind, TypeKind::Vector { .. })
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self.kind, TypeKind::Matrix { .. })
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self.kind, TypeKind::Sampler(_))
    }

    /// Numeric scalar (not bool).
    pub fn is_number(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar(kind) if kind.is_number())
    }

    /// Component kind of scalars, vectors and matrices.
    pub fn component_kind(&self) -> Option<ScalarKind> {
        match self.kind {
            TypeKind::Scalar(kind) => Some(kind),
            TypeKind::Vector { component, .. } | TypeKind::Matrix { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }

    pub fn component_type(&self) -> Type {
        match &self.kind {
            TypeKind::Array { element, .. } => (**element).clone(),
            _ => match self.component_kind() {
                Some(kind) => Type::scalar(kind),
                None => panic!("type '{}' has no component type", self.name),
            },
        }
    }

    /// Vector size, matrix column count or array length; 1 for scalars.
    pub fn columns(&self) -> u32 {
        match &self.kind {
            TypeKind::Scalar(_) => 1,
            TypeKind::Vector { size, .. } => *size,
            TypeKind::Matrix { columns, .. } => *columns,
            TypeKind::Array { len, .. } => len.unwrap_or(0),
            _ => panic!("type '{}' has no columns", self.name),
        }
    }

    pub fn rows(&self) -> u32 {
        match &self.kind {
            TypeKind::Matrix { rows, .. } => *rows,
            TypeKind::Scalar(_) | TypeKind::Vector { .. } => 1,
            _ => panic!("type '{}' has no rows", self.name),
        }
    }

    /// Column vector type of a matrix.
    pub fn column_type(&self) -> Type {
        match self.kind {
            TypeKind::Matrix { component, rows, .. } => Type::vector(component, rows),
            _ => panic!("type '{}' is not a matrix", self.name),
        }
    }

    /// Type produced by indexing into this type.
    pub fn index_type(&self) -> Type {
        match &self.kind {
            TypeKind::Array { element, .. } => (**element).clone(),
            TypeKind::Matrix { .. } => self.column_type(),
            TypeKind::Vector { component, .. } => Type::scalar(*component),
            _ => panic!("type '{}' cannot be indexed", self.name),
        }
    }

    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Struct { fields } => fields,
            _ => panic!("type '{}' is not a struct", self.name),
        }
    }

    pub fn sampler_type(&self) -> Option<&SamplerType> {
        match &self.kind {
            TypeKind::Sampler(sampler) => Some(sampler),
            _ => None,
        }
    }

    /// Whether the encoding of this type changes with the memory layout
    /// standard (array strides and struct member offsets).
    pub fn depends_on_layout(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. } | TypeKind::Struct { .. })
    }

    /// Same shape with a different component kind (`vec3` -> `ivec3`).
    pub fn with_component(&self, kind: ScalarKind) -> Type {
        match self.kind {
            TypeKind::Scalar(_) => Type::scalar(kind),
            TypeKind::Vector { size, .. } => Type::vector(kind, size),
            TypeKind::Matrix { columns, rows, .. } => Type::matrix(kind, columns, rows),
            _ => panic!("type '{}' has no component kind", self.name),
        }
    }
}
