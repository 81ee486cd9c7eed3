use super::SpirvCodeGenerator;
use log::trace;
use quill_ir::{ScalarKind, Type, TypeKind};
use rspirv::spirv::Word;
use std::collections::HashMap;

/// Constants already declared in the module. Floats are keyed by
/// bit pattern so `-0.0` and `0.0` stay distinct.
#[derive(Debug, Default)]
pub struct ConstantCache {
    ints: HashMap<i32, Word>,
    uints: HashMap<u32, Word>,
    bool_true: Option<Word>,
    bool_false: Option<Word>,
    floats: HashMap<u32, Word>,
    doubles: HashMap<u64, Word>,
    composites: HashMap<(Word, Vec<Word>), Word>,
}

impl SpirvCodeGenerator<'_> {
    pub fn int_constant(&mut self, value: i32) -> Word {
        if let Some(&id) = self.constants.ints.get(&value) {
            return id;
        }
        let ty = self.get_type(&Type::int());
        let id = self.encoder.builder.constant_bit32(ty, value as u32);
        trace!("int constant {} -> %{}", value, id);
        self.constants.ints.insert(value, id);
        id
    }

    pub fn uint_constant(&mut self, value: u32) -> Word {
        if let Some(&id) = self.constants.uints.get(&value) {
            return id;
        }
        let ty = self.get_type(&Type::uint());
        let id = self.encoder.builder.constant_bit32(ty, value);
        trace!("uint constant {} -> %{}", value, id);
        self.constants.uints.insert(value, id);
        id
    }

    pub fn bool_constant(&mut self, value: bool) -> Word {
        let cached = if value {
            self.constants.bool_true
        } else {
            self.constants.bool_false
        };
        if let Some(id) = cached {
            return id;
        }
        let ty = self.get_type(&Type::bool());
        let id = if value {
            self.encoder.builder.constant_true(ty)
        } else {
            self.encoder.builder.constant_false(ty)
        };
        if value {
            self.constants.bool_true = Some(id);
        } else {
            self.constants.bool_false = Some(id);
        }
        id
    }

    pub fn float_constant(&mut self, value: f32) -> Word {
        let bits = value.to_bits();
        if let Some(&id) = self.constants.floats.get(&bits) {
            return id;
        }
        let ty = self.get_type(&Type::float());
        let id = self.encoder.builder.constant_bit32(ty, bits);
        trace!("float constant {} -> %{}", value, id);
        self.constants.floats.insert(bits, id);
        id
    }

    /// 64-bit literals are written low word first.
    pub fn double_constant(&mut self, value: f64) -> Word {
        let bits = value.to_bits();
        if let Some(&id) = self.constants.doubles.get(&bits) {
            return id;
        }
        let ty = self.get_type(&Type::double());
        let id = self.encoder.builder.constant_bit64(ty, bits);
        trace!("double constant {} -> %{}", value, id);
        self.constants.doubles.insert(bits, id);
        id
    }

    pub fn constant_composite(&mut self, ty: &Type, components: &[Word]) -> Word {
        let type_id = self.get_type(ty);
        let key = (type_id, components.to_vec());
        if let Some(&id) = self.constants.composites.get(&key) {
            return id;
        }
        let id = self
            .encoder
            .builder
            .constant_composite(type_id, components.iter().copied());
        self.constants.composites.insert(key, id);
        id
    }

    /// A scalar constant of the given kind; `value` is converted as a
    /// shading language cast would.
    pub fn scalar_constant(&mut self, kind: ScalarKind, value: f64) -> Word {
        match kind {
            ScalarKind::Bool => self.bool_constant(value != 0.0),
            ScalarKind::Int => self.int_constant(value as i32),
            ScalarKind::UInt => self.uint_constant(value as u32),
            ScalarKind::Float => self.float_constant(value as f32),
            ScalarKind::Double => self.double_constant(value),
        }
    }

    /// `value` in every component of a scalar, vector or matrix type.
    pub fn splat_constant(&mut self, ty: &Type, value: f64) -> Word {
        match &ty.kind {
            TypeKind::Scalar(kind) => self.scalar_constant(*kind, value),
            TypeKind::Vector { component, size } => {
                let scalar = self.scalar_constant(*component, value);
                self.constant_composite(ty, &vec![scalar; *size as usize])
            }
            TypeKind::Matrix { columns, .. } => {
                let column = self.splat_constant(&ty.column_type(), value);
                self.constant_composite(ty, &vec![column; *columns as usize])
            }
            _ => panic!("cannot splat a constant of type '{}'", ty),
        }
    }
}
