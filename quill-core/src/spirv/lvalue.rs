use super::globals::storage_class;
use super::layout::MemoryLayout;
use super::SpirvCodeGenerator;
use crate::error::Result;
use quill_ir::{ExprKind, Expression, Type, TypeKind};
use rspirv::spirv::{StorageClass, Word};

/// Something that can be loaded from and stored to.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    /// A variable, or a temporary standing in for a non-addressable value
    Pointer {
        pointer: Word,
        ty: Type,
        storage: StorageClass,
    },
    /// Result of an `OpAccessChain` into a struct, array, matrix or vector
    AccessChain {
        pointer: Word,
        ty: Type,
        storage: StorageClass,
    },
    /// Several lanes of a vector; SPIR-V has no pointer to these
    Swizzle {
        base: Word,
        base_type: Type,
        storage: StorageClass,
        components: Vec<u32>,
        ty: Type,
    },
}

impl LValue {
    pub fn pointer(&self) -> Option<Word> {
        match self {
            LValue::Pointer { pointer, .. } | LValue::AccessChain { pointer, .. } => Some(*pointer),
            LValue::Swizzle { .. } => None,
        }
    }

    pub fn ty(&self) -> &Type {
        match self {
            LValue::Pointer { ty, .. }
            | LValue::AccessChain { ty, .. }
            | LValue::Swizzle { ty, .. } => ty,
        }
    }

    pub fn storage(&self) -> StorageClass {
        match self {
            LValue::Pointer { storage, .. }
            | LValue::AccessChain { storage, .. }
            | LValue::Swizzle { storage, .. } => *storage,
        }
    }
}

/// Shuffle indices writing the lanes of a `value` vector into `components`
/// of a `width`-lane base, operands ordered base then value.
pub fn swizzle_store_indices(width: u32, components: &[u32]) -> Vec<u32> {
    (0..width)
        .map(|lane| match components.iter().position(|&c| c == lane) {
            Some(rank) => width + rank as u32,
            None => lane,
        })
        .collect()
}

impl SpirvCodeGenerator<'_> {
    pub(crate) fn get_lvalue(&mut self, expr: &Expression) -> Result<LValue> {
        let lvalue = match &expr.kind {
            ExprKind::VariableRef(var) => LValue::Pointer {
                pointer: self.variable_pointer(*var),
                ty: expr.ty.clone(),
                storage: storage_class(self.program.variable(*var)),
            },
            ExprKind::FieldAccess { .. } | ExprKind::Index { .. } => {
                let (chain, storage) = self.access_chain(expr)?;
                self.write_access_chain(&expr.ty, storage, &chain)?
            }
            ExprKind::Swizzle { base, components } => {
                let base_lvalue = self.get_lvalue(base)?;
                let (base_pointer, storage) = self.addressable(base_lvalue)?;
                if let [component] = components[..] {
                    let index = self.int_constant(component as i32);
                    self.write_access_chain(&expr.ty, storage, &[base_pointer, index])?
                } else {
                    LValue::Swizzle {
                        base: base_pointer,
                        base_type: base.ty.clone(),
                        storage,
                        components: components.clone(),
                        ty: expr.ty.clone(),
                    }
                }
            }
            _ => {
                let value = self.lower_expression(expr)?;
                LValue::Pointer {
                    pointer: self.materialize(&expr.ty, value)?,
                    ty: expr.ty.clone(),
                    storage: StorageClass::Function,
                }
            }
        };
        Ok(lvalue)
    }

    /// Pointer to an lvalue's storage, copying a multi-lane swizzle into a
    /// temporary first.
    fn addressable(&mut self, lvalue: LValue) -> Result<(Word, StorageClass)> {
        match lvalue.pointer() {
            Some(pointer) => Ok((pointer, lvalue.storage())),
            None => {
                let value = self.load_lvalue(&lvalue)?;
                Ok((self.materialize(lvalue.ty(), value)?, StorageClass::Function))
            }
        }
    }

    /// Root pointer followed by every index of a nested field/index
    /// expression, plus the storage class of the root.
    fn access_chain(&mut self, expr: &Expression) -> Result<(Vec<Word>, StorageClass)> {
        match &expr.kind {
            ExprKind::Index { base, index } => {
                let (mut chain, storage) = self.access_chain(base)?;
                chain.push(self.lower_expression(index)?);
                Ok((chain, storage))
            }
            ExprKind::FieldAccess { base, field } => {
                let (mut chain, storage) = self.access_chain(base)?;
                chain.push(self.int_constant(*field as i32));
                Ok((chain, storage))
            }
            _ => {
                let lvalue = self.get_lvalue(expr)?;
                let (pointer, storage) = self.addressable(lvalue)?;
                Ok((vec![pointer], storage))
            }
        }
    }

    fn write_access_chain(
        &mut self,
        ty: &Type,
        storage: StorageClass,
        chain: &[Word],
    ) -> Result<LValue> {
        let pointer_type = self.get_pointer_type(ty, storage);
        let (base, indices) = (chain[0], chain[1..].to_vec());
        let pointer = self
            .encoder
            .builder
            .access_chain(pointer_type, None, base, indices)?;
        Ok(LValue::AccessChain {
            pointer,
            ty: ty.clone(),
            storage,
        })
    }

    pub(crate) fn load_lvalue(&mut self, lvalue: &LValue) -> Result<Word> {
        match lvalue {
            LValue::Pointer { pointer, ty, storage } | LValue::AccessChain { pointer, ty, storage } => {
                self.load(ty, *storage, *pointer)
            }
            LValue::Swizzle {
                base,
                base_type,
                storage,
                components,
                ty,
            } => {
                let base = self.load(base_type, *storage, *base)?;
                let result_type = self.get_type(ty);
                let id = self.encoder.builder.vector_shuffle(
                    result_type,
                    None,
                    base,
                    base,
                    components.iter().copied(),
                )?;
                Ok(id)
            }
        }
    }

    pub(crate) fn store_lvalue(&mut self, lvalue: &LValue, value: Word) -> Result<()> {
        match lvalue {
            LValue::Pointer { pointer, .. } | LValue::AccessChain { pointer, .. } => {
                self.encoder.builder.store(*pointer, value, None, [])?;
            }
            LValue::Swizzle {
                base,
                base_type,
                storage,
                components,
                ..
            } => {
                let original = self.load(base_type, *storage, *base)?;
                let base_type_id = self.get_type_with_layout(base_type, self.layout_for(*storage));
                let id = self.encoder.builder.vector_shuffle(
                    base_type_id,
                    None,
                    original,
                    value,
                    swizzle_store_indices(base_type.columns(), components),
                )?;
                self.encoder.builder.store(*base, id, None, [])?;
            }
        }
        Ok(())
    }

    /// Loads through `pointer`. Aggregates laid out differently from the
    /// default are rebuilt under the default layout, so the value can be
    /// stored anywhere else.
    fn load(&mut self, ty: &Type, storage: StorageClass, pointer: Word) -> Result<Word> {
        let layout = self.layout_for(storage);
        let type_id = self.get_type_with_layout(ty, layout);
        let value = self.encoder.builder.load(type_id, None, pointer, None, [])?;
        if layout != self.default_layout && ty.depends_on_layout() {
            return self.relayout(ty, value, layout);
        }
        Ok(value)
    }

    /// Copies `value`, declared under `from`, member by member into the
    /// same type under the default layout.
    fn relayout(&mut self, ty: &Type, value: Word, from: MemoryLayout) -> Result<Word> {
        let members: Vec<(u32, Type)> = match &ty.kind {
            TypeKind::Struct { fields } => fields
                .iter()
                .enumerate()
                .map(|(index, field)| (index as u32, field.ty.clone()))
                .collect(),
            TypeKind::Array {
                element,
                len: Some(len),
            } => (0..*len).map(|index| (index, (**element).clone())).collect(),
            _ => return Ok(value),
        };
        let mut parts = Vec::with_capacity(members.len());
        for (index, member_type) in members {
            let source_type = self.get_type_with_layout(&member_type, from);
            let part = self
                .encoder
                .builder
                .composite_extract(source_type, None, value, [index])?;
            parts.push(self.relayout(&member_type, part, from)?);
        }
        let type_id = self.get_type(ty);
        Ok(self.encoder.builder.composite_construct(type_id, None, parts)?)
    }

    /// Declares a Function-storage temporary of `ty`.
    pub(crate) fn temporary(&mut self, ty: &Type) -> Result<Word> {
        let pointer_type = self.get_pointer_type(ty, StorageClass::Function);
        self.encoder.local_variable(pointer_type)
    }

    /// Stores `value` into a fresh temporary and returns its pointer.
    pub(crate) fn materialize(&mut self, ty: &Type, value: Word) -> Result<Word> {
        let pointer = self.temporary(ty)?;
        self.encoder.builder.store(pointer, value, None, [])?;
        Ok(pointer)
    }
}
