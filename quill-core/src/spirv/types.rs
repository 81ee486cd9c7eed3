use super::layout::{align_to, LayoutStd, MemoryLayout};
use super::SpirvCodeGenerator;
use log::trace;
use quill_ir::{Dim, Field, FunctionDeclaration, Layout, SamplerType, ScalarKind, Type, TypeKind};
use rspirv::dr::Operand;
use rspirv::spirv::{self, Capability, Decoration, ImageFormat, StorageClass, Word};
use std::collections::HashMap;

/// Cache key for a type under a memory layout. Only types whose encoding
/// depends on the layout keep the layout in their key, so a `vec4` is
/// declared once no matter which block it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    ty: Type,
    layout: Option<LayoutStd>,
}

impl TypeKey {
    pub fn new(ty: &Type, layout: MemoryLayout) -> Self {
        TypeKey {
            ty: ty.clone(),
            layout: ty.depends_on_layout().then_some(layout.std),
        }
    }
}

#[derive(Debug, Default)]
pub struct TypeCache {
    types: HashMap<TypeKey, Word>,
    function_types: HashMap<(Type, Vec<Type>), Word>,
    pointers: HashMap<(TypeKey, StorageClass), Word>,
}

fn spirv_dim(dim: Dim) -> spirv::Dim {
    match dim {
        Dim::D1 => spirv::Dim::Dim1D,
        Dim::D2 => spirv::Dim::Dim2D,
        Dim::D3 => spirv::Dim::Dim3D,
        Dim::Cube => spirv::Dim::DimCube,
        Dim::Rect => spirv::Dim::DimRect,
        Dim::Buffer => spirv::Dim::DimBuffer,
        Dim::SubpassData => spirv::Dim::DimSubpassData,
    }
}

impl SpirvCodeGenerator<'_> {
    /// Id of `ty` under the default memory layout.
    pub fn get_type(&mut self, ty: &Type) -> Word {
        self.get_type_with_layout(ty, self.default_layout)
    }

    pub fn get_type_with_layout(&mut self, ty: &Type, layout: MemoryLayout) -> Word {
        let key = TypeKey::new(ty, layout);
        if let Some(&id) = self.types.types.get(&key) {
            return id;
        }
        let id = self.next_id();
        trace!("Declaring type {} as %{}", ty, id);
        match &ty.kind {
            TypeKind::Void => {
                self.encoder.builder.type_void_id(Some(id));
            }
            TypeKind::Scalar(kind) => self.write_scalar_type(*kind, id),
            TypeKind::Vector { component, size } => {
                let component = self.get_type_with_layout(&Type::scalar(*component), layout);
                self.encoder
                    .builder
                    .type_vector_id(Some(id), component, *size);
            }
            TypeKind::Matrix { columns, .. } => {
                let column = self.get_type_with_layout(&ty.column_type(), layout);
                self.encoder
                    .builder
                    .type_matrix_id(Some(id), column, *columns);
            }
            TypeKind::Array { element, len } => {
                let Some(len) = len else {
                    panic!("runtime-sized arrays are not supported ('{}')", ty);
                };
                let element = self.get_type_with_layout(element, layout);
                let len = self.int_constant(*len as i32);
                self.encoder.builder.type_array_id(Some(id), element, len);
                self.decorate(id, Decoration::ArrayStride, &[layout.stride(ty) as Word]);
            }
            TypeKind::Struct { fields } => self.write_struct(ty, fields, layout, id),
            TypeKind::Sampler(sampler) => self.write_sampler_type(sampler, layout, id),
        }
        self.types.types.insert(key, id);
        id
    }

    fn write_scalar_type(&mut self, kind: ScalarKind, id: Word) {
        let builder = &mut self.encoder.builder;
        match kind {
            ScalarKind::Bool => builder.type_bool_id(Some(id)),
            ScalarKind::Int => builder.type_int_id(Some(id), 32, 1),
            ScalarKind::UInt => builder.type_int_id(Some(id), 32, 0),
            ScalarKind::Float => builder.type_float_id(Some(id), 32),
            ScalarKind::Double => {
                self.capabilities.insert(Capability::Float64);
                builder.type_float_id(Some(id), 64)
            }
        };
    }

    fn write_sampler_type(&mut self, sampler: &SamplerType, layout: MemoryLayout, id: Word) {
        match sampler.dim {
            Dim::D1 => self.require_capability(Capability::Sampled1D),
            Dim::Rect => self.require_capability(Capability::SampledRect),
            Dim::Buffer => self.require_capability(Capability::SampledBuffer),
            Dim::SubpassData => self.require_capability(Capability::InputAttachment),
            Dim::D2 | Dim::D3 | Dim::Cube => {}
        }
        let sampled_type = self.get_type_with_layout(&Type::float(), layout);
        let is_subpass = sampler.dim == Dim::SubpassData;
        let image = if is_subpass { id } else { self.next_id() };
        self.encoder.builder.type_image_id(
            Some(image),
            sampled_type,
            spirv_dim(sampler.dim),
            sampler.depth as u32,
            sampler.arrayed as u32,
            sampler.multisampled as u32,
            if sampler.sampled { 1 } else { 2 },
            ImageFormat::Unknown,
            None,
        );
        if !is_subpass {
            self.encoder.builder.type_sampled_image_id(Some(id), image);
        }
    }

    fn write_struct(&mut self, ty: &Type, fields: &[Field], layout: MemoryLayout, id: Word) {
        self.write_name(id, &ty.name);
        // Resolve member types first so nothing is written in the middle of
        // the struct declaration
        let members: Vec<Word> = fields
            .iter()
            .map(|field| self.get_type_with_layout(&field.ty, layout))
            .collect();
        self.encoder.builder.type_struct_id(Some(id), members);

        let mut offset = 0;
        for (i, field) in fields.iter().enumerate() {
            let member = i as Word;
            let size = layout.size(&field.ty);
            let alignment = layout.alignment(&field.ty);
            let field_layout = &field.modifiers.layout;
            match field_layout.offset {
                Some(explicit) => {
                    let explicit = explicit as usize;
                    if explicit < offset {
                        self.errors.layout_error(
                            ty.position,
                            format!("offset of field '{}' must be at least {}", field.name, offset),
                        );
                    }
                    if explicit % alignment != 0 {
                        self.errors.layout_error(
                            ty.position,
                            format!(
                                "offset of field '{}' must be a multiple of {}",
                                field.name, alignment
                            ),
                        );
                    }
                    offset = explicit;
                }
                None => offset = align_to(offset, alignment),
            }
            self.encoder.builder.member_name(id, member, field.name.as_str());
            self.write_member_layout(field_layout, id, member);
            if field_layout.builtin.is_none() {
                self.member_decorate(id, member, Decoration::Offset, &[offset as Word]);
            }
            if field.ty.is_matrix() {
                self.member_decorate(id, member, Decoration::ColMajor, &[]);
                let stride = layout.stride(&field.ty) as Word;
                self.member_decorate(id, member, Decoration::MatrixStride, &[stride]);
            }
            offset += size;
            if field.ty.depends_on_layout() {
                offset = align_to(offset, alignment);
            }
        }
    }

    pub(crate) fn decorate(&mut self, target: Word, decoration: Decoration, literals: &[Word]) {
        let operands = literals.iter().map(|&value| Operand::LiteralBit32(value));
        self.encoder.builder.decorate(target, decoration, operands);
    }

    fn member_decorate(&mut self, target: Word, member: Word, decoration: Decoration, literals: &[Word]) {
        let operands = literals.iter().map(|&value| Operand::LiteralBit32(value));
        self.encoder
            .builder
            .member_decorate(target, member, decoration, operands);
    }

    /// Layout qualifiers of a variable or block.
    pub(crate) fn write_layout(&mut self, layout: &Layout, target: Word) {
        let decorations = [
            (layout.location, Decoration::Location),
            (layout.binding, Decoration::Binding),
            (layout.index, Decoration::Index),
            (layout.set, Decoration::DescriptorSet),
            (layout.input_attachment_index, Decoration::InputAttachmentIndex),
        ];
        for (value, decoration) in decorations {
            if let Some(value) = value {
                self.decorate(target, decoration, &[value]);
            }
        }
        if let Some(quill_ir::Builtin::Spirv(builtin)) = layout.builtin {
            self.decorate(target, Decoration::BuiltIn, &[builtin]);
        }
    }

    fn write_member_layout(&mut self, layout: &Layout, target: Word, member: Word) {
        let decorations = [
            (layout.location, Decoration::Location),
            (layout.binding, Decoration::Binding),
            (layout.index, Decoration::Index),
            (layout.set, Decoration::DescriptorSet),
            (layout.input_attachment_index, Decoration::InputAttachmentIndex),
        ];
        for (value, decoration) in decorations {
            if let Some(value) = value {
                self.member_decorate(target, member, decoration, &[value]);
            }
        }
        if let Some(quill_ir::Builtin::Spirv(builtin)) = layout.builtin {
            self.member_decorate(target, member, Decoration::BuiltIn, &[builtin]);
        }
    }

    /// Function types take every parameter as a pointer to Function
    /// storage; call sites pass the address of a temporary.
    pub fn get_function_type(&mut self, function: &FunctionDeclaration) -> Word {
        let program = self.program;
        let parameters: Vec<Type> = function
            .parameters
            .iter()
            .map(|&param| program.variable(param).ty.clone())
            .collect();
        let key = (function.return_type.clone(), parameters);
        if let Some(&id) = self.types.function_types.get(&key) {
            return id;
        }
        let return_type = self.get_type(&function.return_type);
        let parameters: Vec<Word> = key
            .1
            .iter()
            .map(|param| self.get_pointer_type(param, StorageClass::Function))
            .collect();
        let id = self.next_id();
        self.encoder
            .builder
            .type_function_id(Some(id), return_type, parameters);
        self.types.function_types.insert(key, id);
        id
    }

    /// Pointer to `ty` in `storage_class`, with the pointee laid out as that
    /// storage class requires.
    pub fn get_pointer_type(&mut self, ty: &Type, storage_class: StorageClass) -> Word {
        let layout = self.layout_for(storage_class);
        self.get_pointer_type_with_layout(ty, layout, storage_class)
    }

    pub fn get_pointer_type_with_layout(
        &mut self,
        ty: &Type,
        layout: MemoryLayout,
        storage_class: StorageClass,
    ) -> Word {
        let key = (TypeKey::new(ty, layout), storage_class);
        if let Some(&id) = self.types.pointers.get(&key) {
            return id;
        }
        let pointee = self.get_type_with_layout(ty, layout);
        let id = self.next_id();
        self.encoder
            .builder
            .type_pointer(Some(id), storage_class, pointee);
        self.types.pointers.insert(key, id);
        id
    }
}
